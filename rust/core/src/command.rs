// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed command channel between an interaction layer and a session.
//!
//! The driver applies every load in arrival order as soon as it is
//! received, then keeps the resulting fetches in flight concurrently; a
//! slow fetch never delays the visibility changes of a later command.
//! A load by ids takes its place in that order when it arrives and is
//! dropped with [`Error::Superseded`] if a later load was applied before
//! its ids resolved.

use crate::diff::SelectionDiff;
use crate::error::{Error, Result};
use crate::fetch::{FragmentSource, GeometryParser};
use crate::index::CodeIndex;
use crate::scene::SceneSurface;
use crate::session::{SessionStatus, StreamingSession};
use crate::types::{Code, GeometryHandle, QualifiedId};
use futures::future::{FutureExt, LocalBoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, oneshot};

/// What a finished load did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub diff: SelectionDiff,
    pub handles: Vec<GeometryHandle>,
}

pub type LoadReply = oneshot::Receiver<Result<LoadOutcome>>;

#[derive(Debug)]
pub enum SessionCommand {
    LoadCodes {
        codes: Vec<Code>,
        reply: oneshot::Sender<Result<LoadOutcome>>,
    },
    LoadIds {
        ids: Vec<QualifiedId>,
        reply: oneshot::Sender<Result<LoadOutcome>>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
}

/// Cloneable sender side of a session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Queue a load by codes; the receiver resolves when its fetch settles.
    pub async fn send_codes(&self, codes: Vec<Code>) -> Result<LoadReply> {
        let (reply, receiver) = oneshot::channel();
        self.send(SessionCommand::LoadCodes { codes, reply }).await?;
        Ok(receiver)
    }

    /// Queue a load by component ids.
    pub async fn send_ids(&self, ids: Vec<QualifiedId>) -> Result<LoadReply> {
        let (reply, receiver) = oneshot::channel();
        self.send(SessionCommand::LoadIds { ids, reply }).await?;
        Ok(receiver)
    }

    pub async fn load_codes(&self, codes: Vec<Code>) -> Result<LoadOutcome> {
        Self::settle(self.send_codes(codes).await?).await
    }

    pub async fn load_ids(&self, ids: Vec<QualifiedId>) -> Result<LoadOutcome> {
        Self::settle(self.send_ids(ids).await?).await
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        let (reply, receiver) = oneshot::channel();
        self.send(SessionCommand::Status { reply }).await?;
        receiver.await.map_err(|_| Error::SessionClosed)
    }

    /// Wait for a queued load.
    pub async fn settle(reply: LoadReply) -> Result<LoadOutcome> {
        reply.await.map_err(|_| Error::SessionClosed)?
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::SessionClosed)
    }
}

/// Owns a session and serves commands until every handle is dropped and
/// all pending loads have settled.
pub struct SessionDriver<I, F, P, S> {
    session: StreamingSession<I, F, P, S>,
    commands: mpsc::Receiver<SessionCommand>,
}

/// Create a handle/driver pair around `session`.
pub fn session_channel<I, F, P, S>(
    session: StreamingSession<I, F, P, S>,
    capacity: usize,
) -> (SessionHandle, SessionDriver<I, F, P, S>) {
    let (commands, receiver) = mpsc::channel(capacity.max(1));
    (
        SessionHandle { commands },
        SessionDriver {
            session,
            commands: receiver,
        },
    )
}

impl<I, F, P, S> SessionDriver<I, F, P, S>
where
    I: CodeIndex + 'static,
    F: FragmentSource + 'static,
    P: GeometryParser + 'static,
    S: SceneSurface + 'static,
{
    pub async fn run(mut self) {
        let mut pending: FuturesUnordered<LocalBoxFuture<'static, ()>> = FuturesUnordered::new();
        let mut open = true;

        loop {
            tokio::select! {
                command = self.commands.recv(), if open => match command {
                    Some(command) => {
                        if let Some(task) = self.dispatch(command) {
                            pending.push(task);
                        }
                    }
                    None => open = false,
                },
                Some(()) = pending.next(), if !pending.is_empty() => {}
                else => break,
            }
        }

        tracing::debug!(model_name = %self.session.model_name(), "Session driver stopped");
    }

    fn dispatch(&self, command: SessionCommand) -> Option<LocalBoxFuture<'static, ()>> {
        match command {
            SessionCommand::LoadCodes { codes, reply } => {
                let submission = self.session.submit(&codes);
                let diff = submission.diff().clone();
                Some(
                    async move {
                        let result = submission
                            .complete()
                            .await
                            .map(|handles| LoadOutcome { diff, handles });
                        let _ = reply.send(result);
                    }
                    .boxed_local(),
                )
            }
            SessionCommand::LoadIds { ids, reply } => {
                let session = self.session.clone();
                let ticket = session.reserve();
                Some(
                    async move {
                        let result = async {
                            let codes = session.resolve_ids(&ids).await?;
                            let submission =
                                session.submit_at(ticket, &codes).ok_or(Error::Superseded)?;
                            let diff = submission.diff().clone();
                            let handles = submission.complete().await?;
                            Ok::<_, Error>(LoadOutcome { diff, handles })
                        }
                        .await;
                        let _ = reply.send(result);
                    }
                    .boxed_local(),
                )
            }
            SessionCommand::Status { reply } => {
                let _ = reply.send(self.session.status());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LoadCache;
    use crate::coordinator::ModelFetchCoordinator;
    use crate::fetch::RawBlobParser;
    use crate::scene::MemoryScene;
    use crate::testing::{codes, CountingSource, Gate, ScriptedIndex};
    use crate::types::ComponentId;
    use std::sync::Arc;

    type TestDriver = SessionDriver<ScriptedIndex, CountingSource, RawBlobParser, MemoryScene>;

    fn two_floors() -> ScriptedIndex {
        ScriptedIndex::new()
            .code("A", &[1])
            .code("B", &[2])
            .file("a.bin", &[1])
            .file("b.bin", &[2])
    }

    fn driver(source: CountingSource) -> (SessionHandle, TestDriver, Arc<MemoryScene>) {
        driver_with(two_floors(), source)
    }

    fn driver_with(
        index: ScriptedIndex,
        source: CountingSource,
    ) -> (SessionHandle, TestDriver, Arc<MemoryScene>) {
        let scene = Arc::new(MemoryScene::new());
        let coordinator = ModelFetchCoordinator::new(
            index,
            source,
            RawBlobParser,
            Arc::clone(&scene),
            LoadCache::new(),
        );
        let (handle, driver) = session_channel(StreamingSession::new("tower", coordinator), 8);
        (handle, driver, scene)
    }

    #[tokio::test]
    async fn test_commands_round_trip() {
        let source = CountingSource::new();
        let (handle, driver, scene) = driver(source.clone());

        let client = async move {
            let first = handle.load_codes(codes(&["A", "B"])).await.unwrap();
            assert_eq!(first.diff.to_fetch, codes(&["A", "B"]));
            assert_eq!(first.handles.len(), 2);

            let second = handle
                .load_ids(vec![QualifiedId::parse("tower|1").unwrap()])
                .await
                .unwrap();
            assert_eq!(second.diff.to_conceal, codes(&["B"]));
            assert!(second.handles.is_empty());

            let status = handle.status().await.unwrap();
            assert_eq!(status.selected, codes(&["A"]));
            assert_eq!(status.loaded, codes(&["A", "B"]));
        };

        tokio::join!(driver.run(), client);

        assert_eq!(scene.visible_components("tower"), vec![ComponentId::Numeric(1)]);
        assert_eq!(source.fetched().len(), 2);
    }

    #[tokio::test]
    async fn test_queued_loads_apply_in_order() {
        let (handle, driver, scene) = driver(CountingSource::new());

        let client = async move {
            let a = handle.send_codes(codes(&["A"])).await.unwrap();
            let b = handle.send_codes(codes(&["B"])).await.unwrap();
            let a = SessionHandle::settle(a).await.unwrap();
            let b = SessionHandle::settle(b).await.unwrap();
            assert_eq!(a.diff.to_fetch, codes(&["A"]));
            assert_eq!(b.diff.to_fetch, codes(&["B"]));
            assert_eq!(b.diff.to_conceal, codes(&["A"]));
        };

        tokio::join!(driver.run(), client);

        // A landed after B's submission deselected it.
        assert_eq!(scene.visible_components("tower"), vec![ComponentId::Numeric(2)]);
        assert_eq!(scene.node_count(), 2);
    }

    #[tokio::test]
    async fn test_closed_session_reports_error() {
        let (handle, driver, _scene) = driver(CountingSource::new());
        drop(driver);
        assert_eq!(handle.status().await.unwrap_err(), Error::SessionClosed);
    }

    #[tokio::test]
    async fn test_load_by_ids_does_not_override_later_codes() {
        let gate = Gate::closed();
        let index = two_floors().gate_id_lookups(gate.clone());
        let (handle, driver, scene) = driver_with(index, CountingSource::new());

        let client = async move {
            let by_ids = handle
                .send_ids(vec![QualifiedId::parse("tower|1").unwrap()])
                .await
                .unwrap();
            let by_codes = handle.send_codes(codes(&["B"])).await.unwrap();

            let b = SessionHandle::settle(by_codes).await.unwrap();
            assert_eq!(b.diff.to_fetch, codes(&["B"]));

            gate.open();
            let err = SessionHandle::settle(by_ids).await.unwrap_err();
            assert_eq!(err, Error::Superseded);

            let status = handle.status().await.unwrap();
            assert_eq!(status.selected, codes(&["B"]));
            assert_eq!(status.loaded, codes(&["B"]));
        };

        tokio::join!(driver.run(), client);

        assert_eq!(scene.visible_components("tower"), vec![ComponentId::Numeric(2)]);
    }
}
