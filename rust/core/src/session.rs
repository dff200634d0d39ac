// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-viewer streaming session.
//!
//! Each submission goes `Idle → Diffing → Fetching → Reconciling → Idle`.
//! Diffing and the conceal/reveal toggles happen synchronously inside
//! [`StreamingSession::submit`]; only the fetch of never-loaded codes is
//! deferred to the returned [`Submission`]. A second submission made while
//! an earlier fetch is still running is diffed against the already-updated
//! selection, so visibility always follows the latest request.
//!
//! Loads that resolve something before submitting (ids to codes) reserve a
//! [`Ticket`] up front. A ticket older than the last applied submission is
//! refused, so a slow resolution cannot overwrite a newer selection.

use crate::cache::LoadCache;
use crate::coordinator::{FetchReport, ModelFetchCoordinator};
use crate::diff::{dedup_codes, SelectionDiff};
use crate::error::{Error, Result};
use crate::fetch::{FragmentSource, GeometryParser};
use crate::index::CodeIndex;
use crate::scene::SceneSurface;
use crate::types::{Code, ComponentId, GeometryHandle, NodeTag, QualifiedId};
use futures::future::{FutureExt, LocalBoxFuture};
use rustc_hash::FxHashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Where a session currently is in its submission cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Diffing,
    Fetching,
    Reconciling,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub model_name: String,
    pub phase: SessionPhase,
    pub selected: Vec<Code>,
    pub loaded: Vec<Code>,
    pub in_flight: usize,
}

/// Place of a submission in the session's request order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Default)]
struct SessionState {
    selected: Vec<Code>,
    in_flight: usize,
    issued: u64,
    applied: u64,
}

impl SessionState {
    fn issue(&mut self) -> Ticket {
        self.issued += 1;
        Ticket(self.issued)
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Counts one running fetch for as long as it lives.
struct InFlight(Arc<Mutex<SessionState>>);

impl InFlight {
    fn enter(state: Arc<Mutex<SessionState>>) -> Self {
        lock(&state).in_flight += 1;
        Self(state)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut state = lock(&self.0);
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// A submission whose visibility changes are applied and whose fetch, if
/// any, has not been awaited yet.
#[must_use = "the fetch only runs when the submission is completed"]
pub struct Submission {
    diff: SelectionDiff,
    pending: Option<LocalBoxFuture<'static, Result<FetchReport>>>,
}

impl Submission {
    pub fn diff(&self) -> &SelectionDiff {
        &self.diff
    }

    pub fn needs_fetch(&self) -> bool {
        self.pending.is_some()
    }

    /// Run the fetch and return the full per-fragment report.
    pub async fn report(self) -> Result<FetchReport> {
        match self.pending {
            Some(pending) => pending.await,
            None => Ok(FetchReport::default()),
        }
    }

    /// Run the fetch. Fails with the first fragment error, after every
    /// successful fragment has been inserted.
    pub async fn complete(self) -> Result<Vec<GeometryHandle>> {
        self.report().await?.into_result()
    }
}

/// Owns the selection state of one viewer over one model.
pub struct StreamingSession<I, F, P, S> {
    model_name: String,
    coordinator: Arc<ModelFetchCoordinator<I, F, P, S>>,
    state: Arc<Mutex<SessionState>>,
}

impl<I, F, P, S> Clone for StreamingSession<I, F, P, S> {
    fn clone(&self) -> Self {
        Self {
            model_name: self.model_name.clone(),
            coordinator: Arc::clone(&self.coordinator),
            state: Arc::clone(&self.state),
        }
    }
}

impl<I, F, P, S> StreamingSession<I, F, P, S>
where
    I: CodeIndex + 'static,
    F: FragmentSource + 'static,
    P: GeometryParser + 'static,
    S: SceneSurface + 'static,
{
    pub fn new(model_name: impl Into<String>, coordinator: ModelFetchCoordinator<I, F, P, S>) -> Self {
        Self {
            model_name: model_name.into(),
            coordinator: Arc::new(coordinator),
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn coordinator(&self) -> &ModelFetchCoordinator<I, F, P, S> {
        &self.coordinator
    }

    pub fn load_cache(&self) -> &LoadCache {
        self.coordinator.cache()
    }

    /// Codes currently desired visible, in submission order.
    pub fn selected_codes(&self) -> Vec<Code> {
        lock(&self.state).selected.clone()
    }

    /// Codes materialized at least once, sorted.
    pub fn loaded_codes(&self) -> Vec<Code> {
        self.load_cache().snapshot()
    }

    /// Number of fetches currently running.
    pub fn in_flight(&self) -> usize {
        lock(&self.state).in_flight
    }

    pub fn status(&self) -> SessionStatus {
        let (selected, in_flight) = {
            let state = lock(&self.state);
            (state.selected.clone(), state.in_flight)
        };
        SessionStatus {
            model_name: self.model_name.clone(),
            phase: if in_flight > 0 {
                SessionPhase::Fetching
            } else {
                SessionPhase::Idle
            },
            selected,
            loaded: self.loaded_codes(),
            in_flight,
        }
    }

    /// Reserve a place in request order for a submission made later with
    /// [`StreamingSession::submit_at`].
    pub fn reserve(&self) -> Ticket {
        lock(&self.state).issue()
    }

    /// Apply `desired` to the scene: diff against the session state, hide
    /// and show already-resident geometry, and make `desired` the selection.
    /// The returned submission fetches whatever was never loaded.
    pub fn submit(&self, desired: &[Code]) -> Submission {
        let desired = dedup_codes(desired);
        let diff = {
            let mut state = lock(&self.state);
            let ticket = state.issue();
            self.diff_locked(&mut state, ticket, &desired)
        };
        self.finish(diff, &desired)
    }

    /// Like [`StreamingSession::submit`] for a reserved ticket. Returns `None`
    /// without touching the scene when a newer submission was already applied.
    pub fn submit_at(&self, ticket: Ticket, desired: &[Code]) -> Option<Submission> {
        let desired = dedup_codes(desired);
        let diff = {
            let mut state = lock(&self.state);
            if ticket.0 <= state.applied {
                tracing::debug!(
                    model_name = %self.model_name,
                    ticket = ticket.0,
                    applied = state.applied,
                    "Submission superseded"
                );
                return None;
            }
            self.diff_locked(&mut state, ticket, &desired)
        };
        Some(self.finish(diff, &desired))
    }

    fn diff_locked(&self, state: &mut SessionState, ticket: Ticket, desired: &[Code]) -> SelectionDiff {
        tracing::debug!(
            model_name = %self.model_name,
            phase = ?SessionPhase::Diffing,
            ticket = ticket.0,
            desired = desired.len(),
            "Submission received"
        );
        let diff = self
            .load_cache()
            .with_loaded(|loaded| SelectionDiff::compute(desired, &state.selected, loaded));
        state.selected = desired.to_vec();
        state.applied = ticket.0;
        diff
    }

    fn finish(&self, diff: SelectionDiff, desired: &[Code]) -> Submission {
        tracing::info!(
            model_name = %self.model_name,
            fetch = diff.to_fetch.len(),
            reveal = diff.to_reveal.len(),
            conceal = diff.to_conceal.len(),
            "Selection diffed"
        );

        self.apply_visibility(&diff, desired);

        let pending = if diff.to_fetch.is_empty() {
            None
        } else {
            Some(self.fetch(diff.to_fetch.clone()))
        };

        Submission { diff, pending }
    }

    /// Submit `desired` and wait for its fetch.
    pub async fn load_model_by_codes(&self, desired: &[Code]) -> Result<Vec<GeometryHandle>> {
        self.submit(desired).complete().await
    }

    /// Resolve component ids to the codes that contain them. Ids qualified
    /// with another model are skipped.
    pub async fn resolve_ids(&self, ids: &[QualifiedId]) -> Result<Vec<Code>> {
        let mut seen = FxHashSet::default();
        let mut component_ids: Vec<ComponentId> = Vec::with_capacity(ids.len());
        let mut foreign = 0;
        for id in ids {
            if !id.belongs_to(&self.model_name) {
                foreign += 1;
            } else if seen.insert(&id.component_id) {
                component_ids.push(id.component_id.clone());
            }
        }
        if foreign > 0 {
            tracing::warn!(
                model_name = %self.model_name,
                skipped = foreign,
                "Ignoring ids of other models"
            );
        }
        if component_ids.is_empty() {
            return Ok(Vec::new());
        }

        let codes = self
            .coordinator
            .index()
            .component_ids_to_codes(&self.model_name, &component_ids)
            .await?;
        Ok(dedup_codes(&codes))
    }

    /// Resolve ids to codes and load those codes. Fails with
    /// [`Error::Superseded`] if another submission was applied while the ids
    /// were being resolved.
    pub async fn load_model_by_ids(&self, ids: &[QualifiedId]) -> Result<Vec<GeometryHandle>> {
        let ticket = self.reserve();
        let codes = self.resolve_ids(ids).await?;
        self.submit_at(ticket, &codes)
            .ok_or(Error::Superseded)?
            .complete()
            .await
    }

    fn apply_visibility(&self, diff: &SelectionDiff, desired: &[Code]) {
        if diff.to_conceal.is_empty() && diff.to_reveal.is_empty() {
            return;
        }
        let scene = self.coordinator.scene();
        let model = self.model_name.as_str();

        let mut changed = 0;
        if !diff.to_conceal.is_empty() {
            let conceal: FxHashSet<&Code> = diff.to_conceal.iter().collect();
            let keep: FxHashSet<&Code> = desired.iter().collect();
            changed += scene.set_visible(
                &|tag: &NodeTag| {
                    tag.model_name == model
                        && tag.has_any_code(conceal.iter().copied())
                        && !tag.has_any_code(keep.iter().copied())
                },
                false,
            );
        }
        if !diff.to_reveal.is_empty() {
            let reveal: FxHashSet<&Code> = diff.to_reveal.iter().collect();
            changed += scene.set_visible(
                &|tag: &NodeTag| tag.model_name == model && tag.has_any_code(reveal.iter().copied()),
                true,
            );
        }
        scene.render();
        tracing::debug!(model_name = %model, nodes = changed, "Visibility toggled");
    }

    fn fetch(&self, codes: Vec<Code>) -> LocalBoxFuture<'static, Result<FetchReport>> {
        let coordinator = Arc::clone(&self.coordinator);
        let state = Arc::clone(&self.state);
        let model_name = self.model_name.clone();

        async move {
            let in_flight = InFlight::enter(Arc::clone(&state));
            tracing::debug!(
                model_name = %model_name,
                phase = ?SessionPhase::Fetching,
                codes = codes.len(),
                "Fetch started"
            );
            let report = coordinator.fetch_codes(&model_name, &codes).await;
            drop(in_flight);

            // A later submission may have deselected some of these codes while
            // they were in flight; their fresh nodes must not stay visible.
            let selected = lock(&state).selected.clone();
            let stale: FxHashSet<&Code> = codes.iter().filter(|c| !selected.contains(c)).collect();
            if !stale.is_empty() {
                tracing::debug!(
                    model_name = %model_name,
                    phase = ?SessionPhase::Reconciling,
                    stale = stale.len(),
                    "Hiding deselected arrivals"
                );
                let keep: FxHashSet<&Code> = selected.iter().collect();
                let scene = coordinator.scene();
                let hidden = scene.set_visible(
                    &|tag: &NodeTag| {
                        tag.model_name == model_name
                            && tag.has_any_code(stale.iter().copied())
                            && !tag.has_any_code(keep.iter().copied())
                    },
                    false,
                );
                if hidden > 0 {
                    scene.render();
                }
            }
            tracing::debug!(
                model_name = %model_name,
                phase = ?SessionPhase::Idle,
                "Fetch settled"
            );
            report
        }
        .boxed_local()
    }
}
