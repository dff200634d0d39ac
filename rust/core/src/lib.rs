// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Model Stream Core
//!
//! Incremental, code-driven model streaming for a BIM viewer. Callers
//! describe what should be visible as a set of *codes* (named grouping
//! rules such as a floor or a discipline); the session reconciles the
//! scene with that set while fetching as little as possible.
//!
//! ## Overview
//!
//! - **Selection diffing** ([`SelectionDiff`]): splits a desired code set
//!   into codes to fetch, to reveal and to conceal
//! - **Load cache** ([`LoadCache`]): append-only record of materialized codes
//! - **Fetch coordination** ([`ModelFetchCoordinator`]): codes → component
//!   ids → fragment files, one concurrent fetch per distinct file
//! - **Sessions** ([`StreamingSession`]): per-viewer selection state and
//!   visibility reconciliation
//! - **Command channel** ([`session_channel`]): typed messages from an
//!   interaction layer to a session
//!
//! The network, the geometry format and the display scene are reached only
//! through the [`CodeIndex`], [`FragmentSource`], [`GeometryParser`] and
//! [`SceneSurface`] traits.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use model_stream_core::{
//!     Code, GlbParser, LoadCache, MemoryScene, ModelFetchCoordinator, StreamingSession,
//! };
//! use std::sync::Arc;
//!
//! let scene = Arc::new(MemoryScene::new());
//! let coordinator =
//!     ModelFetchCoordinator::new(index, source, GlbParser, scene.clone(), LoadCache::new());
//! let session = StreamingSession::new("tower", coordinator);
//!
//! // Hides/shows resident geometry immediately, then fetches the rest.
//! let handles = session
//!     .load_model_by_codes(&[Code::from("L1"), Code::from("HVAC")])
//!     .await?;
//! ```

pub mod cache;
pub mod command;
pub mod coordinator;
pub mod diff;
pub mod error;
pub mod fetch;
pub mod index;
pub mod scene;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use cache::LoadCache;
pub use command::{session_channel, LoadOutcome, LoadReply, SessionCommand, SessionDriver, SessionHandle};
pub use coordinator::{CoordinatorConfig, FetchReport, FragmentFailure, ModelFetchCoordinator};
pub use diff::{dedup_codes, SelectionDiff};
pub use error::{Error, Result};
pub use fetch::{FragmentSource, GeometryParser, GlbParser, RawBlobParser};
pub use index::CodeIndex;
pub use scene::{MemoryScene, SceneNode, SceneSurface, SubSceneId};
pub use session::{SessionPhase, SessionStatus, StreamingSession, Submission, Ticket};
pub use types::{Code, CodeGroup, CodeTreeNode, ComponentId, FragmentReference, GeometryHandle, NodeTag, QualifiedId};
