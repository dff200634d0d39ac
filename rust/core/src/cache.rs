// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-session record of which codes have been materialized.
//!
//! Append-only for the lifetime of the session. Concealing a code only
//! hides its nodes; the geometry stays resolved in the scene, so the code
//! stays here and a later reveal needs no network round trip. Memory grows
//! with every distinct code ever loaded.

use crate::types::Code;
use rustc_hash::FxHashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared handle to the set of codes fetched at least once.
#[derive(Debug, Clone, Default)]
pub struct LoadCache {
    loaded: Arc<Mutex<FxHashSet<Code>>>,
}

impl LoadCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FxHashSet<Code>> {
        // The set is only ever extended, so a poisoned guard is still consistent.
        self.loaded.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Union `codes` into the loaded set. Idempotent.
    pub fn record_loaded<'a>(&self, codes: impl IntoIterator<Item = &'a Code>) {
        let mut loaded = self.lock();
        let before = loaded.len();
        loaded.extend(codes.into_iter().cloned());
        tracing::trace!(added = loaded.len() - before, total = loaded.len(), "Recorded loaded codes");
    }

    pub fn contains(&self, code: &Code) -> bool {
        self.lock().contains(code)
    }

    /// Run `f` against the current set without copying it.
    pub fn with_loaded<R>(&self, f: impl FnOnce(&FxHashSet<Code>) -> R) -> R {
        f(&self.lock())
    }

    /// Loaded codes in sorted order.
    pub fn snapshot(&self) -> Vec<Code> {
        let mut codes: Vec<Code> = self.lock().iter().cloned().collect();
        codes.sort();
        codes
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
