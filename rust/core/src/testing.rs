// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-crate fakes for the collaborator traits.

use crate::error::{Error, Result};
use crate::fetch::FragmentSource;
use crate::index::CodeIndex;
use crate::types::{Code, CodeGroup, ComponentId, FragmentReference};
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub fn codes(names: &[&str]) -> Vec<Code> {
    names.iter().map(|n| Code::from(*n)).collect()
}

fn ids(raw: &[u64]) -> Vec<ComponentId> {
    raw.iter().map(|i| ComponentId::from(*i)).collect()
}

/// Holds callers until opened.
#[derive(Clone)]
pub struct Gate(Arc<Semaphore>);

impl Gate {
    pub fn closed() -> Self {
        Self(Arc::new(Semaphore::new(0)))
    }

    pub fn open(&self) {
        self.0.add_permits(1);
    }

    async fn pass(gate: &Option<Gate>) {
        if let Some(gate) = gate {
            let _permit = gate.0.acquire().await;
        }
    }
}

#[derive(Default)]
struct Counters {
    code_lookups: AtomicUsize,
    fragment_lookups: AtomicUsize,
}

/// Code index answering from a fixed table.
#[derive(Clone, Default)]
pub struct ScriptedIndex {
    groups: Vec<(Code, Vec<ComponentId>, Option<String>)>,
    files: Vec<(String, Vec<ComponentId>)>,
    broken: bool,
    id_gate: Option<Gate>,
    counters: Arc<Counters>,
}

impl ScriptedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(mut self, code: &str, components: &[u64]) -> Self {
        self.groups.push((Code::from(code), ids(components), None));
        self
    }

    pub fn code_in_file(mut self, code: &str, components: &[u64], file: &str) -> Self {
        self.groups
            .push((Code::from(code), ids(components), Some(file.to_string())));
        self
    }

    pub fn file(mut self, file: &str, components: &[u64]) -> Self {
        self.files.push((file.to_string(), ids(components)));
        self
    }

    /// Ids to codes lookups wait for `gate`.
    pub fn gate_id_lookups(mut self, gate: Gate) -> Self {
        self.id_gate = Some(gate);
        self
    }

    /// Every lookup fails.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    pub fn code_lookups(&self) -> usize {
        self.counters.code_lookups.load(Ordering::SeqCst)
    }

    pub fn fragment_lookups(&self) -> usize {
        self.counters.fragment_lookups.load(Ordering::SeqCst)
    }

    fn check(&self, operation: &'static str, model_name: &str) -> Result<()> {
        if self.broken {
            return Err(Error::remote_lookup(operation, model_name, "service unavailable"));
        }
        Ok(())
    }
}

impl CodeIndex for ScriptedIndex {
    async fn codes_to_component_ids(
        &self,
        model_name: &str,
        codes: &[Code],
    ) -> Result<Vec<CodeGroup>> {
        self.counters.code_lookups.fetch_add(1, Ordering::SeqCst);
        self.check("codes_to_component_ids", model_name)?;
        Ok(codes
            .iter()
            .filter_map(|code| self.groups.iter().find(|(c, _, _)| c == code))
            .filter(|(_, ids, _)| !ids.is_empty())
            .map(|(code, ids, file)| CodeGroup {
                code: code.clone(),
                component_ids: ids.clone(),
                fragment_file: file.clone(),
            })
            .collect())
    }

    async fn component_ids_to_fragment_references(
        &self,
        model_name: &str,
        component_ids: &[ComponentId],
    ) -> Result<Vec<FragmentReference>> {
        self.counters.fragment_lookups.fetch_add(1, Ordering::SeqCst);
        self.check("component_ids_to_fragment_references", model_name)?;
        Ok(self
            .files
            .iter()
            .map(|(file, held)| FragmentReference {
                fragment_file: file.clone(),
                component_ids: component_ids
                    .iter()
                    .filter(|id| held.contains(id))
                    .cloned()
                    .collect(),
            })
            .filter(|r| !r.component_ids.is_empty())
            .collect())
    }

    async fn component_ids_to_codes(
        &self,
        model_name: &str,
        component_ids: &[ComponentId],
    ) -> Result<Vec<Code>> {
        Gate::pass(&self.id_gate).await;
        self.check("component_ids_to_codes", model_name)?;
        Ok(self
            .groups
            .iter()
            .filter(|(_, ids, _)| ids.iter().any(|id| component_ids.contains(id)))
            .map(|(code, _, _)| code.clone())
            .collect())
    }
}

/// Fragment source that records every fetch.
#[derive(Clone, Default)]
pub struct CountingSource {
    fetched: Arc<Mutex<Vec<String>>>,
    failing: Vec<String>,
    empty: Vec<String>,
    gate: Option<Gate>,
}

impl CountingSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches of `file` fail.
    pub fn failing(mut self, file: &str) -> Self {
        self.failing.push(file.to_string());
        self
    }

    /// Fetches of `file` succeed with an empty body.
    pub fn empty(mut self, file: &str) -> Self {
        self.empty.push(file.to_string());
        self
    }

    /// Fetches wait for `gate`.
    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Files fetched so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl FragmentSource for CountingSource {
    async fn fetch_fragment(&self, fragment: &FragmentReference) -> Result<Bytes> {
        let file = &fragment.fragment_file;
        self.fetched.lock().unwrap().push(file.clone());
        Gate::pass(&self.gate).await;
        if self.failing.contains(file) {
            return Err(Error::fetch(file, "connection reset"));
        }
        if self.empty.contains(file) {
            return Ok(Bytes::new());
        }
        Ok(Bytes::from(format!("geometry:{}", file)))
    }
}
