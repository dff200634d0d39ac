// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fetch pipeline: codes → component ids → fragment files → geometry → scene.
//!
//! One fetch is issued per distinct fragment file, however many codes map
//! onto it. Fragments are fetched concurrently and each is inserted as soon
//! as it has been parsed. A failing fragment does not abort its siblings;
//! codes touching a failed fragment are simply not recorded as loaded.

use crate::cache::LoadCache;
use crate::diff::dedup_codes;
use crate::error::{Error, Result};
use crate::fetch::{FragmentSource, GeometryParser};
use crate::index::CodeIndex;
use crate::scene::SceneSurface;
use crate::types::{Code, ComponentId, FragmentReference, GeometryHandle, NodeTag};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Coordinator tunables.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound on fragment fetches in flight at once (minimum 1).
    pub max_concurrent_fetches: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
        }
    }
}

/// A fragment that could not be fetched or parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentFailure {
    pub fragment_file: String,
    /// Codes with at least one component in this fragment.
    pub codes: Vec<Code>,
    pub error: Error,
}

/// Outcome of one `fetch_codes` batch.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// Geometry inserted into the scene, in completion order.
    pub handles: Vec<GeometryHandle>,
    /// Codes recorded as loaded by this batch.
    pub loaded_codes: Vec<Code>,
    pub failures: Vec<FragmentFailure>,
    /// Codes with components the index placed in no fragment file. They are
    /// not recorded as loaded.
    pub unplaced: Vec<Code>,
    /// Number of fragment fetches issued.
    pub fetches: usize,
}

impl FetchReport {
    /// Handles if every fragment succeeded, otherwise the first failure.
    pub fn into_result(self) -> Result<Vec<GeometryHandle>> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure.error),
            None => Ok(self.handles),
        }
    }
}

/// Drives code resolution, fragment fetches and scene insertion.
pub struct ModelFetchCoordinator<I, F, P, S> {
    index: I,
    source: F,
    parser: P,
    scene: Arc<S>,
    cache: LoadCache,
    config: CoordinatorConfig,
}

impl<I, F, P, S> ModelFetchCoordinator<I, F, P, S>
where
    I: CodeIndex,
    F: FragmentSource,
    P: GeometryParser,
    S: SceneSurface,
{
    pub fn new(index: I, source: F, parser: P, scene: Arc<S>, cache: LoadCache) -> Self {
        Self::with_config(index, source, parser, scene, cache, CoordinatorConfig::default())
    }

    pub fn with_config(
        index: I,
        source: F,
        parser: P,
        scene: Arc<S>,
        cache: LoadCache,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            index,
            source,
            parser,
            scene,
            cache,
            config,
        }
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn scene(&self) -> &Arc<S> {
        &self.scene
    }

    pub fn cache(&self) -> &LoadCache {
        &self.cache
    }

    /// Fetch and insert the geometry for `codes` into the sub-scene named
    /// `model_name`.
    ///
    /// Resolution failures abort the batch before anything is fetched.
    /// Fragment failures are collected in the report.
    pub async fn fetch_codes(&self, model_name: &str, codes: &[Code]) -> Result<FetchReport> {
        let codes = dedup_codes(codes);
        if codes.is_empty() {
            return Ok(FetchReport::default());
        }

        let (fragments, id_codes, unplaced) = self.resolve_fragments(model_name, &codes).await?;

        tracing::info!(
            model_name = %model_name,
            codes = codes.len(),
            fragments = fragments.len(),
            "Fetching model fragments"
        );

        let scene_id = self.scene.get_or_create_sub_scene(model_name);
        let mut report = FetchReport {
            fetches: fragments.len(),
            ..FetchReport::default()
        };
        let mut failed_codes: BTreeSet<Code> = unplaced.clone();
        report.unplaced = unplaced.into_iter().collect();

        let limit = self.config.max_concurrent_fetches.max(1);
        let mut completions = stream::iter(fragments)
            .map(|fragment| async move {
                let result = self.load_fragment(&fragment).await;
                (fragment, result)
            })
            .buffer_unordered(limit);

        while let Some((fragment, result)) = completions.next().await {
            match result {
                Ok(handle) => {
                    let tags: Vec<NodeTag> = handle
                        .component_ids
                        .iter()
                        .map(|id| NodeTag {
                            model_name: model_name.to_string(),
                            component_id: id.clone(),
                            codes: id_codes.get(id).cloned().unwrap_or_default(),
                        })
                        .collect();
                    self.scene.insert_geometry(scene_id, &handle, &tags);
                    tracing::debug!(
                        fragment = %handle.fragment_file,
                        nodes = tags.len(),
                        bytes = handle.blob.len(),
                        "Inserted fragment geometry"
                    );
                    report.handles.push(handle);
                }
                Err(error) => {
                    let codes: BTreeSet<Code> = fragment
                        .component_ids
                        .iter()
                        .filter_map(|id| id_codes.get(id))
                        .flatten()
                        .cloned()
                        .collect();
                    tracing::warn!(
                        fragment = %fragment.fragment_file,
                        codes = codes.len(),
                        error = %error,
                        "Fragment failed"
                    );
                    failed_codes.extend(codes.iter().cloned());
                    report.failures.push(FragmentFailure {
                        fragment_file: fragment.fragment_file,
                        codes: codes.into_iter().collect(),
                        error,
                    });
                }
            }
        }

        if !report.handles.is_empty() {
            self.scene.render();
        }

        report.loaded_codes = codes
            .into_iter()
            .filter(|c| !failed_codes.contains(c))
            .collect();
        self.cache.record_loaded(&report.loaded_codes);

        tracing::info!(
            model_name = %model_name,
            loaded = report.loaded_codes.len(),
            inserted = report.handles.len(),
            failed = report.failures.len(),
            "Fragment batch finished"
        );

        Ok(report)
    }

    /// Resolve codes to deduplicated fragment references, the codes each
    /// component was reached through, and the codes with a component no
    /// fragment holds.
    async fn resolve_fragments(
        &self,
        model_name: &str,
        codes: &[Code],
    ) -> Result<(
        Vec<FragmentReference>,
        BTreeMap<ComponentId, BTreeSet<Code>>,
        BTreeSet<Code>,
    )> {
        let groups = self.index.codes_to_component_ids(model_name, codes).await?;

        let mut id_codes: BTreeMap<ComponentId, BTreeSet<Code>> = BTreeMap::new();
        let mut files: BTreeMap<String, BTreeSet<ComponentId>> = BTreeMap::new();
        let mut unresolved: BTreeSet<ComponentId> = BTreeSet::new();

        for group in groups.into_iter().filter(|g| !g.component_ids.is_empty()) {
            for id in &group.component_ids {
                id_codes.entry(id.clone()).or_default().insert(group.code.clone());
            }
            match group.fragment_file {
                Some(file) => files.entry(file).or_default().extend(group.component_ids),
                None => unresolved.extend(group.component_ids),
            }
        }

        if !unresolved.is_empty() {
            let unresolved: Vec<ComponentId> = unresolved.into_iter().collect();
            let references = self
                .index
                .component_ids_to_fragment_references(model_name, &unresolved)
                .await?;

            for reference in references {
                let wanted = reference
                    .component_ids
                    .into_iter()
                    .filter(|id| id_codes.contains_key(id));
                files
                    .entry(reference.fragment_file)
                    .or_default()
                    .extend(wanted);
            }
        }

        let placed: BTreeSet<&ComponentId> = files.values().flatten().collect();
        let missing: Vec<&ComponentId> = id_codes.keys().filter(|id| !placed.contains(id)).collect();
        let unplaced: BTreeSet<Code> = missing
            .iter()
            .filter_map(|id| id_codes.get(*id))
            .flatten()
            .cloned()
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                model_name = %model_name,
                missing = missing.len(),
                codes = unplaced.len(),
                "Some components have no fragment file"
            );
        }

        let fragments = files
            .into_iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(fragment_file, ids)| FragmentReference {
                fragment_file,
                component_ids: ids.into_iter().collect(),
            })
            .collect();

        Ok((fragments, id_codes, unplaced))
    }

    async fn load_fragment(&self, fragment: &FragmentReference) -> Result<GeometryHandle> {
        let bytes = self.source.fetch_fragment(fragment).await?;
        self.parser.parse(fragment, bytes)
    }
}
