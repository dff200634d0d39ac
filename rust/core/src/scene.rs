// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scene-surface contract and an in-memory implementation.

use crate::types::{ComponentId, GeometryHandle, NodeTag};
use std::sync::{Mutex, MutexGuard};

/// Handle to a named sub-scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubSceneId(pub usize);

/// The parts of the display scene graph the streaming core writes to.
///
/// Methods take `&self`; implementations own their interior mutability.
/// Changes are only observable after [`SceneSurface::render`].
pub trait SceneSurface {
    fn get_or_create_sub_scene(&self, name: &str) -> SubSceneId;

    /// Insert geometry as one node per tag. Every tagged node is visible
    /// afterwards, including ones that were already resident and hidden.
    fn insert_geometry(&self, scene: SubSceneId, handle: &GeometryHandle, tags: &[NodeTag]);

    /// Set visibility of every leaf node matching `predicate`; returns how
    /// many nodes changed.
    fn set_visible(&self, predicate: &dyn Fn(&NodeTag) -> bool, visible: bool) -> usize;

    fn render(&self);
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub tag: NodeTag,
    pub fragment_file: String,
    pub visible: bool,
}

#[derive(Debug, Default)]
struct SubScene {
    name: String,
    nodes: Vec<SceneNode>,
}

#[derive(Debug, Default)]
struct SceneState {
    sub_scenes: Vec<SubScene>,
    renders: usize,
}

/// Headless scene graph: keeps tagged nodes and counts renders.
#[derive(Debug, Default)]
pub struct MemoryScene {
    state: Mutex<SceneState>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SceneState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of `render()` calls so far.
    pub fn render_count(&self) -> usize {
        self.lock().renders
    }

    /// All nodes across sub-scenes.
    pub fn nodes(&self) -> Vec<SceneNode> {
        self.lock()
            .sub_scenes
            .iter()
            .flat_map(|s| s.nodes.iter().cloned())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.lock().sub_scenes.iter().map(|s| s.nodes.len()).sum()
    }

    /// Component ids of visible nodes in the sub-scene `name`, sorted.
    pub fn visible_components(&self, name: &str) -> Vec<ComponentId> {
        let state = self.lock();
        let mut ids: Vec<ComponentId> = state
            .sub_scenes
            .iter()
            .filter(|s| s.name == name)
            .flat_map(|s| s.nodes.iter())
            .filter(|n| n.visible)
            .map(|n| n.tag.component_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn sub_scene_names(&self) -> Vec<String> {
        self.lock().sub_scenes.iter().map(|s| s.name.clone()).collect()
    }
}

impl SceneSurface for MemoryScene {
    fn get_or_create_sub_scene(&self, name: &str) -> SubSceneId {
        let mut state = self.lock();
        if let Some(index) = state.sub_scenes.iter().position(|s| s.name == name) {
            return SubSceneId(index);
        }
        state.sub_scenes.push(SubScene {
            name: name.to_string(),
            nodes: Vec::new(),
        });
        SubSceneId(state.sub_scenes.len() - 1)
    }

    fn insert_geometry(&self, scene: SubSceneId, handle: &GeometryHandle, tags: &[NodeTag]) {
        let mut state = self.lock();
        let Some(sub_scene) = state.sub_scenes.get_mut(scene.0) else {
            tracing::warn!(scene = scene.0, "Insert into unknown sub-scene ignored");
            return;
        };

        for tag in tags {
            // Same component arriving again: merge code tags and show it.
            let existing = sub_scene.nodes.iter().position(|n| {
                n.tag.model_name == tag.model_name && n.tag.component_id == tag.component_id
            });
            match existing {
                Some(index) => {
                    let node = &mut sub_scene.nodes[index];
                    node.tag.codes.extend(tag.codes.iter().cloned());
                    node.visible = true;
                }
                None => sub_scene.nodes.push(SceneNode {
                    tag: tag.clone(),
                    fragment_file: handle.fragment_file.clone(),
                    visible: true,
                }),
            }
        }
    }

    fn set_visible(&self, predicate: &dyn Fn(&NodeTag) -> bool, visible: bool) -> usize {
        let mut state = self.lock();
        let mut changed = 0;
        for node in state.sub_scenes.iter_mut().flat_map(|s| s.nodes.iter_mut()) {
            if node.visible != visible && predicate(&node.tag) {
                node.visible = visible;
                changed += 1;
            }
        }
        changed
    }

    fn render(&self) {
        let mut state = self.lock();
        state.renders += 1;
        tracing::trace!(renders = state.renders, "Scene rendered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Code;
    use bytes::Bytes;

    fn tag(id: u64, codes: &[&str]) -> NodeTag {
        NodeTag {
            model_name: "tower".into(),
            component_id: ComponentId::from(id),
            codes: codes.iter().map(|c| Code::from(*c)).collect(),
        }
    }

    fn handle() -> GeometryHandle {
        GeometryHandle {
            fragment_file: "f.glb".into(),
            component_ids: vec![],
            blob: Bytes::new(),
        }
    }

    #[test]
    fn test_sub_scene_is_reused() {
        let scene = MemoryScene::new();
        let a = scene.get_or_create_sub_scene("tower");
        let b = scene.get_or_create_sub_scene("annex");
        assert_ne!(a, b);
        assert_eq!(scene.get_or_create_sub_scene("tower"), a);
        assert_eq!(scene.sub_scene_names(), vec!["tower", "annex"]);
    }

    #[test]
    fn test_reinsert_merges_codes_and_shows_node() {
        let scene = MemoryScene::new();
        let id = scene.get_or_create_sub_scene("tower");
        scene.insert_geometry(id, &handle(), &[tag(1, &["A"])]);
        scene.set_visible(&|_| true, false);
        scene.insert_geometry(id, &handle(), &[tag(1, &["B"]), tag(2, &["B"])]);

        let nodes = scene.nodes();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].tag.codes.len(), 2);
        assert!(nodes[0].visible);
        assert!(nodes[1].visible);
    }

    #[test]
    fn test_set_visible_counts_changes() {
        let scene = MemoryScene::new();
        let id = scene.get_or_create_sub_scene("tower");
        scene.insert_geometry(id, &handle(), &[tag(1, &["A"]), tag(2, &["B"])]);

        let a = Code::from("A");
        assert_eq!(scene.set_visible(&|t| t.codes.contains(&a), false), 1);
        assert_eq!(scene.set_visible(&|t| t.codes.contains(&a), false), 0);
        assert_eq!(scene.visible_components("tower"), vec![ComponentId::Numeric(2)]);
    }
}
