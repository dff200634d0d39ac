// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data model shared by the streaming components.

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A named grouping rule within a model (a floor, a discipline, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Code(String);

impl Code {
    pub fn new(code: impl Into<String>) -> Self {
        Code(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Code {
    fn from(code: &str) -> Self {
        Code(code.to_string())
    }
}

impl From<String> for Code {
    fn from(code: String) -> Self {
        Code(code)
    }
}

impl AsRef<str> for Code {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of one drawable component, unique only within its model.
///
/// The code-rule service answers with numbers for most models and with
/// strings for a few, so both are kept and serialised back unchanged.
/// Text that is the canonical form of an integer is stored as `Numeric`
/// so that `"12"` and `12` name the same component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum ComponentId {
    Numeric(u64),
    Text(String),
}

impl From<u64> for ComponentId {
    fn from(id: u64) -> Self {
        ComponentId::Numeric(id)
    }
}

impl From<&str> for ComponentId {
    fn from(id: &str) -> Self {
        match id.parse::<u64>() {
            Ok(n) if n.to_string() == id => ComponentId::Numeric(n),
            _ => ComponentId::Text(id.to_string()),
        }
    }
}

impl From<String> for ComponentId {
    fn from(id: String) -> Self {
        ComponentId::from(id.as_str())
    }
}

impl<'de> Deserialize<'de> for ComponentId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Numeric(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Numeric(n) => ComponentId::Numeric(n),
            Raw::Text(s) => ComponentId::from(s),
        })
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentId::Numeric(n) => write!(f, "{}", n),
            ComponentId::Text(s) => f.write_str(s),
        }
    }
}

/// A component id as written by the viewer's node naming: `model|id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedId {
    /// `None` for a bare id, which belongs to whichever model is asking.
    pub model_name: Option<String>,
    pub component_id: ComponentId,
}

impl QualifiedId {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (model_name, id) = match input.split_once('|') {
            Some((model, id)) => {
                let model = model.trim();
                if model.is_empty() {
                    return Err(Error::InvalidId(input.to_string()));
                }
                (Some(model.to_string()), id.trim())
            }
            None => (None, input),
        };

        if id.is_empty() || id.contains('|') {
            return Err(Error::InvalidId(input.to_string()));
        }

        Ok(Self {
            model_name,
            component_id: ComponentId::from(id),
        })
    }

    /// Whether this id may be used against `model_name`.
    pub fn belongs_to(&self, model_name: &str) -> bool {
        self.model_name.as_deref().map_or(true, |m| m == model_name)
    }
}

impl fmt::Display for QualifiedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.model_name {
            Some(model) => write!(f, "{}|{}", model, self.component_id),
            None => write!(f, "{}", self.component_id),
        }
    }
}

/// Result of resolving one code: the components it currently matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeGroup {
    pub code: Code,
    pub component_ids: Vec<ComponentId>,
    /// Set when the service already names the fragment holding these ids.
    pub fragment_file: Option<String>,
}

/// The unit of network fetch: a fragment file and the ids wanted from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentReference {
    pub fragment_file: String,
    pub component_ids: Vec<ComponentId>,
}

/// Tag attached to every scene node inserted by the streaming core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTag {
    pub model_name: String,
    pub component_id: ComponentId,
    /// Codes whose resolution produced this node.
    pub codes: BTreeSet<Code>,
}

impl NodeTag {
    pub fn has_any_code<'a>(&self, mut codes: impl Iterator<Item = &'a Code>) -> bool {
        codes.any(|c| self.codes.contains(c))
    }
}

/// Opaque geometry produced from one fetched fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryHandle {
    pub fragment_file: String,
    /// Components present in the fragment that were asked for.
    pub component_ids: Vec<ComponentId>,
    pub blob: Bytes,
}

/// One node of a model's code tree, names and structure only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeTreeNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CodeTreeNode>,
}

impl CodeTreeNode {
    /// Total number of nodes in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(CodeTreeNode::node_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_id_canonical_numbers() {
        assert_eq!(ComponentId::from("12"), ComponentId::Numeric(12));
        assert_eq!(ComponentId::from("012"), ComponentId::Text("012".into()));
        assert_eq!(ComponentId::from("2Xb3"), ComponentId::Text("2Xb3".into()));
    }

    #[test]
    fn test_component_id_wire_forms() {
        let ids: Vec<ComponentId> = serde_json::from_str(r#"[1, "2", "abc"]"#).unwrap();
        assert_eq!(
            ids,
            vec![
                ComponentId::Numeric(1),
                ComponentId::Numeric(2),
                ComponentId::Text("abc".into())
            ]
        );
        assert_eq!(serde_json::to_string(&ids).unwrap(), r#"[1,2,"abc"]"#);
    }

    #[test]
    fn test_qualified_id_parse() {
        let id = QualifiedId::parse("tower|42").unwrap();
        assert_eq!(id.model_name.as_deref(), Some("tower"));
        assert_eq!(id.component_id, ComponentId::Numeric(42));
        assert!(id.belongs_to("tower"));
        assert!(!id.belongs_to("annex"));

        let bare = QualifiedId::parse("42").unwrap();
        assert!(bare.belongs_to("anything"));
        assert_eq!(bare.to_string(), "42");

        assert!(QualifiedId::parse("|42").is_err());
        assert!(QualifiedId::parse("tower|").is_err());
        assert!(QualifiedId::parse("a|b|c").is_err());
        assert!(QualifiedId::parse("").is_err());
    }

    #[test]
    fn test_tree_node_count() {
        let tree: CodeTreeNode = serde_json::from_str(
            r#"{"name":"site","children":[{"name":"L1"},{"name":"L2","children":[{"name":"HVAC"}]}]}"#,
        )
        .unwrap();
        assert_eq!(tree.node_count(), 4);
    }
}
