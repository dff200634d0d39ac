// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request and response bodies of the code-rule service.

use model_stream_core::{Code, CodeGroup, CodeTreeNode, ComponentId, FragmentReference};
use serde::{Deserialize, Serialize};

/// `POST code_rule/rules/cids`
#[derive(Debug, Serialize)]
pub struct RulesRequest<'a> {
    pub model_name: &'a str,
    pub rules: &'a [Code],
}

/// `POST code_rule/cids/fragment`, `POST code_rule/cids/rules`
#[derive(Debug, Serialize)]
pub struct ComponentsRequest<'a> {
    pub model_name: &'a str,
    pub cids: &'a [ComponentId],
}

/// Single-item lookups: only the model is sent, the item is in the path.
#[derive(Debug, Serialize)]
pub struct ModelRequest<'a> {
    pub model_name: &'a str,
}

/// `POST code_rule/tree`
#[derive(Debug, Serialize)]
pub struct TreeRequest<'a> {
    pub model_name: &'a str,
    #[serde(rename = "type")]
    pub tree_type: &'a str,
}

/// `POST bim/model/ids`
#[derive(Debug, Serialize)]
pub struct FragmentRequest<'a> {
    pub model_file: &'a str,
    pub ids: &'a [ComponentId],
}

/// Every JSON answer wraps its payload in `data`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// Some endpoints answer with one object or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// One code's resolution. `rule` is optional; without it the entry pairs
/// with the requested code at the same position.
#[derive(Debug, Deserialize)]
pub struct CodeGroupEntry {
    #[serde(default)]
    pub rule: Option<Code>,
    #[serde(default)]
    pub model_file: Option<String>,
    #[serde(default)]
    pub cids: Vec<ComponentId>,
}

#[derive(Debug, Deserialize)]
pub struct FragmentEntry {
    #[serde(rename = "fragmentFile", alias = "fragment_file", alias = "model_file")]
    pub fragment_file: String,
    #[serde(default)]
    pub cids: Vec<ComponentId>,
}

impl From<FragmentEntry> for FragmentReference {
    fn from(entry: FragmentEntry) -> Self {
        FragmentReference {
            fragment_file: entry.fragment_file,
            component_ids: entry.cids,
        }
    }
}

/// Tree node as served; names may be strings or numbers and nodes carry
/// extra fields that are ignored.
#[derive(Debug, Deserialize)]
pub struct TreeEntry {
    pub name: serde_json::Value,
    #[serde(default)]
    pub children: Vec<TreeEntry>,
}

impl From<TreeEntry> for CodeTreeNode {
    fn from(entry: TreeEntry) -> Self {
        let name = match entry.name {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        CodeTreeNode {
            name,
            children: entry.children.into_iter().map(CodeTreeNode::from).collect(),
        }
    }
}

/// Pair resolution entries with their codes and drop codes that matched
/// nothing.
pub fn code_groups(entries: Vec<CodeGroupEntry>, requested: &[Code]) -> Vec<CodeGroup> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(position, entry)| {
            let code = entry.rule.or_else(|| requested.get(position).cloned());
            match code {
                Some(code) => Some(CodeGroup {
                    code,
                    component_ids: entry.cids,
                    fragment_file: entry.model_file.filter(|f| !f.is_empty()),
                }),
                None => {
                    tracing::warn!(position, "Resolution entry without a matching code");
                    None
                }
            }
        })
        .filter(|group| !group.component_ids.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_groups_pair_by_position_and_drop_empty() {
        let body = r#"{"data":[{"cids":[1,2]},{"cids":[]},{"cids":["x"],"model_file":"m.glb"}]}"#;
        let envelope: Envelope<Vec<CodeGroupEntry>> = serde_json::from_str(body).unwrap();
        let requested = vec![Code::from("A"), Code::from("ghost"), Code::from("C")];

        let groups = code_groups(envelope.data, &requested);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].code, Code::from("A"));
        assert_eq!(groups[0].fragment_file, None);
        assert_eq!(groups[1].code, Code::from("C"));
        assert_eq!(groups[1].fragment_file.as_deref(), Some("m.glb"));
        assert_eq!(groups[1].component_ids, vec![ComponentId::Text("x".into())]);
    }

    #[test]
    fn test_code_groups_prefer_named_rule() {
        let body = r#"{"data":[{"rule":"B","cids":[3]}]}"#;
        let envelope: Envelope<Vec<CodeGroupEntry>> = serde_json::from_str(body).unwrap();
        let groups = code_groups(envelope.data, &[Code::from("A"), Code::from("B")]);
        assert_eq!(groups[0].code, Code::from("B"));
    }

    #[test]
    fn test_fragment_answer_one_or_many() {
        let one: Envelope<OneOrMany<FragmentEntry>> =
            serde_json::from_str(r#"{"data":{"fragmentFile":"m.glb","cids":[1]}}"#).unwrap();
        assert_eq!(one.data.into_vec().len(), 1);

        let many: Envelope<OneOrMany<FragmentEntry>> = serde_json::from_str(
            r#"{"data":[{"fragmentFile":"a.glb","cids":[1]},{"model_file":"b.glb","cids":[2]}]}"#,
        )
        .unwrap();
        let refs: Vec<FragmentReference> =
            many.data.into_vec().into_iter().map(FragmentReference::from).collect();
        assert_eq!(refs[1].fragment_file, "b.glb");
    }

    #[test]
    fn test_tree_names_are_stringified() {
        let envelope: Envelope<Vec<TreeEntry>> = serde_json::from_str(
            r#"{"data":[{"name":"site","id":9,"children":[{"name":101},{"name":"HVAC"}]}]}"#,
        )
        .unwrap();
        let tree: Vec<CodeTreeNode> = envelope.data.into_iter().map(CodeTreeNode::from).collect();
        assert_eq!(tree[0].children[0].name, "101");
        assert_eq!(tree[0].node_count(), 3);
    }
}
