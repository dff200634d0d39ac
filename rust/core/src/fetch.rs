// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fragment transport and geometry parsing collaborators.

use crate::error::{Error, Result};
use crate::types::{ComponentId, FragmentReference, GeometryHandle};
use bytes::Bytes;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::future::Future;

/// Fetches the binary body of one fragment, fully buffered.
pub trait FragmentSource {
    fn fetch_fragment(&self, fragment: &FragmentReference) -> impl Future<Output = Result<Bytes>>;
}

/// Turns fetched fragment bytes into an opaque geometry handle.
pub trait GeometryParser {
    fn parse(&self, fragment: &FragmentReference, bytes: Bytes) -> Result<GeometryHandle>;
}

/// Accepts any non-empty body as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBlobParser;

impl GeometryParser for RawBlobParser {
    fn parse(&self, fragment: &FragmentReference, bytes: Bytes) -> Result<GeometryHandle> {
        if bytes.is_empty() {
            return Err(Error::parse(&fragment.fragment_file, "empty body"));
        }
        Ok(GeometryHandle {
            fragment_file: fragment.fragment_file.clone(),
            component_ids: fragment.component_ids.clone(),
            blob: bytes,
        })
    }
}

const GLB_MAGIC: u32 = 0x4654_6C67; // "glTF"
const GLB_VERSION: u32 = 2;
const GLB_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
const CHUNK_TYPE_JSON: u32 = 0x4E4F_534A; // "JSON"

#[derive(Deserialize)]
struct GltfDocument {
    #[serde(default)]
    nodes: Vec<GltfNode>,
}

#[derive(Deserialize)]
struct GltfNode {
    #[serde(default)]
    name: Option<String>,
}

/// Validates binary glTF fragments and finds which requested components
/// they actually contain. Component nodes are named by their id.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlbParser;

impl GlbParser {
    fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
        let word = bytes.get(offset..offset + 4)?;
        Some(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }

    fn json_chunk<'a>(fragment_file: &str, bytes: &'a [u8]) -> Result<&'a [u8]> {
        let header = |field| {
            Self::read_u32(bytes, field)
                .ok_or_else(|| Error::parse(fragment_file, "truncated GLB header"))
        };

        if header(0)? != GLB_MAGIC {
            return Err(Error::parse(fragment_file, "not a binary glTF container"));
        }
        let version = header(4)?;
        if version != GLB_VERSION {
            return Err(Error::parse(
                fragment_file,
                format!("unsupported glTF version {}", version),
            ));
        }
        let declared = header(8)? as usize;
        if declared != bytes.len() {
            return Err(Error::parse(
                fragment_file,
                format!("declared length {} but received {} bytes", declared, bytes.len()),
            ));
        }

        let chunk_len = Self::read_u32(bytes, GLB_HEADER_LEN)
            .ok_or_else(|| Error::parse(fragment_file, "missing JSON chunk"))?
            as usize;
        let chunk_type = Self::read_u32(bytes, GLB_HEADER_LEN + 4)
            .ok_or_else(|| Error::parse(fragment_file, "missing JSON chunk"))?;
        if chunk_type != CHUNK_TYPE_JSON {
            return Err(Error::parse(fragment_file, "first chunk is not JSON"));
        }

        let start = GLB_HEADER_LEN + CHUNK_HEADER_LEN;
        start
            .checked_add(chunk_len)
            .and_then(|end| bytes.get(start..end))
            .ok_or_else(|| Error::parse(fragment_file, "JSON chunk overruns container"))
    }
}

impl GeometryParser for GlbParser {
    fn parse(&self, fragment: &FragmentReference, bytes: Bytes) -> Result<GeometryHandle> {
        let file = &fragment.fragment_file;
        let json = Self::json_chunk(file, &bytes)?;
        let document: GltfDocument = serde_json::from_slice(json)
            .map_err(|e| Error::parse(file, format!("invalid glTF JSON: {}", e)))?;

        let named: FxHashSet<ComponentId> = document
            .nodes
            .into_iter()
            .filter_map(|n| n.name)
            .map(ComponentId::from)
            .collect();

        let component_ids = if named.is_empty() {
            fragment.component_ids.clone()
        } else {
            fragment
                .component_ids
                .iter()
                .filter(|id| named.contains(*id))
                .cloned()
                .collect()
        };

        if component_ids.len() < fragment.component_ids.len() {
            tracing::debug!(
                fragment = %file,
                requested = fragment.component_ids.len(),
                present = component_ids.len(),
                "Fragment is missing some requested components"
            );
        }

        Ok(GeometryHandle {
            fragment_file: file.clone(),
            component_ids,
            blob: bytes,
        })
    }
}

/// Assemble a minimal GLB container around `json` (no BIN chunk).
#[cfg(test)]
pub(crate) fn glb_with_json(json: &str) -> Bytes {
    let mut chunk = json.as_bytes().to_vec();
    while chunk.len() % 4 != 0 {
        chunk.push(b' ');
    }
    let total = GLB_HEADER_LEN + CHUNK_HEADER_LEN + chunk.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_TYPE_JSON.to_le_bytes());
    out.extend_from_slice(&chunk);
    Bytes::from(out)
}
