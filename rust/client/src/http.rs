// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON-over-HTTP implementations of the code index and fragment transport.

use crate::config::ClientConfig;
use crate::wire::{
    code_groups, CodeGroupEntry, ComponentsRequest, Envelope, FragmentEntry, FragmentRequest,
    ModelRequest, OneOrMany, RulesRequest, TreeEntry, TreeRequest,
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use model_stream_core::{
    Code, CodeGroup, CodeIndex, CodeTreeNode, ComponentId, Error, FragmentReference,
    FragmentSource, Result,
};
use reqwest::Url;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// Build the shared HTTP client for a configuration.
pub fn http_client(config: &ClientConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(concat!("model-stream/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Append path segments to `domain`, percent-encoding each one.
fn endpoint(domain: &str, segments: &[&str]) -> std::result::Result<Url, String> {
    let mut url = Url::parse(domain).map_err(|e| format!("invalid domain `{}`: {}", domain, e))?;
    url.path_segments_mut()
        .map_err(|_| format!("domain `{}` cannot carry a path", domain))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Client for the code-rule service.
#[derive(Debug, Clone)]
pub struct HttpCodeIndex {
    domain: String,
    model_name: String,
    tree_type: String,
    http: reqwest::Client,
}

impl HttpCodeIndex {
    pub fn new(config: &ClientConfig, http: reqwest::Client) -> Self {
        Self {
            domain: config.domain.trim_end_matches('/').to_string(),
            model_name: config.model_name.clone(),
            tree_type: config.tree_type.clone(),
            http,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn post_json<B, R>(
        &self,
        operation: &'static str,
        model_name: &str,
        segments: &[&str],
        body: &B,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let fail = |message: String| Error::remote_lookup(operation, model_name, message);

        let url = endpoint(&self.domain, segments).map_err(fail)?;
        tracing::debug!(operation, url = %url, "Code-rule request");

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| fail(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(fail(format!("service returned {}: {}", status, body)));
        }

        resp.json()
            .await
            .map_err(|e| fail(format!("response parse failed: {e}")))
    }

    /// The model's code tree.
    pub async fn model_tree(&self) -> Result<Vec<CodeTreeNode>> {
        let body = TreeRequest {
            model_name: &self.model_name,
            tree_type: &self.tree_type,
        };
        let envelope: Envelope<OneOrMany<TreeEntry>> = self
            .post_json("model_tree", &self.model_name, &["code_rule", "tree"], &body)
            .await?;
        Ok(envelope
            .data
            .into_vec()
            .into_iter()
            .map(CodeTreeNode::from)
            .collect())
    }

    /// Components matched by a single code.
    pub async fn code_to_component_ids(&self, code: &Code) -> Result<Vec<ComponentId>> {
        let body = ModelRequest {
            model_name: &self.model_name,
        };
        let envelope: Envelope<Vec<ComponentId>> = self
            .post_json(
                "code_to_component_ids",
                &self.model_name,
                &["code_rule", code.as_str(), "cids"],
                &body,
            )
            .await?;
        Ok(envelope.data)
    }

    /// Codes matching a single component.
    pub async fn component_id_to_codes(&self, id: &ComponentId) -> Result<Vec<Code>> {
        let body = ModelRequest {
            model_name: &self.model_name,
        };
        let id = id.to_string();
        let envelope: Envelope<Vec<Code>> = self
            .post_json(
                "component_id_to_codes",
                &self.model_name,
                &["code_rule", "component", &id],
                &body,
            )
            .await?;
        Ok(envelope.data)
    }
}

impl CodeIndex for HttpCodeIndex {
    async fn codes_to_component_ids(
        &self,
        model_name: &str,
        codes: &[Code],
    ) -> Result<Vec<CodeGroup>> {
        let body = RulesRequest {
            model_name,
            rules: codes,
        };
        let envelope: Envelope<Vec<CodeGroupEntry>> = self
            .post_json(
                "codes_to_component_ids",
                model_name,
                &["code_rule", "rules", "cids"],
                &body,
            )
            .await?;
        let groups = code_groups(envelope.data, codes);
        tracing::debug!(
            model_name = %model_name,
            requested = codes.len(),
            matched = groups.len(),
            "Resolved codes"
        );
        Ok(groups)
    }

    async fn component_ids_to_fragment_references(
        &self,
        model_name: &str,
        component_ids: &[ComponentId],
    ) -> Result<Vec<FragmentReference>> {
        let body = ComponentsRequest {
            model_name,
            cids: component_ids,
        };
        let envelope: Envelope<OneOrMany<FragmentEntry>> = self
            .post_json(
                "component_ids_to_fragment_references",
                model_name,
                &["code_rule", "cids", "fragment"],
                &body,
            )
            .await?;
        Ok(envelope
            .data
            .into_vec()
            .into_iter()
            .map(FragmentReference::from)
            .collect())
    }

    async fn component_ids_to_codes(
        &self,
        model_name: &str,
        component_ids: &[ComponentId],
    ) -> Result<Vec<Code>> {
        let body = ComponentsRequest {
            model_name,
            cids: component_ids,
        };
        let envelope: Envelope<Vec<Code>> = self
            .post_json(
                "component_ids_to_codes",
                model_name,
                &["code_rule", "cids", "rules"],
                &body,
            )
            .await?;
        Ok(envelope.data)
    }
}

/// Streams fragment bodies from the model service.
#[derive(Debug, Clone)]
pub struct HttpFragmentSource {
    domain: String,
    http: reqwest::Client,
}

impl HttpFragmentSource {
    pub fn new(config: &ClientConfig, http: reqwest::Client) -> Self {
        Self {
            domain: config.domain.trim_end_matches('/').to_string(),
            http,
        }
    }
}

impl FragmentSource for HttpFragmentSource {
    async fn fetch_fragment(&self, fragment: &FragmentReference) -> Result<Bytes> {
        let file = fragment.fragment_file.as_str();
        let fail = |message: String| Error::fetch(file, message);

        let url = endpoint(&self.domain, &["bim", "model", "ids"]).map_err(fail)?;
        let body = FragmentRequest {
            model_file: file,
            ids: &fragment.component_ids,
        };

        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| fail(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(fail(format!("service returned {}", resp.status())));
        }

        let mut buffer = BytesMut::with_capacity(resp.content_length().unwrap_or(0) as usize);
        let mut chunks = resp.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| fail(format!("body stream failed: {e}")))?;
            buffer.extend_from_slice(&chunk);
        }

        tracing::debug!(
            fragment = %file,
            components = fragment.component_ids.len(),
            bytes = buffer.len(),
            "Fragment received"
        );
        Ok(buffer.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_segments() {
        let url = endpoint("http://bim.local/api", &["code_rule", "L1/HVAC", "cids"]).unwrap();
        assert_eq!(url.as_str(), "http://bim.local/api/code_rule/L1%2FHVAC/cids");

        let url = endpoint("http://bim.local/", &["bim", "model", "ids"]).unwrap();
        assert_eq!(url.as_str(), "http://bim.local/bim/model/ids");

        assert!(endpoint("not a url", &["x"]).is_err());
    }
}
