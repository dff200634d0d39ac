// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Client configuration loaded from environment variables.

use model_stream_core::CoordinatorConfig;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the code-rule and model service.
    pub domain: String,
    /// Model whose components are streamed.
    pub model_name: String,
    /// Tree flavour requested from the code tree endpoint.
    pub tree_type: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Fragment fetches allowed in flight at once.
    pub max_concurrent_fetches: usize,
    /// Directory for the fragment blob cache; disabled when unset.
    pub fragment_cache_dir: Option<String>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl ClientConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            domain: std::env::var("MODEL_STREAM_DOMAIN")
                .unwrap_or_else(|_| "http://localhost:8080".into())
                .trim_end_matches('/')
                .to_string(),
            model_name: std::env::var("MODEL_NAME").unwrap_or_else(|_| "model".into()),
            tree_type: std::env::var("MODEL_TREE_TYPE").unwrap_or_else(|_| "default".into()),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 60),
            max_concurrent_fetches: env_or("MAX_CONCURRENT_FETCHES", 8usize).max(1),
            fragment_cache_dir: std::env::var("FRAGMENT_CACHE_DIR")
                .ok()
                .map(|dir| dir.trim().to_string())
                .filter(|dir| !dir.is_empty()),
        }
    }

    /// Configuration for a service at `domain` with everything else defaulted.
    pub fn for_domain(domain: &str, model_name: &str) -> Self {
        Self {
            domain: domain.trim_end_matches('/').to_string(),
            model_name: model_name.to_string(),
            tree_type: "default".into(),
            request_timeout_secs: 60,
            max_concurrent_fetches: 8,
            fragment_cache_dir: None,
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_concurrent_fetches: self.max_concurrent_fetches,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
