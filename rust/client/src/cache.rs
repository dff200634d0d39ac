// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Disk-based fragment blob cache using cacache.

use bytes::Bytes;
use model_stream_core::{FragmentReference, FragmentSource, Result};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Content-addressable disk cache of fragment bodies.
#[derive(Debug, Clone)]
pub struct FragmentDiskCache {
    cache_dir: PathBuf,
}

impl FragmentDiskCache {
    /// Create a new cache in the specified directory.
    pub async fn new(cache_dir: &str) -> Self {
        let path = PathBuf::from(cache_dir);

        if let Err(e) = tokio::fs::create_dir_all(&path).await {
            tracing::warn!(
                error = %e,
                path = %path.display(),
                "Failed to create fragment cache directory"
            );
        }

        Self { cache_dir: path }
    }

    /// Cache key for a fragment request: SHA256 of the file name and the
    /// sorted component ids.
    pub fn key(fragment: &FragmentReference) -> String {
        let mut ids: Vec<String> = fragment.component_ids.iter().map(|id| id.to_string()).collect();
        ids.sort();

        let mut hasher = Sha256::new();
        hasher.update(fragment.fragment_file.as_bytes());
        for id in &ids {
            hasher.update(b"\n");
            hasher.update(id.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Get cached bytes by key.
    pub async fn get(&self, key: &str) -> std::result::Result<Option<Bytes>, cacache::Error> {
        match cacache::read(&self.cache_dir, key).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(cacache::Error::EntryNotFound(_, _)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Store bytes under key.
    pub async fn set(&self, key: &str, data: &[u8]) -> std::result::Result<(), cacache::Error> {
        cacache::write(&self.cache_dir, key, data).await?;
        tracing::debug!(key = %key, size = data.len(), "Cached fragment");
        Ok(())
    }

    /// Check if a key exists in the cache.
    pub async fn has(&self, key: &str) -> bool {
        cacache::metadata(&self.cache_dir, key)
            .await
            .ok()
            .flatten()
            .is_some()
    }

    /// Clear all cached entries.
    pub async fn clear(&self) -> std::result::Result<(), cacache::Error> {
        cacache::clear(&self.cache_dir).await
    }
}

/// Fragment source that answers from the disk cache when it can.
///
/// Cache failures never fail a fetch; they fall through to `inner`.
#[derive(Debug, Clone)]
pub struct CachedFragmentSource<S> {
    inner: S,
    cache: Option<FragmentDiskCache>,
}

impl<S> CachedFragmentSource<S> {
    pub fn new(inner: S, cache: FragmentDiskCache) -> Self {
        Self {
            inner,
            cache: Some(cache),
        }
    }

    /// No caching; every fetch goes to `inner`.
    pub fn passthrough(inner: S) -> Self {
        Self { inner, cache: None }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: FragmentSource> FragmentSource for CachedFragmentSource<S> {
    async fn fetch_fragment(&self, fragment: &FragmentReference) -> Result<Bytes> {
        let Some(cache) = &self.cache else {
            return self.inner.fetch_fragment(fragment).await;
        };

        let key = FragmentDiskCache::key(fragment);
        match cache.get(&key).await {
            Ok(Some(bytes)) => {
                tracing::debug!(fragment = %fragment.fragment_file, key = %key, "Fragment cache HIT");
                return Ok(bytes);
            }
            Ok(None) => {
                tracing::debug!(fragment = %fragment.fragment_file, key = %key, "Fragment cache MISS");
            }
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Fragment cache read failed");
            }
        }

        let bytes = self.inner.fetch_fragment(fragment).await?;
        if let Err(e) = cache.set(&key, &bytes).await {
            tracing::warn!(error = %e, key = %key, "Fragment cache write failed");
        }
        Ok(bytes)
    }
}
