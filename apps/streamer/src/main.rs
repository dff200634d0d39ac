// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model streamer - drives one streaming session from stdin.
//!
//! Resolves codes against a code-rule service and keeps a headless scene
//! in sync with the requested selection.
//!
//! # Commands
//!
//! - `codes L1,HVAC` - make exactly these codes visible
//! - `ids tower|12,tower|40` - make the codes containing these components visible
//! - `tree` - print the model's code tree
//! - `status` - print the session state
//! - `quit` - stop reading and wait for in-flight loads

use anyhow::Context;
use model_stream_client::{
    http_client, CachedFragmentSource, ClientConfig, FragmentDiskCache, HttpCodeIndex,
    HttpFragmentSource,
};
use model_stream_core::{
    session_channel, GlbParser, LoadCache, MemoryScene, ModelFetchCoordinator, StreamingSession,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod console;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,model_stream_core=debug,model_stream_client=debug")
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ClientConfig::from_env();

    tracing::info!(
        domain = %config.domain,
        model_name = %config.model_name,
        max_concurrent_fetches = config.max_concurrent_fetches,
        fragment_cache_dir = ?config.fragment_cache_dir,
        "Starting model streamer"
    );

    let http = http_client(&config).context("Failed to build HTTP client")?;
    let index = HttpCodeIndex::new(&config, http.clone());
    let fragments = HttpFragmentSource::new(&config, http);
    let source = match &config.fragment_cache_dir {
        Some(dir) => CachedFragmentSource::new(fragments, FragmentDiskCache::new(dir).await),
        None => CachedFragmentSource::passthrough(fragments),
    };

    let scene = Arc::new(MemoryScene::new());
    let coordinator = ModelFetchCoordinator::with_config(
        index.clone(),
        source,
        GlbParser,
        Arc::clone(&scene),
        LoadCache::new(),
        config.coordinator_config(),
    );
    let session = StreamingSession::new(config.model_name.clone(), coordinator);
    let (handle, driver) = session_channel(session, 32);

    let (_, console) = tokio::join!(driver.run(), console::run(handle, index, Arc::clone(&scene)));
    console?;

    tracing::info!(
        nodes = scene.node_count(),
        renders = scene.render_count(),
        "Model streamer finished"
    );
    Ok(())
}
