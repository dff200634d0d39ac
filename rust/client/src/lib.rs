// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Model Stream Client
//!
//! Network side of model streaming: the code-rule service and the model
//! fragment endpoint, spoken as JSON over HTTP with [reqwest](https://docs.rs/reqwest).
//!
//! - [`HttpCodeIndex`]: codes ↔ component ids ↔ fragment files, plus the
//!   model code tree and single-item lookups
//! - [`HttpFragmentSource`]: streams fragment bodies into memory
//! - [`CachedFragmentSource`]: optional content-addressed disk cache of
//!   fragment bodies
//! - [`ClientConfig`]: environment-driven configuration

pub mod cache;
pub mod config;
pub mod http;
pub mod wire;

pub use cache::{CachedFragmentSource, FragmentDiskCache};
pub use config::ClientConfig;
pub use http::{http_client, HttpCodeIndex, HttpFragmentSource};
