// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for streaming operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, fetching or parsing model fragments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A code/id resolution round trip failed.
    #[error("Remote lookup `{operation}` for model `{model_name}` failed: {message}")]
    RemoteLookup {
        operation: &'static str,
        model_name: String,
        message: String,
    },

    /// A binary fragment could not be fetched.
    #[error("Fetch of fragment `{fragment_file}` failed: {message}")]
    Fetch {
        fragment_file: String,
        message: String,
    },

    /// Fetched bytes could not be turned into geometry.
    #[error("Fragment `{fragment_file}` could not be parsed: {message}")]
    Parse {
        fragment_file: String,
        message: String,
    },

    #[error("Invalid component id: {0}")]
    InvalidId(String),

    #[error("Streaming session is closed")]
    SessionClosed,

    /// A newer load was applied while this one was still resolving.
    #[error("Load superseded by a newer request")]
    Superseded,
}

impl Error {
    pub fn remote_lookup(
        operation: &'static str,
        model_name: &str,
        message: impl Into<String>,
    ) -> Self {
        Error::RemoteLookup {
            operation,
            model_name: model_name.to_string(),
            message: message.into(),
        }
    }

    pub fn fetch(fragment_file: &str, message: impl Into<String>) -> Self {
        Error::Fetch {
            fragment_file: fragment_file.to_string(),
            message: message.into(),
        }
    }

    pub fn parse(fragment_file: &str, message: impl Into<String>) -> Self {
        Error::Parse {
            fragment_file: fragment_file.to_string(),
            message: message.into(),
        }
    }
}
