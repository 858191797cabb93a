// Copyright (c) The blackbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced while reading manifests.

use camino::Utf8PathBuf;
use thiserror::Error;

/// An error that occurred while reading a bundle manifest.
#[derive(Debug, Error)]
pub enum ManifestReadError {
    /// Error reading the manifest file.
    #[error("failed to read manifest at {path}")]
    Read {
        /// The path that failed to be read.
        path: Utf8PathBuf,
        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// Error deserializing the manifest.
    #[error("failed to deserialize manifest at {path}")]
    Deserialize {
        /// The path that failed to be deserialized.
        path: Utf8PathBuf,
        /// The underlying deserialization error.
        #[source]
        error: serde_json::Error,
    },

    /// The manifest carries a schema version this crate does not support.
    #[error("manifest schema version mismatch at {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The path with the version mismatch.
        path: Utf8PathBuf,
        /// The expected schema version.
        expected: u32,
        /// The actual schema version found.
        actual: u32,
    },
}
