// Copyright (c) The blackbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the BlackBox recorder.

use camino::Utf8PathBuf;
use thiserror::Error;

/// A recording operation was invoked while no test was active on the calling
/// thread.
///
/// This is a caller bug: the recording API may only be used between the host
/// adapter's test-start and test-end hooks, on the thread the test runs on.
#[derive(Clone, Debug, Error)]
#[error("no test is active on the current thread")]
pub struct InactiveRecorderError;

/// An error that occurred while recording context, steps, or attachments.
#[derive(Debug, Error)]
pub enum RecordError {
    /// A recording operation was invoked outside an active test.
    #[error(transparent)]
    Inactive(#[from] InactiveRecorderError),

    /// A context value could not be serialized to JSON.
    #[error("failed to serialize context value for key `{key}`")]
    ContextValueSerialize {
        /// The context key the value was being recorded under.
        key: String,
        /// The underlying serialization error.
        #[source]
        error: serde_json::Error,
    },

    /// Step data could not be serialized to JSON.
    #[error("failed to serialize step data for step `{message}`")]
    StepDataSerialize {
        /// The message of the step the data was attached to.
        message: String,
        /// The underlying serialization error.
        #[source]
        error: serde_json::Error,
    },
}

/// A string did not parse as a test id.
///
/// Test ids are exactly 16 lowercase hex digits.
#[derive(Clone, Debug, Error)]
#[error("invalid test id `{input}` (expected 16 lowercase hex digits)")]
pub struct InvalidTestId {
    /// The rejected input.
    pub input: String,
}

/// An error that occurred while resolving the bundle output root.
#[derive(Debug, Error)]
pub enum PathResolveError {
    /// The current working directory could not be determined.
    #[error("failed to determine the current directory")]
    CurrentDir {
        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The current working directory is not valid UTF-8.
    #[error("current directory `{}` is not valid UTF-8", path.display())]
    CurrentDirNotUtf8 {
        /// The non-UTF-8 path.
        path: std::path::PathBuf,
    },
}

/// An error that occurred while writing a failure bundle.
///
/// The writer fails loudly and does not clean up partially written bundles;
/// whatever made it to disk is left for inspection.
#[derive(Debug, Error)]
pub enum BundleWriteError {
    /// The output root could not be resolved.
    #[error(transparent)]
    ResolveOutputRoot(#[from] PathResolveError),

    /// Error creating the bundle directory.
    #[error("failed to create bundle directory {bundle_dir}")]
    BundleDirCreate {
        /// The directory that failed to be created.
        bundle_dir: Utf8PathBuf,
        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// Error writing the context log.
    #[error("failed to write context log to {path}")]
    ContextLogWrite {
        /// The path that failed to be written.
        path: Utf8PathBuf,
        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// Error creating the attachments directory.
    #[error("failed to create attachments directory {path}")]
    AttachmentsDirCreate {
        /// The directory that failed to be created.
        path: Utf8PathBuf,
        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// Error writing an attachment.
    #[error("failed to write attachment to {path}")]
    AttachmentWrite {
        /// The path that failed to be written.
        path: Utf8PathBuf,
        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// Error serializing the manifest.
    #[error("failed to serialize manifest")]
    ManifestSerialize {
        /// The underlying serialization error.
        #[source]
        error: serde_json::Error,
    },

    /// Error writing the manifest.
    #[error("failed to write manifest to {path}")]
    ManifestWrite {
        /// The path that failed to be written.
        path: Utf8PathBuf,
        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that prevented a bundle from being checked at all.
///
/// Findings about an unsound bundle are reported as
/// [`BundleViolation`](crate::validate::BundleViolation)s, not errors; this
/// type covers failures of the check itself.
#[derive(Debug, Error)]
pub enum BundleCheckError {
    /// The given path is not a directory.
    #[error("bundle path {path} is not a directory")]
    NotADirectory {
        /// The path that was checked.
        path: Utf8PathBuf,
    },

    /// Error walking the bundle directory.
    #[error("failed to walk bundle directory {path}")]
    Walk {
        /// The directory being walked.
        path: Utf8PathBuf,
        /// The underlying walk error.
        #[source]
        error: walkdir::Error,
    },

    /// A file path inside the bundle is not valid UTF-8.
    #[error("bundle entry `{}` is not valid UTF-8", path.display())]
    EntryNotUtf8 {
        /// The non-UTF-8 path.
        path: std::path::PathBuf,
    },
}
