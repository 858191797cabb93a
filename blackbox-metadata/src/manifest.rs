// Copyright (c) The blackbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ManifestReadError;
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{fmt, fs};
use uuid::Uuid;

/// The manifest schema version this crate reads and writes.
pub const SCHEMA_VERSION: u32 = 1;

/// The value substituted for framework and runtime fields that cannot be
/// determined from the environment.
pub const UNKNOWN_FIELD: &str = "unknown";

/// The root of a failure-bundle manifest (`manifest.json`).
///
/// Field order matches the serialized key order; the manifest is written
/// pretty-printed with two-space indentation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    /// The schema version of this manifest. Always [`SCHEMA_VERSION`] for
    /// manifests written by this crate.
    pub schema_version: u32,

    /// Identity, timing, and environment metadata for the failed test.
    pub meta: BundleMeta,

    /// User-recorded key/value context, in first-insertion order.
    pub context: IndexMap<String, serde_json::Value>,

    /// Ordered step annotations recorded during the test.
    pub steps: Vec<StepEntry>,

    /// The failure that triggered this bundle.
    pub exception: ExceptionInfo,

    /// Relative locations of the files making up the bundle.
    pub artifacts: ArtifactsInfo,
}

impl BundleManifest {
    /// Reads and deserializes a manifest from the given path.
    ///
    /// Returns an error if the file cannot be read, is not a valid manifest,
    /// or carries a schema version other than [`SCHEMA_VERSION`].
    pub fn from_path(path: &Utf8Path) -> Result<Self, ManifestReadError> {
        let contents = fs::read_to_string(path).map_err(|error| ManifestReadError::Read {
            path: path.to_owned(),
            error,
        })?;
        let manifest: Self =
            serde_json::from_str(&contents).map_err(|error| ManifestReadError::Deserialize {
                path: path.to_owned(),
                error,
            })?;
        if manifest.schema_version != SCHEMA_VERSION {
            return Err(ManifestReadError::VersionMismatch {
                path: path.to_owned(),
                expected: SCHEMA_VERSION,
                actual: manifest.schema_version,
            });
        }
        Ok(manifest)
    }
}

/// Identity, timing, and environment metadata for a failed test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMeta {
    /// Stable 16-hex-character identifier derived from the test identity.
    pub test_id: String,

    /// Human-readable test name.
    pub test_name: String,

    /// Fully qualified container name of the test.
    pub test_class: String,

    /// The outcome recorded in this bundle. Bundles are only emitted for
    /// failures, so this is always [`BundleStatus::Failed`] today.
    pub status: BundleStatus,

    /// When the test ended, as an ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,

    /// Wall-clock duration of the test in milliseconds.
    ///
    /// May be negative if the clock moved backwards between test start and
    /// end; the value is recorded as observed, not remapped.
    pub duration_ms: i64,

    /// Process-scoped identifier shared by every bundle from one test-runner
    /// invocation.
    pub run_id: Uuid,

    /// Callable identifier of the test method, if the host exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_method: Option<String>,

    /// Parameter values for parametrized tests, if the host exposes them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<IndexMap<String, serde_json::Value>>,

    /// The test framework the host adapter binds to.
    pub framework: FrameworkMetadata,

    /// The language runtime and platform the test ran on.
    pub runtime: RuntimeMetadata,
}

/// The outcome of the test a bundle describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BundleStatus {
    /// The test failed. The only status bundles are emitted for.
    Failed,
}

impl BundleStatus {
    /// Returns the status as the string serialized into the manifest.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name and version of the test framework driving the host adapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkMetadata {
    /// The framework name, e.g. `libtest`.
    pub name: String,

    /// The framework version, or `"unknown"` if not determinable.
    pub version: String,
}

impl FrameworkMetadata {
    /// Creates new framework metadata.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// The language runtime and platform a test ran on.
///
/// Fields that cannot be determined are filled with `"unknown"` rather than
/// omitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeMetadata {
    /// The implementation language of the host, e.g. `rust`.
    pub language: String,

    /// The runtime version, or `"unknown"`.
    pub version: String,

    /// The operating system name.
    pub os: String,

    /// The machine architecture.
    pub arch: String,
}

/// A severity level attached to a recorded step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepLevel {
    /// Fine-grained diagnostic detail.
    Debug,
    /// Routine progress. The default level.
    #[default]
    Info,
    /// Something unexpected that did not fail the step.
    Warn,
    /// A step-level failure.
    Error,
}

impl StepLevel {
    /// Normalizes a caller-supplied level string.
    ///
    /// Matching is case-insensitive. Anything that is not one of the four
    /// known levels, including `None`, maps to [`StepLevel::Info`].
    pub fn normalize(input: Option<&str>) -> Self {
        let Some(input) = input else {
            return Self::Info;
        };
        match input.to_ascii_uppercase().as_str() {
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "WARN" => Self::Warn,
            "ERROR" => Self::Error,
            _ => Self::Info,
        }
    }

    /// Returns the level as the string serialized into the manifest.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }

    /// Returns all known level strings.
    pub fn variants() -> &'static [&'static str] {
        &["DEBUG", "INFO", "WARN", "ERROR"]
    }
}

impl fmt::Display for StepLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single timestamped step annotation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepEntry {
    /// When the step was recorded.
    pub ts: DateTime<Utc>,

    /// The step's severity level.
    pub level: StepLevel,

    /// The step message.
    pub message: String,

    /// Structured data attached to the step, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// The failure recorded in a bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionInfo {
    /// The failure's type name. When the host reports a failure without a
    /// cause object, adapters substitute their framework's canonical
    /// assertion-failure name.
    #[serde(rename = "type")]
    pub ty: String,

    /// The failure message. Empty if the cause carried none.
    pub message: String,

    /// A rendered stack trace or error chain. Omitted when the host
    /// provided no cause object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

/// Relative locations of the files making up a bundle.
///
/// All values are relative to the bundle directory; the writer never emits
/// absolute paths or parent-directory components here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactsInfo {
    /// The bundle directory's own name under the output root.
    pub bundle_dir: String,

    /// The context log file name. Always `context.log`.
    pub logs: String,

    /// The attachments directory, as `attachments/`. Present only when the
    /// bundle contains at least one attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments_dir: Option<String>,
}
