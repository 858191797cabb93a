// Copyright (c) The blackbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recorder configuration.
//!
//! The recorder has exactly one configuration input: the directory failure
//! bundles are written under.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

/// Environment variable overriding the bundle output directory.
///
/// Relative values resolve against the current working directory at
/// bundle-write time.
pub const OUTPUT_DIR_ENV: &str = "BLACKBOX_OUTPUT_DIR";

/// The default bundle output directory, relative to the current working
/// directory.
pub const DEFAULT_OUTPUT_DIR: &str = "blackbox-reports";

/// Configuration for the recorder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecorderConfig {
    output_dir: Utf8PathBuf,
}

impl RecorderConfig {
    /// Creates a configuration with an explicit output directory.
    pub fn new(output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Resolves the configuration from the environment.
    ///
    /// Uses [`OUTPUT_DIR_ENV`] if set and non-empty, and
    /// [`DEFAULT_OUTPUT_DIR`] otherwise.
    pub fn from_env() -> Self {
        match std::env::var(OUTPUT_DIR_ENV) {
            Ok(dir) if !dir.is_empty() => {
                debug!(output_dir = %dir, "using output directory from {OUTPUT_DIR_ENV}");
                Self::new(dir)
            }
            _ => Self::default(),
        }
    }

    /// Returns the configured output directory, possibly relative.
    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_dir() {
        assert_eq!(
            RecorderConfig::default().output_dir(),
            Utf8Path::new("blackbox-reports")
        );
    }

    #[test]
    fn explicit_output_dir() {
        let config = RecorderConfig::new("/var/bundles");
        assert_eq!(config.output_dir(), Utf8Path::new("/var/bundles"));
    }
}
