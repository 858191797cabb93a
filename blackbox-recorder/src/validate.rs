// Copyright (c) The blackbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strict re-validation of emitted bundles.
//!
//! A bundle on disk can drift from its manifest: files can be added or
//! deleted by hand, and a writer crash leaves partial bundles behind.
//! [`check_bundle`] re-reads a bundle directory and enforces the canonical
//! layout, reporting everything wrong with it as typed
//! [`BundleViolation`]s rather than failing on the first finding.

use crate::{
    errors::BundleCheckError,
    paths::{ATTACHMENTS_DIR_NAME, MANIFEST_FILE_NAME},
};
use blackbox_metadata::BundleManifest;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use walkdir::WalkDir;

/// The result of checking a bundle directory.
#[derive(Debug)]
pub struct BundleCheck {
    /// The parsed manifest, if it could be read at all.
    pub manifest: Option<BundleManifest>,

    /// Everything wrong with the bundle. Empty for a conforming bundle.
    pub violations: Vec<BundleViolation>,
}

impl BundleCheck {
    /// Returns true if the bundle conforms to the canonical layout.
    pub fn is_valid(&self) -> bool {
        self.manifest.is_some() && self.violations.is_empty()
    }
}

/// A single way in which a bundle fails to conform to the canonical layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BundleViolation {
    /// `manifest.json` is missing or unreadable.
    ManifestUnreadable {
        /// A rendered description of the underlying failure.
        message: String,
    },

    /// An artifact value contains a path that could escape the bundle:
    /// a `..` component, an absolute path, or a drive letter.
    UnsafeArtifactPath {
        /// The manifest key carrying the path.
        key: String,
        /// The offending value.
        value: String,
    },

    /// A file declared in the manifest does not exist on disk.
    MissingDeclaredFile {
        /// The declared bundle-relative path.
        path: String,
    },

    /// The manifest declares `attachmentsDir` but no attachments directory
    /// exists on disk.
    AttachmentsDirMissing,

    /// An attachments directory exists on disk but the manifest does not
    /// declare it.
    AttachmentsDirUndeclared,

    /// A file exists in the bundle that the manifest does not account for.
    ExtraFile {
        /// The bundle-relative path of the undeclared file.
        path: String,
    },
}

impl fmt::Display for BundleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManifestUnreadable { message } => {
                write!(f, "manifest is unreadable: {message}")
            }
            Self::UnsafeArtifactPath { key, value } => {
                write!(f, "unsafe path in artifacts: {key}={value}")
            }
            Self::MissingDeclaredFile { path } => {
                write!(f, "file declared in manifest is missing: {path}")
            }
            Self::AttachmentsDirMissing => {
                write!(f, "attachmentsDir declared but attachments/ is missing")
            }
            Self::AttachmentsDirUndeclared => {
                write!(f, "attachments/ exists but attachmentsDir is not declared")
            }
            Self::ExtraFile { path } => {
                write!(f, "file not accounted for by the manifest: {path}")
            }
        }
    }
}

/// Checks a bundle directory against the canonical layout.
///
/// Enforces, in order:
///
/// 1. `manifest.json` parses into the typed schema.
/// 2. Artifact values contain no `..`, absolute paths, or drive letters.
/// 3. Every declared file exists.
/// 4. `attachments/` exists on disk exactly when `artifacts.attachmentsDir`
///    is declared.
/// 5. No file exists beyond the manifest, declared files, and files under
///    declared directories.
///
/// Returns an error only if the check itself cannot run; findings about
/// the bundle are reported in the returned [`BundleCheck`].
pub fn check_bundle(bundle_dir: &Utf8Path) -> Result<BundleCheck, BundleCheckError> {
    if !bundle_dir.is_dir() {
        return Err(BundleCheckError::NotADirectory {
            path: bundle_dir.to_owned(),
        });
    }

    let manifest_path = bundle_dir.join(MANIFEST_FILE_NAME);
    let manifest = match BundleManifest::from_path(&manifest_path) {
        Ok(manifest) => manifest,
        Err(error) => {
            return Ok(BundleCheck {
                manifest: None,
                violations: vec![BundleViolation::ManifestUnreadable {
                    message: error.to_string(),
                }],
            });
        }
    };

    let mut violations = Vec::new();

    // Path-safety checks cover every artifact value, including bundleDir
    // (which names the bundle itself and is excluded from existence
    // checks).
    let mut artifact_values = vec![
        ("bundleDir", manifest.artifacts.bundle_dir.as_str()),
        ("logs", manifest.artifacts.logs.as_str()),
    ];
    if let Some(attachments_dir) = &manifest.artifacts.attachments_dir {
        artifact_values.push(("attachmentsDir", attachments_dir.as_str()));
    }
    for (key, value) in &artifact_values {
        if is_unsafe_path(value) {
            violations.push(BundleViolation::UnsafeArtifactPath {
                key: (*key).to_owned(),
                value: (*value).to_owned(),
            });
        }
    }

    let mut expected_files = vec![MANIFEST_FILE_NAME.to_owned()];
    let mut expected_dirs = Vec::new();
    for (key, value) in &artifact_values {
        if *key == "bundleDir" || is_unsafe_path(value) {
            continue;
        }
        if let Some(dir) = value.strip_suffix('/') {
            expected_dirs.push(dir.to_owned());
        } else {
            expected_files.push((*value).to_owned());
        }
    }

    for file in &expected_files {
        if !bundle_dir.join(file).exists() {
            violations.push(BundleViolation::MissingDeclaredFile { path: file.clone() });
        }
    }

    let attachments_declared = expected_dirs.iter().any(|d| d == ATTACHMENTS_DIR_NAME);
    let attachments_on_disk = bundle_dir.join(ATTACHMENTS_DIR_NAME).exists();
    if attachments_declared && !attachments_on_disk {
        violations.push(BundleViolation::AttachmentsDirMissing);
    }
    if attachments_on_disk && !attachments_declared {
        violations.push(BundleViolation::AttachmentsDirUndeclared);
    }

    for entry in WalkDir::new(bundle_dir) {
        let entry = entry.map_err(|error| BundleCheckError::Walk {
            path: bundle_dir.to_owned(),
            error,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(bundle_dir)
            .expect("walked entries live under the bundle dir");
        let rel = Utf8PathBuf::from_path_buf(rel.to_path_buf())
            .map_err(|path| BundleCheckError::EntryNotUtf8 { path })?;
        let rel = rel.as_str();

        let declared = expected_files.iter().any(|f| f == rel)
            || expected_dirs
                .iter()
                .any(|d| rel.starts_with(&format!("{d}/")));
        if !declared {
            violations.push(BundleViolation::ExtraFile {
                path: rel.to_owned(),
            });
        }
    }

    Ok(BundleCheck {
        manifest: Some(manifest),
        violations,
    })
}

/// Returns true for values that could escape the bundle directory:
/// parent-directory components, absolute paths, and drive letters.
fn is_unsafe_path(value: &str) -> bool {
    value.contains("..")
        || value.starts_with('/')
        || value.starts_with('\\')
        || (value.len() > 1 && value.as_bytes()[1] == b':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsafe_path_detection() {
        assert!(is_unsafe_path("../escape"));
        assert!(is_unsafe_path("logs/../../escape"));
        assert!(is_unsafe_path("/etc/passwd"));
        assert!(is_unsafe_path("\\\\share\\x"));
        assert!(is_unsafe_path("C:\\Windows"));
        assert!(!is_unsafe_path("context.log"));
        assert!(!is_unsafe_path("attachments/"));
        assert!(!is_unsafe_path("a.b.c"));
    }
}
