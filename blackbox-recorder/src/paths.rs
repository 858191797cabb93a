// Copyright (c) The blackbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Path computation for failure bundles.
//!
//! All bundle paths are derived up front into a [`BundlePaths`] record and
//! never recomputed: the writer, the adapter, and the bundle checker all
//! agree on the layout by construction.

use crate::{errors::PathResolveError, state::TestId};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};

/// The manifest file name inside a bundle directory.
pub static MANIFEST_FILE_NAME: &str = "manifest.json";

/// The context log file name inside a bundle directory.
pub static CONTEXT_LOG_FILE_NAME: &str = "context.log";

/// The attachments directory name inside a bundle directory.
pub static ATTACHMENTS_DIR_NAME: &str = "attachments";

/// The file name substituted for empty or fully illegal attachment names.
static FALLBACK_ATTACHMENT_NAME: &str = "attachment";

/// The set of paths making up one failure bundle.
///
/// Immutable once constructed; see [`BundlePaths::for_failure`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundlePaths {
    /// The absolute output root all bundles are written under.
    pub output_root: Utf8PathBuf,

    /// The directory for this bundle: `output_root/bundle_dir_name`.
    pub bundle_dir: Utf8PathBuf,

    /// The bundle directory's name: `<test-id>_<YYYYMMDDThhmmssZ>`.
    pub bundle_dir_name: String,

    /// Path to `manifest.json` inside the bundle.
    pub manifest_path: Utf8PathBuf,

    /// Path to `context.log` inside the bundle.
    pub context_log_path: Utf8PathBuf,

    /// Path to the `attachments` directory inside the bundle. Only created
    /// on disk if the test recorded attachments.
    pub attachments_dir: Utf8PathBuf,
}

impl BundlePaths {
    /// Computes the paths for a failure bundle.
    ///
    /// The bundle directory name combines the test id with `timestamp`
    /// formatted as a UTC `YYYYMMDDThhmmssZ` stamp (whole seconds,
    /// sub-second components truncated). Two failures of the same test
    /// within the same UTC second therefore map to the same directory; the
    /// later bundle overwrites the earlier one.
    pub fn for_failure(
        output_dir: &Utf8Path,
        test_id: &TestId,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, PathResolveError> {
        let bundle_dir_name = format!("{}_{}", test_id, bundle_timestamp(timestamp));
        let output_root = resolve_output_root(output_dir)?;
        let bundle_dir = output_root.join(&bundle_dir_name);
        Ok(Self {
            manifest_path: bundle_dir.join(MANIFEST_FILE_NAME),
            context_log_path: bundle_dir.join(CONTEXT_LOG_FILE_NAME),
            attachments_dir: bundle_dir.join(ATTACHMENTS_DIR_NAME),
            output_root,
            bundle_dir,
            bundle_dir_name,
        })
    }
}

/// Resolves the configured output directory to an absolute path.
///
/// Absolute paths are returned unchanged. Relative paths are resolved
/// against the current working directory and normalized (`.` and `..`
/// components folded away).
pub fn resolve_output_root(output_dir: &Utf8Path) -> Result<Utf8PathBuf, PathResolveError> {
    if output_dir.is_absolute() {
        return Ok(output_dir.to_owned());
    }
    let cwd = std::env::current_dir().map_err(|error| PathResolveError::CurrentDir { error })?;
    let cwd = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|path| PathResolveError::CurrentDirNotUtf8 { path })?;
    Ok(normalize(&cwd.join(output_dir)))
}

/// Formats a timestamp as the UTC bundle-directory stamp, e.g.
/// `20260202T143000Z`.
pub fn bundle_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Sanitizes a user-supplied attachment name into a safe file name.
///
/// Every character outside `[A-Za-z0-9._-]` is replaced with `_`, one
/// replacement per character. Path separators are always outside that set,
/// so the result can never escape the attachments directory. Empty input
/// maps to `attachment`.
///
/// The function is idempotent: sanitizing an already-sanitized name is a
/// no-op.
pub fn sanitize_file_name(name: &str) -> String {
    if name.is_empty() {
        return FALLBACK_ATTACHMENT_NAME.to_owned();
    }
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if safe.is_empty() {
        return FALLBACK_ATTACHMENT_NAME.to_owned();
    }
    safe
}

/// Folds `.` and `..` components out of a path, without touching the
/// filesystem.
fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => match out.components().next_back() {
                Some(Utf8Component::Normal(_)) => {
                    out.pop();
                }
                // `..` at the root stays at the root.
                Some(Utf8Component::RootDir) | Some(Utf8Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn test_id(s: &str) -> TestId {
        s.parse().expect("valid test id")
    }

    // Dots are legal; each path separator becomes exactly one underscore,
    // with no collapsing of adjacent replacements.
    #[test_case("note.txt", "note.txt"; "normal name")]
    #[test_case("file-name_v2.txt", "file-name_v2.txt"; "safe chars preserved")]
    #[test_case("../../etc/passwd", ".._.._etc_passwd"; "forward slashes replaced")]
    #[test_case("..\\..\\etc\\passwd", ".._.._etc_passwd"; "backslashes replaced")]
    #[test_case("my file.txt", "my_file.txt"; "spaces replaced")]
    #[test_case("a//b", "a__b"; "adjacent separators not collapsed")]
    #[test_case("a  !b", "a___b"; "adjacent illegal chars not collapsed")]
    #[test_case("", "attachment"; "empty falls back")]
    fn sanitize_cases(input: &str, expected: &str) {
        assert_eq!(sanitize_file_name(input), expected);
    }

    #[test]
    fn bundle_dir_name_format() {
        let ts = "2026-02-02T14:30:00Z".parse().unwrap();
        let paths =
            BundlePaths::for_failure(Utf8Path::new("blackbox-reports"), &test_id("abcdef0123456789"), ts)
                .unwrap();
        assert_eq!(paths.bundle_dir_name, "abcdef0123456789_20260202T143000Z");
    }

    #[test]
    fn bundle_dir_name_midnight() {
        let ts = "2026-01-01T00:00:00Z".parse().unwrap();
        let paths = BundlePaths::for_failure(Utf8Path::new("output"), &test_id("aabbccdd11223344"), ts)
            .unwrap();
        assert_eq!(paths.bundle_dir_name, "aabbccdd11223344_20260101T000000Z");
    }

    #[test]
    fn bundle_dir_name_end_of_day() {
        let ts = "2026-12-31T23:59:59Z".parse().unwrap();
        let paths = BundlePaths::for_failure(Utf8Path::new("output"), &test_id("aabbccdd11223344"), ts)
            .unwrap();
        assert_eq!(paths.bundle_dir_name, "aabbccdd11223344_20261231T235959Z");
    }

    #[test]
    fn bundle_timestamp_truncates_subseconds() {
        let ts = "2026-02-02T14:30:00.987Z".parse().unwrap();
        assert_eq!(bundle_timestamp(ts), "20260202T143000Z");
    }

    #[test]
    fn derived_paths_live_under_bundle_dir() {
        let ts = "2026-01-01T00:00:00Z".parse().unwrap();
        let paths =
            BundlePaths::for_failure(Utf8Path::new("blackbox-reports"), &test_id("aaaa0000bbbb1111"), ts)
                .unwrap();
        assert_eq!(paths.manifest_path, paths.bundle_dir.join("manifest.json"));
        assert_eq!(
            paths.context_log_path,
            paths.bundle_dir.join("context.log")
        );
        assert_eq!(paths.attachments_dir, paths.bundle_dir.join("attachments"));
        assert!(paths.bundle_dir.starts_with(&paths.output_root));
    }

    #[test]
    fn resolve_output_root_absolute_passthrough() {
        let root = resolve_output_root(Utf8Path::new("/tmp/output")).unwrap();
        assert_eq!(root, Utf8PathBuf::from("/tmp/output"));
    }

    #[test]
    fn resolve_output_root_relative_resolves_against_cwd() {
        let root = resolve_output_root(Utf8Path::new("blackbox-reports")).unwrap();
        assert!(root.is_absolute());
        assert!(root.ends_with("blackbox-reports"));
    }

    #[test]
    fn resolve_output_root_normalizes_dot_components() {
        let root = resolve_output_root(Utf8Path::new("./reports/../blackbox-reports")).unwrap();
        assert!(root.is_absolute());
        assert!(root.ends_with("blackbox-reports"));
        assert!(!root.as_str().contains(".."));
    }

    #[test]
    fn normalize_keeps_root_on_excess_parent_dirs() {
        assert_eq!(normalize(Utf8Path::new("/a/../../b")), Utf8PathBuf::from("/b"));
    }

    /// Checks a bundle directory name against
    /// `^[0-9a-f]{16}_\d{8}T\d{6}Z$` without pulling in a regex engine.
    fn is_valid_bundle_dir_name(name: &str) -> bool {
        let bytes = name.as_bytes();
        if bytes.len() != 16 + 1 + 8 + 1 + 6 + 1 {
            return false;
        }
        let hex_ok = bytes[..16]
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b));
        hex_ok
            && bytes[16] == b'_'
            && bytes[17..25].iter().all(u8::is_ascii_digit)
            && bytes[25] == b'T'
            && bytes[26..32].iter().all(u8::is_ascii_digit)
            && bytes[32] == b'Z'
    }

    proptest! {
        #[test]
        fn sanitize_output_is_always_safe(name in ".*") {
            let safe = sanitize_file_name(&name);
            prop_assert!(!safe.is_empty());
            let all_safe = safe.chars().all(|c| {
                c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
            });
            prop_assert!(all_safe);
        }

        #[test]
        fn sanitize_is_idempotent(name in ".*") {
            let once = sanitize_file_name(&name);
            prop_assert_eq!(sanitize_file_name(&once), once);
        }

        #[test]
        fn sanitize_preserves_char_count(name in ".+") {
            let safe = sanitize_file_name(&name);
            prop_assert_eq!(safe.chars().count(), name.chars().count());
        }

        #[test]
        fn bundle_dir_names_match_expected_shape(
            class in "[a-zA-Z:_]{1,40}",
            name in "[a-zA-Z:_]{1,40}",
            secs in 0i64..4102444800,
        ) {
            let id = TestId::new(&class, &name);
            let ts = DateTime::from_timestamp(secs, 0).unwrap();
            let dir_name = format!("{}_{}", id, bundle_timestamp(ts));
            prop_assert!(is_valid_bundle_dir_name(&dir_name), "bad name: {dir_name}");
        }
    }
}
