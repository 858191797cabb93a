// Copyright (c) The blackbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the failure-bundle flow: record through a session,
//! fail, and inspect what landed on disk.

use blackbox_metadata::{BundleManifest, BundleStatus, StepLevel};
use blackbox_recorder::{
    adapter::{FailureCause, HostMetadata, TestSession},
    config::RecorderConfig,
    recorder,
    state::TestIdentity,
    validate::{BundleViolation, check_bundle},
};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use chrono::{DateTime, TimeDelta, Utc};
use pretty_assertions::assert_eq;
use std::fs;

fn t0() -> DateTime<Utc> {
    "2026-02-02T14:29:59Z".parse().unwrap()
}

fn setup(temp_dir: &Utf8TempDir) -> (RecorderConfig, HostMetadata) {
    // An absolute output root keeps the tests independent of the working
    // directory.
    let config = RecorderConfig::new(temp_dir.path().join("blackbox-reports"));
    (config, HostMetadata::current())
}

fn bundle_dirs(output_root: &Utf8Path) -> Vec<Utf8PathBuf> {
    let mut dirs: Vec<_> = output_root
        .read_dir_utf8()
        .expect("output root exists")
        .map(|entry| entry.expect("readable entry").path().to_owned())
        .collect();
    dirs.sort();
    dirs
}

#[test]
fn empty_failure_produces_minimal_bundle() {
    let temp_dir = Utf8TempDir::new().unwrap();
    let (config, host) = setup(&temp_dir);

    let session = TestSession::start_at(TestIdentity::new("codec::tests", "roundtrip"), t0());
    let end_time = t0() + TimeDelta::milliseconds(10);
    let paths = session.fail_at(None, end_time, &config, &host).unwrap();
    session.finish();

    assert!(paths.bundle_dir_name.ends_with("_20260202T142959Z"));
    assert!(paths.manifest_path.is_file());
    assert!(paths.context_log_path.is_file());
    assert!(!paths.attachments_dir.exists());

    let manifest = BundleManifest::from_path(&paths.manifest_path).unwrap();
    assert_eq!(manifest.meta.status, BundleStatus::Failed);
    assert_eq!(manifest.meta.duration_ms, 10);
    assert_eq!(manifest.meta.test_class, "codec::tests");
    assert_eq!(manifest.meta.test_name, "roundtrip");
    assert!(manifest.context.is_empty());
    assert!(manifest.steps.is_empty());
    assert!(manifest.artifacts.attachments_dir.is_none());
    assert_eq!(manifest.artifacts.logs, "context.log");
    assert_eq!(manifest.artifacts.bundle_dir, paths.bundle_dir_name);
    assert!(paths.bundle_dir_name.starts_with(&manifest.meta.test_id));

    let check = check_bundle(&paths.bundle_dir).unwrap();
    assert!(check.is_valid(), "violations: {:?}", check.violations);
}

#[test]
fn recorded_context_steps_and_attachments_round_trip() {
    let temp_dir = Utf8TempDir::new().unwrap();
    let (config, host) = setup(&temp_dir);

    let mut identity = TestIdentity::new("codec::tests", "rejects bad header");
    identity.set_test_method("rejects_bad_header");
    let session = TestSession::start_at(identity, t0());
    let handle = session.recorder();

    handle.log("endpoint", "db.local:5432").unwrap();
    handle.log("retries", 1).unwrap();
    handle.log("retries", 3).unwrap();
    handle.step("connected");
    handle.step_with("slow handshake", StepLevel::normalize(Some("warn")));
    handle.step_with("unknown level", StepLevel::normalize(Some("trace")));
    handle
        .step_with_data("gave up", StepLevel::Error, serde_json::json!({"attempt": 3}))
        .unwrap();
    handle.attach("handshake.log", "SYN/ACK");

    let cause = FailureCause::new("codec::HeaderError", "magic number mismatch");
    let end_time = t0() + TimeDelta::milliseconds(250);
    let paths = session.fail_at(Some(&cause), end_time, &config, &host).unwrap();
    session.finish();

    let manifest = BundleManifest::from_path(&paths.manifest_path).unwrap();

    // Context preserves first-insertion order; the rewritten key keeps its
    // slot with the newest value.
    let keys: Vec<_> = manifest.context.keys().cloned().collect();
    assert_eq!(keys, ["endpoint", "retries"]);
    assert_eq!(manifest.context["retries"], serde_json::json!(3));

    let levels: Vec<_> = manifest.steps.iter().map(|s| s.level).collect();
    assert_eq!(
        levels,
        [StepLevel::Info, StepLevel::Warn, StepLevel::Info, StepLevel::Error]
    );
    assert_eq!(manifest.steps[3].data, Some(serde_json::json!({"attempt": 3})));

    assert_eq!(manifest.meta.test_name, "rejects_bad_header");
    assert_eq!(manifest.meta.test_method.as_deref(), Some("rejects_bad_header"));
    assert_eq!(manifest.exception.ty, "codec::HeaderError");
    assert_eq!(manifest.exception.message, "magic number mismatch");
    assert_eq!(manifest.artifacts.attachments_dir.as_deref(), Some("attachments/"));

    let attachment = paths.attachments_dir.join("handshake.log");
    assert_eq!(fs::read_to_string(attachment).unwrap(), "SYN/ACK");

    let context_log = fs::read_to_string(&paths.context_log_path).unwrap();
    assert!(context_log.starts_with("BlackBox context log\n"));
    assert!(context_log.contains("testClass=codec::tests\n"));
    assert!(context_log.contains("durationMs=250\n"));
    assert!(context_log.contains("- retries: 3\n"));
    assert!(context_log.contains("WARN slow handshake\n"));
    assert!(context_log.contains(" | data={\"attempt\":3}\n"));

    let check = check_bundle(&paths.bundle_dir).unwrap();
    assert!(check.is_valid(), "violations: {:?}", check.violations);
}

#[test]
fn repeated_attachment_names_are_disambiguated() {
    let temp_dir = Utf8TempDir::new().unwrap();
    let (config, host) = setup(&temp_dir);

    let session = TestSession::start_at(TestIdentity::new("codec::tests", "retries"), t0());
    let handle = session.recorder();
    handle.attach("a.txt", "first");
    handle.attach("a.txt", "second");
    handle.attach("a.txt", "third");
    handle.attach("b.txt", "other");

    let end_time = t0() + TimeDelta::seconds(1);
    let paths = session.fail_at(None, end_time, &config, &host).unwrap();
    session.finish();

    assert_eq!(
        fs::read_to_string(paths.attachments_dir.join("a.txt")).unwrap(),
        "first"
    );
    assert_eq!(
        fs::read_to_string(paths.attachments_dir.join("a.txt-1")).unwrap(),
        "second"
    );
    assert_eq!(
        fs::read_to_string(paths.attachments_dir.join("a.txt-2")).unwrap(),
        "third"
    );
    assert_eq!(
        fs::read_to_string(paths.attachments_dir.join("b.txt")).unwrap(),
        "other"
    );

    let mut names: Vec<_> = paths
        .attachments_dir
        .read_dir_utf8()
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_owned())
        .collect();
    names.sort();
    assert_eq!(names, ["a.txt", "a.txt-1", "a.txt-2", "b.txt"]);
}

#[test]
fn unsafe_attachment_names_cannot_escape() {
    let temp_dir = Utf8TempDir::new().unwrap();
    let (config, host) = setup(&temp_dir);

    let session = TestSession::start_at(TestIdentity::new("codec::tests", "escape"), t0());
    session.recorder().attach("../../etc/passwd", "x");

    let end_time = t0() + TimeDelta::seconds(1);
    let paths = session.fail_at(None, end_time, &config, &host).unwrap();
    session.finish();

    // One file, separators replaced, dots preserved, inside attachments/.
    let names: Vec<_> = paths
        .attachments_dir
        .read_dir_utf8()
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_owned())
        .collect();
    assert_eq!(names, [".._.._etc_passwd"]);

    // Nothing landed outside the bundle directory.
    let output_root = paths.output_root.clone();
    assert_eq!(bundle_dirs(&output_root), [paths.bundle_dir.clone()]);
    assert!(!output_root.join("etc").exists());

    let check = check_bundle(&paths.bundle_dir).unwrap();
    assert!(check.is_valid(), "violations: {:?}", check.violations);
}

#[test]
fn missing_cause_defaults_exception() {
    let temp_dir = Utf8TempDir::new().unwrap();
    let (config, host) = setup(&temp_dir);

    let session = TestSession::start_at(TestIdentity::new("codec::tests", "no_cause"), t0());
    let end_time = t0() + TimeDelta::milliseconds(10);
    let paths = session.fail_at(None, end_time, &config, &host).unwrap();
    session.finish();

    let manifest = BundleManifest::from_path(&paths.manifest_path).unwrap();
    assert_eq!(manifest.exception.ty, "panic");
    assert_eq!(manifest.exception.message, "");
    assert!(manifest.exception.stack_trace.is_none());

    let raw = fs::read_to_string(&paths.manifest_path).unwrap();
    assert!(!raw.contains("stackTrace"));
}

#[test]
fn cause_with_chain_is_recorded() {
    let temp_dir = Utf8TempDir::new().unwrap();
    let (config, host) = setup(&temp_dir);

    let session = TestSession::start_at(TestIdentity::new("codec::tests", "chained"), t0());
    let mut cause = FailureCause::new("codec::HeaderError", "magic number mismatch");
    cause.set_backtrace("magic number mismatch\ncaused by:\n  - short read");
    let end_time = t0() + TimeDelta::milliseconds(42);
    let paths = session
        .fail_at(Some(&cause), end_time, &config, &host)
        .unwrap();
    session.finish();

    let manifest = BundleManifest::from_path(&paths.manifest_path).unwrap();
    let stack_trace = manifest.exception.stack_trace.unwrap();
    assert!(stack_trace.contains("caused by:"));
    assert!(stack_trace.contains("short read"));
}

#[test]
fn manifest_is_deterministic_for_identical_inputs() {
    let temp_dir = Utf8TempDir::new().unwrap();
    let host = HostMetadata::current();
    let config_a = RecorderConfig::new(temp_dir.path().join("first"));
    let config_b = RecorderConfig::new(temp_dir.path().join("second"));

    let session = TestSession::start_at(TestIdentity::new("codec::tests", "stable"), t0());
    let handle = session.recorder();
    handle.log("endpoint", "db.local:5432").unwrap();
    handle.attach("trace.txt", "hello");

    let cause = FailureCause::new("codec::HeaderError", "magic number mismatch");
    let end_time = t0() + TimeDelta::milliseconds(77);
    let paths_a = session
        .fail_at(Some(&cause), end_time, &config_a, &host)
        .unwrap();
    let paths_b = session
        .fail_at(Some(&cause), end_time, &config_b, &host)
        .unwrap();
    session.finish();

    let manifest_a = fs::read(&paths_a.manifest_path).unwrap();
    let manifest_b = fs::read(&paths_b.manifest_path).unwrap();
    assert_eq!(manifest_a, manifest_b);
}

#[test]
fn same_second_failures_overwrite() {
    let temp_dir = Utf8TempDir::new().unwrap();
    let (config, host) = setup(&temp_dir);

    let session = TestSession::start_at(TestIdentity::new("codec::tests", "flaky"), t0());
    let end_time = t0() + TimeDelta::milliseconds(100);
    let first = session.fail_at(None, end_time, &config, &host).unwrap();
    // 400ms later, still within the same UTC second.
    let second = session
        .fail_at(None, end_time + TimeDelta::milliseconds(400), &config, &host)
        .unwrap();
    session.finish();

    assert_eq!(first.bundle_dir, second.bundle_dir);
    assert_eq!(bundle_dirs(&first.output_root), [first.bundle_dir.clone()]);

    let manifest = BundleManifest::from_path(&second.manifest_path).unwrap();
    assert_eq!(manifest.meta.duration_ms, 500);
}

#[test]
fn ambient_recording_flows_through_session() {
    let temp_dir = Utf8TempDir::new().unwrap();
    let (config, host) = setup(&temp_dir);

    let session = TestSession::start_at(TestIdentity::new("codec::tests", "ambient"), t0());
    recorder::log("retries", 2).unwrap();
    recorder::step("connected").unwrap();
    recorder::step_with("nearly done", StepLevel::Debug).unwrap();
    recorder::attach("notes.txt", "checked twice").unwrap();

    let end_time = t0() + TimeDelta::seconds(2);
    let paths = session.fail_at(None, end_time, &config, &host).unwrap();
    session.finish();

    // After test-end the thread is unbound again.
    assert!(recorder::log("late", 1).is_err());

    let manifest = BundleManifest::from_path(&paths.manifest_path).unwrap();
    assert_eq!(manifest.context["retries"], serde_json::json!(2));
    assert_eq!(manifest.steps.len(), 2);
    assert_eq!(
        fs::read_to_string(paths.attachments_dir.join("notes.txt")).unwrap(),
        "checked twice"
    );
}

#[test]
fn check_bundle_flags_tampering() {
    let temp_dir = Utf8TempDir::new().unwrap();
    let (config, host) = setup(&temp_dir);

    let session = TestSession::start_at(TestIdentity::new("codec::tests", "tampered"), t0());
    let end_time = t0() + TimeDelta::seconds(1);
    let paths = session.fail_at(None, end_time, &config, &host).unwrap();
    session.finish();

    // A stray file not accounted for by the manifest.
    fs::write(paths.bundle_dir.join("stray.txt"), "??").unwrap();
    // An attachments directory the manifest never declared.
    fs::create_dir(&paths.attachments_dir).unwrap();

    let check = check_bundle(&paths.bundle_dir).unwrap();
    assert!(!check.is_valid());
    assert!(check.violations.contains(&BundleViolation::ExtraFile {
        path: "stray.txt".to_owned()
    }));
    assert!(
        check
            .violations
            .contains(&BundleViolation::AttachmentsDirUndeclared)
    );
}

#[test]
fn check_bundle_reports_unreadable_manifest() {
    let temp_dir = Utf8TempDir::new().unwrap();
    let bundle_dir = temp_dir.path().join("broken");
    fs::create_dir(&bundle_dir).unwrap();
    fs::write(bundle_dir.join("manifest.json"), "{ not json").unwrap();

    let check = check_bundle(&bundle_dir).unwrap();
    assert!(check.manifest.is_none());
    assert!(matches!(
        check.violations.as_slice(),
        [BundleViolation::ManifestUnreadable { .. }]
    ));
}
