// Copyright (c) The blackbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The failure-bundle writer.
//!
//! On test failure the writer materializes the bundle directory. The write
//! order is observable and deliberate: directories first, then the context
//! log and attachments, and the manifest last — a bundle without a
//! `manifest.json` is the signature of a failure inside the writer itself.
//!
//! The writer never cleans up after an error; a partial bundle is more
//! useful to an operator than an empty directory.

use crate::{
    adapter::{DEFAULT_FAILURE_TYPE, FailureCause, HostMetadata},
    config::RecorderConfig,
    errors::BundleWriteError,
    paths::{BundlePaths, sanitize_file_name},
    state::RecorderState,
};
use blackbox_metadata::{
    ArtifactsInfo, BundleManifest, BundleMeta, BundleStatus, ExceptionInfo, SCHEMA_VERSION,
    StepEntry,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::{collections::HashMap, fs};
use swrite::{SWrite, swrite, swriteln};
use tracing::{info, warn};

/// Writes the failure bundle for a test.
///
/// Computes the bundle paths from the configured output directory, creates
/// the bundle directory, and writes `context.log`, any attachments, and
/// `manifest.json`, in that order. Returns the paths of the written bundle.
pub fn write_failure_bundle(
    state: &RecorderState,
    end_time: DateTime<Utc>,
    cause: Option<&FailureCause>,
    config: &RecorderConfig,
    host: &HostMetadata,
) -> Result<BundlePaths, BundleWriteError> {
    let paths = BundlePaths::for_failure(config.output_dir(), state.test_id(), end_time)?;

    let duration_ms = (end_time - state.start_time()).num_milliseconds();
    if duration_ms < 0 {
        warn!(
            test_id = %state.test_id(),
            duration_ms,
            "clock moved backwards during test; recording negative duration"
        );
    }

    fs::create_dir_all(&paths.bundle_dir).map_err(|error| BundleWriteError::BundleDirCreate {
        bundle_dir: paths.bundle_dir.clone(),
        error,
    })?;

    write_context_log(&paths, state, end_time, duration_ms)?;
    write_attachments(&paths, state)?;
    write_manifest(&paths, state, end_time, duration_ms, cause, host)?;

    info!(
        test_id = %state.test_id(),
        bundle_dir = %paths.bundle_dir,
        "wrote failure bundle"
    );
    Ok(paths)
}

/// Formats a timestamp for the context log and manifest-adjacent text:
/// RFC 3339 with millisecond precision and a literal `Z`.
fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn write_context_log(
    paths: &BundlePaths,
    state: &RecorderState,
    end_time: DateTime<Utc>,
    duration_ms: i64,
) -> Result<(), BundleWriteError> {
    let contents = render_context_log(state, end_time, duration_ms);
    fs::write(&paths.context_log_path, contents).map_err(|error| {
        BundleWriteError::ContextLogWrite {
            path: paths.context_log_path.clone(),
            error,
        }
    })
}

/// Renders the human-readable context log.
///
/// Line-oriented, fixed field order; context entries in insertion order and
/// steps in record order, with `- (none)` placeholders for empty sections.
fn render_context_log(state: &RecorderState, end_time: DateTime<Utc>, duration_ms: i64) -> String {
    let mut out = String::new();
    swriteln!(out, "BlackBox context log");
    swriteln!(out, "testClass={}", state.test_class());
    swriteln!(out, "testName={}", state.test_name());
    swriteln!(out, "testId={}", state.test_id());
    swriteln!(out, "runId={}", state.run_id());
    swriteln!(out, "status={}", BundleStatus::Failed);
    swriteln!(out, "timestamp={}", format_timestamp(end_time));
    swriteln!(out, "durationMs={duration_ms}");
    out.push('\n');

    swriteln!(out, "context:");
    if state.context().is_empty() {
        swriteln!(out, "- (none)");
    } else {
        for (key, value) in state.context() {
            swriteln!(out, "- {key}: {value}");
        }
    }
    out.push('\n');

    swriteln!(out, "steps:");
    if state.steps().is_empty() {
        swriteln!(out, "- (none)");
    } else {
        for step in state.steps() {
            swrite!(
                out,
                "- [{}] {} {}",
                format_timestamp(step.ts),
                step.level,
                step.message
            );
            if let Some(data) = &step.data {
                swrite!(out, " | data={data}");
            }
            out.push('\n');
        }
    }
    out
}

/// Writes attachments in insertion order, disambiguating repeated names.
///
/// The k-th occurrence of a sanitized name is written as-is for k = 1 and
/// as `name-<k-1>` afterwards. Pre-existing files are truncated.
fn write_attachments(paths: &BundlePaths, state: &RecorderState) -> Result<(), BundleWriteError> {
    if state.attachments().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(&paths.attachments_dir).map_err(|error| {
        BundleWriteError::AttachmentsDirCreate {
            path: paths.attachments_dir.clone(),
            error,
        }
    })?;

    let mut name_counts: HashMap<String, usize> = HashMap::new();
    for attachment in state.attachments() {
        // Names are sanitized at attach time; re-sanitizing here keeps the
        // no-path-escape invariant local to the write.
        let safe = sanitize_file_name(attachment.name());
        let count = name_counts.entry(safe.clone()).or_insert(0);
        let file_name = if *count == 0 {
            safe
        } else {
            format!("{safe}-{count}")
        };
        *count += 1;

        let path = paths.attachments_dir.join(file_name);
        fs::write(&path, attachment.content())
            .map_err(|error| BundleWriteError::AttachmentWrite { path, error })?;
    }
    Ok(())
}

fn write_manifest(
    paths: &BundlePaths,
    state: &RecorderState,
    end_time: DateTime<Utc>,
    duration_ms: i64,
    cause: Option<&FailureCause>,
    host: &HostMetadata,
) -> Result<(), BundleWriteError> {
    let exception = match cause {
        Some(cause) => ExceptionInfo {
            ty: cause.type_name.clone(),
            message: cause.message.clone(),
            stack_trace: cause.backtrace.clone(),
        },
        None => ExceptionInfo {
            ty: DEFAULT_FAILURE_TYPE.to_owned(),
            message: String::new(),
            stack_trace: None,
        },
    };

    let manifest = BundleManifest {
        schema_version: SCHEMA_VERSION,
        meta: BundleMeta {
            test_id: state.test_id().to_string(),
            test_name: state.test_name().to_owned(),
            test_class: state.test_class().to_owned(),
            status: BundleStatus::Failed,
            timestamp: end_time,
            duration_ms,
            run_id: state.run_id(),
            test_method: state.test_method().map(str::to_owned),
            parameters: state.parameters().cloned(),
            framework: host.framework.clone(),
            runtime: host.runtime.clone(),
        },
        context: state.context().clone(),
        steps: state
            .steps()
            .iter()
            .map(|step| StepEntry {
                ts: step.ts,
                level: step.level,
                message: step.message.clone(),
                data: step.data.clone(),
            })
            .collect(),
        exception,
        artifacts: ArtifactsInfo {
            bundle_dir: paths.bundle_dir_name.clone(),
            logs: "context.log".to_owned(),
            attachments_dir: paths
                .attachments_dir
                .is_dir()
                .then(|| "attachments/".to_owned()),
        },
    };

    let json = serde_json::to_string_pretty(&manifest)
        .map_err(|error| BundleWriteError::ManifestSerialize { error })?;
    fs::write(&paths.manifest_path, json).map_err(|error| BundleWriteError::ManifestWrite {
        path: paths.manifest_path.clone(),
        error,
    })
}
