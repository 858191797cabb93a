// Copyright (c) The blackbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The host-adapter contract.
//!
//! A host adapter binds a test framework's lifecycle to the recorder:
//!
//! 1. On test-start, call [`TestSession::start`] with the test's identity.
//!    This captures the start time and binds the recorder as current for
//!    the calling thread.
//! 2. On test-end (success or failure), call [`TestSession::finish`] to
//!    clear the thread binding.
//! 3. On test-failure, call [`TestSession::fail`] with the captured cause
//!    (if any) before finishing. This captures the end time and writes the
//!    failure bundle.
//!
//! Errors raised while writing a bundle must not mask the original test
//! failure the host is already reporting; adapters should surface them
//! alongside it.

use crate::{
    config::RecorderConfig,
    errors::BundleWriteError,
    paths::BundlePaths,
    recorder::{self, Recorder},
    state::{RecorderState, TestIdentity},
    writer,
};
use blackbox_metadata::{FrameworkMetadata, RuntimeMetadata, UNKNOWN_FIELD};
use chrono::{DateTime, Utc};
use std::{
    any::Any,
    error::Error,
    sync::{Arc, Mutex, PoisonError},
};
use swrite::{SWrite, swrite};

/// The exception type recorded when the host reports a failure without a
/// cause object. Rust tests fail by panicking, so the canonical name is
/// `panic`.
pub static DEFAULT_FAILURE_TYPE: &str = "panic";

/// The framework name reported by this adapter.
static FRAMEWORK_NAME: &str = "libtest";

/// The failure that ended a test, as captured by the host adapter.
#[derive(Clone, Debug)]
pub struct FailureCause {
    /// The failure's type name.
    pub type_name: String,

    /// The failure message, empty if none was available.
    pub message: String,

    /// A rendered stack trace or error chain, if available.
    pub backtrace: Option<String>,
}

impl FailureCause {
    /// Creates a failure cause from a type name and message.
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            backtrace: None,
        }
    }

    /// Sets the rendered stack trace.
    pub fn set_backtrace(&mut self, backtrace: impl Into<String>) -> &mut Self {
        self.backtrace = Some(backtrace.into());
        self
    }

    /// Creates a failure cause from an error value.
    ///
    /// The type name is the error's concrete Rust type; the source chain,
    /// if any, is rendered into the stack-trace field.
    pub fn from_error<E: Error>(error: &E) -> Self {
        Self {
            type_name: std::any::type_name::<E>().to_owned(),
            message: error.to_string(),
            backtrace: render_error_chain(error),
        }
    }

    /// Creates a failure cause from a panic payload, as obtained from
    /// `std::panic::catch_unwind` or a panic hook.
    ///
    /// String payloads (the overwhelmingly common case: `panic!`,
    /// `assert!`, `assert_eq!`) become the message; other payload types
    /// leave the message empty.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_default();
        Self {
            type_name: DEFAULT_FAILURE_TYPE.to_owned(),
            message,
            backtrace: None,
        }
    }
}

/// Renders an error's source chain, or `None` for chain-less errors.
fn render_error_chain(error: &dyn Error) -> Option<String> {
    error.source()?;
    let mut out = format!("{error}\ncaused by:");
    let mut source = error.source();
    while let Some(err) = source {
        swrite!(out, "\n  - {err}");
        source = err.source();
    }
    Some(out)
}

/// Framework and runtime metadata recorded into each manifest.
#[derive(Clone, Debug)]
pub struct HostMetadata {
    /// The test framework driving this adapter.
    pub framework: FrameworkMetadata,

    /// The language runtime and platform.
    pub runtime: RuntimeMetadata,
}

impl HostMetadata {
    /// Collects metadata for the built-in libtest binding.
    pub fn current() -> Self {
        Self::with_framework(FrameworkMetadata::new(FRAMEWORK_NAME, UNKNOWN_FIELD))
    }

    /// Collects runtime metadata under a caller-supplied framework
    /// identity, for adapters binding other frameworks.
    pub fn with_framework(framework: FrameworkMetadata) -> Self {
        Self {
            framework,
            runtime: current_runtime(),
        }
    }
}

/// Collects runtime metadata from the environment.
///
/// The compiler version is not discoverable from a running binary, so
/// `version` is reported as `unknown`.
fn current_runtime() -> RuntimeMetadata {
    RuntimeMetadata {
        language: "rust".to_owned(),
        version: UNKNOWN_FIELD.to_owned(),
        os: std::env::consts::OS.to_owned(),
        arch: std::env::consts::ARCH.to_owned(),
    }
}

/// The recording session for one test execution.
///
/// Owns the per-test state from test-start until the bundle is written (on
/// failure) or the session is dropped (on success). No state outlives its
/// session.
#[derive(Debug)]
pub struct TestSession {
    state: Arc<Mutex<RecorderState>>,
}

impl TestSession {
    /// Starts a session for the given test, capturing the start time now
    /// and binding the recorder as current for the calling thread.
    pub fn start(identity: TestIdentity) -> Self {
        Self::start_at(identity, Utc::now())
    }

    /// Starts a session with an explicit start time.
    ///
    /// Useful for hosts with their own clock, and for deterministic tests.
    pub fn start_at(identity: TestIdentity, start_time: DateTime<Utc>) -> Self {
        let state = Arc::new(Mutex::new(RecorderState::new(identity, start_time)));
        let session = Self { state };
        recorder::bind_current(session.recorder());
        session
    }

    /// Returns a recorder handle for this session's state.
    pub fn recorder(&self) -> Recorder {
        Recorder::new(Arc::clone(&self.state))
    }

    /// Clears the calling thread's recorder binding.
    ///
    /// Call from the test-end hook, after a success or after [`Self::fail`].
    pub fn finish(&self) {
        recorder::unbind_current();
    }

    /// Writes the failure bundle for this test, capturing the end time now
    /// and resolving configuration and host metadata from the environment.
    ///
    /// Partially written bundles are left in place on error.
    pub fn fail(&self, cause: Option<&FailureCause>) -> Result<BundlePaths, BundleWriteError> {
        self.fail_at(
            cause,
            Utc::now(),
            &RecorderConfig::from_env(),
            &HostMetadata::current(),
        )
    }

    /// Writes the failure bundle with an explicit end time, configuration,
    /// and host metadata.
    pub fn fail_at(
        &self,
        cause: Option<&FailureCause>,
        end_time: DateTime<Utc>,
        config: &RecorderConfig,
        host: &HostMetadata,
    ) -> Result<BundlePaths, BundleWriteError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        writer::write_failure_bundle(&state, end_time, cause, config, host)
    }
}
