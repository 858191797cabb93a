// Copyright (c) The blackbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The recording API exposed to test code.
//!
//! Tests record against the state of the test in progress, either through an
//! explicit [`Recorder`] handle (preferred, and the only way to record from
//! threads the test spawns itself) or through the ambient module-level
//! functions, which resolve the state bound to the calling thread by the
//! host adapter's lifecycle hooks.
//!
//! The ambient binding is per-thread: it is set at test-start and cleared at
//! test-end, on the thread the host runs the test on. Worker threads
//! spawned by a test do not inherit it; clone a [`Recorder`] into such
//! threads instead.

use crate::{
    errors::{InactiveRecorderError, RecordError},
    paths::sanitize_file_name,
    state::{Attachment, RecorderState, StepRecord},
};
use blackbox_metadata::StepLevel;
use chrono::Utc;
use serde::Serialize;
use std::{
    cell::RefCell,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

thread_local! {
    static CURRENT: RefCell<Option<Recorder>> = const { RefCell::new(None) };
}

/// Binds a recorder as the current one for the calling thread.
///
/// Only the host adapter's test-start hook calls this.
pub(crate) fn bind_current(recorder: Recorder) {
    CURRENT.with(|current| {
        *current.borrow_mut() = Some(recorder);
    });
}

/// Clears the calling thread's current recorder.
///
/// Only the host adapter's test-end hook calls this.
pub(crate) fn unbind_current() {
    CURRENT.with(|current| {
        *current.borrow_mut() = None;
    });
}

/// A handle to the recording state of one test.
///
/// Cheap to clone; clones share the same underlying state. Handles stay
/// usable from any thread, which is how recording from test-spawned worker
/// threads is supported.
#[derive(Clone, Debug)]
pub struct Recorder {
    state: Arc<Mutex<RecorderState>>,
}

impl Recorder {
    pub(crate) fn new(state: Arc<Mutex<RecorderState>>) -> Self {
        Self { state }
    }

    /// Returns the recorder bound to the calling thread, or
    /// [`InactiveRecorderError`] if no test is active.
    pub fn current() -> Result<Self, InactiveRecorderError> {
        CURRENT
            .with(|current| current.borrow().clone())
            .ok_or(InactiveRecorderError)
    }

    /// Records a context value under `key`.
    ///
    /// The value is serialized to a JSON node immediately. Re-using a key
    /// replaces the stored value; the key keeps its first-insertion
    /// position.
    pub fn log(&self, key: impl Into<String>, value: impl Serialize) -> Result<(), RecordError> {
        let key = key.into();
        let value =
            serde_json::to_value(value).map_err(|error| RecordError::ContextValueSerialize {
                key: key.clone(),
                error,
            })?;
        self.lock_state().put_context(key, value);
        Ok(())
    }

    /// Records an INFO-level step with no data.
    pub fn step(&self, message: impl Into<String>) {
        self.push_step(message.into(), StepLevel::Info, None);
    }

    /// Records a step at the given level.
    pub fn step_with(&self, message: impl Into<String>, level: StepLevel) {
        self.push_step(message.into(), level, None);
    }

    /// Records a step at the given level with structured data.
    ///
    /// The data is serialized to a JSON node immediately.
    pub fn step_with_data(
        &self,
        message: impl Into<String>,
        level: StepLevel,
        data: impl Serialize,
    ) -> Result<(), RecordError> {
        let message = message.into();
        let data = serde_json::to_value(data).map_err(|error| RecordError::StepDataSerialize {
            message: message.clone(),
            error,
        })?;
        self.push_step(message, level, Some(data));
        Ok(())
    }

    /// Records a named text attachment.
    ///
    /// The name is sanitized on the way in; name collisions are resolved at
    /// bundle-write time by suffixing a counter.
    pub fn attach(&self, name: &str, content: impl Into<String>) {
        let attachment = Attachment::new(sanitize_file_name(name), content.into());
        self.lock_state().push_attachment(attachment);
    }

    /// Runs `f` with shared access to the underlying state.
    #[cfg(test)]
    pub(crate) fn with_state<T>(&self, f: impl FnOnce(&RecorderState) -> T) -> T {
        f(&self.lock_state())
    }

    fn push_step(&self, message: String, level: StepLevel, data: Option<serde_json::Value>) {
        let step = StepRecord {
            ts: Utc::now(),
            level,
            message,
            data,
        };
        self.lock_state().push_step(step);
    }

    /// Locks the state, recovering it if a panicking test poisoned the
    /// mutex. The state only holds plain data, so a poisoned lock cannot
    /// leave it torn in a way the writer would misread.
    fn lock_state(&self) -> MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Records a context value against the current thread's test.
///
/// See [`Recorder::log`].
pub fn log(key: impl Into<String>, value: impl Serialize) -> Result<(), RecordError> {
    Recorder::current()?.log(key, value)
}

/// Records an INFO-level step against the current thread's test.
pub fn step(message: impl Into<String>) -> Result<(), RecordError> {
    Recorder::current()?.step(message);
    Ok(())
}

/// Records a leveled step against the current thread's test.
pub fn step_with(message: impl Into<String>, level: StepLevel) -> Result<(), RecordError> {
    Recorder::current()?.step_with(message, level);
    Ok(())
}

/// Records a leveled step with structured data against the current thread's
/// test.
pub fn step_with_data(
    message: impl Into<String>,
    level: StepLevel,
    data: impl Serialize,
) -> Result<(), RecordError> {
    Recorder::current()?.step_with_data(message, level, data)
}

/// Records a named text attachment against the current thread's test.
pub fn attach(name: &str, content: impl Into<String>) -> Result<(), RecordError> {
    Recorder::current()?.attach(name, content);
    Ok(())
}
