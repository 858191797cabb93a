// Copyright (c) The blackbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-test recording state and identity.
//!
//! One [`RecorderState`] exists per test execution. It is created by the
//! host adapter at test-start, mutated through the recording API while the
//! test runs, read once by the bundle writer on failure, and discarded.

use crate::errors::InvalidTestId;
use blackbox_metadata::StepLevel;
use chrono::{DateTime, Utc};
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use sha1::{Digest, Sha1};
use std::{fmt, str::FromStr, sync::OnceLock};
use uuid::Uuid;

/// Number of hex digits kept from the SHA-1 digest for a test id.
const TEST_ID_LEN: usize = 16;

static RUN_ID: OnceLock<Uuid> = OnceLock::new();

/// Returns the process-scoped run id.
///
/// Initialized to a random v4 UUID on first use and immutable thereafter;
/// every bundle produced by one test-runner invocation carries the same
/// value.
pub fn run_id() -> Uuid {
    *RUN_ID.get_or_init(Uuid::new_v4)
}

/// A stable identifier for one test identity, used to name bundle
/// directories.
///
/// Derived as the first 16 hex digits of `SHA-1(test_class + "::" +
/// test_name)`: a pure function of the identity, so the same test maps to
/// the same id across runs and machines.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TestId(String);

impl TestId {
    /// Computes the test id for a `(test_class, test_name)` identity.
    pub fn new(test_class: &str, test_name: &str) -> Self {
        let digest = Sha1::digest(format!("{test_class}::{test_name}").as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(TEST_ID_LEN);
        Self(hex)
    }

    /// Returns the id as a string slice: exactly 16 lowercase hex digits.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TestId {
    type Err = InvalidTestId;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let valid = input.len() == TEST_ID_LEN
            && input
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(input.to_owned()))
        } else {
            Err(InvalidTestId {
                input: input.to_owned(),
            })
        }
    }
}

/// The identity of a test as reported by the host framework.
#[derive(Clone, Debug)]
pub struct TestIdentity {
    /// Fully qualified container name, e.g. a module path.
    pub test_class: String,

    /// The host-provided display name.
    pub display_name: String,

    /// Callable identifier of the test, if the host exposes one. When
    /// present, it takes precedence over `display_name` as the test name.
    pub test_method: Option<String>,

    /// Parameter values for parametrized tests, if the host exposes them.
    pub parameters: Option<IndexMap<String, serde_json::Value>>,
}

impl TestIdentity {
    /// Creates a new test identity from a container name and display name.
    pub fn new(test_class: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            test_class: test_class.into(),
            display_name: display_name.into(),
            test_method: None,
            parameters: None,
        }
    }

    /// Sets the callable identifier of the test.
    pub fn set_test_method(&mut self, test_method: impl Into<String>) -> &mut Self {
        self.test_method = Some(test_method.into());
        self
    }

    /// Sets parameter values for a parametrized test.
    pub fn set_parameters(
        &mut self,
        parameters: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> &mut Self {
        self.parameters = Some(parameters.into_iter().collect());
        self
    }
}

/// A single timestamped step annotation, as recorded.
#[derive(Clone, Debug)]
pub struct StepRecord {
    /// When the step was recorded.
    pub ts: DateTime<Utc>,

    /// The step's severity level, already normalized.
    pub level: StepLevel,

    /// The step message.
    pub message: String,

    /// Structured data attached to the step, if any.
    pub data: Option<serde_json::Value>,
}

/// A named text document recorded during a test.
///
/// The name is stored sanitized; duplicate names are permitted and
/// disambiguated at write time.
#[derive(Clone, Debug)]
pub struct Attachment {
    name: String,
    content: DebugIgnore<String>,
}

impl Attachment {
    /// Creates a new attachment. `name` must already be sanitized.
    pub(crate) fn new(name: String, content: String) -> Self {
        Self {
            name,
            content: DebugIgnore(content),
        }
    }

    /// Returns the sanitized attachment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the attachment content.
    pub fn content(&self) -> &str {
        &self.content.0
    }
}

/// The per-test recording container.
///
/// Holds the test identity plus everything the test records: the
/// insertion-ordered context map, the step list, and the attachment list.
#[derive(Debug)]
pub struct RecorderState {
    run_id: Uuid,
    test_class: String,
    test_name: String,
    test_method: Option<String>,
    parameters: Option<IndexMap<String, serde_json::Value>>,
    test_id: TestId,
    start_time: DateTime<Utc>,
    context: IndexMap<String, serde_json::Value>,
    steps: Vec<StepRecord>,
    attachments: Vec<Attachment>,
}

impl RecorderState {
    /// Creates the state for a test starting at `start_time`.
    ///
    /// The test name is the callable identifier when the host exposes one,
    /// and the display name otherwise; the test id is derived from the
    /// resulting `(test_class, test_name)` pair.
    pub fn new(identity: TestIdentity, start_time: DateTime<Utc>) -> Self {
        let test_name = identity
            .test_method
            .clone()
            .unwrap_or_else(|| identity.display_name.clone());
        let test_id = TestId::new(&identity.test_class, &test_name);
        Self {
            run_id: run_id(),
            test_class: identity.test_class,
            test_name,
            test_method: identity.test_method,
            parameters: identity.parameters,
            test_id,
            start_time,
            context: IndexMap::new(),
            steps: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// The process-scoped run id this state was created under.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The fully qualified container name of the test.
    pub fn test_class(&self) -> &str {
        &self.test_class
    }

    /// The resolved test name.
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// The callable identifier of the test, if the host exposed one.
    pub fn test_method(&self) -> Option<&str> {
        self.test_method.as_deref()
    }

    /// Parameter values for parametrized tests, if the host exposed them.
    pub fn parameters(&self) -> Option<&IndexMap<String, serde_json::Value>> {
        self.parameters.as_ref()
    }

    /// The stable id derived from the test identity.
    pub fn test_id(&self) -> &TestId {
        &self.test_id
    }

    /// When the test started.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// The recorded context, in first-insertion order.
    pub fn context(&self) -> &IndexMap<String, serde_json::Value> {
        &self.context
    }

    /// The recorded steps, in record order.
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// The recorded attachments, in record order.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Stores a context value. Re-using a key replaces the value but keeps
    /// the key's first-insertion position.
    pub(crate) fn put_context(&mut self, key: String, value: serde_json::Value) {
        self.context.insert(key, value);
    }

    /// Appends a step record.
    pub(crate) fn push_step(&mut self, step: StepRecord) {
        self.steps.push(step);
    }

    /// Appends an attachment.
    pub(crate) fn push_attachment(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }
}
