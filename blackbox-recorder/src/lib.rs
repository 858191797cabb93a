// Copyright (c) The blackbox Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! In-test recording and failure-bundle writing for BlackBox.
//!
//! BlackBox attaches to a unit-testing host and, whenever a test fails,
//! emits a self-contained bundle directory describing what the test did and
//! why it failed. During a test, code records structured key/value context,
//! ordered step annotations, and named text attachments; on failure these
//! are serialized together with the failure cause, environment metadata,
//! and timing into a deterministic on-disk layout:
//!
//! ```text
//! <output-root>/
//!   <test-id>_<YYYYMMDDThhmmssZ>/
//!     manifest.json
//!     context.log
//!     attachments/          (only if any attachments)
//! ```
//!
//! Bundles are only emitted on failure; there are no success bundles.
//!
//! The [`adapter`] module defines the contract a host adapter implements to
//! drive the recorder from test-framework lifecycle hooks; the [`recorder`]
//! module is the API test code records through. The manifest schema lives
//! in the `blackbox-metadata` crate.

pub mod adapter;
pub mod config;
pub mod errors;
pub mod paths;
pub mod recorder;
pub mod state;
pub mod validate;
pub mod writer;
