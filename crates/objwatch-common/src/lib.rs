//! objwatch Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging setup, and error handling for the objwatch workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`ObjwatchError`] and the [`Result`] alias
//! - **Logging**: `tracing` subscriber configuration shared by every binary
//! - **Types**: object identifiers, detail records and ingest payloads
//!
//! # Example
//!
//! ```no_run
//! use objwatch_common::types::{ObjectDetail, ObjectId};
//!
//! let detail = ObjectDetail::observed(ObjectId::new(7), true);
//! assert!(detail.online);
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{ObjwatchError, Result};
