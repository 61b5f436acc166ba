//! # Error Handling
//!
//! Every failure aborts the current rotation step and is surfaced to the caller
//! unchanged. Rotation resumes from the store's state on the next invocation.

pub mod types;

pub use types::{Result, RotationError};
