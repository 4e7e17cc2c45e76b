//! `secretary-core` — identifiers and error types shared by the assistant's
//! background subsystems.
//!
//! This crate has no runtime behaviour of its own.

pub mod error;
pub mod id;

pub use error::CoreError;
pub use id::JobId;
