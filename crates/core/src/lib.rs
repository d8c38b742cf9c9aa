//! Shared types, error taxonomy, and session domain logic.
//!
//! This crate has no I/O dependencies so the API layer, repositories, and
//! the realtime feed can all reference the same mode enum, control-flag
//! filtering, and validation rules.

pub mod error;
pub mod session;
pub mod types;

pub use error::CoreError;
