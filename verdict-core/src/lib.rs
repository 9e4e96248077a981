//! Shared data model, input validation and classifier-response normalization.
//!
//! Nothing in this crate performs I/O; the daemon and the client both build on it.

pub mod input;
pub mod models;
pub mod normalize;
pub mod wire;

/// Page size used when the caller does not give a usable one.
pub const DEFAULT_PAGE_LIMIT: u64 = 50;
/// Largest page a single list call returns.
pub const MAX_PAGE_LIMIT: u64 = 100;
