//! Core abstractions for setenv: secret source contracts, the environment table
//! the resolver publishes into, and the resolution request.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod environment;
pub mod request;
pub mod source;

/// Variable resolved when the caller does not name one.
pub const DEFAULT_TARGET: &str = "HF_TOKEN";
