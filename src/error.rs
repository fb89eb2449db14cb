//! Typed validation failures.
//!
//! Most of the crate works in `anyhow::Result`; these are the failures callers
//! may want to match on. Most are not fatal: the offending input is either
//! sanitized to a safe fallback or dropped from the written record. A
//! non-finite checkpoint confidence rejects the save.

use std::path::PathBuf;

use thiserror::Error;

/// Input rejected by one of the guards in front of the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A resolved path is not a descendant of its storage root.
    #[error("path {path} escapes storage root {root}")]
    PathEscape { root: PathBuf, path: PathBuf },

    /// Trigger pattern exceeds the length limit.
    #[error("pattern is {len} characters, limit is {max}")]
    PatternTooLong { len: usize, max: usize },

    /// Trigger pattern does not compile.
    #[error("pattern does not compile: {0}")]
    PatternInvalid(String),

    /// Trigger pattern has a quantified group wrapped in another quantifier.
    #[error("pattern has a nested quantifier: {0}")]
    NestedQuantifier(String),

    /// Embedding length differs from the collection's dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A zero-length embedding.
    #[error("embedding is empty")]
    EmptyVector,

    /// Checkpoint confidence is NaN or infinite.
    #[error("checkpoint confidence must be a finite number")]
    NonFiniteConfidence,

    /// An item may not link to itself.
    #[error("item {0} cannot link to itself")]
    SelfLink(String),
}
