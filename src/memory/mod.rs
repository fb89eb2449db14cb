//! The knowledge and checkpoint memory engine.
//!
//! Leaves first: [`types`] and [`patterns`] have no storage dependencies,
//! [`index`] and [`vectors`] persist records and embeddings, and the
//! remaining modules are the operations callers use.

pub mod checkpoints;
pub mod dedup;
pub mod index;
pub mod maintenance;
pub mod patterns;
pub mod relations;
pub mod search;
pub mod stats;
pub mod store;
pub mod types;
pub mod vectors;
