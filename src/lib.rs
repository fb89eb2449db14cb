//! File-backed knowledge and research-checkpoint memory.
//!
//! Cairn stores small reusable knowledge items and research checkpoints as
//! plain files under a storage root, recalls the items relevant to a query,
//! blocks near-duplicate checkpoints, and prunes stale items over time.
//!
//! | Item type | Purpose | Semantic threshold |
//! |-----------|---------|--------------------|
//! | **knowledge** | Facts and how-tos worth recalling | 0.70 |
//! | **preference** | User or project preferences | 0.30 |
//! | **todo** | Follow-ups to surface later | 0.40 |
//! | **reference** | Pointers to code, docs and papers | 0.80 |
//!
//! # Architecture
//!
//! - **Storage**: one JSON index per root, Markdown content files with a YAML
//!   header, atomic replace-by-rename writes, owner-only permissions
//! - **Embeddings**: pluggable; a deterministic feature-hashing embedder or a
//!   local ONNX Runtime sentence encoder (all-MiniLM-L6-v2, 384 dimensions)
//! - **Recall**: keyword and pattern scoring, or a 0.7/0.3 blend of embedding
//!   similarity and keyword score when an embedder is available
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`error`]: Typed validation failures
//! - [`storage`]: Storage root layout, path guarding, content files, atomic writes
//! - [`embedding`]: Text-to-vector embedding providers
//! - [`memory`]: Core engine: index, vectors, recall, links, dedup, checkpoints, maintenance

pub mod config;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod storage;
