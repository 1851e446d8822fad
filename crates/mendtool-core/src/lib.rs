//! Core engine for mendtool.
//!
//! This crate provides the language-agnostic repair engine:
//! - Program tree model with structural shape hashing
//! - Change templates, contexts, and the persistent change pool
//! - Change extraction from before/after edit scripts
//! - Fix-location search driven by fault localization
//! - Concretization of templates against in-scope materials
//! - Patch application, rendering, and audit records
//! - Collaborator traits for language front ends and tree diffs
//! - Error types, text utilities, and diff generation

pub mod apply;
pub mod change;
pub mod concretize;
pub mod context;
pub mod diff;
pub mod error;
pub mod extract;
pub mod frontend;
pub mod location;
pub mod patch_info;
pub mod pool;
pub mod rewrite;
pub mod text;
pub mod tree;
pub mod treediff;
pub mod types;

#[cfg(test)]
mod testing;
