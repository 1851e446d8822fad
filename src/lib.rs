//! mendtool: template-based automated program repair
//!
//! Mines edit templates from before/after file pairs into a change pool,
//! then searches fault-localized lines of a program for a template instance
//! that makes its failing tests pass.

// Engine - re-exported from mendtool-core
pub use mendtool_core::apply;
pub use mendtool_core::change;
pub use mendtool_core::concretize;
pub use mendtool_core::context;
pub use mendtool_core::diff;
pub use mendtool_core::error;
pub use mendtool_core::extract;
pub use mendtool_core::frontend;
pub use mendtool_core::location;
pub use mendtool_core::patch_info;
pub use mendtool_core::pool;
pub use mendtool_core::tree;
pub use mendtool_core::treediff;
pub use mendtool_core::types;

// Language front ends
pub use mendtool_java as java;

// Run-level infrastructure
pub mod config;
pub mod fault;
pub mod mine;
pub mod orchestrator;
pub mod output;
pub mod runner;
pub mod store;
pub mod verify;

// Error bridges - converts run-level errors to MendError
mod error_bridges;
