//! Compile-only test to verify public API surface.
//!
//! This file serves as a compile-time contract for the public API.
//! If this file fails to compile, the public API has regressed.
//!
//! Run with: cargo test -- api_surface

// Allow unused imports - this test is about compile-time verification, not runtime usage
#![allow(unused_imports)]

// ============================================================================
// Engine Types
// ============================================================================

// tree module - program trees and shape hashing
use mendtool::tree::{Category, NodeData, NodeId, Role, SlotDesc, Tree};
use mendtool::types::{ContentHash, Span};

// change and pool modules - templates and their persistent store
use mendtool::change::{Anchor, Change, ChangeKind};
use mendtool::context::{Context, ContextInfo};
use mendtool::pool::{ChangeId, ChangePool, PoolError, PoolStats};

// extraction and diffing
use mendtool::extract::{synthesize, ChangeExtractor, MineStats, MinedChange};
use mendtool::frontend::{Binding, EditOp, EditScript, FrontEnd, FrontEndError, TreeDiff};
use mendtool::treediff::ShapeDiff;

// location, concretization, application
use mendtool::apply::{ApplyOutcome, Patcher};
use mendtool::concretize::{ConcretizationStrategy, Concretizer, Instance, Materials};
use mendtool::location::{
    CoveredLine, InsertionKind, LocationSource, LocationStats, LocationStrategy,
    LocationStrategyKind, TargetLocation,
};
use mendtool::patch_info::{PatchInfo, RepairAction};
use mendtool::diff::unified_diff;

// error module - error types and codes
use mendtool::error::{MendError, OutputErrorCode};

// Language front ends
use mendtool::java::JavaFrontEnd;

// ============================================================================
// Run Infrastructure
// ============================================================================

use mendtool::config::{
    ConfigError, ConfigOverrides, ConfigSource, ConfigValue, LocationMode, RepairConfig,
    ResolvedConfig, CONFIG_FILE,
};
use mendtool::fault::{load_fault_file, parse_fault_lines, parse_location, FaultError};
use mendtool::mine::{discover_pairs, mine_pairs, MinePair, MineSummary};
use mendtool::orchestrator::{
    ensure_pools, format_elapsed, run, PatcherCache, RepairContext, RepairSummary,
    Termination,
};
use mendtool::output::{
    emit_response, ErrorInfo, ErrorResponse, MineResponse, PoolStatsResponse, RepairResponse,
    SCHEMA_VERSION,
};
use mendtool::runner::{
    ensure_runnable, expand_template, parse_junit_output, run_command, CommandCompiler,
    CommandTestRunner, CompileResult, Compiler, ProcessOutput, TestRunResult, TestRunner,
};
use mendtool::store::{
    class_path, format_timestamp, Candidate, CandidateStore, PatchRecord, StoreError, StoreResult,
};
use mendtool::verify::{Outcome, TestPlan, TestPlanFiles, Verifier, VerifySettings};

// ============================================================================
// Test
// ============================================================================

#[test]
fn api_surface_compiles() {
    // The imports above form the public API contract.
    // Any change that breaks these imports is a breaking change.
    let _ = std::any::type_name::<Tree>();
    let _ = std::any::type_name::<ChangePool>();
    let _ = std::any::type_name::<Patcher>();
    let _ = std::any::type_name::<LocationStrategy>();
    let _ = std::any::type_name::<MendError>();
    let _ = std::any::type_name::<RepairContext>();
    let _ = std::any::type_name::<RepairConfig>();
    let _ = std::any::type_name::<JavaFrontEnd>();
}

#[test]
fn schema_version_is_stable() {
    // The schema version is part of the public API contract
    assert_eq!(SCHEMA_VERSION, "1");
}

#[test]
fn outcome_codes_are_stable() {
    let codes: Vec<u8> = [
        Outcome::Pass,
        Outcome::CompileError,
        Outcome::TestFailure,
        Outcome::TestTimeout,
        Outcome::BreakFunc,
        Outcome::TriggerTestFailure,
        Outcome::RelevantTestFailure,
    ]
    .iter()
    .map(Outcome::code)
    .collect();
    assert_eq!(codes, vec![0, 1, 2, 3, 4, 5, 6]);
}
