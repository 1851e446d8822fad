//! The repair search.
//!
//! For each configured pool, covered lines are walked through a
//! `LocationStrategy`. Each (location, change) pair gets up to `max_trials`
//! apply attempts; every distinct rendered candidate is stored, compiled,
//! and tested. The first candidate that passes every test tier is stored as
//! a patch and ends the search.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant, SystemTime};

use mendtool_core::apply::{ApplyOutcome, Patcher};
use mendtool_core::change::Change;
use mendtool_core::concretize::ConcretizationStrategy;
use mendtool_core::context::Context;
use mendtool_core::error::MendError;
use mendtool_core::frontend::FrontEnd;
use mendtool_core::location::{
    CoveredLine, LocationSource, LocationStats, LocationStrategy, LocationStrategyKind,
    TargetLocation,
};
use mendtool_core::patch_info::PatchInfo;
use mendtool_core::pool::{ChangeId, ChangePool};
use mendtool_core::types::ContentHash;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{LocationMode, RepairConfig};
use crate::fault::parse_location;
use crate::runner::{Compiler, TestRunner};
use crate::store::{class_path, format_timestamp, Candidate, CandidateStore, PatchRecord};
use crate::verify::{Outcome, TestPlan, TestPlanFiles, Verifier, VerifySettings};

const CLASSPATH_SEPARATOR: &str = if cfg!(windows) { ";" } else { ":" };

// ============================================================================
// Context
// ============================================================================

/// Everything a run needs, built once and threaded through the search.
pub struct RepairContext {
    pub config: RepairConfig,
    pub front_end: Rc<dyn FrontEnd>,
    pub compiler: Box<dyn Compiler>,
    pub tester: Box<dyn TestRunner>,
    pub store: CandidateStore,
    pub plan: TestPlan,
    pub settings: VerifySettings,
    started: Instant,
}

impl RepairContext {
    /// Build a context, reading the test lists named in `config`.
    pub fn new(
        config: RepairConfig,
        front_end: Rc<dyn FrontEnd>,
        compiler: Box<dyn Compiler>,
        tester: Box<dyn TestRunner>,
    ) -> Self {
        let files = TestPlanFiles {
            trigger: config.trigger_tests.clone(),
            relevant: config.relevant_tests.clone(),
            all: config.all_tests.clone(),
            flaky: config.flaky_tests.clone(),
        };
        let plan = TestPlan::load(&files, config.trigger_failures);
        Self::with_plan(config, front_end, compiler, tester, plan)
    }

    pub fn with_plan(
        config: RepairConfig,
        front_end: Rc<dyn FrontEnd>,
        compiler: Box<dyn Compiler>,
        tester: Box<dyn TestRunner>,
        plan: TestPlan,
    ) -> Self {
        let target = config.target_dir.to_string_lossy().into_owned();
        let test_classpath = std::iter::once(target)
            .chain(config.test_classpath.iter().cloned())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(CLASSPATH_SEPARATOR);
        let settings = VerifySettings {
            compile_classpath: config.compile_classpath.join(CLASSPATH_SEPARATOR),
            test_classpath,
            target_dir: config.target_dir.clone(),
            timeout: config.test_timeout(),
        };
        let store = CandidateStore::new(config.candidate_dir.clone(), config.patch_dir.clone());
        RepairContext {
            config,
            front_end,
            compiler,
            tester,
            store,
            plan,
            settings,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn budget_exhausted(&self) -> bool {
        self.config
            .time_budget()
            .is_some_and(|budget| self.elapsed() >= budget)
    }

    fn verifier(&self) -> Verifier<'_> {
        Verifier::new(
            self.compiler.as_ref(),
            self.tester.as_ref(),
            &self.plan,
            &self.settings,
        )
    }

    fn location_kind(&self) -> Result<LocationStrategyKind, MendError> {
        match self.config.location_strategy {
            LocationMode::Ranked => Ok(LocationStrategyKind::Ranked),
            LocationMode::Perfect => {
                let text = self.config.perfect_location.as_deref().unwrap_or_default();
                let (class, line) = parse_location(text).ok_or_else(|| {
                    MendError::invalid_args(format!("bad perfect location {:?}", text))
                })?;
                Ok(LocationStrategyKind::Perfect { class, line })
            }
        }
    }
}

// ============================================================================
// Patcher Cache
// ============================================================================

/// One `Patcher` per class, loaded from the source tree on first use. A
/// class that cannot be read or parsed is remembered as unavailable.
pub struct PatcherCache {
    source_dir: PathBuf,
    front_end: Rc<dyn FrontEnd>,
    strategy: ConcretizationStrategy,
    patchers: HashMap<String, Option<Patcher>>,
}

impl PatcherCache {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        front_end: Rc<dyn FrontEnd>,
        strategy: ConcretizationStrategy,
    ) -> Self {
        PatcherCache {
            source_dir: source_dir.into(),
            front_end,
            strategy,
            patchers: HashMap::new(),
        }
    }

    pub fn get(&mut self, class: &str) -> Option<&mut Patcher> {
        if !self.patchers.contains_key(class) {
            let loaded = self.load(class);
            self.patchers.insert(class.to_string(), loaded);
        }
        self.patchers.get_mut(class).and_then(Option::as_mut)
    }

    /// Classes loaded so far, including unavailable ones.
    pub fn len(&self) -> usize {
        self.patchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patchers.is_empty()
    }

    fn load(&self, class: &str) -> Option<Patcher> {
        let path = self
            .source_dir
            .join(class_path(class, self.front_end.file_extension()));
        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) => {
                warn!(class, path = %path.display(), error = %e, "cannot read class source");
                return None;
            }
        };
        match Patcher::new(class, &source, Rc::clone(&self.front_end), self.strategy) {
            Ok(patcher) => {
                debug!(class, nodes = patcher.tree().len(), "loaded class");
                Some(patcher)
            }
            Err(e) => {
                warn!(class, path = %path.display(), error = %e, "cannot parse class source");
                None
            }
        }
    }
}

impl LocationSource for PatcherCache {
    fn locations(&mut self, class: &str, line: u32) -> Vec<TargetLocation> {
        self.get(class)
            .map(|p| p.locations(line))
            .unwrap_or_default()
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    PatchFound,
    /// Every location of every pool was tried.
    LocationsExhausted,
    /// `patch_count` candidates were verified.
    CandidateLimit,
    TimeBudget,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairSummary {
    pub termination: Termination,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<PatchInfo>,
    pub candidates: usize,
    pub compile_errors: usize,
    pub test_failures: usize,
    /// Rendered candidates skipped as identical to an earlier one.
    pub duplicates: usize,
    pub trials: usize,
    pub outcomes: BTreeMap<Outcome, usize>,
    pub locations: LocationStats,
    /// `h hrs. m min. s sec.`
    pub elapsed: String,
}

/// Render a duration as `1 hrs. 2 min. 3 sec.`, dropping leading zero units.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{} hrs. ", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{} min. ", minutes));
    }
    out.push_str(&format!("{} sec.", seconds));
    out
}

// ============================================================================
// Search
// ============================================================================

/// Counters and dedup state for one run.
#[derive(Default)]
struct Tally {
    candidates: usize,
    compile_errors: usize,
    test_failures: usize,
    duplicates: usize,
    trials: usize,
    outcomes: BTreeMap<Outcome, usize>,
    seen: HashSet<ContentHash>,
    patch_dir: Option<PathBuf>,
    patch: Option<PatchInfo>,
}

/// Fail unless at least one pool is configured.
pub fn ensure_pools(config: &RepairConfig) -> Result<(), MendError> {
    if config.pools.is_empty() {
        return Err(MendError::invalid_args("no change pool configured"));
    }
    Ok(())
}

/// Run the search over every configured pool in order.
pub fn run(ctx: &RepairContext, lines: Vec<CoveredLine>) -> Result<RepairSummary, MendError> {
    ensure_pools(&ctx.config)?;
    let kind = ctx.location_kind()?;
    let mut cache = PatcherCache::new(
        ctx.config.source_dir.clone(),
        Rc::clone(&ctx.front_end),
        ctx.config.concretization,
    );
    let mut tally = Tally::default();
    let mut stats = LocationStats::default();
    let mut termination = Termination::LocationsExhausted;
    let mut covered_written = false;

    for pool_dir in &ctx.config.pools {
        let mut pool = ChangePool::open(pool_dir.clone(), ctx.config.max_pool_load)?;
        let mut strategy = LocationStrategy::new(kind.clone(), ctx.config.concretization, lines.clone());
        if !covered_written {
            write_report(&ctx.config.report_dir, "coveredlines.txt", &strategy.covered_lines_text());
            covered_written = true;
        }
        info!(pool = %pool_dir.display(), changes = pool.len(), lines = strategy.covered_lines().len(), "searching pool");

        let stopped = search_pool(ctx, &mut pool, &mut strategy, &mut cache, &mut tally);

        let pool_name = pool_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pool".to_string());
        write_report(
            &ctx.config.report_dir,
            &format!("lines-{}.txt", pool_name),
            &strategy.report_text(),
        );
        let pool_stats = strategy.stats();
        stats.checked_lines += pool_stats.checked_lines;
        stats.locations += pool_stats.locations;
        stats.changes += pool_stats.changes;
        stats.applied += pool_stats.applied;

        if let Some(reason) = stopped {
            termination = reason;
            break;
        }
    }

    write_report(
        &ctx.config.report_dir,
        "locinfo.csv",
        &format!(
            "checked_lines,locations,changes,applied\n{},{},{},{}\n",
            stats.checked_lines, stats.locations, stats.changes, stats.applied
        ),
    );

    let summary = RepairSummary {
        termination,
        patch_dir: tally.patch_dir,
        patch: tally.patch,
        candidates: tally.candidates,
        compile_errors: tally.compile_errors,
        test_failures: tally.test_failures,
        duplicates: tally.duplicates,
        trials: tally.trials,
        outcomes: tally.outcomes,
        locations: stats,
        elapsed: format_elapsed(ctx.elapsed()),
    };
    info!(
        termination = ?summary.termination,
        candidates = summary.candidates,
        compile_errors = summary.compile_errors,
        test_failures = summary.test_failures,
        elapsed = %summary.elapsed,
        "repair finished"
    );
    Ok(summary)
}

/// Search one pool. `None` when its locations ran out.
fn search_pool(
    ctx: &RepairContext,
    pool: &mut ChangePool,
    strategy: &mut LocationStrategy,
    cache: &mut PatcherCache,
    tally: &mut Tally,
) -> Option<Termination> {
    while tally.candidates < ctx.config.patch_count {
        let loc = strategy.select_location(pool, cache)?;
        let Some(id) = strategy.select_change() else {
            continue;
        };
        if strategy.change_count() > ctx.config.max_change_count {
            debug!(location = %loc.key(), "change limit reached at location");
            strategy.next_location();
            continue;
        }
        let change = match pool.get_change(id) {
            Ok(change) => change,
            Err(e) => {
                warn!(id = id.0, error = %e, "skipping unreadable change");
                continue;
            }
        };
        if let Some(stop) = try_change(ctx, pool, strategy, cache, tally, &loc, id, &change) {
            return Some(stop);
        }
    }
    Some(Termination::CandidateLimit)
}

/// Apply attempts for one (location, change) pair.
#[allow(clippy::too_many_arguments)]
fn try_change(
    ctx: &RepairContext,
    pool: &ChangePool,
    strategy: &mut LocationStrategy,
    cache: &mut PatcherCache,
    tally: &mut Tally,
    loc: &TargetLocation,
    id: ChangeId,
    change: &Change,
) -> Option<Termination> {
    let Some(patcher) = cache.get(&loc.class) else {
        strategy.next_location();
        return None;
    };
    let fault_score = strategy
        .covered_lines()
        .iter()
        .find(|l| l.class == loc.class && l.line == loc.line)
        .map(|l| l.score);
    let mut counted = false;

    for attempt in 0..ctx.config.max_trials {
        let outcome = patcher.apply(loc, change, attempt);
        tally.trials += 1;

        if outcome == ApplyOutcome::Applied {
            if !counted {
                strategy.mark_applied();
                counted = true;
            }
            let actions = patcher.take_actions();
            let source = patcher.new_source();
            if !tally.seen.insert(ContentHash::compute(source.as_bytes())) {
                tally.duplicates += 1;
                debug!(class = %loc.class, line = loc.line, attempt, "duplicate candidate");
            } else {
                let mut info = PatchInfo::new(loc.class.clone());
                for action in actions {
                    info.push(action);
                }
                info.pool_id = Some(id.0);
                info.frequency = pool.frequency(id);
                info.context = Some(Context::of(change).label());
                info.fault_score = fault_score;
                let candidate = Candidate {
                    class: &loc.class,
                    extension: ctx.front_end.file_extension(),
                    original: patcher.source(),
                    source: &source,
                    info: &info,
                    change,
                };
                if verify_candidate(ctx, tally, &candidate) {
                    return Some(Termination::PatchFound);
                }
                if tally.candidates >= ctx.config.patch_count {
                    return Some(Termination::CandidateLimit);
                }
            }
        }

        if ctx.budget_exhausted() {
            info!(elapsed = %format_elapsed(ctx.elapsed()), "time budget exhausted");
            return Some(Termination::TimeBudget);
        }
        if matches!(outcome, ApplyOutcome::NoFixLocation | ApplyOutcome::NoChange) {
            break;
        }
    }
    None
}

/// Store and verify one candidate. True when it is accepted as a patch.
fn verify_candidate(ctx: &RepairContext, tally: &mut Tally, candidate: &Candidate<'_>) -> bool {
    tally.candidates += 1;
    let n = tally.candidates;
    let file = match ctx.store.store_candidate(n, candidate) {
        Ok(file) => file,
        Err(e) => {
            warn!(candidate = n, error = %e, "cannot store candidate; skipping verification");
            return false;
        }
    };
    let outcome = ctx.verifier().verify(&file);
    *tally.outcomes.entry(outcome).or_default() += 1;
    match outcome {
        Outcome::Pass => {}
        Outcome::CompileError => {
            tally.compile_errors += 1;
            return false;
        }
        _ => {
            tally.test_failures += 1;
            return false;
        }
    }

    let record = PatchRecord {
        patch_id: ctx.store.next_patch_id(),
        time: format_elapsed(ctx.elapsed()),
        timestamp: format_timestamp(SystemTime::now()),
        candidates: tally.candidates,
        compile_errors: tally.compile_errors,
        test_failures: tally.test_failures,
        concretize: ctx.config.concretization.name().to_string(),
        info: candidate.info.clone(),
    };
    match ctx.store.store_patch(candidate, &record) {
        Ok(dir) => tally.patch_dir = Some(dir),
        Err(e) => warn!(error = %e, "patch passed but could not be stored"),
    }
    tally.patch = Some(candidate.info.clone());
    true
}

fn write_report(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    let written = fs::create_dir_all(dir).and_then(|_| fs::write(&path, content));
    if let Err(e) = written {
        warn!(path = %path.display(), error = %e, "cannot write report");
    }
}
