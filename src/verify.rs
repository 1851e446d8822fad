//! Staged verification of a candidate.
//!
//! A candidate is compiled, then tested in three tiers: trigger tests,
//! relevant tests, and the full suite. The first tier that fails decides the
//! outcome. Flaky tests are removed from every failure list before it is
//! counted.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::runner::{Compiler, TestRunResult, TestRunner};

// ============================================================================
// Outcome
// ============================================================================

/// Verification result of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    CompileError,
    TestFailure,
    TestTimeout,
    /// More trigger tests fail than before the patch.
    BreakFunc,
    TriggerTestFailure,
    RelevantTestFailure,
}

impl Outcome {
    /// Stable numeric code.
    pub fn code(&self) -> u8 {
        match self {
            Outcome::Pass => 0,
            Outcome::CompileError => 1,
            Outcome::TestFailure => 2,
            Outcome::TestTimeout => 3,
            Outcome::BreakFunc => 4,
            Outcome::TriggerTestFailure => 5,
            Outcome::RelevantTestFailure => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::CompileError => "compile_error",
            Outcome::TestFailure => "test_failure",
            Outcome::TestTimeout => "test_timeout",
            Outcome::BreakFunc => "break_func",
            Outcome::TriggerTestFailure => "trigger_test_failure",
            Outcome::RelevantTestFailure => "relevant_test_failure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Test Plan
// ============================================================================

/// Which tests to run at each tier.
#[derive(Debug, Clone, Default)]
pub struct TestPlan {
    /// Test classes holding the failing tests.
    pub trigger: Vec<String>,
    pub relevant: Vec<String>,
    pub all: Vec<String>,
    /// Known flaky tests as `Class#method`.
    pub flaky: HashSet<String>,
    /// Trigger failures of the unpatched program.
    pub trigger_failures: usize,
}

/// Files a `TestPlan` is read from.
#[derive(Debug, Clone)]
pub struct TestPlanFiles {
    pub trigger: PathBuf,
    pub relevant: PathBuf,
    pub all: PathBuf,
    pub flaky: PathBuf,
}

impl TestPlan {
    /// Read the test lists. Trigger entries are `Class::method`; each class
    /// is run once. A missing list is empty. `trigger_failures` defaults to
    /// the number of trigger entries.
    pub fn load(files: &TestPlanFiles, trigger_failures: Option<usize>) -> Self {
        let trigger_entries = read_list(&files.trigger);
        let mut trigger: Vec<String> = Vec::new();
        for entry in &trigger_entries {
            let class = entry.split("::").next().unwrap_or(entry).to_string();
            if !trigger.contains(&class) {
                trigger.push(class);
            }
        }
        let flaky = if files.flaky.exists() {
            read_list(&files.flaky)
                .into_iter()
                .map(|t| t.replace("::", "#"))
                .collect()
        } else {
            warn!(path = %files.flaky.display(), "no flaky test list; failures are not filtered");
            HashSet::new()
        };
        TestPlan {
            trigger,
            relevant: read_list(&files.relevant),
            all: read_list(&files.all),
            flaky,
            trigger_failures: trigger_failures.unwrap_or(trigger_entries.len()),
        }
    }

    /// Drop flaky tests from a result and recount its failures.
    pub fn remove_flaky(&self, result: &mut TestRunResult) {
        if self.flaky.is_empty() {
            return;
        }
        let before = result.failed_names.len();
        result.failed_names.retain(|t| !self.flaky.contains(t));
        if result.failed_names.len() != before {
            debug!(removed = before - result.failed_names.len(), "ignored flaky failures");
        }
        result.failed = result.failed_names.len();
    }
}

fn read_list(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(content) => content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "test list not readable");
            Vec::new()
        }
    }
}

// ============================================================================
// Verifier
// ============================================================================

/// Classpaths and limits for compiling and testing candidates.
#[derive(Debug, Clone)]
pub struct VerifySettings {
    pub compile_classpath: String,
    pub test_classpath: String,
    pub target_dir: PathBuf,
    pub timeout: Duration,
}

/// Runs the compile and test stages for a candidate file.
pub struct Verifier<'a> {
    compiler: &'a dyn Compiler,
    tester: &'a dyn TestRunner,
    plan: &'a TestPlan,
    settings: &'a VerifySettings,
}

impl<'a> Verifier<'a> {
    pub fn new(
        compiler: &'a dyn Compiler,
        tester: &'a dyn TestRunner,
        plan: &'a TestPlan,
        settings: &'a VerifySettings,
    ) -> Self {
        Verifier {
            compiler,
            tester,
            plan,
            settings,
        }
    }

    pub fn verify(&self, file: &Path) -> Outcome {
        let compiled = self.compiler.compile(
            file,
            &self.settings.compile_classpath,
            &self.settings.target_dir,
        );
        if !compiled.success {
            debug!(file = %file.display(), "compile error");
            return Outcome::CompileError;
        }
        let outcome = self.test_check();
        info!(file = %file.display(), outcome = %outcome, "verified candidate");
        outcome
    }

    /// Classify test results tier by tier. Empty tiers are skipped; a plan
    /// under which no test ran at all is a timeout, never a pass.
    pub fn test_check(&self) -> Outcome {
        let plan = self.plan;
        let mut ran = 0;

        if !plan.trigger.is_empty() {
            match self.run_tier("trigger", &plan.trigger) {
                None => return Outcome::TestTimeout,
                Some(r) if r.failed > 0 => {
                    if r.failed > plan.trigger_failures {
                        return Outcome::BreakFunc;
                    }
                    return Outcome::TriggerTestFailure;
                }
                Some(r) if r.ran == 0 => return Outcome::TestTimeout,
                Some(r) => ran += r.ran,
            }
        }

        if !plan.relevant.is_empty() {
            match self.run_tier("relevant", &plan.relevant) {
                None => return Outcome::TestTimeout,
                Some(r) if r.failed > 0 => return Outcome::RelevantTestFailure,
                Some(r) if r.ran == 0 => return Outcome::TestTimeout,
                Some(r) => ran += r.ran,
            }
        }

        if !plan.all.is_empty() {
            match self.run_tier("all", &plan.all) {
                None => return Outcome::TestTimeout,
                Some(r) if r.failed > 0 => return Outcome::TestFailure,
                Some(r) if r.ran == 0 => return Outcome::TestTimeout,
                Some(r) => ran += r.ran,
            }
        }

        if ran == 0 {
            warn!("no test lists to run; candidate cannot be accepted");
            return Outcome::TestTimeout;
        }
        Outcome::Pass
    }

    fn run_tier(&self, tier: &str, tests: &[String]) -> Option<TestRunResult> {
        let mut result = self
            .tester
            .run(tests, &self.settings.test_classpath, self.settings.timeout)?;
        self.plan.remove_flaky(&mut result);
        debug!(tier, ran = result.ran, failed = result.failed, "test tier finished");
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CompileResult;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct FixedCompiler(bool);

    impl Compiler for FixedCompiler {
        fn compile(&self, _file: &Path, _classpath: &str, _target_dir: &Path) -> CompileResult {
            if self.0 {
                CompileResult::ok()
            } else {
                CompileResult::failed("error: ';' expected")
            }
        }
    }

    /// Answers each run from a queue and records what was asked.
    struct ScriptedTester {
        answers: RefCell<Vec<Option<TestRunResult>>>,
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl ScriptedTester {
        fn new(answers: Vec<Option<TestRunResult>>) -> Self {
            ScriptedTester {
                answers: RefCell::new(answers.into_iter().rev().collect()),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl TestRunner for ScriptedTester {
        fn run(&self, tests: &[String], _classpath: &str, _timeout: Duration) -> Option<TestRunResult> {
            self.calls.borrow_mut().push(tests.to_vec());
            self.answers.borrow_mut().pop().flatten()
        }
    }

    fn failing(ran: usize, names: &[&str]) -> Option<TestRunResult> {
        Some(TestRunResult {
            ran,
            failed: names.len(),
            failed_names: names.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn plan(trigger_failures: usize) -> TestPlan {
        TestPlan {
            trigger: vec!["demo.CounterTest".to_string()],
            relevant: vec!["demo.CounterTest".to_string(), "demo.LogTest".to_string()],
            all: vec!["demo.AllTests".to_string()],
            flaky: HashSet::new(),
            trigger_failures,
        }
    }

    fn settings() -> VerifySettings {
        VerifySettings {
            compile_classpath: String::new(),
            test_classpath: String::new(),
            target_dir: PathBuf::from("target"),
            timeout: Duration::from_secs(1),
        }
    }

    fn check(plan: &TestPlan, answers: Vec<Option<TestRunResult>>) -> (Outcome, usize) {
        let tester = ScriptedTester::new(answers);
        let settings = settings();
        let verifier = Verifier::new(&FixedCompiler(true), &tester, plan, &settings);
        let outcome = verifier.test_check();
        let calls = tester.calls.borrow().len();
        (outcome, calls)
    }

    mod outcomes {
        use super::*;

        #[test]
        fn codes_are_stable() {
            assert_eq!(Outcome::Pass.code(), 0);
            assert_eq!(Outcome::CompileError.code(), 1);
            assert_eq!(Outcome::TestTimeout.code(), 3);
            assert_eq!(Outcome::RelevantTestFailure.code(), 6);
            assert_eq!(Outcome::BreakFunc.to_string(), "break_func");
        }

        #[test]
        fn compile_failure_stops_before_tests() {
            let plan = plan(1);
            let tester = ScriptedTester::new(vec![]);
            let settings = settings();
            let verifier = Verifier::new(&FixedCompiler(false), &tester, &plan, &settings);
            assert_eq!(verifier.verify(Path::new("A.java")), Outcome::CompileError);
            assert!(tester.calls.borrow().is_empty());
        }

        #[test]
        fn all_tiers_green_is_pass() {
            let p = plan(1);
            let answers = vec![failing(1, &[]), failing(5, &[]), failing(40, &[])];
            assert_eq!(check(&p, answers), (Outcome::Pass, 3));
        }

        #[test]
        fn more_trigger_failures_than_recorded_breaks_functionality() {
            let p = plan(2);
            let answers = vec![failing(3, &["T#a", "T#b", "T#c"])];
            assert_eq!(check(&p, answers), (Outcome::BreakFunc, 1));
        }

        #[test]
        fn recorded_trigger_failures_remain() {
            let p = plan(2);
            let answers = vec![failing(3, &["T#a"])];
            assert_eq!(check(&p, answers), (Outcome::TriggerTestFailure, 1));
        }

        #[test]
        fn relevant_failure_skips_full_suite() {
            let p = plan(1);
            let answers = vec![failing(1, &[]), failing(5, &["demo.LogTest#testLog"])];
            assert_eq!(check(&p, answers), (Outcome::RelevantTestFailure, 2));
        }

        #[test]
        fn full_suite_failure() {
            let p = plan(1);
            let answers = vec![failing(1, &[]), failing(5, &[]), failing(40, &["demo.X#y"])];
            assert_eq!(check(&p, answers), (Outcome::TestFailure, 3));
        }

        #[test]
        fn missing_result_or_empty_run_is_timeout() {
            let p = plan(1);
            assert_eq!(check(&p, vec![None]), (Outcome::TestTimeout, 1));
            assert_eq!(check(&p, vec![failing(0, &[])]), (Outcome::TestTimeout, 1));
            assert_eq!(
                check(&p, vec![failing(1, &[]), failing(0, &[])]),
                (Outcome::TestTimeout, 2)
            );
        }

        #[test]
        fn empty_tiers_are_skipped() {
            let p = TestPlan {
                relevant: Vec::new(),
                all: Vec::new(),
                ..plan(1)
            };
            assert_eq!(check(&p, vec![failing(1, &[])]), (Outcome::Pass, 1));
        }

        #[test]
        fn plan_without_tests_is_never_a_pass() {
            let dir = TempDir::new().unwrap();
            let files = TestPlanFiles {
                trigger: dir.path().join("tests.trigger"),
                relevant: dir.path().join("tests.relevant"),
                all: dir.path().join("tests.all"),
                flaky: dir.path().join("tests.broken"),
            };
            let plan = TestPlan::load(&files, None);
            let tester = ScriptedTester::new(vec![]);
            let settings = settings();
            let verifier = Verifier::new(&FixedCompiler(true), &tester, &plan, &settings);
            assert_eq!(verifier.verify(Path::new("A.java")), Outcome::TestTimeout);
            assert!(tester.calls.borrow().is_empty());
        }
    }

    mod flaky {
        use super::*;

        #[test]
        fn flaky_failures_are_ignored() {
            let p = TestPlan {
                flaky: ["demo.LogTest#testTime".to_string()].into_iter().collect(),
                ..plan(1)
            };
            let answers = vec![
                failing(1, &[]),
                failing(5, &["demo.LogTest#testTime"]),
                failing(40, &[]),
            ];
            assert_eq!(check(&p, answers), (Outcome::Pass, 3));
        }

        #[test]
        fn plan_loads_lists_and_normalizes_flaky_names() {
            let dir = TempDir::new().unwrap();
            let path = |name: &str| dir.path().join(name);
            fs::write(
                path("tests.trigger"),
                "demo.CounterTest::testAdd\ndemo.CounterTest::testSum\n",
            )
            .unwrap();
            fs::write(path("tests.relevant"), "demo.CounterTest\n\ndemo.LogTest\n").unwrap();
            fs::write(path("tests.broken"), "demo.LogTest::testTime\n").unwrap();
            let files = TestPlanFiles {
                trigger: path("tests.trigger"),
                relevant: path("tests.relevant"),
                all: path("tests.all"),
                flaky: path("tests.broken"),
            };
            let plan = TestPlan::load(&files, None);
            assert_eq!(plan.trigger, vec!["demo.CounterTest"]);
            assert_eq!(plan.trigger_failures, 2);
            assert_eq!(plan.relevant.len(), 2);
            assert!(plan.all.is_empty());
            assert!(plan.flaky.contains("demo.LogTest#testTime"));

            let plan = TestPlan::load(&files, Some(1));
            assert_eq!(plan.trigger_failures, 1);
        }

        #[test]
        fn missing_flaky_list_filters_nothing() {
            let dir = TempDir::new().unwrap();
            let files = TestPlanFiles {
                trigger: dir.path().join("t"),
                relevant: dir.path().join("r"),
                all: dir.path().join("a"),
                flaky: dir.path().join("tests.broken"),
            };
            let plan = TestPlan::load(&files, None);
            assert!(plan.flaky.is_empty());
            let mut result = failing(2, &["demo.A#b"]).unwrap();
            plan.remove_flaky(&mut result);
            assert_eq!(result.failed, 1);
        }
    }
}
