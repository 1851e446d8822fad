//! Compiler and test-runner collaborators.
//!
//! The orchestrator only sees the `Compiler` and `TestRunner` traits. The
//! command-backed implementations expand a command template, run it as a
//! child process with a timeout, and read the result off the exit status
//! (compile) or the JUnit console summary (tests).

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};

use mendtool_core::error::MendError;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

// ============================================================================
// Results and Traits
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileResult {
    pub success: bool,
    /// Compiler output, empty on success.
    pub diagnostics: String,
}

impl CompileResult {
    pub fn ok() -> Self {
        CompileResult {
            success: true,
            diagnostics: String::new(),
        }
    }

    pub fn failed(diagnostics: impl Into<String>) -> Self {
        CompileResult {
            success: false,
            diagnostics: diagnostics.into(),
        }
    }
}

/// Summary of one test run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestRunResult {
    pub ran: usize,
    pub failed: usize,
    /// Failing tests as `Class#method`.
    pub failed_names: Vec<String>,
}

impl TestRunResult {
    pub fn passed(ran: usize) -> Self {
        TestRunResult {
            ran,
            ..TestRunResult::default()
        }
    }
}

/// Compiles a single candidate source file.
pub trait Compiler {
    fn compile(&self, file: &Path, classpath: &str, target_dir: &Path) -> CompileResult;
}

/// Runs a set of tests. `None` means the run produced no usable result:
/// timeout, crash, or unreadable output.
pub trait TestRunner {
    fn run(&self, tests: &[String], classpath: &str, timeout: Duration) -> Option<TestRunResult>;
}

// ============================================================================
// Process Plumbing
// ============================================================================

/// Output of a child process that exited on its own.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Run `command` with a timeout. `Ok(None)` when the timeout elapsed and the
/// child was killed.
pub fn run_command(command: &[String], timeout: Duration) -> io::Result<Option<ProcessOutput>> {
    let Some((program, args)) = command.split_first() else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "Empty command"));
    };
    let program = resolve_program(program)?;

    let start = Instant::now();
    let mut child = Command::new(&program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Drain both pipes while waiting so a chatty child cannot block on a
    // full pipe.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    match child.wait_timeout(timeout)? {
        Some(status) => Ok(Some(ProcessOutput {
            success: status.success(),
            exit_code: status.code(),
            stdout: join_output(stdout),
            stderr: join_output(stderr),
            duration: start.elapsed(),
        })),
        None => {
            kill(&mut child);
            warn!(
                "Command timed out after {:?}: {:?}",
                start.elapsed(),
                command
            );
            Ok(None)
        }
    }
}

/// Check that a command template names a program that can be started.
/// `stage` labels the error, e.g. `compile` or `test`.
pub fn ensure_runnable(stage: &str, command: &[String]) -> Result<PathBuf, MendError> {
    let Some(program) = command.first() else {
        return Err(MendError::verification(stage, "empty command"));
    };
    let path = resolve_program(program).map_err(|e| MendError::verification(stage, e.to_string()))?;
    if !path.is_file() {
        return Err(MendError::verification(
            stage,
            format!("{} is not an executable file", path.display()),
        ));
    }
    debug!(stage, program = %path.display(), "command available");
    Ok(path)
}

fn resolve_program(program: &str) -> io::Result<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        return Ok(PathBuf::from(program));
    }
    which::which(program).map_err(|e| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} not found on PATH: {}", program, e),
        )
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<Vec<u8>>> {
    pipe.map(|mut p| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            p.read_to_end(&mut buf).ok();
            buf
        })
    })
}

fn join_output(handle: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).to_string())
        .unwrap_or_default()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait(); // Reap the zombie
}

/// Substitute `{name}` placeholders. An argument that is exactly `{tests}`
/// expands to one argument per test.
pub fn expand_template(template: &[String], vars: &[(&str, &str)], tests: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(template.len() + tests.len());
    for arg in template {
        if arg == "{tests}" {
            out.extend(tests.iter().cloned());
            continue;
        }
        let mut expanded = arg.clone();
        for (name, value) in vars {
            expanded = expanded.replace(&format!("{{{}}}", name), value);
        }
        out.push(expanded);
    }
    out
}

// ============================================================================
// Command-backed Collaborators
// ============================================================================

/// Compiles with an external compiler command (`javac` by default).
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandCompiler {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        CommandCompiler { command, timeout }
    }
}

impl Compiler for CommandCompiler {
    fn compile(&self, file: &Path, classpath: &str, target_dir: &Path) -> CompileResult {
        if let Err(e) = std::fs::create_dir_all(target_dir) {
            return CompileResult::failed(format!("cannot create {}: {}", target_dir.display(), e));
        }
        let file = file.to_string_lossy().into_owned();
        let target = target_dir.to_string_lossy().into_owned();
        let command = expand_template(
            &self.command,
            &[("file", file.as_str()), ("classpath", classpath), ("target", target.as_str())],
            &[],
        );
        match run_command(&command, self.timeout) {
            Ok(Some(output)) if output.success => CompileResult::ok(),
            Ok(Some(output)) => {
                debug!(file = %file, "candidate does not compile");
                CompileResult::failed(format!("{}{}", output.stdout, output.stderr))
            }
            Ok(None) => CompileResult::failed("compiler timed out"),
            Err(e) => {
                warn!(error = %e, "failed to run compiler");
                CompileResult::failed(e.to_string())
            }
        }
    }
}

/// Runs tests with an external JUnit console command.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    command: Vec<String>,
}

impl CommandTestRunner {
    pub fn new(command: Vec<String>) -> Self {
        CommandTestRunner { command }
    }
}

impl TestRunner for CommandTestRunner {
    fn run(&self, tests: &[String], classpath: &str, timeout: Duration) -> Option<TestRunResult> {
        let command = expand_template(&self.command, &[("classpath", classpath)], tests);
        match run_command(&command, timeout) {
            Ok(Some(output)) => {
                let result = parse_junit_output(&output.stdout);
                if result.is_none() {
                    debug!(exit_code = ?output.exit_code, "no test summary in runner output");
                }
                result
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "failed to run tests");
                None
            }
        }
    }
}

static OK_SUMMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^OK \((\d+) tests?\)").unwrap());
static FAILURE_SUMMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Tests run: (\d+),\s+Failures: (\d+)").unwrap());
static FAILURE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\d+\) ([^(\s]+)\(([^)\s]+)\)").unwrap());

/// Read a JUnit 4 console summary. `None` when neither summary line is
/// present.
pub fn parse_junit_output(stdout: &str) -> Option<TestRunResult> {
    if let Some(caps) = OK_SUMMARY.captures(stdout) {
        return Some(TestRunResult::passed(caps[1].parse().ok()?));
    }
    let caps = FAILURE_SUMMARY.captures(stdout)?;
    let ran = caps[1].parse().ok()?;
    let failed = caps[2].parse().ok()?;
    let failed_names = FAILURE_HEADER
        .captures_iter(stdout)
        .map(|c| format!("{}#{}", &c[2], &c[1]))
        .collect();
    Some(TestRunResult {
        ran,
        failed,
        failed_names,
    })
}
