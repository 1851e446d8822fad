//! CLI tests: run the `mend` binary and check its JSON envelopes.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn mend(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mend"))
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .env_remove("MEND_POOLS")
        .output()
        .expect("failed to run mend")
}

fn json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("bad JSON ({}): {}", e, stdout))
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn corpus(root: &Path) {
    write(
        &root.join("corpus/bug-1/before/demo/Pair.java"),
        "package demo;\n\nclass Pair {\n    boolean same(int a, int b) {\n        return a == b;\n    }\n}\n",
    );
    write(
        &root.join("corpus/bug-1/after/demo/Pair.java"),
        "package demo;\n\nclass Pair {\n    boolean same(int a, int b) {\n        return a != b;\n    }\n}\n",
    );
}

#[test]
fn mine_then_stats() {
    let dir = TempDir::new().unwrap();
    corpus(dir.path());

    let out = mend(&["mine", "--input", "corpus", "--pool", "pool"], dir.path());
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let mined = json(&out);
    assert_eq!(mined["status"], "ok");
    assert_eq!(mined["pairs"], 1);
    let size = mined["pool_size"].as_u64().unwrap();
    assert!(size >= 1);

    let out = mend(&["pool", "stats", "--pool", "pool"], dir.path());
    assert!(out.status.success());
    let stats = json(&out);
    assert_eq!(stats["stats"]["changes"].as_u64(), Some(size));
}

#[test]
fn mining_nothing_is_invalid_arguments() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("empty")).unwrap();
    let out = mend(&["mine", "--input", "empty", "--pool", "pool"], dir.path());
    assert_eq!(out.status.code(), Some(2));
    let err = json(&out);
    assert_eq!(err["status"], "error");
    assert_eq!(err["error"]["code"], 2);
}

#[test]
fn repair_without_pool_reports_error() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("faults.txt"), "demo.Pair#5,1.0\n");
    let out = mend(&["repair"], dir.path());
    assert_eq!(out.status.code(), Some(2));
    let err = json(&out);
    assert!(err["error"]["message"].as_str().unwrap().contains("no change pool"));
}

#[test]
fn missing_fault_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    corpus(dir.path());
    let out = mend(&["repair", "--pool", "pool", "--fault-file", "nope.txt"], dir.path());
    assert_eq!(out.status.code(), Some(3));
    assert_eq!(json(&out)["status"], "error");
}

#[test]
fn unavailable_compiler_is_a_verification_error() {
    let dir = TempDir::new().unwrap();
    corpus(dir.path());
    let out = mend(&["mine", "--input", "corpus", "--pool", "pool"], dir.path());
    assert!(out.status.success());
    write(&dir.path().join("faults.txt"), "demo.Pair#5,1.0\n");
    write(
        &dir.path().join("mend.toml"),
        "pools = [\"pool\"]\ncompile_command = [\"mend-no-such-compiler\", \"{file}\"]\n",
    );

    let out = mend(&["repair"], dir.path());
    assert_eq!(out.status.code(), Some(5));
    let err = json(&out);
    assert_eq!(err["error"]["code"], 5);
    assert!(err["error"]["message"].as_str().unwrap().contains("(compile)"));
    assert!(!dir.path().join("candidates").exists());
}
