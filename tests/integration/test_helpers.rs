#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Path to the `sw` binary Cargo built for this test run
pub fn get_binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_sw"))
}

/// Run a git command in `repo_path`, panicking on failure, and return stdout
pub fn git(repo_path: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .env("GIT_EDITOR", "true")
        .output()
        .expect("git should be installed");

    if !output.status.success() {
        panic!(
            "Git command failed: git {}\nStderr: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Whether `ancestor` is reachable from `descendant`
pub fn is_ancestor(repo_path: &Path, ancestor: &str, descendant: &str) -> bool {
    Command::new("git")
        .args(["merge-base", "--is-ancestor", ancestor, descendant])
        .current_dir(repo_path)
        .status()
        .expect("git should be installed")
        .success()
}

pub fn commit_file(repo_path: &Path, name: &str, content: &str) {
    std::fs::write(repo_path.join(name), content).unwrap();
    git(repo_path, &["add", name]);
    git(repo_path, &["commit", "-m", &format!("Update {name}")]);
}

pub fn current_branch(repo_path: &Path) -> String {
    git(repo_path, &["rev-parse", "--abbrev-ref", "HEAD"])
}

pub fn head_of(repo_path: &Path, branch: &str) -> String {
    git(repo_path, &["rev-parse", branch])
}

/// Run `sw` in `repo_path`, returning (success, stdout, stderr)
pub fn run_sw(repo_path: &Path, args: &[&str]) -> (bool, String, String) {
    let output: Output = Command::new(get_binary_path())
        .args(args)
        .arg("--no-color")
        .current_dir(repo_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("sw binary should run");

    (
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

/// Run `sw` and panic with its output if it fails
pub fn sw_ok(repo_path: &Path, args: &[&str]) -> String {
    let (success, stdout, stderr) = run_sw(repo_path, args);
    assert!(
        success,
        "sw {} failed\nstdout: {stdout}\nstderr: {stderr}",
        args.join(" ")
    );
    stdout
}

/// Git repository on `main` with one commit and stackwise initialized
pub fn create_test_repo() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let repo_path = temp_dir.path().to_path_buf();

    git(&repo_path, &["init"]);
    git(&repo_path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(&repo_path, &["config", "user.name", "Test User"]);
    git(&repo_path, &["config", "user.email", "test@example.com"]);
    git(&repo_path, &["config", "commit.gpgsign", "false"]);
    git(&repo_path, &["config", "core.autocrlf", "false"]);
    commit_file(&repo_path, "README.md", "# Test Repository\n");

    sw_ok(&repo_path, &["init", "--trunk", "main"]);

    (temp_dir, repo_path)
}

/// main -> feature-1 -> feature-2, each with a commit, feature-2 checked out
pub fn create_linear_stack() -> (TempDir, PathBuf) {
    let (temp_dir, repo_path) = create_test_repo();

    sw_ok(&repo_path, &["stack", "branch", "feature-1"]);
    commit_file(&repo_path, "one.txt", "one\n");
    sw_ok(&repo_path, &["stack", "branch", "feature-2"]);
    commit_file(&repo_path, "two.txt", "two\n");

    (temp_dir, repo_path)
}
