//! CLI subprocess integration tests.
//!
//! These tests invoke the `strata` binary as a subprocess and verify
//! exit codes, stdout content, and JSON output stability.

use std::path::Path;
use std::process::Command;

fn strata_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_strata"));
    cmd.env_remove("STRATA_LOG");
    cmd
}

fn write(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, body).unwrap();
}

fn write_app(dir: &Path) {
    write(
        dir,
        "kustomization.yaml",
        "namePrefix: dev-\nresources:\n- svc.yaml\nconfigMapGenerator:\n- name: cfg\n  literals:\n  - A=1\n",
    );
    write(
        dir,
        "svc.yaml",
        "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\nspec:\n  type: ClusterIP\n",
    );
}

#[test]
fn cli_version_exits_zero() {
    let output = strata_bin().arg("--version").output().unwrap();
    assert!(output.status.success(), "strata --version must exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("strata"),
        "version output must contain 'strata': {stdout}"
    );
}

#[test]
fn cli_help_lists_commands() {
    let output = strata_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("build"), "help must list 'build' command");
    assert!(stdout.contains("completions"));
}

#[test]
fn cli_build_writes_stream_to_stdout() {
    let project = tempfile::tempdir().unwrap();
    write_app(project.path());

    let output = strata_bin()
        .args(["build", &project.path().to_string_lossy()])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "build must exit 0. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("apiVersion: v1\ndata:\n  A: \"1\"\nkind: ConfigMap\n"), "{stdout}");
    assert!(stdout.contains("\n---\n"));
    assert!(stdout.contains("  name: dev-web\n"));
}

#[test]
fn cli_build_defaults_to_current_directory() {
    let project = tempfile::tempdir().unwrap();
    write_app(project.path());

    let here = strata_bin()
        .arg("build")
        .current_dir(project.path())
        .output()
        .unwrap();
    let there = strata_bin()
        .args(["build", &project.path().to_string_lossy()])
        .output()
        .unwrap();
    assert!(here.status.success());
    assert_eq!(here.stdout, there.stdout);
}

#[test]
fn cli_build_output_file_and_json_summary() {
    let project = tempfile::tempdir().unwrap();
    write_app(project.path());
    let out_file = project.path().join("rendered.yaml");

    let output = strata_bin()
        .args([
            "--json",
            "build",
            &project.path().to_string_lossy(),
            "-o",
            &out_file.to_string_lossy(),
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("build --json must produce valid JSON: {e}\n{stdout}"));
    assert_eq!(json["documents"], 2);
    assert_eq!(json["digest"].as_str().unwrap().len(), 64);

    let written = std::fs::read_to_string(&out_file).unwrap();
    assert!(written.contains("kind: Service"));
}

#[test]
fn cli_json_without_output_carries_stream() {
    let project = tempfile::tempdir().unwrap();
    write_app(project.path());

    let output = strata_bin()
        .args(["build", &project.path().to_string_lossy(), "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json["stream"].as_str().unwrap().contains("kind: ConfigMap"));
}

#[test]
fn cli_reorder_none_keeps_load_order() {
    let project = tempfile::tempdir().unwrap();
    write_app(project.path());

    let output = strata_bin()
        .args([
            "build",
            &project.path().to_string_lossy(),
            "--reorder",
            "none",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("apiVersion: v1\nkind: Service\n"), "{stdout}");
}

#[test]
fn cli_load_restrictor_none_allows_parent_files() {
    let root = tempfile::tempdir().unwrap();
    write(
        root.path(),
        "app/kustomization.yaml",
        "resources:\n- ../shared/svc.yaml\n",
    );
    write(
        root.path(),
        "shared/svc.yaml",
        "apiVersion: v1\nkind: Service\nmetadata:\n  name: svc\n",
    );
    let app = root.path().join("app");

    let restricted = strata_bin()
        .args(["build", &app.to_string_lossy()])
        .output()
        .unwrap();
    assert_eq!(restricted.status.code(), Some(2));

    let open = strata_bin()
        .args(["build", &app.to_string_lossy(), "--load-restrictor", "none"])
        .output()
        .unwrap();
    assert!(open.status.success());
}

#[test]
fn cli_missing_descriptor_exits_two() {
    let project = tempfile::tempdir().unwrap();
    let output = strata_bin()
        .args(["build", &project.path().to_string_lossy()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("kustomization.yaml"), "{stderr}");
    assert!(output.stdout.is_empty());
}

#[test]
fn cli_failed_patch_exits_three_and_prints_nothing() {
    let project = tempfile::tempdir().unwrap();
    write_app(project.path());
    write(
        project.path(),
        "kustomization.yaml",
        "resources:\n- svc.yaml\npatchesJson6902:\n- target:\n    version: v1\n    kind: Service\n    name: web\n  patch: |\n    - op: test\n      path: /spec/type\n      value: NodePort\n",
    );

    let output = strata_bin()
        .args(["build", &project.path().to_string_lossy()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(output.stdout.is_empty());
}

#[test]
fn cli_duplicate_key_exits_one() {
    let project = tempfile::tempdir().unwrap();
    write(
        project.path(),
        "kustomization.yaml",
        "configMapGenerator:\n- name: cfg\n  literals:\n  - A=1\n  - A=2\n",
    );
    let output = strata_bin()
        .args(["build", &project.path().to_string_lossy()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("duplicate key"));
}

#[test]
fn cli_verbose_logs_go_to_stderr() {
    let project = tempfile::tempdir().unwrap();
    write_app(project.path());

    let quiet = strata_bin()
        .args(["build", &project.path().to_string_lossy()])
        .output()
        .unwrap();
    let verbose = strata_bin()
        .args(["--verbose", "build", &project.path().to_string_lossy()])
        .output()
        .unwrap();
    assert_eq!(quiet.stdout, verbose.stdout);
    assert!(quiet.stderr.is_empty());
    let stderr = String::from_utf8_lossy(&verbose.stderr);
    assert!(stderr.contains("rendered 2 documents, digest "), "{stderr}");
    assert!(stderr.contains("output stdout"), "{stderr}");
}

#[test]
fn cli_completions_bash() {
    let output = strata_bin().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("strata"));
}
