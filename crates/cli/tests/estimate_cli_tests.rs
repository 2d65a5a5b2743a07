// Integration tests for the odflow binary: exit codes, the --json stdout
// contract and output file placement.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn odflow() -> Command {
    Command::new(env!("CARGO_BIN_EXE_odflow"))
}

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../distribution/tests/fixtures")
}

/// Copy the engine fixtures into a scratch directory so runs can write outputs.
fn scratch() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for entry in std::fs::read_dir(fixtures_dir()).unwrap() {
        let entry = entry.unwrap();
        std::fs::copy(entry.path(), dir.path().join(entry.file_name())).unwrap();
    }
    dir
}

fn run_in(dir: &Path, args: &[&str]) -> Output {
    odflow().current_dir(dir).args(args).output().expect("run odflow")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Assert stdout is a single, parseable JSON value with no extra lines.
fn assert_single_json(stdout: &str) -> serde_json::Value {
    let trimmed = stdout.trim();
    assert!(!trimmed.is_empty(), "stdout should not be empty");
    serde_json::from_str(trimmed)
        .unwrap_or_else(|e| panic!("stdout must be valid JSON.\nParse error: {e}\nstdout:\n{trimmed}"))
}

// ===========================================================================
// odflow estimate
// ===========================================================================

#[test]
fn estimate_json_to_stdout() {
    let dir = scratch();
    let output = run_in(dir.path(), &["estimate", "estimate.toml", "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(val["meta"]["config_name"], "Central Macedonia and Thrace 2019");
    assert_eq!(val["summary"]["products"], 2);
    assert_eq!(val["summary"]["not_converged"], 0);
    assert_eq!(val["flows"].as_array().unwrap().len(), 32);

    let err = stderr(&output);
    assert!(err.contains("estimate 'Central Macedonia and Thrace 2019'"), "stderr: {err}");
}

#[test]
fn estimate_writes_configured_flows_next_to_config() {
    let dir = scratch();
    let cwd = tempfile::tempdir().unwrap();
    let config = dir.path().join("estimate.toml");

    let output = run_in(cwd.path(), &["estimate", config.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(output.stdout.is_empty(), "no stdout without --json");

    let flows = std::fs::read_to_string(dir.path().join("flows.csv")).unwrap();
    let mut lines = flows.lines();
    assert_eq!(lines.next(), Some("product,origin,destination,quantity"));
    assert_eq!(lines.count(), 32);
    assert!(!cwd.path().join("flows.csv").exists());
}

#[test]
fn estimate_flags_override_output_paths() {
    let dir = scratch();
    let output = run_in(
        dir.path(),
        &["estimate", "estimate.toml", "--output", "custom.csv", "--result", "result.json"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    assert!(dir.path().join("custom.csv").exists());
    assert!(!dir.path().join("flows.csv").exists());
    let result: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("result.json")).unwrap()).unwrap();
    assert_eq!(result["meta"]["prior_source"], "empirical");
}

#[test]
fn estimate_impedance_prior() {
    let dir = scratch();
    let output = run_in(dir.path(), &["estimate", "impedance.toml", "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(val["meta"]["prior_source"], "impedance");
}

#[test]
fn estimate_strict_fails_on_non_convergence() {
    let dir = scratch();
    let toml = std::fs::read_to_string(dir.path().join("estimate.toml")).unwrap();
    std::fs::write(
        dir.path().join("capped.toml"),
        format!("{toml}\n[balancing]\nmax_iterations = 1\n"),
    )
    .unwrap();

    let lenient = run_in(dir.path(), &["estimate", "capped.toml"]);
    assert!(lenient.status.success(), "stderr: {}", stderr(&lenient));
    assert!(stderr(&lenient).contains("2 not converged"));

    let strict = run_in(dir.path(), &["estimate", "capped.toml", "--strict"]);
    assert_eq!(strict.status.code(), Some(7));
    let err = stderr(&strict);
    assert!(err.contains("did not converge"), "stderr: {err}");
    assert!(err.contains("hint:"), "stderr: {err}");
}

#[test]
fn estimate_missing_input_file() {
    let dir = scratch();
    std::fs::remove_file(dir.path().join("od-survey.csv")).unwrap();
    let output = run_in(dir.path(), &["estimate", "estimate.toml"]);
    assert_eq!(output.status.code(), Some(4));
    assert!(stderr(&output).contains("od-survey.csv"));
}

#[test]
fn estimate_data_error() {
    let dir = scratch();
    let survey = dir.path().join("od-survey.csv");
    let mut data = std::fs::read_to_string(&survey).unwrap();
    data.push_str("EL511,EL512,heavy,1\n");
    std::fs::write(&survey, data).unwrap();

    let output = run_in(dir.path(), &["estimate", "estimate.toml"]);
    assert_eq!(output.status.code(), Some(5));
    assert!(stderr(&output).contains("heavy"));
}

#[test]
fn estimate_empty_universe() {
    let dir = scratch();
    let toml = std::fs::read_to_string(dir.path().join("estimate.toml"))
        .unwrap()
        .replace("country = \"EL\"", "country = \"XX\"");
    std::fs::write(dir.path().join("nowhere.toml"), toml).unwrap();

    let output = run_in(dir.path(), &["estimate", "nowhere.toml"]);
    assert_eq!(output.status.code(), Some(6));
    assert!(stderr(&output).contains("hint:"));
}

// ===========================================================================
// odflow validate
// ===========================================================================

#[test]
fn validate_ok() {
    let output = run_in(&fixtures_dir(), &["validate", "estimate.toml"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).starts_with("valid: estimate 'Central Macedonia and Thrace 2019'"));
}

#[test]
fn validate_rejects_bad_config() {
    let dir = tempfile::tempdir().unwrap();
    let toml = std::fs::read_to_string(fixtures_dir().join("estimate.toml"))
        .unwrap()
        .replace("source = \"empirical\"", "source = \"empirical\"\ninvert = true");
    std::fs::write(dir.path().join("bad.toml"), toml).unwrap();

    let output = run_in(dir.path(), &["validate", "bad.toml"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("prior.invert"));
}

// ===========================================================================
// odflow resolve
// ===========================================================================

#[test]
fn resolve_json() {
    let output = run_in(
        &fixtures_dir(),
        &["resolve", "nuts.csv", "Θεσσαλονικη", "Εβρος", "--level", "3", "--country", "EL", "--json"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    let rows = val.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], "EL522");
    assert_eq!(rows[1]["id"], "EL511");
    assert_eq!(rows[1]["accepted"], true);
    assert!(rows[0]["score"].as_f64().unwrap() > 0.9);
}

#[test]
fn resolve_table_output() {
    let output = run_in(&fixtures_dir(), &["resolve", "nuts.csv", "Ημαθια", "--level", "3"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().next().unwrap().starts_with("label"));
    assert!(stdout.contains("EL521"));
}

#[test]
fn resolve_below_threshold() {
    let output = run_in(
        &fixtures_dir(),
        &["resolve", "nuts.csv", "Evros", "--level", "3", "--min-similarity", "0.9", "--json"],
    );
    assert_eq!(output.status.code(), Some(10));
    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(val[0]["accepted"], false);
}

#[test]
fn resolve_unknown_country() {
    let output = run_in(&fixtures_dir(), &["resolve", "nuts.csv", "Evros", "--country", "XX"]);
    assert_eq!(output.status.code(), Some(6));
}
