//! CLI-level tests: exit codes and output surfaces of the itsq binary.

mod common;

use common::{RepoBuilder, itsq, stdout};

use itsq::model::{CustomerKey, Phase};

#[test]
fn doctor_passes_on_a_complete_repository() {
    let repo = RepoBuilder::consistent();
    let output = itsq(&repo, &["doctor"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("[OK] source root"));
    assert!(out.contains("All checks passed!"));
}

#[test]
fn doctor_reports_missing_trees() {
    let repo = RepoBuilder::new();
    let output = itsq(&repo, &["doctor"]);
    let out = stdout(&output);
    assert!(out.contains("[FAIL] ARCHIV-BESTAND-PH1: missing"));
    assert!(out.contains("[FAIL] REF-EXPORTS: missing"));
    assert!(out.contains("Some checks failed"));
}

#[test]
fn doctor_emits_json() {
    let repo = RepoBuilder::consistent();
    let output = itsq(&repo, &["doctor", "--format", "json"]);
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(parsed["all_ok"], serde_json::Value::Bool(true));
    assert!(parsed["checks"].as_array().is_some_and(|c| !c.is_empty()));
}

#[test]
fn scan_output_is_byte_identical_across_runs() {
    let repo = RepoBuilder::consistent();
    let first = itsq(&repo, &["scan"]);
    let second = itsq(&repo, &["scan"]);
    assert!(first.status.success());
    assert_eq!(stdout(&first), stdout(&second));
    let out = stdout(&first);
    assert!(out.contains("REF-EXPORTS/"));
    assert!(out.contains("directories"));
}

#[test]
fn scan_fails_on_missing_source() {
    let repo = RepoBuilder::new();
    std::fs::remove_dir_all(repo.source()).unwrap();
    let output = itsq(&repo, &["scan"]);
    assert!(!output.status.success());
}

#[test]
fn verify_is_quiet_and_green_on_a_consistent_repository() {
    let repo = RepoBuilder::consistent();
    let output = itsq(&repo, &["verify"]);
    assert!(output.status.success(), "stdout: {}", stdout(&output));
    assert!(stdout(&output).contains("migration completed"));
    assert!(!repo.target().exists(), "verify must not copy anything");
}

#[test]
fn verify_fails_on_mapping_violations() {
    // c02 is defined for the Crefo in phase 2 but exports nothing: the
    // exact check reports it and verify exits non-zero.
    let repo = RepoBuilder::consistent().relevanz("c02", "n01=1234567899\n");
    let output = itsq(&repo, &["verify"]);
    assert!(!output.status.success());
    let out = stdout(&output);
    assert!(out.contains("consistency errors:"), "stdout: {out}");
    assert!(out.contains("1234567891"));
}

#[test]
fn migrate_dry_run_touches_nothing() {
    let repo = RepoBuilder::consistent();
    let output = itsq(&repo, &["migrate", "--dry-run", "--on-problem", "abort"]);
    assert!(output.status.success(), "stdout: {}", stdout(&output));
    assert!(!repo.target().exists());
    assert!(stdout(&output).contains("skipped"));
}

#[test]
fn migrate_builds_the_new_layout() {
    let repo = RepoBuilder::consistent();
    let output = itsq(&repo, &["migrate", "--on-problem", "abort"]);
    assert!(output.status.success(), "stdout: {}", stdout(&output));
    for phase in Phase::ALL {
        assert!(
            repo.target()
                .join("ARCHIV-BESTAND")
                .join(phase.dir_name())
                .join("1234567891.xml")
                .exists()
        );
        assert!(
            repo.target()
                .join("REF-EXPORTS")
                .join(phase.dir_name())
                .join("c02")
                .join("szenario-a")
                .join("p01.xml")
                .exists()
        );
    }
}

#[test]
fn migrate_with_problems_and_skip_policy_exits_zero() {
    let repo = RepoBuilder::consistent();
    std::fs::remove_file(
        repo.config()
            .old_ref_export_xml(&CustomerKey::new("c02").unwrap(), "szenario-a", "p01"),
    )
    .unwrap();
    let output = itsq(&repo, &["migrate", "--on-problem", "skip"]);
    assert!(output.status.success(), "stdout: {}", stdout(&output));
    assert!(stdout(&output).contains("completed with warnings"));
}

#[test]
fn migrate_with_abort_policy_fails_on_problems() {
    let repo = RepoBuilder::consistent();
    std::fs::remove_file(
        repo.config()
            .old_ref_export_xml(&CustomerKey::new("c02").unwrap(), "szenario-a", "p01"),
    )
    .unwrap();
    let output = itsq(&repo, &["migrate", "--on-problem", "abort"]);
    assert!(!output.status.success());
}

#[test]
fn migrate_emits_json_result() {
    let repo = RepoBuilder::consistent();
    let output = itsq(&repo, &["migrate", "--dry-run", "--format", "json"]);
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(parsed["status"], serde_json::json!("completed"));
    assert!(parsed["files"]["skipped"].as_u64().unwrap() > 0);
}

#[test]
fn missing_source_flag_is_a_usage_error() {
    let repo = RepoBuilder::new();
    let output = common::itsq_in(repo.source(), &["verify"]);
    assert!(!output.status.success());
    assert!(common::stderr(&output).contains("source root required"));
}
