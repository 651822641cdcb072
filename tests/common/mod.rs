//! Shared test helpers for itsq integration tests.
//!
//! All tests use temp directories — no side effects outside the fixture.
//! Each test builds its own old-layout repository via [`RepoBuilder`].

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

use itsq::config::MigrationConfig;
use itsq::model::{CrefoNr, CustomerKey, Phase};

/// Builds an old-layout ITSQ repository inside a temp directory.
pub struct RepoBuilder {
    dir: TempDir,
    source: PathBuf,
    target: PathBuf,
}

impl RepoBuilder {
    /// Create an empty repository skeleton (source root only).
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let source = dir.path().join("OLD");
        let target = dir.path().join("NEW");
        std::fs::create_dir_all(&source).expect("failed to create source root");
        Self {
            dir,
            source,
            target,
        }
    }

    /// The migration config pointing at this repository.
    pub fn config(&self) -> MigrationConfig {
        MigrationConfig::new(&self.source, &self.target)
    }

    /// The source root.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The target root.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Write a phase's `TestCrefos.properties`.
    pub fn spec(self, phase: Phase, text: &str) -> Self {
        write(&self.config().old_spec_file(phase), text);
        self
    }

    /// Create an archive XML record for a Crefo in a phase.
    pub fn archiv(self, phase: Phase, crefo: &str) -> Self {
        let crefo = CrefoNr::new(crefo).expect("bad crefo in fixture");
        write(&self.config().old_archiv_xml(phase, crefo), "<bestand/>");
        self
    }

    /// Write a customer's `Relevanz_Positiv/Relevanz.properties`.
    pub fn relevanz(self, customer: &str, text: &str) -> Self {
        let customer = CustomerKey::new(customer).expect("bad customer in fixture");
        write(&self.config().old_relevanz_file(&customer), text);
        self
    }

    /// Create a reference-export XML for one test case.
    pub fn export(self, customer: &str, scenario: &str, test_fall: &str) -> Self {
        let customer = CustomerKey::new(customer).expect("bad customer in fixture");
        write(
            &self.config().old_ref_export_xml(&customer, scenario, test_fall),
            "<export/>",
        );
        self
    }

    /// A fully consistent single-customer repository: customer `c02`,
    /// scenario `szenario-a`, positive case p01 on Crefo 1234567891,
    /// negative case n01 on Crefo 1234567899, matching specifications in
    /// both phases.
    pub fn consistent() -> Self {
        let spec = "1234567891::[c02],[412],[],[BILANZ],[KEINE],[],[]\n";
        Self::new()
            .spec(Phase::One, spec)
            .spec(Phase::Two, spec)
            .archiv(Phase::One, "1234567891")
            .archiv(Phase::Two, "1234567891")
            .relevanz("c02", "p01=1234567891\nn01=1234567899\n")
            .export("c02", "szenario-a", "p01")
    }
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().expect("fixture path has no parent"))
        .expect("failed to create fixture dirs");
    std::fs::write(path, content).expect("failed to write fixture file");
}

/// Run itsq with the given args in the given directory.
pub fn itsq_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_itsq"))
        .args(args)
        .current_dir(dir)
        .env_remove("ITSQ_SOURCE")
        .env_remove("ITSQ_TARGET")
        .env_remove("ITSQ_LOG")
        .output()
        .expect("failed to run itsq")
}

/// Run itsq against a fixture repository.
pub fn itsq(repo: &RepoBuilder, args: &[&str]) -> Output {
    let mut full: Vec<String> = args.iter().map(|s| (*s).to_owned()).collect();
    full.push("--source".to_owned());
    full.push(repo.source().display().to_string());
    full.push("--target".to_owned());
    full.push(repo.target().display().to_string());
    let refs: Vec<&str> = full.iter().map(String::as_str).collect();
    itsq_in(repo.dir.path(), &refs)
}

/// Captured stdout as a string.
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Captured stderr as a string.
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
