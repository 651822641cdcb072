//! The migration engine.
//!
//! Runs one migration end to end: classify the source tree, parse the
//! per-phase specifications and per-customer relevance files, derive phase
//! validity, verify the Crefo mappings, and copy valid artifacts into the
//! phase-partitioned layout. All outcomes accumulate into one
//! [`MigrationResult`].
//!
//! The engine is single-threaded and cooperative: it checks the
//! cancellation token between customers, scenarios, and file operations,
//! and blocks on the decision-maker whenever a problem needs resolving.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use crate::cancel::CancellationToken;
use crate::classify::{self, NodeKind, ScanNode};
use crate::config::{DEFAULT_SCENARIO, MigrationConfig, RELEVANZ_DIR, RELEVANZ_FILE, SPEC_FILE};
use crate::consistency::{
    self, CrefoMapping, check_cross_phase, check_exact, check_subset, find_orphans,
};
use crate::model::{
    CrefoNr, CustomerKey, MigrationProblem, MigrationResult, Phase, ProblemLocation, ProblemType,
    Resolution,
};
use crate::parse::{self, RelevanzEntry};
use crate::phases::{self, DefinedSpecs};
use crate::resolve::{DecisionHandler, DecisionRequest, ProblemResolutionPolicy, decision_channel};

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run a migration to completion on the calling thread.
#[must_use]
pub fn run(
    config: &MigrationConfig,
    handler: &mut dyn DecisionHandler,
    cancel: &CancellationToken,
) -> MigrationResult {
    let mut run = Run {
        config,
        cancel,
        policy: ProblemResolutionPolicy::new(),
        result: MigrationResult::new(),
        aborted: false,
        export_crefos: BTreeMap::new(),
    };
    run.execute(handler);
    run.result
}

/// A migration running on a dedicated background thread.
///
/// Decision requests arrive on `requests`; the engine blocks until each is
/// answered. Dropping the receiver resolves all pending and future
/// requests as abort.
pub struct EngineHandle {
    pub handle: thread::JoinHandle<MigrationResult>,
    /// Decision requests from the engine.
    pub requests: mpsc::Receiver<DecisionRequest>,
    /// Cancels the run cooperatively.
    pub cancel: CancellationToken,
}

impl EngineHandle {
    /// Wait for the engine to finish and return its result.
    #[must_use]
    pub fn join(self) -> MigrationResult {
        self.handle.join().unwrap_or_else(|_| {
            let mut result = MigrationResult::new();
            result.fail("engine task panicked");
            result
        })
    }
}

/// Start a migration on a background thread.
#[must_use]
pub fn spawn(config: MigrationConfig) -> EngineHandle {
    let (mut handler, requests) = decision_channel();
    let cancel = CancellationToken::new();
    let engine_cancel = cancel.clone();
    let handle = thread::spawn(move || run(&config, &mut handler, &engine_cancel));
    EngineHandle {
        handle,
        requests,
        cancel,
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

struct Run<'a> {
    config: &'a MigrationConfig,
    cancel: &'a CancellationToken,
    policy: ProblemResolutionPolicy,
    result: MigrationResult,
    aborted: bool,
    /// Per customer: the Crefos its p/x relevance entries point at.
    export_crefos: BTreeMap<CustomerKey, BTreeSet<CrefoNr>>,
}

impl Run<'_> {
    fn execute(&mut self, handler: &mut dyn DecisionHandler) {
        if let Err(e) = self.config.validate() {
            self.result.fail(e.to_string());
            return;
        }
        self.result.start();

        // Authoritative per-phase specifications.
        let defined_ph1 = self.load_spec(Phase::One);
        let defined_ph2 = self.load_spec(Phase::Two);
        let defined = DefinedSpecs {
            phase1: &defined_ph1,
            phase2: &defined_ph2,
        };

        // Classify the source tree and discover customers.
        let report = classify::scan(&self.config.source_root);
        let customers = match report.root.as_ref().and_then(find_ref_exports) {
            Some(node) => self.discover_customers(node),
            None => {
                self.result
                    .add_warning("no REF-EXPORTS tree found under the source root");
                Vec::new()
            }
        };

        for customer in customers {
            if self.cancel.is_cancelled() {
                self.result.cancel();
                return;
            }
            self.process_customer(&customer, &defined, handler);
            if self.aborted {
                self.result.fail("migration aborted by decision");
                return;
            }
        }
        if self.cancel.is_cancelled() {
            self.result.cancel();
            return;
        }

        self.verify_consistency(&defined);
        self.update_counters();

        let plan = self.build_copy_plan();
        self.execute_plan(plan, handler);
        if self.aborted {
            self.result.fail("migration aborted by decision");
            return;
        }
        if self.cancel.is_cancelled() {
            self.result.cancel();
            return;
        }

        self.result.finish();
    }

    // -- specification loading --

    fn load_spec(&mut self, phase: Phase) -> CrefoMapping {
        let path = self.config.old_spec_file(phase);
        let Ok(text) = std::fs::read_to_string(&path) else {
            tracing::warn!(path = %path.display(), "specification file unreadable");
            self.result
                .add_warning(format!("{phase}: specification file missing: {}", path.display()));
            return CrefoMapping::new();
        };
        let parsed = parse::parse_spec(&text);
        for warning in &parsed.warnings {
            self.result
                .add_warning(format!("{}: {warning}", path.display()));
        }
        consistency::defined_mapping(&parsed.entries)
    }

    // -- customer discovery and processing --

    fn discover_customers(&mut self, ref_exports: &ScanNode) -> Vec<CustomerDir> {
        let mut customers = Vec::new();
        for child in &ref_exports.children {
            if !child.kind.is_dir() {
                continue;
            }
            match CustomerKey::new(&child.name) {
                Ok(key) => {
                    let scenarios: Vec<String> = child
                        .children
                        .iter()
                        .filter(|c| c.kind.is_dir() && c.name != RELEVANZ_DIR)
                        .map(|c| c.name.clone())
                        .collect();
                    customers.push(CustomerDir { key, scenarios });
                }
                Err(e) => {
                    self.result
                        .add_warning(format!("skipping customer directory: {e}"));
                }
            }
        }
        customers
    }

    fn process_customer(
        &mut self,
        customer: &CustomerDir,
        defined: &DefinedSpecs<'_>,
        handler: &mut dyn DecisionHandler,
    ) {
        let entries = self.load_relevanz(&customer.key, handler);
        if self.aborted {
            return;
        }

        if let Some(warning) = phases::unknown_customer_warning(&customer.key, defined) {
            self.result.add_warning(warning);
        }

        let exported: BTreeSet<CrefoNr> = entries
            .iter()
            .filter(|e| e.case_type.should_be_exported())
            .map(|e| e.crefo)
            .collect();
        self.export_crefos.insert(customer.key.clone(), exported);

        let scenarios = if customer.scenarios.is_empty() {
            vec![DEFAULT_SCENARIO.to_owned()]
        } else {
            customer.scenarios.clone()
        };

        let config = self.config;
        let cancel = self.cancel;
        let outcome = {
            let mut resolver = |problem: MigrationProblem| self.resolve(problem, handler);
            phases::derive_customer(
                config,
                &customer.key,
                &scenarios,
                &entries,
                defined,
                cancel,
                &mut resolver,
            )
        };

        if outcome.cancelled {
            self.result.cancel();
            return;
        }

        for phase in Phase::ALL {
            if outcome.assignments.iter().any(|a| a.is_valid(phase)) {
                self.result.customers_mut(phase).insert(customer.key.clone());
            }
        }
        if !outcome.aborted {
            for phase in Phase::ALL {
                if let Some(problem) =
                    phases::check_customer_phase(&customer.key, phase, &outcome.assignments, defined)
                {
                    let resolution = self.resolve(problem, handler);
                    if resolution == Resolution::Abort {
                        break;
                    }
                }
            }
        }

        for assignment in outcome.assignments {
            self.result.add_assignment(assignment);
        }
        if outcome.aborted {
            self.aborted = true;
        }
    }

    fn load_relevanz(
        &mut self,
        customer: &CustomerKey,
        handler: &mut dyn DecisionHandler,
    ) -> Vec<RelevanzEntry> {
        let path = self.config.old_relevanz_file(customer);
        let Ok(text) = std::fs::read_to_string(&path) else {
            tracing::warn!(path = %path.display(), "relevance file unreadable");
            self.result.add_warning(format!(
                "customer '{customer}' has no relevance file at {}",
                path.display()
            ));
            return Vec::new();
        };
        let parsed = parse::parse_relevanz(&text);
        for warning in &parsed.warnings {
            self.result
                .add_warning(format!("{}: {warning}", path.display()));
        }
        for invalid in &parsed.invalid {
            let problem = MigrationProblem::new(
                ProblemType::InvalidRelevanzEntry,
                ProblemLocation {
                    customer: Some(customer.clone()),
                    scenario: None,
                    test_fall: None,
                    phase: None,
                },
                format!("line {}: '{}': {}", invalid.line_no, invalid.line, invalid.reason),
            )
            .with_source_file(&path);
            let resolution = self.resolve(problem, handler);
            if resolution == Resolution::Abort {
                return parsed.entries;
            }
        }
        parsed.entries
    }

    // -- resolution --

    fn resolve(
        &mut self,
        mut problem: MigrationProblem,
        handler: &mut dyn DecisionHandler,
    ) -> Resolution {
        let outcome = self.policy.resolve(&mut problem, handler);
        if let Some(note) = outcome.note {
            self.result.add_warning(note);
        }
        self.result.add_problem(problem);
        if outcome.resolution == Resolution::Abort {
            self.aborted = true;
        }
        outcome.resolution
    }

    // -- consistency verification --

    fn verify_consistency(&mut self, defined: &DefinedSpecs<'_>) {
        let actual_ph1 = self.actual_mapping(Phase::One);
        let actual_ph2 = self.actual_mapping(Phase::Two);

        // Mapping violations describe the end state; they are recorded as a
        // batch on the run, never resolved per item. The "consistency:"
        // prefix separates them from informational warnings.
        let phase1_customers = self.result.customers(Phase::One).clone();
        for error in check_subset(defined.phase1, &actual_ph1, &phase1_customers) {
            self.result.add_warning(format!("consistency: {error}"));
        }
        for error in check_exact(defined.phase2, &actual_ph2) {
            self.result.add_warning(format!("consistency: {error}"));
        }
        for error in check_cross_phase(defined.phase1, defined.phase2) {
            self.result.add_warning(format!("consistency: {error}"));
        }
        for warning in find_orphans(defined.phase2, &actual_ph2) {
            self.result.add_warning(warning);
        }
    }

    /// The mapping actually observed in relevance files, restricted to the
    /// phase's customers. `n` entries never contribute.
    fn actual_mapping(&self, phase: Phase) -> CrefoMapping {
        let mut mapping = CrefoMapping::new();
        for customer in self.result.customers(phase) {
            let Some(crefos) = self.export_crefos.get(customer) else {
                continue;
            };
            for &crefo in crefos {
                mapping.entry(crefo).or_default().insert(customer.clone());
            }
        }
        mapping
    }

    // -- counters --

    fn update_counters(&mut self) {
        for phase in Phase::ALL {
            let mut scenarios = BTreeSet::new();
            let mut test_cases = 0usize;
            for (customer, assignments) in &self.result.assignments {
                for assignment in assignments {
                    if assignment.is_valid(phase) {
                        scenarios.insert((customer.clone(), assignment.scenario.clone()));
                        test_cases += 1;
                    }
                }
            }
            let customers = self.result.customers(phase).len();
            let counts = self.result.counts_mut(phase);
            counts.customers = customers;
            counts.scenarios = scenarios.len();
            counts.test_cases = test_cases;
        }
    }

    // -- copy stage --

    fn build_copy_plan(&self) -> Vec<CopyItem> {
        let mut plan = Vec::new();
        for phase in Phase::ALL {
            let archiv_dir = self.config.new_archiv_dir(phase);
            let old_spec = self.config.old_spec_file(phase);
            if old_spec.exists() {
                plan.push(CopyItem {
                    src: old_spec,
                    dest: archiv_dir.join(SPEC_FILE),
                    customer: None,
                    phase,
                });
            }

            let mut archived: BTreeSet<PathBuf> = BTreeSet::new();
            for customer in self.result.customers(phase) {
                let customer_dir = self.config.new_customer_dir(phase, customer);
                let old_relevanz = self.config.old_relevanz_file(customer);
                if old_relevanz.exists() {
                    plan.push(CopyItem {
                        src: old_relevanz,
                        dest: customer_dir.join(RELEVANZ_DIR).join(RELEVANZ_FILE),
                        customer: Some(customer.clone()),
                        phase,
                    });
                }
                let Some(assignments) = self.result.assignments.get(customer) else {
                    continue;
                };
                for assignment in assignments {
                    if !assignment.is_valid(phase) {
                        continue;
                    }
                    let state = assignment.phase(phase);
                    if let (Some(archiv), Some(crefo)) = (&state.archiv_xml, assignment.crefo) {
                        let dest = archiv_dir.join(format!("{crefo}.xml"));
                        // One archive record per Crefo and phase.
                        if archived.insert(dest.clone()) {
                            plan.push(CopyItem {
                                src: archiv.clone(),
                                dest,
                                customer: Some(customer.clone()),
                                phase,
                            });
                        }
                    }
                    if let Some(ref_xml) = &state.ref_export_xml {
                        plan.push(CopyItem {
                            src: ref_xml.clone(),
                            dest: customer_dir
                                .join(&assignment.scenario)
                                .join(format!("{}.xml", assignment.test_fall)),
                            customer: Some(customer.clone()),
                            phase,
                        });
                    }
                }
            }
        }
        plan
    }

    fn execute_plan(&mut self, plan: Vec<CopyItem>, handler: &mut dyn DecisionHandler) {
        for item in plan {
            if self.aborted {
                return;
            }
            if self.cancel.is_cancelled() {
                self.result.cancel();
                return;
            }
            if self.config.dry_run {
                self.result.files.skipped += 1;
                continue;
            }
            match self.copy_item(&item) {
                Ok(CopyOutcome::Copied) => self.result.files.copied += 1,
                Ok(CopyOutcome::SkippedExisting) => self.result.files.skipped += 1,
                Err(e) => {
                    let problem = MigrationProblem::new(
                        ProblemType::FileCopyError,
                        ProblemLocation {
                            customer: item.customer.clone(),
                            scenario: None,
                            test_fall: None,
                            phase: Some(item.phase),
                        },
                        format!(
                            "copying '{}' to '{}' failed: {e}",
                            item.src.display(),
                            item.dest.display()
                        ),
                    )
                    .with_source_file(&item.src);
                    let resolution = self.resolve(problem, handler);
                    if resolution == Resolution::Abort {
                        return;
                    }
                    self.result.files.skipped += 1;
                }
            }
        }
    }

    fn copy_item(&mut self, item: &CopyItem) -> std::io::Result<CopyOutcome> {
        if item.dest.exists() {
            if !self.config.overwrite_existing {
                return Ok(CopyOutcome::SkippedExisting);
            }
            if self.config.create_backup {
                let backup = self.config.backup_path(&item.dest);
                self.create_dirs(backup.parent())?;
                std::fs::copy(&item.dest, &backup)?;
            }
        }
        self.create_dirs(item.dest.parent())?;
        std::fs::copy(&item.src, &item.dest)?;
        Ok(CopyOutcome::Copied)
    }

    fn create_dirs(&mut self, dir: Option<&Path>) -> std::io::Result<()> {
        let Some(dir) = dir else { return Ok(()) };
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            self.result.files.created += 1;
        }
        Ok(())
    }
}

/// A customer directory found under `REF-EXPORTS`.
struct CustomerDir {
    key: CustomerKey,
    scenarios: Vec<String>,
}

/// One planned file copy.
struct CopyItem {
    src: PathBuf,
    dest: PathBuf,
    customer: Option<CustomerKey>,
    phase: Phase,
}

enum CopyOutcome {
    Copied,
    SkippedExisting,
}

/// Locate the `REF-EXPORTS` node, descending through umbrella directories.
fn find_ref_exports(node: &ScanNode) -> Option<&ScanNode> {
    if node.kind == NodeKind::RefExportsDir {
        return Some(node);
    }
    if matches!(node.kind, NodeKind::RootDir) {
        for child in &node.children {
            if let Some(found) = find_ref_exports(child) {
                return Some(found);
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
