//! Phase-validity derivation.
//!
//! For every discovered test case, derive whether it is valid for phase 1
//! and/or phase 2 from its test-case type, the authoritative specification
//! scope, and the presence of the expected artifacts at their predicted
//! paths. Findings that need a decision are handed to the resolver as they
//! are made; an abort resolution stops the derivation.

use std::collections::BTreeSet;

use crate::cancel::CancellationToken;
use crate::config::MigrationConfig;
use crate::consistency::CrefoMapping;
use crate::model::{
    AssignmentStatus, CrefoNr, CustomerKey, MigrationProblem, Phase, ProblemLocation, ProblemType,
    Resolution, TestCasePhaseAssignment, TestCaseType,
};
use crate::parse::RelevanzEntry;

// ---------------------------------------------------------------------------
// DefinedSpecs
// ---------------------------------------------------------------------------

/// The authoritative per-phase Crefo → customer mappings.
#[derive(Clone, Copy, Debug)]
pub struct DefinedSpecs<'a> {
    /// Phase-1 defined mapping.
    pub phase1: &'a CrefoMapping,
    /// Phase-2 defined mapping.
    pub phase2: &'a CrefoMapping,
}

impl DefinedSpecs<'_> {
    /// The mapping for one phase.
    #[must_use]
    pub const fn mapping(&self, phase: Phase) -> &CrefoMapping {
        match phase {
            Phase::One => self.phase1,
            Phase::Two => self.phase2,
        }
    }

    /// Whether the specification authorizes this customer for this Crefo
    /// in the given phase.
    #[must_use]
    pub fn expects(&self, phase: Phase, crefo: CrefoNr, customer: &CustomerKey) -> bool {
        self.mapping(phase)
            .get(&crefo)
            .is_some_and(|customers| customers.contains(customer))
    }

    /// Whether the customer appears anywhere in the phase's specification.
    #[must_use]
    pub fn in_scope(&self, phase: Phase, customer: &CustomerKey) -> bool {
        self.mapping(phase)
            .values()
            .any(|customers| customers.contains(customer))
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Result of deriving one customer's assignments.
#[derive(Debug, Default)]
pub struct CustomerOutcome {
    /// All assignments for this customer, one per (scenario, entry).
    pub assignments: Vec<TestCasePhaseAssignment>,
    /// Set when a resolver returned abort; the caller must stop the run.
    pub aborted: bool,
    /// Set when the cancellation token fired mid-derivation.
    pub cancelled: bool,
}

/// Derive phase validity for every (scenario, relevance entry) pair of a
/// customer.
///
/// `resolve` is consulted for each finding and returns the applied
/// resolution; [`Resolution::Abort`] stops the derivation immediately.
pub fn derive_customer(
    config: &MigrationConfig,
    customer: &CustomerKey,
    scenarios: &[String],
    entries: &[RelevanzEntry],
    defined: &DefinedSpecs<'_>,
    cancel: &CancellationToken,
    resolve: &mut dyn FnMut(MigrationProblem) -> Resolution,
) -> CustomerOutcome {
    let mut outcome = CustomerOutcome::default();
    for scenario in scenarios {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            return outcome;
        }
        for entry in entries {
            let mut assignment = TestCasePhaseAssignment::new(customer.clone(), scenario, &entry.test_fall);
            assignment.crefo = Some(entry.crefo);
            assignment.info = format!("declared as {}", entry.case_type);

            for phase in Phase::ALL {
                let aborted = derive_phase(
                    config,
                    defined,
                    &mut assignment,
                    entry,
                    phase,
                    resolve,
                );
                if aborted {
                    outcome.assignments.push(assignment);
                    outcome.aborted = true;
                    return outcome;
                }
            }
            outcome.assignments.push(assignment);
        }
    }
    outcome
}

/// Derive one phase of one assignment. Returns true on abort.
fn derive_phase(
    config: &MigrationConfig,
    defined: &DefinedSpecs<'_>,
    assignment: &mut TestCasePhaseAssignment,
    entry: &RelevanzEntry,
    phase: Phase,
    resolve: &mut dyn FnMut(MigrationProblem) -> Resolution,
) -> bool {
    let crefo = entry.crefo;
    let archiv_xml = config.old_archiv_xml(phase, crefo);
    let ref_export_xml =
        config.old_ref_export_xml(&assignment.customer, &assignment.scenario, &assignment.test_fall);

    if entry.case_type == TestCaseType::Negative {
        // Negative cases prove absence; finding an archive record for one
        // is itself a problem.
        if archiv_xml.exists() {
            let problem = MigrationProblem::new(
                ProblemType::UnexpectedArchivBestandXml,
                location(assignment, phase),
                format!("archive record exists for negative test case '{}'", assignment.test_fall),
            )
            .with_crefo(crefo)
            .with_source_file(&archiv_xml);
            return apply_resolution(assignment, phase, resolve(problem), &archiv_xml, &ref_export_xml);
        }
        assignment
            .phase_mut(phase)
            .set(AssignmentStatus::Invalid, "negative test case, artifacts expected absent");
        return false;
    }

    if !defined.expects(phase, crefo, &assignment.customer) {
        assignment.phase_mut(phase).set(
            AssignmentStatus::Invalid,
            format!("customer not authorized for Crefo {crefo} in {phase}"),
        );
        return false;
    }

    let archiv_present = archiv_xml.exists();
    let ref_present = ref_export_xml.exists();

    if archiv_present && ref_present {
        let state = assignment.phase_mut(phase);
        state.set(AssignmentStatus::Valid, "archive and export artifacts present");
        state.archiv_xml = Some(archiv_xml);
        state.ref_export_xml = Some(ref_export_xml);
        return false;
    }

    let mut missing = Vec::new();
    if !archiv_present {
        missing.push(format!("archive XML '{}'", archiv_xml.display()));
    }
    if !ref_present {
        missing.push(format!("reference-export XML '{}'", ref_export_xml.display()));
    }
    let problem_type = if archiv_present {
        ProblemType::MissingRefExportXml
    } else {
        ProblemType::MissingArchivBestandXml
    };
    let source = if archiv_present { &ref_export_xml } else { &archiv_xml };
    let problem = MigrationProblem::new(
        problem_type,
        location(assignment, phase),
        format!("missing {}", missing.join(" and ")),
    )
    .with_crefo(crefo)
    .with_source_file(source);
    apply_resolution(assignment, phase, resolve(problem), &archiv_xml, &ref_export_xml)
}

/// Apply a resolution to one phase state. Returns true on abort.
fn apply_resolution(
    assignment: &mut TestCasePhaseAssignment,
    phase: Phase,
    resolution: Resolution,
    archiv_xml: &std::path::Path,
    ref_export_xml: &std::path::Path,
) -> bool {
    match resolution {
        Resolution::Abort => {
            assignment
                .phase_mut(phase)
                .set(AssignmentStatus::Error, "run aborted while resolving");
            true
        }
        Resolution::Skip => {
            assignment
                .phase_mut(phase)
                .set(AssignmentStatus::Skipped, "skipped by decision");
            false
        }
        Resolution::CopyAnyway => {
            let state = assignment.phase_mut(phase);
            state.set(AssignmentStatus::Valid, "forced valid by decision");
            if archiv_xml.exists() {
                state.archiv_xml = Some(archiv_xml.to_path_buf());
            }
            if ref_export_xml.exists() {
                state.ref_export_xml = Some(ref_export_xml.to_path_buf());
            }
            false
        }
    }
}

fn location(assignment: &TestCasePhaseAssignment, phase: Phase) -> ProblemLocation {
    ProblemLocation {
        customer: Some(assignment.customer.clone()),
        scenario: Some(assignment.scenario.clone()),
        test_fall: Some(assignment.test_fall.clone()),
        phase: Some(phase),
    }
}

// ---------------------------------------------------------------------------
// Customer-level checks
// ---------------------------------------------------------------------------

/// Raise [`ProblemType::CustomerNoValidTestcases`] when a customer is in
/// the phase's specification scope but ended the derivation with zero
/// valid test cases for that phase.
#[must_use]
pub fn check_customer_phase(
    customer: &CustomerKey,
    phase: Phase,
    assignments: &[TestCasePhaseAssignment],
    defined: &DefinedSpecs<'_>,
) -> Option<MigrationProblem> {
    if !defined.in_scope(phase, customer) {
        return None;
    }
    if assignments.iter().any(|a| a.is_valid(phase)) {
        return None;
    }
    Some(MigrationProblem::new(
        ProblemType::CustomerNoValidTestcases,
        ProblemLocation {
            customer: Some(customer.clone()),
            scenario: None,
            test_fall: None,
            phase: Some(phase),
        },
        format!("customer has no valid test cases in {phase}"),
    ))
}

/// Warn when a customer directory exists but no phase specification
/// mentions the customer at all.
#[must_use]
pub fn unknown_customer_warning(
    customer: &CustomerKey,
    defined: &DefinedSpecs<'_>,
) -> Option<String> {
    if Phase::ALL.iter().any(|&p| defined.in_scope(p, customer)) {
        return None;
    }
    Some(format!(
        "customer '{customer}' is not mentioned in any phase specification"
    ))
}

/// The customers that belong to a phase: those with at least one valid
/// test case.
#[must_use]
pub fn phase_members(
    assignments: &[TestCasePhaseAssignment],
    phase: Phase,
) -> BTreeSet<CustomerKey> {
    assignments
        .iter()
        .filter(|a| a.is_valid(phase))
        .map(|a| a.customer.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
