//! The run-scoped migration aggregate.
//!
//! [`MigrationResult`] is the single source of truth for a run: status,
//! counters, problems, warnings, and per-customer assignment records. It is
//! written only by the engine task; readers get it after completion or as a
//! cloned snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::problem::MigrationProblem;
use super::types::{CustomerKey, Phase, TestCasePhaseAssignment};

// ---------------------------------------------------------------------------
// MigrationStatus
// ---------------------------------------------------------------------------

/// Run status state machine.
///
/// `NotStarted → InProgress → {Completed, CompletedWithWarnings, Failed,
/// Cancelled}`. The terminal state on completion is derived from the
/// recorded problems and warnings; `fail` and `cancel` short-circuit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    CompletedWithWarnings,
    Failed,
    Cancelled,
}

impl MigrationStatus {
    /// Whether the run has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::NotStarted | Self::InProgress)
    }

    /// Static display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::CompletedWithWarnings => "completed with warnings",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Per-phase scan counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounts {
    /// Customers that belong to this phase.
    pub customers: usize,
    /// Scenarios with at least one test case in this phase.
    pub scenarios: usize,
    /// Test cases valid for this phase.
    pub test_cases: usize,
}

/// File-operation counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCounts {
    /// Directories created in the target layout.
    pub created: usize,
    /// Files copied.
    pub copied: usize,
    /// Files skipped (dry run, skip resolution, or already present).
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// MigrationResult
// ---------------------------------------------------------------------------

/// Append-only aggregate of one migration run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Current run status.
    pub status: MigrationStatus,
    /// Reason recorded by [`MigrationResult::fail`].
    pub fail_reason: Option<String>,
    /// Phase-1 counters.
    pub phase1: PhaseCounts,
    /// Phase-2 counters.
    pub phase2: PhaseCounts,
    /// File-operation counters.
    pub files: FileCounts,
    /// Problems in discovery order.
    pub problems: Vec<MigrationProblem>,
    /// Warnings in discovery order.
    pub warnings: Vec<String>,
    /// Customers that belong to phase 1.
    pub phase1_customers: BTreeSet<CustomerKey>,
    /// Customers that belong to phase 2.
    pub phase2_customers: BTreeSet<CustomerKey>,
    /// All assignments, keyed by customer.
    pub assignments: BTreeMap<CustomerKey, Vec<TestCasePhaseAssignment>>,
    /// Wall-clock duration, set when the run reaches a terminal state.
    pub duration_ms: Option<u64>,
    #[serde(skip)]
    started_at: Option<SerdeSkippedInstant>,
}

// Instant is not serializable; wrap it so the derive can skip it while the
// struct stays Clone + Debug.
#[derive(Clone, Copy, Debug)]
struct SerdeSkippedInstant(Instant);

impl MigrationResult {
    /// Create a result in `NotStarted`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to `InProgress` and start the clock.
    ///
    /// No-op if the run already started or finished.
    pub fn start(&mut self) {
        if self.status == MigrationStatus::NotStarted {
            self.status = MigrationStatus::InProgress;
            self.started_at = Some(SerdeSkippedInstant(Instant::now()));
        }
    }

    /// Derive the terminal state from recorded problems and warnings.
    ///
    /// Completed iff no problems and no warnings; completed-with-warnings
    /// iff nothing is failing; failed iff any problem is unresolved or
    /// resolved with abort. No-op if the run is already terminal.
    pub fn finish(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.stop_clock();
        if self.problems.iter().any(MigrationProblem::is_failing) {
            self.status = MigrationStatus::Failed;
        } else if self.problems.is_empty() && self.warnings.is_empty() {
            self.status = MigrationStatus::Completed;
        } else {
            self.status = MigrationStatus::CompletedWithWarnings;
        }
    }

    /// Explicit transition to `Failed`, usable at any point.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.status.is_terminal() {
            self.stop_clock();
            self.status = MigrationStatus::Failed;
            self.fail_reason = Some(reason.into());
        }
    }

    /// Explicit transition to `Cancelled`, usable at any point.
    pub fn cancel(&mut self) {
        if !self.status.is_terminal() {
            self.stop_clock();
            self.status = MigrationStatus::Cancelled;
        }
    }

    fn stop_clock(&mut self) {
        if let Some(SerdeSkippedInstant(start)) = self.started_at {
            let elapsed = start.elapsed();
            self.duration_ms = Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        }
    }

    /// Record a problem.
    pub fn add_problem(&mut self, problem: MigrationProblem) {
        self.problems.push(problem);
    }

    /// Record a warning.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Record an assignment under its customer.
    pub fn add_assignment(&mut self, assignment: TestCasePhaseAssignment) {
        self.assignments
            .entry(assignment.customer.clone())
            .or_default()
            .push(assignment);
    }

    /// The customer set for the given phase.
    #[must_use]
    pub const fn customers(&self, phase: Phase) -> &BTreeSet<CustomerKey> {
        match phase {
            Phase::One => &self.phase1_customers,
            Phase::Two => &self.phase2_customers,
        }
    }

    /// Mutable customer set for the given phase.
    pub const fn customers_mut(&mut self, phase: Phase) -> &mut BTreeSet<CustomerKey> {
        match phase {
            Phase::One => &mut self.phase1_customers,
            Phase::Two => &mut self.phase2_customers,
        }
    }

    /// The counters for the given phase.
    #[must_use]
    pub const fn counts(&self, phase: Phase) -> &PhaseCounts {
        match phase {
            Phase::One => &self.phase1,
            Phase::Two => &self.phase2,
        }
    }

    /// Mutable counters for the given phase.
    pub const fn counts_mut(&mut self, phase: Phase) -> &mut PhaseCounts {
        match phase {
            Phase::One => &mut self.phase1,
            Phase::Two => &mut self.phase2,
        }
    }

    /// How many problems carry a resolution.
    #[must_use]
    pub fn resolved_problems(&self) -> usize {
        self.problems.iter().filter(|p| p.is_resolved()).count()
    }

    /// Human-readable run summary for a CLI or log sink.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "migration {}", self.status);
        if let Some(ms) = self.duration_ms {
            let _ = write!(out, " ({})", format_duration(Duration::from_millis(ms)));
        }
        if let Some(reason) = &self.fail_reason {
            let _ = write!(out, "\n  reason: {reason}");
        }
        for phase in Phase::ALL {
            let counts = self.counts(phase);
            let _ = write!(
                out,
                "\n  {phase}: {} customers, {} scenarios, {} test cases",
                counts.customers, counts.scenarios, counts.test_cases
            );
        }
        let _ = write!(
            out,
            "\n  files: {} created, {} copied, {} skipped",
            self.files.created, self.files.copied, self.files.skipped
        );
        let _ = write!(
            out,
            "\n  problems: {} ({} resolved), warnings: {}",
            self.problems.len(),
            self.resolved_problems(),
            self.warnings.len()
        );
        out
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
