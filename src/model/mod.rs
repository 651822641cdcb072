//! Domain model: core types, problems, and the run aggregate.

pub mod problem;
pub mod result;
pub mod types;

pub use problem::{MigrationProblem, ProblemLocation, ProblemType, Resolution};
pub use result::{FileCounts, MigrationResult, MigrationStatus, PhaseCounts};
pub use types::{
    AssignmentStatus, CrefoNr, CustomerKey, Phase, PhaseState, TestCasePhaseAssignment,
    TestCaseType, ValidationError,
};
