//! Migration problems and their resolutions.
//!
//! A [`MigrationProblem`] is a finding that needs a decision before the run
//! can continue: a missing artifact, an invalid relevance entry, a failed
//! copy. Problems are created by the detecting component, resolved at most
//! once, and immutable after resolution except for the remember flag.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::types::{CrefoNr, CustomerKey, Phase};

// ---------------------------------------------------------------------------
// ProblemType
// ---------------------------------------------------------------------------

/// The kind of finding a [`MigrationProblem`] reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    /// An expected archive XML is missing for a phase.
    MissingArchivBestandXml,
    /// An archive XML exists for a negative test case.
    UnexpectedArchivBestandXml,
    /// An expected reference-export XML is missing.
    MissingRefExportXml,
    /// A relevance entry is well-formed but semantically invalid.
    InvalidRelevanzEntry,
    /// A customer has zero valid test cases in a phase.
    CustomerNoValidTestcases,
    /// A file copy or backup operation failed.
    FileCopyError,
    /// Anything that does not fit the other categories.
    Other,
}

impl ProblemType {
    /// All problem types, in display order.
    pub const ALL: [Self; 7] = [
        Self::MissingArchivBestandXml,
        Self::UnexpectedArchivBestandXml,
        Self::MissingRefExportXml,
        Self::InvalidRelevanzEntry,
        Self::CustomerNoValidTestcases,
        Self::FileCopyError,
        Self::Other,
    ];

    /// Static display label, kept apart from engine logic.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MissingArchivBestandXml => "missing ARCHIV-BESTAND XML",
            Self::UnexpectedArchivBestandXml => "unexpected ARCHIV-BESTAND XML",
            Self::MissingRefExportXml => "missing REF-EXPORTS XML",
            Self::InvalidRelevanzEntry => "invalid Relevanz entry",
            Self::CustomerNoValidTestcases => "customer has no valid test cases",
            Self::FileCopyError => "file copy failed",
            Self::Other => "other",
        }
    }

    /// Whether the given resolution is allowed for this problem type.
    ///
    /// Forcing a copy is meaningless when there is nothing valid to copy
    /// (no valid test cases) or when the copy operation itself failed.
    #[must_use]
    pub const fn allows(self, resolution: Resolution) -> bool {
        match resolution {
            Resolution::Skip | Resolution::Abort => true,
            Resolution::CopyAnyway => {
                !matches!(self, Self::CustomerNoValidTestcases | Self::FileCopyError)
            }
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// How a decision-maker resolved a problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Skip the affected item and continue.
    Skip,
    /// Perform the copy despite the finding.
    CopyAnyway,
    /// Terminate the run immediately.
    Abort,
}

impl Resolution {
    /// Static display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::CopyAnyway => "copy anyway",
            Self::Abort => "abort",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// ProblemLocation
// ---------------------------------------------------------------------------

/// Where in the repository a problem was found.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemLocation {
    /// The affected customer, when known.
    pub customer: Option<CustomerKey>,
    /// The affected scenario, when known.
    pub scenario: Option<String>,
    /// The affected test case, when known.
    pub test_fall: Option<String>,
    /// The phase the finding applies to, when phase-specific.
    pub phase: Option<Phase>,
}

impl fmt::Display for ProblemLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if let Some(customer) = &self.customer {
            write!(f, "{customer}")?;
            wrote = true;
        }
        if let Some(scenario) = &self.scenario {
            if wrote {
                f.write_str("/")?;
            }
            write!(f, "{scenario}")?;
            wrote = true;
        }
        if let Some(test_fall) = &self.test_fall {
            if wrote {
                f.write_str("/")?;
            }
            write!(f, "{test_fall}")?;
            wrote = true;
        }
        if let Some(phase) = self.phase {
            if wrote {
                f.write_str(" ")?;
            }
            write!(f, "({phase})")?;
            wrote = true;
        }
        if !wrote {
            f.write_str("(no location)")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MigrationProblem
// ---------------------------------------------------------------------------

/// A finding that requires a decision from the decision-maker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationProblem {
    /// What kind of finding this is.
    pub problem_type: ProblemType,
    /// Where the finding was made.
    pub location: ProblemLocation,
    /// The Crefo involved, when known.
    pub crefo: Option<CrefoNr>,
    /// Free-text details.
    pub details: String,
    /// The file the finding refers to, when applicable.
    pub source_file: Option<PathBuf>,
    /// The applied resolution; `None` until resolved.
    pub resolution: Option<Resolution>,
    /// Whether the decision-maker asked to remember the decision.
    pub remembered: bool,
}

impl MigrationProblem {
    /// Create an unresolved problem.
    #[must_use]
    pub fn new(problem_type: ProblemType, location: ProblemLocation, details: impl Into<String>) -> Self {
        Self {
            problem_type,
            location,
            crefo: None,
            details: details.into(),
            source_file: None,
            resolution: None,
            remembered: false,
        }
    }

    /// Attach a Crefo number.
    #[must_use]
    pub const fn with_crefo(mut self, crefo: CrefoNr) -> Self {
        self.crefo = Some(crefo);
        self
    }

    /// Attach the file the finding refers to.
    #[must_use]
    pub fn with_source_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_file = Some(path.into());
        self
    }

    /// Whether a resolution has been applied.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Whether this problem leaves the run failed: unresolved, or
    /// resolved with [`Resolution::Abort`].
    #[must_use]
    pub fn is_failing(&self) -> bool {
        !matches!(self.resolution, Some(Resolution::Skip | Resolution::CopyAnyway))
    }
}

impl fmt::Display for MigrationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} — {}", self.problem_type, self.location, self.details)?;
        if let Some(crefo) = self.crefo {
            write!(f, " (Crefo {crefo})")?;
        }
        if let Some(resolution) = self.resolution {
            write!(f, " [resolved: {resolution}]")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
