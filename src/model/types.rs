//! Core domain types for ITSQ test-data repositories.
//!
//! Foundation types used throughout the engine: Crefo numbers, customer
//! keys, phases, test-case types, and per-phase assignment state.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CrefoNr
// ---------------------------------------------------------------------------

/// A validated Crefo number — the numeric company identifier that
/// cross-references archive records and customer exports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CrefoNr(u64);

impl CrefoNr {
    /// The maximum number of digits in a Crefo number.
    pub const MAX_DIGITS: usize = 12;

    /// Create a new `CrefoNr` from a decimal string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is empty, longer than
    /// [`Self::MAX_DIGITS`], or contains non-digit characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        if s.is_empty() || s.len() > Self::MAX_DIGITS {
            return Err(ValidationError {
                kind: ErrorKind::Crefo,
                value: s.to_owned(),
                reason: format!(
                    "expected 1-{} decimal digits, got {}",
                    Self::MAX_DIGITS,
                    s.len()
                ),
            });
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError {
                kind: ErrorKind::Crefo,
                value: s.to_owned(),
                reason: "must contain only decimal digits (0-9)".to_owned(),
            });
        }
        let n = s.parse::<u64>().map_err(|e| ValidationError {
            kind: ErrorKind::Crefo,
            value: s.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self(n))
    }

    /// Return the numeric value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CrefoNr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CrefoNr {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CrefoNr {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<CrefoNr> for String {
    fn from(crefo: CrefoNr) -> Self {
        crefo.0.to_string()
    }
}

// ---------------------------------------------------------------------------
// CustomerKey
// ---------------------------------------------------------------------------

/// A validated customer key.
///
/// Customer keys are lowercase alphanumeric with hyphens and underscores,
/// 1–64 characters. Examples: `c02`, `c05`, `kunde-nord`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CustomerKey(String);

impl CustomerKey {
    /// The maximum length of a customer key.
    pub const MAX_LEN: usize = 64;

    /// Create a new `CustomerKey` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the key is empty, too long, or contains invalid
    /// characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the customer key as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.is_empty() || s.len() > Self::MAX_LEN {
            return Err(ValidationError {
                kind: ErrorKind::CustomerKey,
                value: s.to_owned(),
                reason: format!("expected 1-{} characters, got {}", Self::MAX_LEN, s.len()),
            });
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
        {
            return Err(ValidationError {
                kind: ErrorKind::CustomerKey,
                value: s.to_owned(),
                reason: "must contain only lowercase alphanumeric, '-' or '_'".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for CustomerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CustomerKey {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CustomerKey {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<CustomerKey> for String {
    fn from(key: CustomerKey) -> Self {
        key.0
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// One of the two export generations. Phase 1 is always a subset of
/// phase 2 in scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    One,
    Two,
}

impl Phase {
    /// Both phases, in order.
    pub const ALL: [Self; 2] = [Self::One, Self::Two];

    /// The phase number (1 or 2).
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }

    /// The old-layout archive tree name (`ARCHIV-BESTAND-PH1`/`-PH2`).
    #[must_use]
    pub const fn old_archiv_dir(self) -> &'static str {
        match self {
            Self::One => "ARCHIV-BESTAND-PH1",
            Self::Two => "ARCHIV-BESTAND-PH2",
        }
    }

    /// The new-layout phase folder name (`PHASE-1`/`PHASE-2`).
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::One => "PHASE-1",
            Self::Two => "PHASE-2",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase {}", self.number())
    }
}

// ---------------------------------------------------------------------------
// TestCaseType
// ---------------------------------------------------------------------------

/// The type of a test case, derived from the first character of its name.
///
/// `p` → positive (expected export), `x` → Loeschsatz/deletion record
/// (expected export), `n` → negative (expected absence). Any other first
/// character leaves the type undefined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCaseType {
    Positive,
    Loeschsatz,
    Negative,
}

impl TestCaseType {
    /// Derive the type from a test-case name (`p01`, `x03`, `n07`, …).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.chars().next() {
            Some('p') => Some(Self::Positive),
            Some('x') => Some(Self::Loeschsatz),
            Some('n') => Some(Self::Negative),
            _ => None,
        }
    }

    /// Whether artifacts of this type are expected to be exported.
    ///
    /// True for positive and Loeschsatz cases; negative cases prove
    /// absence and must not have exported artifacts.
    #[must_use]
    pub const fn should_be_exported(self) -> bool {
        matches!(self, Self::Positive | Self::Loeschsatz)
    }

    /// Static display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Loeschsatz => "Loeschsatz",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for TestCaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// AssignmentStatus
// ---------------------------------------------------------------------------

/// Per-phase validity of a test case. Starts as `Invalid` until evaluated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Valid,
    #[default]
    Invalid,
    Skipped,
    Error,
}

impl AssignmentStatus {
    /// Static display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// PhaseState
// ---------------------------------------------------------------------------

/// The evaluated state of one test case for one phase.
///
/// Artifact paths are references into the scanned tree, not owned content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseState {
    /// Validity for this phase.
    pub status: AssignmentStatus,
    /// Human-readable reason for the status.
    pub reason: String,
    /// Expected archive XML path, when present on disk.
    pub archiv_xml: Option<PathBuf>,
    /// Expected reference-export XML path, when present on disk.
    pub ref_export_xml: Option<PathBuf>,
}

impl PhaseState {
    /// Mark this phase state with a status and reason.
    pub fn set(&mut self, status: AssignmentStatus, reason: impl Into<String>) {
        self.status = status;
        self.reason = reason.into();
    }
}

// ---------------------------------------------------------------------------
// TestCasePhaseAssignment
// ---------------------------------------------------------------------------

/// One discovered test case and its derived per-phase validity.
///
/// Identity is (customer, scenario, test-case name). Created once during a
/// scan, mutated only while deriving status, never destroyed mid-run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCasePhaseAssignment {
    /// The owning customer.
    pub customer: CustomerKey,
    /// The scenario folder this case belongs to.
    pub scenario: String,
    /// The test-case name (`p01`, `x03`, `n07`, …).
    pub test_fall: String,
    /// The Crefo number declared for this case, when parseable.
    pub crefo: Option<CrefoNr>,
    /// Free-text info attached during evaluation.
    pub info: String,
    /// The derived test-case type, `None` when the name has no known prefix.
    pub case_type: Option<TestCaseType>,
    /// Phase-1 evaluation state.
    pub phase1: PhaseState,
    /// Phase-2 evaluation state.
    pub phase2: PhaseState,
}

impl TestCasePhaseAssignment {
    /// Create a fresh assignment; both phases start `Invalid`.
    #[must_use]
    pub fn new(customer: CustomerKey, scenario: &str, test_fall: &str) -> Self {
        Self {
            customer,
            scenario: scenario.to_owned(),
            test_fall: test_fall.to_owned(),
            crefo: None,
            info: String::new(),
            case_type: TestCaseType::from_name(test_fall),
            phase1: PhaseState::default(),
            phase2: PhaseState::default(),
        }
    }

    /// The state for the given phase.
    #[must_use]
    pub const fn phase(&self, phase: Phase) -> &PhaseState {
        match phase {
            Phase::One => &self.phase1,
            Phase::Two => &self.phase2,
        }
    }

    /// Mutable state for the given phase.
    pub const fn phase_mut(&mut self, phase: Phase) -> &mut PhaseState {
        match phase {
            Phase::One => &mut self.phase1,
            Phase::Two => &mut self.phase2,
        }
    }

    /// Whether this case counts as valid for the given phase.
    #[must_use]
    pub const fn is_valid(&self, phase: Phase) -> bool {
        matches!(self.phase(phase).status, AssignmentStatus::Valid)
    }
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Which kind of value failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Crefo,
    CustomerKey,
}

/// A value that failed domain validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// Which type rejected the value.
    pub kind: ErrorKind,
    /// The offending input.
    pub value: String,
    /// Why the value is invalid.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ErrorKind::Crefo => "Crefo number",
            ErrorKind::CustomerKey => "customer key",
        };
        write!(f, "invalid {} '{}': {}", what, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
