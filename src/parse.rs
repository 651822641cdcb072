//! Domain text-format parsing.
//!
//! Two independent line-oriented grammars, both `#`-comment and blank-line
//! tolerant:
//!
//! - **Specification lines** (`TestCrefos.properties`): the authoritative
//!   Crefo-to-customer mapping plus CLZ, related Crefos, balance-sheet
//!   type, transfer type, and two literal-token flags.
//! - **Relevance lines** (`Relevanz.properties`): `<prefix><nn>=<crefo>`
//!   per-customer test-case assignments.
//!
//! Malformed lines are skipped with a warning; the parser always processes
//! the remaining lines of the file.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{CrefoNr, CustomerKey, TestCaseType};

// ---------------------------------------------------------------------------
// BilanzTyp / TransferTyp
// ---------------------------------------------------------------------------

/// Balance-sheet type of a specification entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BilanzTyp {
    Bilanz,
    #[default]
    Keine,
}

impl FromStr for BilanzTyp {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BILANZ" => Ok(Self::Bilanz),
            "" | "KEINE" => Ok(Self::Keine),
            other => Err(UnknownToken {
                field: "bilanz type",
                token: other.to_owned(),
            }),
        }
    }
}

/// Transfer type of a specification entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferTyp {
    #[default]
    Keine,
    Voll,
}

impl FromStr for TransferTyp {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "KEINE" => Ok(Self::Keine),
            "VOLL" => Ok(Self::Voll),
            other => Err(UnknownToken {
                field: "transfer type",
                token: other.to_owned(),
            }),
        }
    }
}

/// A token that matches none of the field's literals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownToken {
    field: &'static str,
    token: String,
}

impl fmt::Display for UnknownToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} token '{}'", self.field, self.token)
    }
}

impl std::error::Error for UnknownToken {}

/// Literal token enabling the CTA-statistics flag.
pub const CTA_STATISTIK_TOKEN: &str = "CTA_STATISTIK";
/// Literal token enabling the GDPR-block flag.
pub const DSGVO_SPERRE_TOKEN: &str = "DSGVO_SPERRE";

// ---------------------------------------------------------------------------
// SpecEntry
// ---------------------------------------------------------------------------

/// One parsed specification line.
///
/// An empty customer bracket is preserved here; the mapping layer drops
/// such entries so the Crefo never appears as a key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecEntry {
    /// The Crefo this line defines.
    pub crefo: CrefoNr,
    /// Customers authorized for this Crefo (order-irrelevant).
    pub customers: BTreeSet<CustomerKey>,
    /// The CLZ number.
    pub clz: u32,
    /// Related ("Beteiligte") Crefos.
    pub beteiligte: BTreeSet<CrefoNr>,
    /// Balance-sheet type.
    pub bilanz_typ: BilanzTyp,
    /// Transfer type.
    pub transfer_typ: TransferTyp,
    /// CTA-statistics flag, set by literal token match.
    pub cta_statistik: bool,
    /// GDPR-block flag, set by literal token match.
    pub dsgvo_sperre: bool,
}

/// The parsed content of a specification file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpecFile {
    /// Entries in file order.
    pub entries: Vec<SpecEntry>,
    /// Warnings for skipped lines.
    pub warnings: Vec<ParseWarning>,
}

// ---------------------------------------------------------------------------
// Relevance entries
// ---------------------------------------------------------------------------

/// One parsed relevance line (`p01=1234567891`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanzEntry {
    /// The test-case name (the line's key).
    pub test_fall: String,
    /// Test-case type derived from the key's prefix.
    pub case_type: TestCaseType,
    /// The Crefo the test case refers to.
    pub crefo: CrefoNr,
}

/// A well-formed relevance line whose content is invalid (bad prefix or
/// bad Crefo). These raise problems rather than mere warnings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidRelevanzLine {
    /// 1-based line number.
    pub line_no: usize,
    /// The offending line, comments stripped.
    pub line: String,
    /// Why the entry is invalid.
    pub reason: String,
}

/// The parsed content of a relevance file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelevanzFile {
    /// Valid entries in file order.
    pub entries: Vec<RelevanzEntry>,
    /// Well-formed but invalid entries.
    pub invalid: Vec<InvalidRelevanzLine>,
    /// Warnings for syntactically broken lines.
    pub warnings: Vec<ParseWarning>,
}

// ---------------------------------------------------------------------------
// ParseWarning
// ---------------------------------------------------------------------------

/// A skipped line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number.
    pub line_no: usize,
    /// Why the line was skipped.
    pub reason: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line_no, self.reason)
    }
}

// ---------------------------------------------------------------------------
// Specification grammar
// ---------------------------------------------------------------------------

/// Parse a specification file (`TestCrefos.properties`).
#[must_use]
pub fn parse_spec(text: &str) -> SpecFile {
    let mut file = SpecFile::default();
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        match parse_spec_line(line) {
            Ok(entry) => file.entries.push(entry),
            Err(reason) => file.warnings.push(ParseWarning { line_no, reason }),
        }
    }
    file
}

fn parse_spec_line(line: &str) -> Result<SpecEntry, String> {
    let (crefo_part, rest) = line
        .split_once("::")
        .ok_or_else(|| "missing '::' separator".to_owned())?;
    let crefo = CrefoNr::new(crefo_part.trim()).map_err(|e| e.to_string())?;

    let fields = bracket_fields(rest)?;
    if fields.len() != 7 {
        return Err(format!("expected 7 bracket fields, got {}", fields.len()));
    }

    let customers = split_set(&fields[0])
        .map(|s| CustomerKey::new(s).map_err(|e| e.to_string()))
        .collect::<Result<BTreeSet<_>, _>>()?;

    let clz_text = fields[1].trim();
    let clz = if clz_text.is_empty() {
        0
    } else {
        clz_text
            .parse::<u32>()
            .map_err(|e| format!("invalid CLZ '{clz_text}': {e}"))?
    };

    let beteiligte = split_set(&fields[2])
        .map(|s| CrefoNr::new(s).map_err(|e| e.to_string()))
        .collect::<Result<BTreeSet<_>, _>>()?;

    let bilanz_typ: BilanzTyp = fields[3].trim().parse().map_err(|e: UnknownToken| e.to_string())?;
    let transfer_typ: TransferTyp =
        fields[4].trim().parse().map_err(|e: UnknownToken| e.to_string())?;

    let mut cta_statistik = false;
    let mut dsgvo_sperre = false;
    for field in &fields[5..7] {
        match field.trim() {
            "" => {}
            CTA_STATISTIK_TOKEN => cta_statistik = true,
            DSGVO_SPERRE_TOKEN => dsgvo_sperre = true,
            other => return Err(format!("unknown flag token '{other}'")),
        }
    }

    Ok(SpecEntry {
        crefo,
        customers,
        clz,
        beteiligte,
        bilanz_typ,
        transfer_typ,
        cta_statistik,
        dsgvo_sperre,
    })
}

/// Extract the contents of the `[...]` groups of a specification line.
fn bracket_fields(rest: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_bracket = false;
    for (i, c) in rest.chars().enumerate() {
        match c {
            '[' if in_bracket => return Err(format!("nested '[' at column {}", i + 1)),
            '[' => in_bracket = true,
            ']' if !in_bracket => return Err(format!("stray ']' at column {}", i + 1)),
            ']' => {
                in_bracket = false;
                fields.push(std::mem::take(&mut current));
            }
            _ if in_bracket => current.push(c),
            ',' | ' ' | '\t' => {}
            other => return Err(format!("unexpected '{other}' between fields")),
        }
    }
    if in_bracket {
        return Err("unterminated '['".to_owned());
    }
    Ok(fields)
}

/// Split a `;`-separated bracket body into trimmed non-empty items.
fn split_set(body: &str) -> impl Iterator<Item = &str> {
    body.split(';').map(str::trim).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Relevance grammar
// ---------------------------------------------------------------------------

/// Parse a relevance file (`Relevanz.properties`).
#[must_use]
pub fn parse_relevanz(text: &str) -> RelevanzFile {
    let mut file = RelevanzFile::default();
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            file.warnings.push(ParseWarning {
                line_no,
                reason: format!("missing '=' in '{line}'"),
            });
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match parse_relevanz_entry(key, value) {
            Ok(entry) => file.entries.push(entry),
            Err(reason) => file.invalid.push(InvalidRelevanzLine {
                line_no,
                line: line.to_owned(),
                reason,
            }),
        }
    }
    file
}

fn parse_relevanz_entry(key: &str, value: &str) -> Result<RelevanzEntry, String> {
    let case_type = TestCaseType::from_name(key)
        .ok_or_else(|| format!("test-case name '{key}' has no p/x/n prefix"))?;
    if key.len() < 2 || !key[1..].bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("test-case name '{key}' is not <prefix><nn>"));
    }
    let crefo = CrefoNr::new(value).map_err(|e| e.to_string())?;
    Ok(RelevanzEntry {
        test_fall: key.to_owned(),
        case_type,
        crefo,
    })
}

/// Strip a trailing `#` comment.
fn strip_comment(line: &str) -> &str {
    line.split_once('#').map_or(line, |(head, _)| head)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn crefo(s: &str) -> CrefoNr {
        CrefoNr::new(s).unwrap()
    }

    fn customer(s: &str) -> CustomerKey {
        CustomerKey::new(s).unwrap()
    }

    // -- specification grammar --

    #[test]
    fn parses_full_specification_line() {
        let file = parse_spec(
            "1234567891::[c02;c03;c05],[412],[1234567895],[BILANZ],[KEINE],[CTA_STATISTIK],[DSGVO_SPERRE]",
        );
        assert!(file.warnings.is_empty());
        assert_eq!(file.entries.len(), 1);
        let e = &file.entries[0];
        assert_eq!(e.crefo, crefo("1234567891"));
        let want_customers: BTreeSet<CustomerKey> =
            [customer("c02"), customer("c03"), customer("c05")].into_iter().collect();
        assert_eq!(e.customers, want_customers);
        assert_eq!(e.clz, 412);
        let want_beteiligte: BTreeSet<CrefoNr> = [crefo("1234567895")].into_iter().collect();
        assert_eq!(e.beteiligte, want_beteiligte);
        assert_eq!(e.bilanz_typ, BilanzTyp::Bilanz);
        assert_eq!(e.transfer_typ, TransferTyp::Keine);
        assert!(e.cta_statistik);
        assert!(e.dsgvo_sperre);
    }

    #[test]
    fn empty_customer_bracket_is_preserved_as_empty_set() {
        let file = parse_spec("1234567895::[],[412],[],[KEINE],[KEINE],[],[]");
        assert_eq!(file.entries.len(), 1);
        assert!(file.entries[0].customers.is_empty());
    }

    #[test]
    fn flags_default_to_false_on_empty_brackets() {
        let file = parse_spec("1234567891::[c02],[412],[],[BILANZ],[KEINE],[],[]");
        let e = &file.entries[0];
        assert!(!e.cta_statistik);
        assert!(!e.dsgvo_sperre);
    }

    #[test]
    fn flag_tokens_match_literally_in_either_slot() {
        let file = parse_spec("1234567891::[c02],[412],[],[BILANZ],[KEINE],[DSGVO_SPERRE],[]");
        let e = &file.entries[0];
        assert!(!e.cta_statistik);
        assert!(e.dsgvo_sperre);
    }

    #[test]
    fn comments_and_blank_lines_are_tolerated() {
        let text = "\n# header comment\n1234567891::[c02],[412],[],[BILANZ],[KEINE],[],[]  # trailing\n\n";
        let file = parse_spec(text);
        assert_eq!(file.entries.len(), 1);
        assert!(file.warnings.is_empty());
    }

    #[test]
    fn malformed_spec_lines_are_skipped_not_fatal() {
        let text = "not a line\n1234567891::[c02],[412],[],[BILANZ],[KEINE],[],[]\n99::[c02],[1]";
        let file = parse_spec(text);
        assert_eq!(file.entries.len(), 1);
        assert_eq!(file.warnings.len(), 2);
        assert_eq!(file.warnings[0].line_no, 1);
        assert!(file.warnings[0].reason.contains("missing '::'"));
        assert!(file.warnings[1].reason.contains("expected 7 bracket fields"));
    }

    #[test]
    fn unknown_flag_token_skips_line() {
        let file = parse_spec("1234567891::[c02],[412],[],[BILANZ],[KEINE],[WAS_IST_DAS],[]");
        assert!(file.entries.is_empty());
        assert_eq!(file.warnings.len(), 1);
        assert!(file.warnings[0].reason.contains("WAS_IST_DAS"));
    }

    #[test]
    fn unknown_bilanz_token_skips_line() {
        let file = parse_spec("1234567891::[c02],[412],[],[GUV],[KEINE],[],[]");
        assert!(file.entries.is_empty());
        assert!(file.warnings[0].reason.contains("bilanz type"));
    }

    #[test]
    fn non_numeric_clz_skips_line() {
        let file = parse_spec("1234567891::[c02],[vier],[],[BILANZ],[KEINE],[],[]");
        assert!(file.entries.is_empty());
        assert!(file.warnings[0].reason.contains("invalid CLZ"));
    }

    #[test]
    fn empty_optional_fields_use_defaults() {
        let file = parse_spec("1234567891::[c02],[],[],[],[],[],[]");
        let e = &file.entries[0];
        assert_eq!(e.clz, 0);
        assert_eq!(e.bilanz_typ, BilanzTyp::Keine);
        assert_eq!(e.transfer_typ, TransferTyp::Keine);
    }

    // -- relevance grammar --

    #[test]
    fn parses_relevance_entries_with_inline_comment() {
        let file = parse_relevanz("p01=1234567891 # note\nx02=1234567892\nn01=1234567893\n");
        assert_eq!(file.entries.len(), 3);
        assert_eq!(file.entries[0].test_fall, "p01");
        assert_eq!(file.entries[0].case_type, TestCaseType::Positive);
        assert_eq!(file.entries[0].crefo, crefo("1234567891"));
        assert_eq!(file.entries[1].case_type, TestCaseType::Loeschsatz);
        assert_eq!(file.entries[2].case_type, TestCaseType::Negative);
        assert!(file.invalid.is_empty());
        assert!(file.warnings.is_empty());
    }

    #[test]
    fn line_without_equals_is_a_warning() {
        let file = parse_relevanz("p01 1234567891\np02=1234567892\n");
        assert_eq!(file.entries.len(), 1);
        assert_eq!(file.warnings.len(), 1);
        assert!(file.invalid.is_empty());
    }

    #[test]
    fn bad_prefix_is_an_invalid_entry() {
        let file = parse_relevanz("q01=1234567891\n");
        assert!(file.entries.is_empty());
        assert_eq!(file.invalid.len(), 1);
        assert!(file.invalid[0].reason.contains("no p/x/n prefix"));
    }

    #[test]
    fn non_numeric_crefo_is_an_invalid_entry() {
        let file = parse_relevanz("p01=12a34\n");
        assert_eq!(file.invalid.len(), 1);
        assert!(file.invalid[0].reason.contains("decimal digits"));
    }

    #[test]
    fn non_numeric_case_suffix_is_an_invalid_entry() {
        let file = parse_relevanz("pxx=1234567891\n");
        assert_eq!(file.invalid.len(), 1);
        assert!(file.invalid[0].reason.contains("<prefix><nn>"));
    }

    #[test]
    fn parser_continues_after_bad_lines() {
        let text = "garbage\nq01=1\np01=1234567891\n";
        let file = parse_relevanz(text);
        assert_eq!(file.entries.len(), 1);
        assert_eq!(file.warnings.len(), 1);
        assert_eq!(file.invalid.len(), 1);
    }

    #[test]
    fn comment_only_file_is_empty() {
        let file = parse_relevanz("# nothing here\n\n   # still nothing\n");
        assert!(file.entries.is_empty());
        assert!(file.warnings.is_empty());
    }
}
