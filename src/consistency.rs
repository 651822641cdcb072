//! Crefo-to-customer mapping verification.
//!
//! All checks are pure functions over two mappings and return an ordered
//! list of human-readable discrepancy strings. They never mutate engine
//! state and are idempotent: phase 1 uses a subset policy, phase 2 an
//! exact-match policy, and phase-1 definitions must always be a subset of
//! phase-2 definitions.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{CrefoNr, CustomerKey};
use crate::parse::SpecEntry;

/// A Crefo → customer-set mapping, transient to one verification pass.
pub type CrefoMapping = BTreeMap<CrefoNr, BTreeSet<CustomerKey>>;

// ---------------------------------------------------------------------------
// Mapping construction
// ---------------------------------------------------------------------------

/// Build the "defined" mapping from parsed specification entries.
///
/// A Crefo with an empty customer list is dropped entirely and never
/// appears as a key. Duplicate Crefo lines merge by set union.
#[must_use]
pub fn defined_mapping(entries: &[SpecEntry]) -> CrefoMapping {
    let mut mapping = CrefoMapping::new();
    for entry in entries {
        if entry.customers.is_empty() {
            continue;
        }
        mapping
            .entry(entry.crefo)
            .or_default()
            .extend(entry.customers.iter().cloned());
    }
    mapping
}

// ---------------------------------------------------------------------------
// Subset check (phase 1)
// ---------------------------------------------------------------------------

/// Phase-1 policy: restrict the defined mapping to customers that exist in
/// phase 1, then require the actual customer set to be a superset per
/// Crefo. Extra actual customers are allowed; missing ones are errors.
#[must_use]
pub fn check_subset(
    defined: &CrefoMapping,
    actual: &CrefoMapping,
    phase_customers: &BTreeSet<CustomerKey>,
) -> Vec<String> {
    let mut errors = Vec::new();
    for (crefo, customers) in defined {
        let filtered: BTreeSet<&CustomerKey> = customers
            .iter()
            .filter(|c| phase_customers.contains(*c))
            .collect();
        if filtered.is_empty() {
            continue;
        }
        let empty = BTreeSet::new();
        let observed = actual.get(crefo).unwrap_or(&empty);
        let missing: Vec<&CustomerKey> = filtered
            .into_iter()
            .filter(|c| !observed.contains(*c))
            .collect();
        if !missing.is_empty() {
            errors.push(format!(
                "phase 1: Crefo {crefo} is defined for {} but not observed there",
                join_keys(missing.into_iter())
            ));
        }
    }
    errors
}

// ---------------------------------------------------------------------------
// Exact check (phase 2)
// ---------------------------------------------------------------------------

/// Phase-2 policy: for every defined Crefo, actual and defined customer
/// sets must be equal. Missing and unexpected customers are reported as
/// separate error lines.
#[must_use]
pub fn check_exact(defined: &CrefoMapping, actual: &CrefoMapping) -> Vec<String> {
    let mut errors = Vec::new();
    let empty = BTreeSet::new();
    for (crefo, customers) in defined {
        let observed = actual.get(crefo).unwrap_or(&empty);
        let missing: Vec<&CustomerKey> = customers.difference(observed).collect();
        if !missing.is_empty() {
            errors.push(format!(
                "phase 2: Crefo {crefo} is defined for {} but not observed there",
                join_keys(missing.into_iter())
            ));
        }
        let unexpected: Vec<&CustomerKey> = observed.difference(customers).collect();
        if !unexpected.is_empty() {
            errors.push(format!(
                "phase 2: Crefo {crefo} is observed for {} but not defined there",
                join_keys(unexpected.into_iter())
            ));
        }
    }
    errors
}

// ---------------------------------------------------------------------------
// Cross-phase invariant
// ---------------------------------------------------------------------------

/// Every Crefo defined in phase 1 must keep its phase-1 customers in
/// phase 2; phase 1 is a subset of phase 2 by definition.
#[must_use]
pub fn check_cross_phase(defined_ph1: &CrefoMapping, defined_ph2: &CrefoMapping) -> Vec<String> {
    let mut errors = Vec::new();
    let empty = BTreeSet::new();
    for (crefo, ph1_customers) in defined_ph1 {
        let ph2_customers = defined_ph2.get(crefo).unwrap_or(&empty);
        let missing: Vec<&CustomerKey> = ph1_customers.difference(ph2_customers).collect();
        if !missing.is_empty() {
            errors.push(format!(
                "Crefo {crefo}: phase-1 customers {} are missing from the phase-2 definition",
                join_keys(missing.into_iter())
            ));
        }
    }
    errors
}

// ---------------------------------------------------------------------------
// Orphan detection
// ---------------------------------------------------------------------------

/// A Crefo observed in actual phase-2 data but absent from the phase-2
/// specification. Worth surfacing, not worth blocking: these are
/// warnings, not errors.
#[must_use]
pub fn find_orphans(defined_ph2: &CrefoMapping, actual_ph2: &CrefoMapping) -> Vec<String> {
    actual_ph2
        .keys()
        .filter(|crefo| !defined_ph2.contains_key(crefo))
        .map(|crefo| {
            format!("Crefo {crefo} appears in phase-2 data but not in the phase-2 specification")
        })
        .collect()
}

fn join_keys<'a>(keys: impl Iterator<Item = &'a CustomerKey>) -> String {
    let joined = keys.map(CustomerKey::as_str).collect::<Vec<_>>().join(", ");
    format!("[{joined}]")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{BilanzTyp, TransferTyp};

    fn crefo(s: &str) -> CrefoNr {
        CrefoNr::new(s).unwrap()
    }

    fn customers(names: &[&str]) -> BTreeSet<CustomerKey> {
        names.iter().map(|n| CustomerKey::new(n).unwrap()).collect()
    }

    fn mapping(pairs: &[(&str, &[&str])]) -> CrefoMapping {
        pairs
            .iter()
            .map(|(c, names)| (crefo(c), customers(names)))
            .collect()
    }

    fn entry(crefo_s: &str, names: &[&str]) -> SpecEntry {
        SpecEntry {
            crefo: crefo(crefo_s),
            customers: customers(names),
            clz: 412,
            beteiligte: BTreeSet::new(),
            bilanz_typ: BilanzTyp::Bilanz,
            transfer_typ: TransferTyp::Keine,
            cta_statistik: false,
            dsgvo_sperre: false,
        }
    }

    // -- defined_mapping --

    #[test]
    fn empty_customer_list_never_becomes_a_key() {
        let mapping = defined_mapping(&[entry("1234567895", &[]), entry("1234567891", &["c02"])]);
        assert!(!mapping.contains_key(&crefo("1234567895")));
        assert!(mapping.contains_key(&crefo("1234567891")));
    }

    #[test]
    fn duplicate_crefo_lines_merge_by_union() {
        let mapping = defined_mapping(&[
            entry("1234567891", &["c02"]),
            entry("1234567891", &["c03"]),
        ]);
        assert_eq!(mapping[&crefo("1234567891")], customers(&["c02", "c03"]));
    }

    // -- subset check --

    #[test]
    fn subset_allows_extra_actual_customers() {
        let defined = mapping(&[("1234567891", &["c02"])]);
        let actual = mapping(&[("1234567891", &["c02", "c09"])]);
        let errors = check_subset(&defined, &actual, &customers(&["c02", "c09"]));
        assert!(errors.is_empty());
    }

    #[test]
    fn subset_reports_missing_customers() {
        let defined = mapping(&[("1234567891", &["c02", "c03"])]);
        let actual = mapping(&[("1234567891", &["c02"])]);
        let errors = check_subset(&defined, &actual, &customers(&["c02", "c03"]));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("1234567891"));
        assert!(errors[0].contains("c03"));
        assert!(!errors[0].contains("c02,"));
    }

    #[test]
    fn subset_filters_to_phase_customers() {
        // c05 does not exist in phase 1, so its absence is not an error.
        let defined = mapping(&[("1234567891", &["c02", "c05"])]);
        let actual = mapping(&[("1234567891", &["c02"])]);
        let errors = check_subset(&defined, &actual, &customers(&["c02"]));
        assert!(errors.is_empty());
    }

    #[test]
    fn subset_skips_crefos_filtered_to_empty() {
        let defined = mapping(&[("1234567891", &["c05"])]);
        let actual = CrefoMapping::new();
        let errors = check_subset(&defined, &actual, &customers(&["c02"]));
        assert!(errors.is_empty());
    }

    // -- exact check --

    #[test]
    fn exact_match_passes() {
        let defined = mapping(&[("1234567891", &["c02", "c03"])]);
        let actual = mapping(&[("1234567891", &["c02", "c03"])]);
        assert!(check_exact(&defined, &actual).is_empty());
    }

    #[test]
    fn exact_reports_missing_and_unexpected_separately() {
        let defined = mapping(&[("1234567891", &["c02", "c03"])]);
        let actual = mapping(&[("1234567891", &["c03", "c07"])]);
        let errors = check_exact(&defined, &actual);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("defined for [c02]"));
        assert!(errors[1].contains("observed for [c07]"));
    }

    #[test]
    fn exact_reports_wholly_unobserved_crefo() {
        let defined = mapping(&[("1234567891", &["c02"])]);
        let actual = CrefoMapping::new();
        let errors = check_exact(&defined, &actual);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("not observed"));
    }

    // -- cross-phase invariant --

    #[test]
    fn cross_phase_subset_holds() {
        let ph1 = mapping(&[("1234567891", &["c02"])]);
        let ph2 = mapping(&[("1234567891", &["c02", "c03"])]);
        assert!(check_cross_phase(&ph1, &ph2).is_empty());
    }

    #[test]
    fn cross_phase_violation_names_missing_customers() {
        let ph1 = mapping(&[("1234567891", &["c02", "c03"])]);
        let ph2 = mapping(&[("1234567891", &["c02"])]);
        let errors = check_cross_phase(&ph1, &ph2);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("[c03]"));
    }

    #[test]
    fn cross_phase_crefo_absent_from_phase2_is_reported() {
        let ph1 = mapping(&[("1234567891", &["c02"])]);
        let ph2 = CrefoMapping::new();
        let errors = check_cross_phase(&ph1, &ph2);
        assert_eq!(errors.len(), 1);
    }

    // -- orphans --

    #[test]
    fn orphan_crefo_is_a_warning_line() {
        let defined = mapping(&[("1234567891", &["c02"])]);
        let actual = mapping(&[("1234567891", &["c02"]), ("1234567899", &["c02"])]);
        let warnings = find_orphans(&defined, &actual);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("1234567899"));
    }

    // -- idempotence --

    #[test]
    fn checks_are_idempotent() {
        let defined = mapping(&[("1234567891", &["c02", "c03"])]);
        let actual = mapping(&[("1234567891", &["c03"])]);
        let phase = customers(&["c02", "c03"]);
        assert_eq!(
            check_subset(&defined, &actual, &phase),
            check_subset(&defined, &actual, &phase)
        );
        assert_eq!(check_exact(&defined, &actual), check_exact(&defined, &actual));
    }
}
