use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use itsq::classify;
use itsq::config::{MigrationConfig, RELEVANZ_DIR, RELEVANZ_FILE};
use itsq::model::Phase;

use crate::format::OutputFormat;

#[derive(Serialize)]
struct DoctorEnvelope {
    checks: Vec<DoctorCheck>,
    all_ok: bool,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fix: Option<String>,
}

fn print_check(check: &DoctorCheck) {
    let prefix = match check.status.as_str() {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "fail" => "[FAIL]",
        _ => "[???]",
    };
    println!("{} {}", prefix, check.message);
    if let Some(fix) = &check.fix {
        println!("       {fix}");
    }
}

/// Check the source repository layout before a migration
pub fn run(config: &MigrationConfig, format: OutputFormat) -> Result<bool> {
    let mut checks = Vec::new();

    checks.push(check_source_root(config));

    for phase in Phase::ALL {
        checks.push(check_archiv_tree(config, phase));
        checks.push(check_spec_file(config, phase));
    }

    checks.push(check_ref_exports(config));
    checks.push(check_target_root(config));

    let all_ok = checks.iter().all(|c| c.status == "ok");

    match format {
        OutputFormat::Json => {
            let envelope = DoctorEnvelope { checks, all_ok };
            println!("{}", format.serialize(&envelope)?);
        }
        OutputFormat::Text => {
            println!("itsq doctor");
            println!("===========");
            println!();
            for check in &checks {
                print_check(check);
            }
            println!();
            if all_ok {
                println!("All checks passed!");
            } else {
                println!("Some checks failed. See above for details.");
            }
        }
    }

    Ok(all_ok)
}

fn check_source_root(config: &MigrationConfig) -> DoctorCheck {
    if config.source_root.is_dir() {
        DoctorCheck {
            name: "source root".to_string(),
            status: "ok".to_string(),
            message: format!("source root: {}", config.source_root.display()),
            fix: None,
        }
    } else {
        DoctorCheck {
            name: "source root".to_string(),
            status: "fail".to_string(),
            message: format!(
                "source root: {} does not exist or is not a directory",
                config.source_root.display()
            ),
            fix: Some("Pass the legacy repository root via --source".to_string()),
        }
    }
}

fn check_archiv_tree(config: &MigrationConfig, phase: Phase) -> DoctorCheck {
    let dir = config.old_archiv_dir(phase);
    let name = format!("{phase} archive tree");
    if dir.is_dir() {
        let xml_count = count_xml_files(&dir);
        DoctorCheck {
            name,
            status: "ok".to_string(),
            message: format!("{}: {} XML records", phase.old_archiv_dir(), xml_count),
            fix: None,
        }
    } else {
        DoctorCheck {
            name,
            status: "fail".to_string(),
            message: format!("{}: missing", phase.old_archiv_dir()),
            fix: Some(format!(
                "Expected {} under the source root",
                phase.old_archiv_dir()
            )),
        }
    }
}

fn check_spec_file(config: &MigrationConfig, phase: Phase) -> DoctorCheck {
    let path = config.old_spec_file(phase);
    let name = format!("{phase} specification");
    if path.is_file() {
        DoctorCheck {
            name,
            status: "ok".to_string(),
            message: format!("{phase} specification: {}", path.display()),
            fix: None,
        }
    } else {
        DoctorCheck {
            name,
            status: "fail".to_string(),
            message: format!("{phase} specification: {} missing", path.display()),
            fix: Some("Every phase needs a TestCrefos.properties at its archive root".to_string()),
        }
    }
}

fn check_ref_exports(config: &MigrationConfig) -> DoctorCheck {
    let dir = config.old_ref_exports();
    if !dir.is_dir() {
        return DoctorCheck {
            name: "export tree".to_string(),
            status: "fail".to_string(),
            message: "REF-EXPORTS: missing".to_string(),
            fix: Some("Expected REF-EXPORTS under the source root".to_string()),
        };
    }

    // Customers without a relevance file cannot contribute test cases.
    let mut customers = 0usize;
    let mut missing: Vec<String> = Vec::new();
    if let Ok(entries) = classify::sorted_entries(&dir) {
        for entry in entries.iter().filter(|e| e.is_dir) {
            customers += 1;
            if !entry.path.join(RELEVANZ_DIR).join(RELEVANZ_FILE).is_file() {
                missing.push(entry.name.clone());
            }
        }
    }

    if missing.is_empty() {
        DoctorCheck {
            name: "export tree".to_string(),
            status: "ok".to_string(),
            message: format!("REF-EXPORTS: {customers} customers, all with relevance files"),
            fix: None,
        }
    } else {
        DoctorCheck {
            name: "export tree".to_string(),
            status: "warn".to_string(),
            message: format!(
                "REF-EXPORTS: {} of {customers} customers missing {RELEVANZ_DIR}/{RELEVANZ_FILE}: {}",
                missing.len(),
                missing.join(", ")
            ),
            fix: None,
        }
    }
}

fn check_target_root(config: &MigrationConfig) -> DoctorCheck {
    let dir = &config.target_root;
    if !dir.exists() {
        return DoctorCheck {
            name: "target root".to_string(),
            status: "ok".to_string(),
            message: format!("target root: {} (will be created)", dir.display()),
            fix: None,
        };
    }
    let non_empty = std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false);
    if non_empty && !config.overwrite_existing {
        DoctorCheck {
            name: "target root".to_string(),
            status: "warn".to_string(),
            message: format!(
                "target root: {} is not empty; existing files will be skipped",
                dir.display()
            ),
            fix: Some("Use --overwrite (and --backup) to replace existing files".to_string()),
        }
    } else {
        DoctorCheck {
            name: "target root".to_string(),
            status: "ok".to_string(),
            message: format!("target root: {}", dir.display()),
            fix: None,
        }
    }
}

fn count_xml_files(dir: &Path) -> usize {
    classify::sorted_entries(dir).map_or(0, |entries| {
        entries
            .iter()
            .filter(|e| !e.is_dir && e.name.to_ascii_lowercase().ends_with(".xml"))
            .count()
    })
}
