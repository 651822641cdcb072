//! Migration configuration (`itsq.toml` plus CLI overrides).
//!
//! Defines the typed configuration for a migration run and the canonical
//! sub-paths of both the old and new repository layouts. Missing config
//! file → all defaults (no error).

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::model::{CrefoNr, CustomerKey, Phase};

/// Fixed name of the customer-side export tree.
pub const REF_EXPORTS: &str = "REF-EXPORTS";
/// Fixed name of the new-layout archive tree.
pub const ARCHIV_BESTAND: &str = "ARCHIV-BESTAND";
/// Holder directory for relevance files under a customer.
pub const RELEVANZ_DIR: &str = "Relevanz_Positiv";
/// Per-customer relevance file name.
pub const RELEVANZ_FILE: &str = "Relevanz.properties";
/// Authoritative per-phase specification file name.
pub const SPEC_FILE: &str = "TestCrefos.properties";
/// Target-side directory for pre-overwrite backups.
pub const BACKUP_DIR: &str = "BACKUP";
/// Synthetic scenario for customers without scenario directories.
pub const DEFAULT_SCENARIO: &str = "STANDARD";

// ---------------------------------------------------------------------------
// MigrationConfig
// ---------------------------------------------------------------------------

/// Configuration for one migration run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Root of the legacy (old-layout) repository.
    pub source_root: PathBuf,
    /// Root of the phase-partitioned (new-layout) repository.
    pub target_root: PathBuf,
    /// Copy an existing target file aside before overwriting it.
    pub create_backup: bool,
    /// Overwrite target files that already exist.
    pub overwrite_existing: bool,
    /// Record every file operation as skipped instead of performing it.
    pub dry_run: bool,
}

impl MigrationConfig {
    /// Create a config with default flags (no backup, no overwrite, real run).
    #[must_use]
    pub fn new(source_root: impl Into<PathBuf>, target_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            target_root: target_root.into(),
            create_backup: false,
            overwrite_existing: false,
            dry_run: false,
        }
    }

    /// Whether the config describes a runnable migration.
    ///
    /// Requires the source root to exist and be a directory.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Validate the config, reporting what is wrong.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the source root is missing or not a
    /// directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source_root.exists() {
            return Err(ConfigError {
                path: Some(self.source_root.clone()),
                message: "source root does not exist".to_owned(),
            });
        }
        if !self.source_root.is_dir() {
            return Err(ConfigError {
                path: Some(self.source_root.clone()),
                message: "source root is not a directory".to_owned(),
            });
        }
        Ok(())
    }

    // -- old layout --

    /// Old-layout archive tree for a phase (`ARCHIV-BESTAND-PHn/`).
    #[must_use]
    pub fn old_archiv_dir(&self, phase: Phase) -> PathBuf {
        self.source_root.join(phase.old_archiv_dir())
    }

    /// Old-layout archive XML for a Crefo in a phase.
    #[must_use]
    pub fn old_archiv_xml(&self, phase: Phase, crefo: CrefoNr) -> PathBuf {
        self.old_archiv_dir(phase).join(format!("{crefo}.xml"))
    }

    /// Old-layout specification file for a phase.
    #[must_use]
    pub fn old_spec_file(&self, phase: Phase) -> PathBuf {
        self.old_archiv_dir(phase).join(SPEC_FILE)
    }

    /// Old-layout export tree (`REF-EXPORTS/`, un-phased).
    #[must_use]
    pub fn old_ref_exports(&self) -> PathBuf {
        self.source_root.join(REF_EXPORTS)
    }

    /// Old-layout relevance file for a customer.
    #[must_use]
    pub fn old_relevanz_file(&self, customer: &CustomerKey) -> PathBuf {
        self.old_ref_exports()
            .join(customer.as_str())
            .join(RELEVANZ_DIR)
            .join(RELEVANZ_FILE)
    }

    /// Old-layout reference-export XML for one test case.
    #[must_use]
    pub fn old_ref_export_xml(
        &self,
        customer: &CustomerKey,
        scenario: &str,
        test_fall: &str,
    ) -> PathBuf {
        self.old_ref_exports()
            .join(customer.as_str())
            .join(scenario)
            .join(format!("{test_fall}.xml"))
    }

    // -- new layout --

    /// New-layout archive tree for a phase (`ARCHIV-BESTAND/PHASE-n/`).
    #[must_use]
    pub fn new_archiv_dir(&self, phase: Phase) -> PathBuf {
        self.target_root.join(ARCHIV_BESTAND).join(phase.dir_name())
    }

    /// New-layout export tree for a phase and customer.
    #[must_use]
    pub fn new_customer_dir(&self, phase: Phase, customer: &CustomerKey) -> PathBuf {
        self.target_root
            .join(REF_EXPORTS)
            .join(phase.dir_name())
            .join(customer.as_str())
    }

    /// Where a pre-overwrite backup of `target` goes, relative to the
    /// target root.
    #[must_use]
    pub fn backup_path(&self, target: &Path) -> PathBuf {
        let backup_root = self.target_root.join(BACKUP_DIR);
        target.strip_prefix(&self.target_root).map_or_else(
            |_| backup_root.join(target.file_name().unwrap_or_default()),
            |rel| backup_root.join(rel),
        )
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration file or value could not be used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigError {
    /// The offending path, when known.
    pub path: Option<PathBuf>,
    /// Human-readable description of the problem.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "config error in '{}': {}", path.display(), self.message),
            None => write!(f, "config error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// File config (itsq.toml)
// ---------------------------------------------------------------------------

/// On-disk configuration, parsed from `itsq.toml`.
///
/// All fields are optional; CLI flags override file values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Migration settings.
    #[serde(default)]
    pub migration: FileMigrationSection,
}

/// The `[migration]` section of `itsq.toml`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileMigrationSection {
    /// Source root of the legacy repository.
    #[serde(default)]
    pub source: Option<PathBuf>,
    /// Target root for the new layout.
    #[serde(default)]
    pub target: Option<PathBuf>,
    /// Back up existing target files before overwriting.
    #[serde(default)]
    pub create_backup: bool,
    /// Overwrite target files that already exist.
    #[serde(default)]
    pub overwrite_existing: bool,
    /// Record file operations without performing them.
    #[serde(default)]
    pub dry_run: bool,
}

impl FileConfig {
    /// Load config from a TOML file. Missing file → all defaults.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the file exists but cannot be read
    /// or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError {
            path: Some(path.to_path_buf()),
            message: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError {
            path: Some(path.to_path_buf()),
            message: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(s: &str) -> CustomerKey {
        CustomerKey::new(s).unwrap()
    }

    fn config() -> MigrationConfig {
        MigrationConfig::new("/data/old", "/data/new")
    }

    #[test]
    fn old_layout_paths() {
        let cfg = config();
        assert_eq!(
            cfg.old_archiv_dir(Phase::One),
            PathBuf::from("/data/old/ARCHIV-BESTAND-PH1")
        );
        assert_eq!(
            cfg.old_spec_file(Phase::Two),
            PathBuf::from("/data/old/ARCHIV-BESTAND-PH2/TestCrefos.properties")
        );
        assert_eq!(
            cfg.old_relevanz_file(&customer("c02")),
            PathBuf::from("/data/old/REF-EXPORTS/c02/Relevanz_Positiv/Relevanz.properties")
        );
        assert_eq!(
            cfg.old_ref_export_xml(&customer("c02"), "szenario-a", "p01"),
            PathBuf::from("/data/old/REF-EXPORTS/c02/szenario-a/p01.xml")
        );
    }

    #[test]
    fn new_layout_paths() {
        let cfg = config();
        assert_eq!(
            cfg.new_archiv_dir(Phase::One),
            PathBuf::from("/data/new/ARCHIV-BESTAND/PHASE-1")
        );
        assert_eq!(
            cfg.new_customer_dir(Phase::Two, &customer("c05")),
            PathBuf::from("/data/new/REF-EXPORTS/PHASE-2/c05")
        );
    }

    #[test]
    fn archiv_xml_named_by_crefo() {
        let cfg = config();
        let crefo = CrefoNr::new("1234567891").unwrap();
        assert_eq!(
            cfg.old_archiv_xml(Phase::One, crefo),
            PathBuf::from("/data/old/ARCHIV-BESTAND-PH1/1234567891.xml")
        );
    }

    #[test]
    fn backup_path_mirrors_relative_target() {
        let cfg = config();
        let target = PathBuf::from("/data/new/REF-EXPORTS/PHASE-1/c02/szenario-a/p01.xml");
        assert_eq!(
            cfg.backup_path(&target),
            PathBuf::from("/data/new/BACKUP/REF-EXPORTS/PHASE-1/c02/szenario-a/p01.xml")
        );
    }

    #[test]
    fn missing_source_is_invalid() {
        let cfg = MigrationConfig::new("/definitely/not/here", "/data/new");
        assert!(!cfg.is_valid());
        let err = cfg.validate().unwrap_err();
        assert!(err.message.contains("does not exist"));
    }

    #[test]
    fn existing_dir_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = MigrationConfig::new(dir.path(), "/data/new");
        assert!(cfg.is_valid());
    }

    #[test]
    fn file_pointing_source_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("afile");
        std::fs::write(&file, "x").unwrap();
        let cfg = MigrationConfig::new(&file, "/data/new");
        let err = cfg.validate().unwrap_err();
        assert!(err.message.contains("not a directory"));
    }

    #[test]
    fn file_config_missing_file_is_defaults() {
        let cfg = FileConfig::load(Path::new("/does/not/exist/itsq.toml")).unwrap();
        assert_eq!(cfg, FileConfig::default());
    }

    #[test]
    fn file_config_parses_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("itsq.toml");
        std::fs::write(
            &path,
            "[migration]\nsource = \"/data/old\"\ndry_run = true\n",
        )
        .unwrap();
        let cfg = FileConfig::load(&path).unwrap();
        assert_eq!(cfg.migration.source, Some(PathBuf::from("/data/old")));
        assert!(cfg.migration.dry_run);
        assert!(!cfg.migration.create_backup);
    }

    #[test]
    fn file_config_rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("itsq.toml");
        std::fs::write(&path, "[migration]\nbogus = 1\n").unwrap();
        assert!(FileConfig::load(&path).is_err());
    }
}
