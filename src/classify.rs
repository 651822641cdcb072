//! Directory-structure classification.
//!
//! Walks a test-data tree and assigns every node a domain type based on
//! ancestor context and naming convention. Classification is a pure
//! function `(name, parent context) -> (kind, child context)`; the walker
//! only supplies deterministic enumeration (directories before files, then
//! lexicographic by name) so scan reports are reproducible byte for byte.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{ARCHIV_BESTAND, REF_EXPORTS};

// ---------------------------------------------------------------------------
// NodeContext
// ---------------------------------------------------------------------------

/// Ancestor context while descending the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeContext {
    Root,
    ArchivBestand,
    ArchivBestandPhase,
    RefExports,
    RefExportsPhase,
    Customer,
    Scenario,
}

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

/// The domain type assigned to a single node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// An umbrella directory above the recognized trees (e.g. `OLD/`, `NEW/`).
    RootDir,
    /// An `ARCHIV-BESTAND*` tree root.
    ArchivBestandDir,
    /// A phase folder (or deeper directory) inside an archive tree.
    ArchivPhaseDir,
    /// The `REF-EXPORTS` tree root.
    RefExportsDir,
    /// A phase folder inside `REF-EXPORTS`.
    RefPhaseDir,
    /// A customer folder.
    CustomerDir,
    /// A scenario folder (recursive; scenario subtrees stay scenarios).
    ScenarioDir,
    /// An XML artifact (also the default for unrecognized files).
    XmlArtifact,
    /// The `options.cfg` artifact.
    OptionsArtifact,
    /// A `.properties` artifact.
    PropertiesArtifact,
}

impl NodeKind {
    /// Static display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RootDir => "root",
            Self::ArchivBestandDir => "archive tree",
            Self::ArchivPhaseDir => "archive phase",
            Self::RefExportsDir => "export tree",
            Self::RefPhaseDir => "export phase",
            Self::CustomerDir => "customer",
            Self::ScenarioDir => "scenario",
            Self::XmlArtifact => "xml",
            Self::OptionsArtifact => "options",
            Self::PropertiesArtifact => "properties",
        }
    }

    /// Whether this kind classifies a directory.
    #[must_use]
    pub const fn is_dir(self) -> bool {
        matches!(
            self,
            Self::RootDir
                | Self::ArchivBestandDir
                | Self::ArchivPhaseDir
                | Self::RefExportsDir
                | Self::RefPhaseDir
                | Self::CustomerDir
                | Self::ScenarioDir
        )
    }
}

// ---------------------------------------------------------------------------
// Classification rules
// ---------------------------------------------------------------------------

/// Classify a directory by name under the given ancestor context.
///
/// Returns the node kind and the context its children see.
#[must_use]
pub fn classify_dir(name: &str, context: NodeContext) -> (NodeKind, NodeContext) {
    match context {
        NodeContext::Root => {
            if name.starts_with(ARCHIV_BESTAND) {
                (NodeKind::ArchivBestandDir, NodeContext::ArchivBestand)
            } else if name == REF_EXPORTS {
                (NodeKind::RefExportsDir, NodeContext::RefExports)
            } else {
                // Umbrella directories (OLD/, NEW/) stay at root context.
                (NodeKind::RootDir, NodeContext::Root)
            }
        }
        NodeContext::ArchivBestand | NodeContext::ArchivBestandPhase => {
            (NodeKind::ArchivPhaseDir, NodeContext::ArchivBestandPhase)
        }
        NodeContext::RefExports => (NodeKind::RefPhaseDir, NodeContext::RefExportsPhase),
        NodeContext::RefExportsPhase => (NodeKind::CustomerDir, NodeContext::Customer),
        NodeContext::Customer | NodeContext::Scenario => {
            (NodeKind::ScenarioDir, NodeContext::Scenario)
        }
    }
}

/// Classify a file by extension or exact name, independent of context.
///
/// Unrecognized files default to the XML-artifact classification, never
/// an "unknown" type.
#[must_use]
pub fn classify_file(name: &str) -> NodeKind {
    if name.eq_ignore_ascii_case("options.cfg") {
        return NodeKind::OptionsArtifact;
    }
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".properties") {
        NodeKind::PropertiesArtifact
    } else {
        // .xml and everything else
        NodeKind::XmlArtifact
    }
}

// ---------------------------------------------------------------------------
// ScanNode / ScanReport
// ---------------------------------------------------------------------------

/// A classified node mirroring one filesystem entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScanNode {
    /// File or directory name.
    pub name: String,
    /// Full filesystem path.
    pub path: PathBuf,
    /// Assigned classification.
    pub kind: NodeKind,
    /// Children in deterministic order (directories first, lexicographic).
    pub children: Vec<ScanNode>,
}

/// Aggregate counters for a scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanCounts {
    /// Total files seen.
    pub files: usize,
    /// Total directories seen (including the root).
    pub directories: usize,
}

/// The result of classifying a tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// The classified root, `None` when the root was missing.
    pub root: Option<ScanNode>,
    /// Aggregate counters.
    pub counts: ScanCounts,
}

/// Classify the tree under `root`.
///
/// A root that does not exist or is not a directory yields an empty report
/// and a logged warning, not an error.
#[must_use]
pub fn scan(root: &Path) -> ScanReport {
    if !root.is_dir() {
        tracing::warn!(path = %root.display(), "scan root missing or not a directory");
        return ScanReport::default();
    }
    let mut counts = ScanCounts {
        files: 0,
        directories: 1,
    };
    let name = root
        .file_name()
        .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().into_owned());
    let children = scan_children(root, NodeContext::Root, &mut counts);
    ScanReport {
        root: Some(ScanNode {
            name,
            path: root.to_path_buf(),
            kind: NodeKind::RootDir,
            children,
        }),
        counts,
    }
}

fn scan_children(dir: &Path, context: NodeContext, counts: &mut ScanCounts) -> Vec<ScanNode> {
    let entries = match sorted_entries(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "skipping unreadable directory");
            return Vec::new();
        }
    };

    let mut children = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.is_dir {
            counts.directories += 1;
            let (kind, child_context) = classify_dir(&entry.name, context);
            let grandchildren = scan_children(&entry.path, child_context, counts);
            children.push(ScanNode {
                name: entry.name,
                path: entry.path,
                kind,
                children: grandchildren,
            });
        } else {
            counts.files += 1;
            children.push(ScanNode {
                name: entry.name.clone(),
                path: entry.path,
                kind: classify_file(&entry.name),
                children: Vec::new(),
            });
        }
    }
    children
}

// ---------------------------------------------------------------------------
// Deterministic enumeration
// ---------------------------------------------------------------------------

/// One enumerated directory entry.
#[derive(Clone, Debug)]
pub struct DirEntryInfo {
    /// Entry name.
    pub name: String,
    /// Full path.
    pub path: PathBuf,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Enumerate a directory with all directories preceding all files, each
/// group sorted lexicographically by name.
///
/// # Errors
/// Returns the underlying I/O error when the directory cannot be read.
pub fn sorted_entries(dir: &Path) -> io::Result<Vec<DirEntryInfo>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        entries.push(DirEntryInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: path.is_dir(),
            path,
        });
    }
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
