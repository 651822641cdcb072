use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};

mod doctor;
mod format;
mod prompt;
mod telemetry;

use itsq::cancel::CancellationToken;
use itsq::classify::{self, ScanNode};
use itsq::config::{FileConfig, MigrationConfig};
use itsq::migrate;
use itsq::model::{MigrationStatus, Resolution};
use itsq::resolve::FixedDecision;

use crate::format::OutputFormat;
use crate::prompt::ConsolePrompt;

/// ITSQ test-data migration
///
/// Reorganizes a legacy flat test-data repository (two ad-hoc phase trees
/// ARCHIV-BESTAND-PH1/PH2 plus a single REF-EXPORTS tree) into a
/// phase-partitioned layout (ARCHIV-BESTAND/PHASE-n,
/// REF-EXPORTS/PHASE-n/<customer>), verifying on the way that every Crefo
/// is associated with exactly the customers authorized for it in each
/// phase.
///
/// QUICK START:
///
///   itsq doctor --source /data/itsq-old
///
///   # Consistency checks only, nothing is copied:
///   itsq verify --source /data/itsq-old
///
///   # Full migration, prompting on problems:
///   itsq migrate --source /data/itsq-old --target /data/itsq-new
///
/// Findings that need a decision (missing artifacts, invalid relevance
/// entries, failed copies) are prompted interactively; answer with an
/// uppercase letter to apply the same decision to all later problems of
/// that type. Use --on-problem skip|abort for unattended runs.
#[derive(Parser)]
#[command(name = "itsq")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'itsq <command> --help' for more information on a specific command.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate the repository into the phase-partitioned layout
    Migrate(MigrateArgs),

    /// Run the consistency checks without copying anything
    Verify(VerifyArgs),

    /// Classify the source tree and print the typed structure
    Scan(ScanArgs),

    /// Check the source repository layout before a migration
    ///
    /// Verifies that the old phase trees, the per-phase TestCrefos
    /// specification files, and the per-customer relevance files are where
    /// the migration expects them.
    Doctor(DoctorArgs),
}

/// Repository location, shared by all commands.
#[derive(Args, Debug)]
struct RepoArgs {
    /// Root of the legacy (old-layout) repository
    #[arg(long, env = "ITSQ_SOURCE")]
    source: Option<PathBuf>,

    /// Root of the new layout (defaults to '<source>-NEW')
    #[arg(long, env = "ITSQ_TARGET")]
    target: Option<PathBuf>,

    /// Configuration file
    #[arg(long, default_value = "itsq.toml")]
    config: PathBuf,
}

#[derive(Args, Debug)]
struct MigrateArgs {
    #[command(flatten)]
    repo: RepoArgs,

    /// Record every file operation as skipped instead of performing it
    #[arg(long)]
    dry_run: bool,

    /// Back up existing target files before overwriting them
    #[arg(long)]
    backup: bool,

    /// Overwrite target files that already exist
    #[arg(long)]
    overwrite: bool,

    /// How to resolve problems: ask interactively, or a fixed policy
    #[arg(long, value_enum, default_value_t = OnProblem::Ask)]
    on_problem: OnProblem,

    /// Output format: text, json
    #[arg(long)]
    format: Option<OutputFormat>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OnProblem {
    /// Prompt on the terminal for every new problem type
    Ask,
    /// Skip every problematic item
    Skip,
    /// Abort the run on the first problem
    Abort,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    #[command(flatten)]
    repo: RepoArgs,

    /// Output format: text, json
    #[arg(long)]
    format: Option<OutputFormat>,
}

#[derive(Args, Debug)]
struct ScanArgs {
    #[command(flatten)]
    repo: RepoArgs,

    /// Output format: text, json
    #[arg(long)]
    format: Option<OutputFormat>,
}

#[derive(Args, Debug)]
struct DoctorArgs {
    #[command(flatten)]
    repo: RepoArgs,

    /// Output format: text, json
    #[arg(long)]
    format: Option<OutputFormat>,
}

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate(args) => run_migrate(&args),
        Commands::Verify(args) => run_verify(&args),
        Commands::Scan(args) => run_scan(&args),
        Commands::Doctor(args) => run_doctor(&args),
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn run_migrate(args: &MigrateArgs) -> Result<()> {
    let mut config = build_config(&args.repo)?;
    // File config seeds the flags; CLI flags can only turn them on.
    config.dry_run |= args.dry_run;
    config.create_backup |= args.backup;
    config.overwrite_existing |= args.overwrite;

    let cancel = CancellationToken::new();
    let result = match args.on_problem {
        OnProblem::Ask => {
            let mut handler = ConsolePrompt;
            migrate::run(&config, &mut handler, &cancel)
        }
        OnProblem::Skip => {
            let mut handler = FixedDecision(Resolution::Skip);
            migrate::run(&config, &mut handler, &cancel)
        }
        OnProblem::Abort => {
            let mut handler = FixedDecision(Resolution::Abort);
            migrate::run(&config, &mut handler, &cancel)
        }
    };

    match args.format.unwrap_or_default() {
        OutputFormat::Json => println!("{}", OutputFormat::Json.serialize(&result)?),
        OutputFormat::Text => {
            println!("{}", result.summary());
            for warning in &result.warnings {
                println!("  warning: {warning}");
            }
            for problem in &result.problems {
                println!("  problem: {problem}");
            }
        }
    }

    match result.status {
        MigrationStatus::Failed => bail!(
            "migration failed{}",
            result
                .fail_reason
                .as_ref()
                .map_or_else(String::new, |r| format!(": {r}"))
        ),
        MigrationStatus::Cancelled => bail!("migration cancelled"),
        _ => Ok(()),
    }
}

fn run_verify(args: &VerifyArgs) -> Result<()> {
    let mut config = build_config(&args.repo)?;
    config.dry_run = true;

    let mut handler = FixedDecision(Resolution::Skip);
    let result = migrate::run(&config, &mut handler, &CancellationToken::new());

    let consistency_errors: Vec<&String> = result
        .warnings
        .iter()
        .filter(|w| w.starts_with("consistency: "))
        .collect();

    match args.format.unwrap_or_default() {
        OutputFormat::Json => println!("{}", OutputFormat::Json.serialize(&result)?),
        OutputFormat::Text => {
            println!("{}", result.summary());
            if !consistency_errors.is_empty() {
                println!();
                println!("consistency errors:");
                for error in &consistency_errors {
                    println!("  {}", error.trim_start_matches("consistency: "));
                }
            }
            let other: Vec<&String> = result
                .warnings
                .iter()
                .filter(|w| !w.starts_with("consistency: "))
                .collect();
            if !other.is_empty() {
                println!();
                println!("warnings:");
                for warning in other {
                    println!("  {warning}");
                }
            }
            if !result.problems.is_empty() {
                println!();
                println!("problems:");
                for problem in &result.problems {
                    println!("  {problem}");
                }
            }
        }
    }

    if result.status == MigrationStatus::Failed {
        bail!("verification failed to run");
    }
    if !result.problems.is_empty() || !consistency_errors.is_empty() {
        bail!(
            "verification found {} problem(s) and {} consistency error(s)",
            result.problems.len(),
            consistency_errors.len()
        );
    }
    Ok(())
}

fn run_scan(args: &ScanArgs) -> Result<()> {
    let config = build_config(&args.repo)?;
    let report = classify::scan(&config.source_root);

    match args.format.unwrap_or_default() {
        OutputFormat::Json => println!("{}", OutputFormat::Json.serialize(&report)?),
        OutputFormat::Text => {
            match &report.root {
                Some(root) => print_node(root, 0),
                None => println!("(empty: source root missing or not a directory)"),
            }
            println!();
            println!(
                "{} directories, {} files",
                report.counts.directories, report.counts.files
            );
        }
    }

    if report.root.is_none() {
        bail!("nothing to scan at {}", config.source_root.display());
    }
    Ok(())
}

fn print_node(node: &ScanNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let suffix = if node.kind.is_dir() { "/" } else { "" };
    println!("{indent}{}{suffix}  [{}]", node.name, node.kind.label());
    for child in &node.children {
        print_node(child, depth + 1);
    }
}

fn run_doctor(args: &DoctorArgs) -> Result<()> {
    let config = build_config(&args.repo)?;
    doctor::run(&config, args.format.unwrap_or_default())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

/// Merge the config file with CLI flags; flags win.
fn build_config(repo: &RepoArgs) -> Result<MigrationConfig> {
    let file = FileConfig::load(&repo.config)?;

    let Some(source) = repo.source.clone().or(file.migration.source) else {
        bail!("source root required: pass --source or set [migration].source in itsq.toml");
    };
    let target = repo
        .target
        .clone()
        .or(file.migration.target)
        .unwrap_or_else(|| default_target(&source));

    let mut config = MigrationConfig::new(source, target);
    config.create_backup = file.migration.create_backup;
    config.overwrite_existing = file.migration.overwrite_existing;
    config.dry_run = file.migration.dry_run;
    Ok(config)
}

/// `/data/itsq-old` → `/data/itsq-old-NEW`
fn default_target(source: &Path) -> PathBuf {
    source.file_name().map_or_else(
        || source.join("NEW"),
        |name| {
            let mut with_suffix = name.to_os_string();
            with_suffix.push("-NEW");
            source.with_file_name(with_suffix)
        },
    )
}
