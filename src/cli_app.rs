//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use share_warden::cleanup::walker::TreeWalk;
use share_warden::cleanup::{CleanupOptions, CleanupReport, run_cleanup};
use share_warden::core::config::Config;
use share_warden::core::errors::SwdError;
use share_warden::core::paths::resolve_absolute_path;
use share_warden::lock::manager::{LockOutcome, UnlockOutcome, lock, unlock};
use share_warden::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
use share_warden::share::ShareLayout;
use share_warden::share::discovery::{effective_shares, share_of};

/// Share Warden — hardlink lock keeper and retention cleaner for SMB shares.
#[derive(Debug, Parser)]
#[command(
    name = "swd",
    author,
    version,
    about = "Share Warden - hardlink lock keeper and retention cleaner",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Lock files by hardlinking them into their share's store.
    Lock(TargetArgs),
    /// Unlock files by removing their store hardlinks.
    Unlock(TargetArgs),
    /// Repair store consistency, then delete stale unlocked files.
    Cleanup(CleanupArgs),
    /// List managed shares and their store directories.
    Shares(SharesArgs),
    /// View and validate configuration state.
    Config(ConfigArgs),
    /// Show version and optional build metadata.
    Version(VersionArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Serialize)]
struct TargetArgs {
    /// Files or directories inside a managed share. A directory applies the
    /// operation to every regular file beneath it.
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct CleanupArgs {
    /// Share root to clean (falls back to the configured share set).
    #[arg(value_name = "SHARE")]
    share: Option<PathBuf>,
    /// Days component of the retention threshold.
    #[arg(short = 'd', long, value_name = "DAYS")]
    days: Option<u64>,
    /// Minutes component, added to the days.
    #[arg(short = 'm', long, value_name = "MINUTES")]
    minutes: Option<u64>,
    /// Report what would be restored/deleted without touching the tree.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct SharesArgs {}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand, Serialize)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct VersionArgs {
    /// Include additional build metadata fields.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Lock(args) => run_targets(cli, args, LockDirection::Lock),
        Command::Unlock(args) => run_targets(cli, args, LockDirection::Unlock),
        Command::Cleanup(args) => run_cleanup_cmd(cli, args),
        Command::Shares(args) => run_shares(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Version(args) => emit_version(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// lock / unlock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockDirection {
    Lock,
    Unlock,
}

impl LockDirection {
    const fn verb(self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Unlock => "unlock",
        }
    }
}

/// Outcome of one lock/unlock target, for reporting.
#[derive(Debug, Serialize)]
struct TargetOutcome {
    path: String,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn run_targets(cli: &Cli, args: &TargetArgs, direction: LockDirection) -> Result<(), CliError> {
    let config =
        Config::load(cli.config.as_deref()).map_err(|e| CliError::Runtime(e.to_string()))?;
    let roots = effective_shares(&config).map_err(|e| CliError::Runtime(e.to_string()))?;
    let mut logger = open_logger(&config);

    let mut outcomes: Vec<TargetOutcome> = Vec::new();
    let mut failed = 0_usize;

    for target in &args.files {
        let Some((root, rel)) = share_of(target, &roots) else {
            failed += 1;
            outcomes.push(TargetOutcome {
                path: target.display().to_string(),
                outcome: "failed",
                error: Some("not inside a managed share".to_string()),
            });
            continue;
        };
        let layout = match ShareLayout::new(&root) {
            Ok(layout) => layout,
            Err(e) => {
                failed += 1;
                outcomes.push(TargetOutcome {
                    path: target.display().to_string(),
                    outcome: "failed",
                    error: Some(e.to_string()),
                });
                continue;
            }
        };

        let absolute = layout.share_root().join(&rel);
        if absolute.is_dir() {
            // Directory target: apply to every regular file beneath it.
            apply_to_tree(
                &layout,
                &rel,
                &absolute,
                direction,
                &mut logger,
                &mut outcomes,
                &mut failed,
            );
        } else {
            apply_to_file(
                &layout,
                &rel,
                direction,
                &mut logger,
                &mut outcomes,
                &mut failed,
            );
        }
    }

    logger.flush();
    report_targets(cli, direction, &outcomes)?;

    if failed > 0 {
        Err(CliError::Partial(format!(
            "{failed} of {} {} targets failed",
            outcomes.len(),
            direction.verb()
        )))
    } else {
        Ok(())
    }
}

fn apply_to_tree(
    layout: &ShareLayout,
    rel_dir: &Path,
    absolute_dir: &Path,
    direction: LockDirection,
    logger: &mut JsonlWriter,
    outcomes: &mut Vec<TargetOutcome>,
    failed: &mut usize,
) {
    let walk = match TreeWalk::new(absolute_dir) {
        Ok(walk) => walk,
        Err(e) => {
            *failed += 1;
            outcomes.push(TargetOutcome {
                path: absolute_dir.display().to_string(),
                outcome: "failed",
                error: Some(e.to_string()),
            });
            return;
        }
    };

    for item in walk {
        match item {
            Ok(entry) => {
                let rel = rel_dir.join(&entry.rel_path);
                apply_to_file(layout, &rel, direction, logger, outcomes, failed);
            }
            Err(e) => {
                *failed += 1;
                outcomes.push(TargetOutcome {
                    path: absolute_dir.display().to_string(),
                    outcome: "failed",
                    error: Some(e.to_string()),
                });
            }
        }
    }
}

fn apply_to_file(
    layout: &ShareLayout,
    rel: &Path,
    direction: LockDirection,
    logger: &mut JsonlWriter,
    outcomes: &mut Vec<TargetOutcome>,
    failed: &mut usize,
) {
    let display = layout.share_root().join(rel).display().to_string();
    let result: Result<&'static str, SwdError> = match direction {
        LockDirection::Lock => lock(layout, rel).map(|outcome| match outcome {
            LockOutcome::Locked => "locked",
            LockOutcome::AlreadyLocked => "already locked",
        }),
        LockDirection::Unlock => unlock(layout, rel).map(|outcome| match outcome {
            UnlockOutcome::Unlocked => "unlocked",
            UnlockOutcome::NotLocked => "not locked",
        }),
    };

    match result {
        Ok(outcome) => {
            let event = match direction {
                LockDirection::Lock => EventType::FileLocked,
                LockDirection::Unlock => EventType::FileUnlocked,
            };
            logger.write_entry(
                &LogEntry::new(event, Severity::Info)
                    .share(layout.share_root())
                    .path(rel),
            );
            outcomes.push(TargetOutcome {
                path: display,
                outcome,
                error: None,
            });
        }
        Err(e) => {
            *failed += 1;
            logger.write_entry(
                &LogEntry::new(EventType::Error, Severity::Warning)
                    .share(layout.share_root())
                    .path(rel)
                    .error(&e),
            );
            outcomes.push(TargetOutcome {
                path: display,
                outcome: "failed",
                error: Some(e.to_string()),
            });
        }
    }
}

fn report_targets(
    cli: &Cli,
    direction: LockDirection,
    outcomes: &[TargetOutcome],
) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            for outcome in outcomes {
                if let Some(error) = &outcome.error {
                    eprintln!("  {} {}: {error}", "failed".red(), outcome.path);
                } else if !cli.quiet {
                    println!("  {} {}", outcome.outcome.green(), outcome.path);
                }
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": direction.verb(),
                "targets": outcomes,
                "failed": outcomes.iter().filter(|o| o.error.is_some()).count(),
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// cleanup
// ---------------------------------------------------------------------------

fn run_cleanup_cmd(cli: &Cli, args: &CleanupArgs) -> Result<(), CliError> {
    let config =
        Config::load(cli.config.as_deref()).map_err(|e| CliError::Runtime(e.to_string()))?;
    let mut logger = open_logger(&config);

    let days = args.days.unwrap_or(config.retention.days);
    let minutes = args.minutes.unwrap_or(config.retention.minutes);
    let options = CleanupOptions {
        threshold: Duration::from_secs(days * 86_400 + minutes * 60),
        dry_run: args.dry_run || config.cleanup.dry_run,
    };

    // An explicit SHARE argument cleans exactly that share; otherwise the
    // whole configured share set is cleaned in turn.
    let (shares, explicit) = match &args.share {
        Some(share) => (vec![resolve_absolute_path(share)], true),
        None => (
            effective_shares(&config).map_err(|e| CliError::Runtime(e.to_string()))?,
            false,
        ),
    };

    let mut reports: Vec<CleanupReport> = Vec::new();
    let mut fatal: Vec<String> = Vec::new();

    for share in &shares {
        let layout = match ShareLayout::new(share) {
            Ok(layout) => layout,
            Err(e) => {
                if explicit {
                    return Err(CliError::User(e.to_string()));
                }
                fatal.push(format!("{}: {e}", share.display()));
                continue;
            }
        };
        match run_cleanup(&layout, &options) {
            Ok(report) => {
                log_cleanup(&mut logger, &layout, &report);
                reports.push(report);
            }
            // Inaccessible share root is fatal for that share; with an
            // explicit target that means the whole invocation.
            Err(e) => {
                logger.write_entry(
                    &LogEntry::new(EventType::Error, Severity::Critical)
                        .share(layout.share_root())
                        .error(&e),
                );
                if explicit {
                    logger.flush();
                    return Err(CliError::Runtime(e.to_string()));
                }
                fatal.push(format!("{}: {e}", share.display()));
            }
        }
    }

    logger.flush();
    report_cleanup(cli, &options, &reports, &fatal)?;

    let failures = reports.iter().filter(|r| r.has_failures()).count() + fatal.len();
    if failures > 0 {
        Err(CliError::Partial(format!(
            "cleanup finished with failures on {failures} of {} shares",
            shares.len()
        )))
    } else {
        Ok(())
    }
}

fn log_cleanup(logger: &mut JsonlWriter, layout: &ShareLayout, report: &CleanupReport) {
    for rel in &report.repair.restored {
        logger.write_entry(
            &LogEntry::new(EventType::FileRestored, Severity::Info)
                .share(layout.share_root())
                .path(rel),
        );
    }
    for rel in &report.repair.conflicts {
        logger.write_entry(
            &LogEntry::new(EventType::LockConflict, Severity::Warning)
                .share(layout.share_root())
                .path(rel),
        );
    }
    for rel in &report.sweep.deleted {
        logger.write_entry(
            &LogEntry::new(EventType::FileDeleted, Severity::Info)
                .share(layout.share_root())
                .path(rel),
        );
    }
    let mut summary =
        LogEntry::new(EventType::CleanupComplete, Severity::Info).share(layout.share_root());
    summary.restored = Some(report.repair.restored.len());
    summary.deleted = Some(report.sweep.deleted.len());
    summary.bytes_freed = Some(report.sweep.bytes_freed);
    summary.conflicts = Some(report.repair.conflicts.len());
    summary.dry_run = Some(report.sweep.dry_run);
    logger.write_entry(&summary);
}

fn report_cleanup(
    cli: &Cli,
    options: &CleanupOptions,
    reports: &[CleanupReport],
    fatal: &[String],
) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            for report in reports {
                print_cleanup_summary(cli, report);
            }
            for failure in fatal {
                eprintln!("  {} {failure}", "error".red());
            }
        }
        OutputMode::Json => {
            let shares: Vec<Value> = reports.iter().map(cleanup_report_json).collect();
            let payload = json!({
                "command": "cleanup",
                "dry_run": options.dry_run,
                "threshold_seconds": options.threshold.as_secs(),
                "shares": shares,
                "fatal": fatal,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_cleanup_summary(cli: &Cli, report: &CleanupReport) {
    let prefix = if report.sweep.dry_run {
        "[dry-run] "
    } else {
        ""
    };
    println!(
        "{prefix}{}: restored {}, deleted {} ({}), {} locked kept, {} fresh kept",
        report.share_root.display(),
        report.repair.restored.len(),
        report.sweep.deleted.len(),
        format_bytes(report.sweep.bytes_freed),
        report.sweep.retained_locked,
        report.sweep.retained_fresh,
    );
    if cli.verbose {
        for rel in &report.repair.restored {
            println!("  {} {}", "restored".green(), rel.display());
        }
        for rel in &report.sweep.deleted {
            println!("  {} {}", "deleted".yellow(), rel.display());
        }
    }
    for rel in &report.repair.conflicts {
        eprintln!(
            "  {} {}: share and store hold different inodes",
            "conflict".red(),
            rel.display()
        );
    }
    for failure in report
        .repair
        .failures
        .iter()
        .chain(report.sweep.failures.iter())
    {
        eprintln!(
            "  {} {} [{}]: {}",
            "failed".red(),
            failure.path.display(),
            failure.error_code,
            failure.error
        );
    }
}

fn cleanup_report_json(report: &CleanupReport) -> Value {
    let failures: Vec<Value> = report
        .repair
        .failures
        .iter()
        .chain(report.sweep.failures.iter())
        .map(|f| {
            json!({
                "path": f.path.display().to_string(),
                "error": f.error,
                "error_code": f.error_code,
                "retryable": f.retryable,
            })
        })
        .collect();
    json!({
        "share": report.share_root.display().to_string(),
        "store_files_seen": report.repair.store_files_seen,
        "share_files_seen": report.sweep.share_files_seen,
        "restored": report.repair.restored,
        "conflicts": report.repair.conflicts,
        "deleted": report.sweep.deleted,
        "bytes_freed": report.sweep.bytes_freed,
        "retained_locked": report.sweep.retained_locked,
        "retained_fresh": report.sweep.retained_fresh,
        "skipped_races": report.sweep.skipped_races,
        "failures": failures,
    })
}

// ---------------------------------------------------------------------------
// shares / config / version
// ---------------------------------------------------------------------------

fn run_shares(cli: &Cli, _args: &SharesArgs) -> Result<(), CliError> {
    let config =
        Config::load(cli.config.as_deref()).map_err(|e| CliError::Runtime(e.to_string()))?;
    let roots = effective_shares(&config).map_err(|e| CliError::Runtime(e.to_string()))?;

    let mut entries: Vec<Value> = Vec::new();
    for root in &roots {
        match ShareLayout::new(root) {
            Ok(layout) => {
                let store_exists = layout.store_root().is_dir();
                if output_mode(cli) == OutputMode::Human {
                    let marker = if store_exists { "" } else { " (no store yet)" };
                    println!(
                        "{}  ->  {}{marker}",
                        layout.share_root().display(),
                        layout.store_root().display()
                    );
                } else {
                    entries.push(json!({
                        "share": layout.share_root().display().to_string(),
                        "store": layout.store_root().display().to_string(),
                        "store_exists": store_exists,
                    }));
                }
            }
            Err(e) => {
                if output_mode(cli) == OutputMode::Human {
                    eprintln!("  {} {}: {e}", "invalid".red(), root.display());
                } else {
                    entries.push(json!({
                        "share": root.display().to_string(),
                        "error": e.to_string(),
                    }));
                }
            }
        }
    }

    if output_mode(cli) == OutputMode::Json {
        write_json_line(&json!({ "command": "shares", "shares": entries }))?;
    }
    Ok(())
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match args.command.as_ref().unwrap_or(&ConfigCommand::Show) {
        ConfigCommand::Path => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(Config::default_path);
            match output_mode(cli) {
                OutputMode::Human => println!("{}", path.display()),
                OutputMode::Json => write_json_line(&json!({
                    "command": "config path",
                    "path": path.display().to_string(),
                }))?,
            }
            Ok(())
        }
        ConfigCommand::Show => {
            let config =
                Config::load(cli.config.as_deref()).map_err(|e| CliError::Runtime(e.to_string()))?;
            match output_mode(cli) {
                OutputMode::Human => {
                    let rendered = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Internal(e.to_string()))?;
                    print!("{rendered}");
                }
                OutputMode::Json => {
                    let value = serde_json::to_value(&config)?;
                    write_json_line(&json!({ "command": "config show", "config": value }))?;
                }
            }
            Ok(())
        }
        ConfigCommand::Validate => match Config::load(cli.config.as_deref()) {
            Ok(_) => {
                match output_mode(cli) {
                    OutputMode::Human => println!("configuration is valid"),
                    OutputMode::Json => write_json_line(&json!({
                        "command": "config validate",
                        "valid": true,
                    }))?,
                }
                Ok(())
            }
            Err(e) => Err(CliError::User(e.to_string())),
        },
    }
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("swd {version}");
            if args.verbose {
                println!("package: {package}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "swd",
                "version": version,
                "package": package,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// output plumbing
// ---------------------------------------------------------------------------

fn open_logger(config: &Config) -> JsonlWriter {
    if config.paths.jsonl_log.as_os_str().is_empty() {
        return JsonlWriter::disabled();
    }
    JsonlWriter::open(JsonlConfig {
        path: config.paths.jsonl_log.clone(),
        ..JsonlConfig::default()
    })
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("SWD_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        Some("auto") | None => fallback,
        Some(_) => fallback,
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

// ---------------------------------------------------------------------------
// tests
// ---------------------------------------------------------------------------
