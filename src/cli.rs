//! Command-line interface for tierscan.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{self, Config};
use crate::parser::{self, ManagerOptions, TierManager};
use crate::report;
use crate::scan::Engine;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Scan Go and Rust sources for complexity and duplication.
///
/// Go files are parsed with an in-process grammar. Rust files go through a
/// tiered parser that falls back from the native grammar to a heuristic
/// parser when the native backend is unavailable or fails on a file.
#[derive(Parser)]
#[command(name = "tierscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: auto-discover)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan files and directories
    Scan(ScanArgs),
    /// Report which Rust parser tier is active and how healthy it is
    Status(StatusArgs),
}

/// Arguments for the scan command.
#[derive(Parser)]
pub struct ScanArgs {
    /// Paths to scan (files or directories)
    #[arg(default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Glob pattern to exclude (repeatable)
    #[arg(short, long)]
    pub exclude: Vec<String>,

    /// Include test files (`_test.go`, `tests/`)
    #[arg(long)]
    pub include_tests: bool,

    /// Worker threads (default: available parallelism)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Skip files larger than this, e.g. "2MB"
    #[arg(long)]
    pub max_file_size: Option<String>,

    /// Do not use the native Rust parser
    #[arg(long)]
    pub no_native: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Arguments for the status command.
#[derive(Parser)]
pub struct StatusArgs {
    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Report as if the native Rust parser were unavailable
    #[arg(long)]
    pub no_native: bool,
}

fn validate_format(format: &str) -> bool {
    if format != "pretty" && format != "json" {
        eprintln!("Error: invalid format {:?}, must be 'pretty' or 'json'", format);
        return false;
    }
    true
}

/// Merge CLI flags over the loaded configuration.
fn apply_overrides(config: &mut Config, args: &ScanArgs) -> anyhow::Result<()> {
    config.scan.exclude.extend(args.exclude.iter().cloned());
    if args.include_tests {
        config.scan.include_tests = true;
    }
    if let Some(workers) = args.workers {
        config.scan.workers = workers;
    }
    if let Some(size) = &args.max_file_size {
        config.scan.max_file_size = config::parse_size(size)?;
    }
    if args.no_native {
        config.parser.disable_native = true;
    }
    config.validate()
}

fn progress_bar(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template("  {spinner} [{bar:30}] {pos}/{len} {wide_msg}")
        .map(|s| s.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

/// Run the scan command.
pub fn run_scan(cli_config: Option<&PathBuf>, args: &ScanArgs) -> anyhow::Result<i32> {
    if !validate_format(&args.format) {
        return Ok(EXIT_ERROR);
    }

    let (mut config, config_path) = match Config::load(cli_config.map(|p| p.as_path())) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };
    if let Err(e) = apply_overrides(&mut config, args) {
        eprintln!("Error: {:#}", e);
        return Ok(EXIT_ERROR);
    }
    if let Some(path) = &config_path {
        tracing::info!(path = %path.display(), "loaded config");
    }

    for path in &args.paths {
        if !path.exists() {
            eprintln!("Error: cannot access path {:?}", path);
            return Ok(EXIT_ERROR);
        }
    }

    let engine = Engine::new(args.paths.clone(), config)?;

    let bar = progress_bar(args.no_progress || args.format == "json");
    let (summary, results) = engine.scan_with_progress(|p| {
        bar.set_length(p.total as u64);
        bar.set_position(p.completed as u64);
        bar.set_message(p.current.display().to_string());
    })?;
    bar.finish_and_clear();

    if summary.total_files == 0 {
        eprintln!("Warning: no files to scan");
        return Ok(EXIT_SUCCESS);
    }

    let paths: Vec<String> = args
        .paths
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect();
    match args.format.as_str() {
        "json" => report::write_json(&paths, &summary, &results)?,
        _ => report::write_pretty(&paths, &summary, &results),
    }

    engine.release_results(results);
    parser::cleanup_global_manager();

    if summary.has_errors() {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Run the status command.
pub fn run_status(cli_config: Option<&PathBuf>, args: &StatusArgs) -> anyhow::Result<i32> {
    if !validate_format(&args.format) {
        return Ok(EXIT_ERROR);
    }

    let (config, _) = match Config::load(cli_config.map(|p| p.as_path())) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let options = ManagerOptions {
        disable_native: config.parser.disable_native || args.no_native,
        ..config.parser.manager_options()
    };
    let manager = TierManager::with_options(options);
    let status = parser::status_report(&manager);
    manager.cleanup();

    match args.format.as_str() {
        "json" => report::write_status_json(&status)?,
        _ => report::write_status_pretty(&status),
    }

    if status.self_test.passed {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_scan() {
        let cli = Cli::parse_from([
            "tierscan",
            "-v",
            "scan",
            "src",
            "pkg",
            "--exclude",
            "gen/**",
            "--workers",
            "3",
            "--max-file-size",
            "1MB",
            "--no-native",
        ]);
        assert!(cli.verbose);
        let Commands::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(args.paths, vec![PathBuf::from("src"), PathBuf::from("pkg")]);

        let mut config = Config::default();
        apply_overrides(&mut config, &args).unwrap();
        assert_eq!(config.scan.exclude, vec!["gen/**"]);
        assert_eq!(config.scan.workers, 3);
        assert_eq!(config.scan.max_file_size, 1024 * 1024);
        assert!(config.parser.disable_native);
    }

    #[test]
    fn test_scan_defaults_to_cwd() {
        let cli = Cli::parse_from(["tierscan", "scan"]);
        let Commands::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(args.paths, vec![PathBuf::from(".")]);
        assert_eq!(args.format, "pretty");
    }

    #[test]
    fn test_bad_size_override() {
        let cli = Cli::parse_from(["tierscan", "scan", "--max-file-size", "lots"]);
        let Commands::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert!(apply_overrides(&mut Config::default(), &args).is_err());
    }

    #[test]
    fn test_invalid_format() {
        assert!(validate_format("json"));
        assert!(!validate_format("sarif"));
    }
}
