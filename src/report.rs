//! Output formatting for scan results and parser status.
//!
//! Two formats:
//! - Pretty: colored terminal output for humans
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::Serialize;

use crate::detect::{Severity, Violation};
use crate::parser::StatusReport;
use crate::scan::{ScanResult, ScanSummary};

// =============================================================================
// JSON Format
// =============================================================================

#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub version: &'static str,
    pub paths: Vec<String>,
    pub summary: &'a ScanSummary,
    pub violations: Vec<&'a Violation>,
    pub files: Vec<JsonFile<'a>>,
}

/// One line per file in the JSON report.
#[derive(Debug, Serialize)]
pub struct JsonFile<'a> {
    pub path: String,
    pub language: &'static str,
    pub scanned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
    pub lines: usize,
    pub functions: usize,
    pub types: usize,
    pub complexity: u32,
}

/// Build the JSON document for a scan. Files and violations are sorted by
/// path so the output is stable across runs.
pub fn json_report<'a>(paths: &[String], summary: &'a ScanSummary, results: &'a [ScanResult]) -> JsonReport<'a> {
    let mut sorted: Vec<&ScanResult> = results.iter().collect();
    sorted.sort_by(|a, b| a.file.path.cmp(&b.file.path));

    let violations = sorted
        .iter()
        .flat_map(|r| r.violations.iter())
        .collect();

    let files = sorted
        .iter()
        .map(|r| JsonFile {
            path: r.file.path.to_string_lossy().to_string(),
            language: r.file.language.as_str(),
            scanned: r.file.scanned,
            tier: r.provenance().map(|t| t.as_str()),
            error: r.file.error.as_deref(),
            lines: r.file.lines,
            functions: r.metrics.function_count,
            types: r.metrics.type_count,
            complexity: r.metrics.complexity_score,
        })
        .collect();

    JsonReport {
        version: env!("CARGO_PKG_VERSION"),
        paths: paths.to_vec(),
        summary,
        violations,
        files,
    }
}

pub fn write_json(paths: &[String], summary: &ScanSummary, results: &[ScanResult]) -> anyhow::Result<()> {
    let report = json_report(paths, summary, results);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn write_status_json(report: &StatusReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write scan results in pretty (human-readable) format.
pub fn write_pretty(paths: &[String], summary: &ScanSummary, results: &[ScanResult]) {
    write_header();

    print!("  {}", "Scanning: ".dimmed());
    println!("{}", paths.join(", "));
    println!();

    write_summary(summary);
    println!();

    let mut violations: Vec<&Violation> = results.iter().flat_map(|r| r.violations.iter()).collect();
    violations.sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));
    if !violations.is_empty() {
        write_violations(&violations);
        println!();
    }

    if !summary.errors.is_empty() {
        println!("  {} ({}):", "Failed files".bold(), summary.errors.len());
        let mut errors = summary.errors.clone();
        errors.sort();
        for error in errors {
            println!("    {}", error.red());
        }
        println!();
    }

    write_final_status(summary);
    println!();
}

fn write_header() {
    println!();
    print!("  ");
    print!("{}", "tierscan".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();
}

fn write_summary(summary: &ScanSummary) {
    println!(
        "  Files: {} scanned, {} failed, {} total  {}",
        summary.scanned_files.to_string().green(),
        if summary.skipped_files > 0 {
            summary.skipped_files.to_string().red()
        } else {
            summary.skipped_files.to_string().normal()
        },
        summary.total_files,
        format!("({} ms)", summary.duration_ms).dimmed()
    );

    if !summary.files_by_tier.is_empty() {
        let tiers: Vec<String> = summary
            .files_by_tier
            .iter()
            .map(|(tier, count)| format!("{} {}", count, tier))
            .collect();
        println!("  {}", format!("Parsed by: {}", tiers.join(", ")).dimmed());
    }
}

fn write_violations(violations: &[&Violation]) {
    println!("  {} ({}):", "Violations".bold(), violations.len());
    println!();

    for v in violations {
        write_severity_tag(&v.severity);
        print!("   ");
        print!("{:<20}", v.rule.as_str().dimmed());
        print!("{}", v.file.blue());
        if v.line > 0 {
            print!("{}", format!(":{}", v.line).dimmed());
        }
        println!();
        println!("            {}", v.message);
        println!();
    }
}

fn write_severity_tag(severity: &Severity) {
    match severity {
        Severity::Error => print!("    {} ", "ERROR".red()),
        Severity::Warning => print!("    {} ", "WARN ".yellow()),
        Severity::Info => print!("    {} ", "INFO ".blue()),
    }
}

fn write_final_status(summary: &ScanSummary) {
    print!(
        "  {}",
        format!("Violations: {}", summary.total_violations).dimmed()
    );
    print!("  ");
    if summary.has_errors() {
        print!("{}", format!("FAILED ({} errors)", summary.error_violations).red());
    } else {
        print!("{}", "PASSED".green());
    }
    println!();
}

/// Write the parser status report in pretty format.
pub fn write_status_pretty(report: &StatusReport) {
    write_header();

    let tier = report.tier.as_str();
    let tier = if report.rust_available && report.fallback_reason.is_none() {
        tier.green().bold()
    } else if report.rust_available {
        tier.yellow().bold()
    } else {
        tier.red().bold()
    };
    println!("  Rust parser tier: {}", tier);
    println!(
        "  {}",
        format!("Accuracy: {}  Performance: {}", report.accuracy, report.performance).dimmed()
    );
    if let Some(reason) = &report.fallback_reason {
        println!("  {}", format!("Fallback reason: {}", reason).yellow());
    }
    println!(
        "  {}",
        format!(
            "Native backend compiled: {}",
            if report.native_compiled { "yes" } else { "no" }
        )
        .dimmed()
    );
    println!();

    let test = &report.self_test;
    if test.passed {
        print!("  {}", "✓ Self-test passed".green());
    } else {
        print!("  {}", "✗ Self-test failed".red());
    }
    println!(
        "  {}",
        format!(
            "({} functions, {} types, {:.2} ms)",
            test.functions_found, test.types_found, test.duration_ms
        )
        .dimmed()
    );
    if let Some(error) = &test.error {
        println!("    {}", error.red());
    }

    if let Some(memory) = &report.memory_state {
        match &memory.fault {
            None => println!("  {}", "✓ Native memory state healthy".green()),
            Some(fault) => println!("  {} {}", "✗ Native memory state:".red(), fault),
        }
        if let Some(stats) = &memory.stats {
            println!(
                "  {}",
                format!(
                    "Outstanding handles: {}  Idle parsers: {}",
                    stats.outstanding_handles, stats.idle_parsers
                )
                .dimmed()
            );
        }
    }
    println!();

    let d = &report.details;
    println!(
        "  Parses: {} attempted, {} succeeded, {} failed, {} fallbacks  {}",
        d.attempts,
        d.successes,
        d.failures,
        d.fallbacks,
        format!("({:.0}% success)", d.success_rate * 100.0).dimmed()
    );

    if !report.recent_errors.is_empty() {
        println!();
        println!("  {} ({}):", "Recent errors".bold(), report.recent_errors.len());
        for error in &report.recent_errors {
            println!("    {}", error.dimmed());
        }
    }

    if !report.recommendations.is_empty() {
        println!();
        println!("  {}", "Recommendations:".bold());
        for rec in &report.recommendations {
            println!("    - {}", rec);
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::analysis::{FileAst, Language, ParserTier};
    use crate::detect::ViolationRule;
    use crate::scan::{FileDescriptor, FileMetrics};

    fn result(path: &str, violations: usize) -> ScanResult {
        ScanResult {
            file: FileDescriptor {
                path: path.into(),
                language: Language::Rust,
                scanned: true,
                lines: 12,
                ..FileDescriptor::default()
            },
            ast: Some(Arc::new(FileAst::new(path, Language::Rust, ParserTier::Heuristic))),
            violations: (0..violations)
                .map(|i| Violation {
                    rule: ViolationRule::LongFunction,
                    message: "too long".to_string(),
                    file: path.to_string(),
                    line: i + 1,
                    severity: Severity::Warning,
                })
                .collect(),
            metrics: FileMetrics {
                function_count: 2,
                ..FileMetrics::default()
            },
        }
    }

    #[test]
    fn test_json_report_sorted_and_serializable() {
        let results = vec![result("b.rs", 1), result("a.rs", 2)];
        let summary = ScanSummary::from_results(&results, 0, 3);
        let report = json_report(&["src".to_string()], &summary, &results);

        assert_eq!(report.files[0].path, "a.rs");
        assert_eq!(report.files[0].tier, Some("heuristic"));
        assert_eq!(report.violations.len(), 3);
        assert_eq!(report.violations[0].file, "a.rs");

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["summary"]["total_violations"], 3);
        assert_eq!(json["files"][1]["functions"], 2);
        assert_eq!(json["violations"][2]["rule"], "long_function");
        assert!(json["files"][0].get("error").is_none());
    }
}
