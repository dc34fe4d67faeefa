//! callcheck - Voice Gateway Acceptance Test Result Analyzer CLI
//!
//! Points the analysis engine at the caller and callee event logs, the
//! recognition grammar and the wav-to-property map, then writes the
//! aggregate report and, optionally, a machine-readable JSON summary.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use callcheck_core::{init_tracing, Analyzer};

#[derive(Parser)]
#[command(name = "callcheck")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Analyze voice-gateway acceptance test results", long_about = None)]
struct Cli {
    /// Path to the caller-side event log
    #[arg(long)]
    caller_log: PathBuf,

    /// Path to the callee-side event log
    #[arg(long)]
    callee_log: PathBuf,

    /// Path to the recognition grammar XML
    #[arg(long)]
    grammar: PathBuf,

    /// Path to the wav-file-to-property map file
    #[arg(long)]
    map_file: PathBuf,

    /// Directory holding the per-iteration recorded wav files
    #[arg(long)]
    results_dir: PathBuf,

    /// Report destination (default: GatewayTestResults.txt in the results
    /// directory)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Also write the run summary as JSON to this path
    #[arg(long)]
    json_summary: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    let report_path = cli
        .report
        .unwrap_or_else(|| cli.results_dir.join("GatewayTestResults.txt"));

    let analyzer = Analyzer::open(
        &cli.caller_log,
        &cli.callee_log,
        &cli.grammar,
        &cli.map_file,
        &cli.results_dir,
    )
    .context("Failed to open analysis inputs")?;

    let report_file = File::create(&report_path)
        .with_context(|| format!("Failed to create report file: {:?}", report_path))?;
    let mut sink = BufWriter::new(report_file);

    let summary = analyzer.run(&mut sink).context("Analysis run failed")?;
    sink.flush().context("Failed to flush report file")?;
    info!(
        total = summary.total_iterations,
        passed = summary.passed,
        failed = summary.failed,
        report = %report_path.display(),
        "analysis complete"
    );

    if let Some(path) = cli.json_summary {
        let json = serde_json::to_string_pretty(&summary)
            .context("Failed to serialize run summary")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write summary to {:?}", path))?;
    }

    Ok(())
}
