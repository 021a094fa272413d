// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! One harness run, from sandbox preparation to the summary line.

use anyhow::{Context, Result};
use harness_core::{save_trace, Executor, OsBackend, RunContext, Sandbox, SavedTrace, Workload};
use harness_kcov::{write_coverage, Coverage, KcovConfig};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub sandbox_root: PathBuf,
    pub sandbox_mode: u32,
    /// `None` runs without touching the kcov device.
    pub coverage: Option<KcovConfig>,
    pub coverage_output: Option<PathBuf>,
    pub trace_output: PathBuf,
    pub workload: Workload,
}

#[derive(Debug)]
pub struct RunReport {
    pub trace: SavedTrace,
    pub successes: usize,
    pub failures: usize,
    pub coverage_addresses: usize,
}

/// Execute a run, writing coverage (unless redirected) and the summary to `out`.
///
/// Any error returned here is fatal for the process.
pub fn execute<W: Write>(settings: &RunSettings, out: &mut W) -> Result<RunReport> {
    let (sandbox, _) = Sandbox::prepare(&settings.sandbox_root, settings.sandbox_mode)
        .context("preparing sandbox")?;

    info!("setting up kcov");
    let mut coverage = match &settings.coverage {
        Some(kcov) => Coverage::attach(kcov).context("setting up kcov")?,
        None => {
            info!("coverage disabled");
            Coverage::disabled()
        }
    };
    coverage.enable().context("enabling kcov")?;

    info!(operations = settings.workload.ops.len(), "running workload");
    let mut ctx = RunContext::new(sandbox);
    let mut executor = Executor::new(&mut ctx, OsBackend);
    settings
        .workload
        .replay(&mut executor)
        .context("replaying workload")?;

    info!(active = coverage.is_active(), "collecting coverage");
    let addresses = coverage.collect();
    emit_coverage(&addresses, settings, out)?;
    for err in coverage.detach() {
        error!(error = %err, "kcov teardown failed");
    }

    info!(output = %settings.trace_output.display(), "dumping trace");
    let recorder = ctx.recorder();
    let trace = save_trace(recorder, &settings.trace_output).context("dumping trace")?;
    writeln!(out, "==> trace dump saved at '{}'", trace.path.display())?;

    let report = RunReport {
        trace,
        successes: recorder.success_count(),
        failures: recorder.failure_count(),
        coverage_addresses: addresses.len(),
    };
    info!(
        successes = report.successes,
        failures = report.failures,
        coverage = report.coverage_addresses,
        trace = %report.trace.path.display(),
        "run summary"
    );
    writeln!(
        out,
        "#SUCCESS: {} | #FAILURE: {}",
        report.successes, report.failures
    )?;
    out.flush()?;
    Ok(report)
}

fn emit_coverage<W: Write>(addresses: &[u64], settings: &RunSettings, out: &mut W) -> Result<()> {
    match &settings.coverage_output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating coverage output {}", path.display()))?;
            write_coverage(addresses, &mut BufWriter::new(file))
                .with_context(|| format!("writing coverage output {}", path.display()))
        }
        None => write_coverage(addresses, out).context("writing coverage"),
    }
}
