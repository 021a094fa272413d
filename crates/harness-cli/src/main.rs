// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

mod run;

use anyhow::{Context, Result};
use clap::Parser;
use harness_config::HarnessConfig;
use harness_core::Workload;
use harness_kcov::KcovConfig;
use harness_logging::CliLoggingArgs;
use std::io;
use std::path::PathBuf;

use crate::run::RunSettings;

#[derive(Parser, Debug)]
#[command(
    name = "fs-harness",
    author,
    version,
    about = "Replay a filesystem workload inside a sandbox, recording a trace and kernel coverage"
)]
struct Cli {
    /// Sandbox root; every workload path is resolved under it
    sandbox: PathBuf,

    /// JSON workload to replay (an empty workload runs when omitted)
    #[arg(long, env = "FS_HARNESS_WORKLOAD")]
    workload: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, env = "FS_HARNESS_CONFIG")]
    config: Option<PathBuf>,

    /// Permission bits for the sandbox root, in octal
    #[arg(long, env = "FS_HARNESS_SANDBOX_MODE", value_parser = parse_octal_mode)]
    sandbox_mode: Option<u32>,

    /// Where to write the trace CSV
    #[arg(long, env = "FS_HARNESS_TRACE_OUTPUT")]
    trace_output: Option<PathBuf>,

    /// kcov device to attach to
    #[arg(long, env = "FS_HARNESS_COVERAGE_DEVICE")]
    coverage_device: Option<PathBuf>,

    /// Coverage buffer capacity in slots
    #[arg(long, env = "FS_HARNESS_COVER_SIZE")]
    cover_size: Option<usize>,

    /// Run without attaching to kcov
    #[arg(long)]
    no_coverage: bool,

    /// Write coverage addresses to this file instead of stdout
    #[arg(long)]
    coverage_output: Option<PathBuf>,

    #[command(flatten)]
    logging: CliLoggingArgs,
}

fn parse_octal_mode(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    u32::from_str_radix(digits, 8).map_err(|e| format!("invalid octal mode '{s}': {e}"))
}

impl Cli {
    /// Layer CLI flags and environment over the config file.
    fn into_settings(self, config: HarnessConfig) -> Result<RunSettings> {
        let workload = match &self.workload {
            Some(path) => Workload::from_json_file(path)
                .with_context(|| format!("loading workload {}", path.display()))?,
            None => Workload::default(),
        };

        let coverage = (!self.no_coverage && config.coverage.enabled).then(|| KcovConfig {
            device: self.coverage_device.unwrap_or(config.coverage.device),
            cover_size: self.cover_size.unwrap_or(config.coverage.cover_size),
        });

        Ok(RunSettings {
            sandbox_root: self.sandbox,
            sandbox_mode: self.sandbox_mode.unwrap_or(config.sandbox.mode),
            coverage,
            coverage_output: self.coverage_output,
            trace_output: self.trace_output.unwrap_or(config.trace.output),
            workload,
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.logging.clone().init("fs-harness")?;

    let config = HarnessConfig::load_or_default(cli.config.as_deref())?;
    let settings = cli.into_settings(config)?;

    run::execute(&settings, &mut io::stdout().lock())?;
    Ok(())
}
