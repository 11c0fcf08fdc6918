// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # GeoFlow CLI Entry Point
//!
//! Parses the command line, installs logging, loads the job file, and
//! hands control to the pipeline driver. On completion without abort the
//! sinks have flushed and the process exits 0; an aborted job exits 1
//! with the aggregated error log already emitted; a usage or job-file
//! problem exits 2.

use anyhow::Context;
use geoflow::application::{JobOutcome, JobSpec, PipelineDriver};
use geoflow_bootstrap::{init_logging, Cli, ExitCode};
use geoflow_domain::entities::DataFlow;
use tracing::{error, info};

fn run(cli: &Cli) -> Result<JobOutcome, anyhow::Error> {
    let spec = JobSpec::from_file(&cli.job)
        .with_context(|| format!("loading job file {}", cli.job.display()))?;
    let mut driver = PipelineDriver::from_spec(&spec).context("building the pipeline")?;

    if cli.validate {
        info!("Job file is valid: {} stage(s)", driver.stage_ids().len());
        return Ok(JobOutcome::Completed);
    }

    let mut flow = DataFlow::new();
    Ok(driver.run(&mut flow))
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.log_level.as_deref());

    match run(&cli) {
        Ok(JobOutcome::Completed) => ExitCode::Success.into(),
        Ok(JobOutcome::Aborted) => {
            error!("Job aborted");
            ExitCode::JobAborted.into()
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::UsageError.into()
        }
    }
}
