// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface
//!
//! Argument parsing for the `geoflow` binary. Kept in the bootstrap crate
//! so the application layer never touches `clap` directly.

use std::path::PathBuf;

use clap::Parser;

/// GeoFlow - group-at-a-time streaming pipeline for 3D seismic volumes.
#[derive(Debug, Parser)]
#[command(name = "geoflow", version, about)]
pub struct Cli {
    /// Path to the YAML job file describing the pipeline.
    pub job: PathBuf,

    /// Log level filter (error, warn, info, debug, trace).
    /// Overrides the GEOFLOW_LOG environment variable.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Parse and validate the job file without running any stage.
    #[arg(long)]
    pub validate: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_invocation() {
        let cli = Cli::try_parse_from(["geoflow", "job.yaml"]).unwrap();
        assert_eq!(cli.job, PathBuf::from("job.yaml"));
        assert!(cli.log_level.is_none());
        assert!(!cli.validate);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from(["geoflow", "job.yaml", "--log-level", "debug", "--validate"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(cli.validate);
    }

    #[test]
    fn test_job_path_is_required() {
        assert!(Cli::try_parse_from(["geoflow"]).is_err());
    }
}
