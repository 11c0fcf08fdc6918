// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Job Specification
//!
//! The YAML job file: an ordered list of stages, each naming its module,
//! an optional id, and the module's config subtree. The driver hands each
//! stage its config re-serialized as a standalone text blob, so stages
//! parse exactly what a hand-written per-module file would contain.
//!
//! ```yaml
//! pipeline:
//!   - module: gendata
//!     config:
//!       gendata:
//!         maxtime: 20
//!         ...
//!   - module: output
//!     id: sink
//!     config:
//!       output:
//!         url: out.gfv
//! ```

use std::path::Path;

use geoflow_domain::PipelineError;
use serde::Deserialize;

/// One stage entry of a job file.
#[derive(Debug, Clone, Deserialize)]
pub struct StageSpec {
    pub module: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub config: serde_yaml::Value,
}

impl StageSpec {
    /// The stage's config subtree as a standalone YAML text blob.
    pub fn config_text(&self) -> Result<String, PipelineError> {
        if self.config.is_null() {
            return Ok("{}".to_string());
        }
        serde_yaml::to_string(&self.config).map_err(|e| PipelineError::SerializationError(e.to_string()))
    }
}

/// A whole parsed job file.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    pub pipeline: Vec<StageSpec>,
}

impl JobSpec {
    /// Parses a job specification from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, PipelineError> {
        let spec: JobSpec = serde_yaml::from_str(text)
            .map_err(|e| PipelineError::InvalidConfiguration(format!("Failed to parse job file: {}", e)))?;
        if spec.pipeline.is_empty() {
            return Err(PipelineError::InvalidConfiguration(
                "Job file declares no pipeline stages".to_string(),
            ));
        }
        Ok(spec)
    }

    /// Reads and parses a job file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&text)
    }
}
