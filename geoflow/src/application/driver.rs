// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Driver
//!
//! The pull-driven loop over primary keys. The driver materializes every
//! stage from the job spec, then:
//!
//! 1. calls `init` in pipeline order exactly once each - an error logs
//!    with the stage id, aborts the job and skips every remaining `init`;
//! 2. runs rounds of `process` in order while neither the finished nor
//!    the aborted flag is set - each round moves one group through the
//!    whole pipeline, and an error aborts the job and ends the round;
//! 3. runs one terminal round of `process` (for the finished and the
//!    aborted outcome alike) so every stage observes the terminal flag,
//!    flushes whatever it sinks, and releases its stage state.
//!
//! Scheduling is single-threaded and cooperative: exactly one stage runs
//! at a time and every stage transition is a synchronization point. Errors
//! never cross the driver boundary as panics; the outcome says whether the
//! job completed or aborted, and the binary maps that to the exit status.

use geoflow_domain::entities::DataFlow;
use geoflow_domain::services::StageService;
use geoflow_domain::PipelineError;
use tracing::{error, info};

use crate::application::job_spec::JobSpec;
use crate::infrastructure::stages::create_stage;

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Aborted,
}

struct StageEntry {
    id: String,
    module: String,
    config_text: String,
    service: Box<dyn StageService>,
}

/// Owns the stage instances of one job and runs them to completion.
pub struct PipelineDriver {
    stages: Vec<StageEntry>,
}

impl PipelineDriver {
    /// Builds the stage list from a job spec.
    ///
    /// Unknown module names and duplicate stage ids fail here, before any
    /// stage has run. Stages without an explicit id get their 1-based
    /// pipeline position.
    pub fn from_spec(spec: &JobSpec) -> Result<Self, PipelineError> {
        let mut stages = Vec::with_capacity(spec.pipeline.len());
        for (index, stage_spec) in spec.pipeline.iter().enumerate() {
            let service = create_stage(&stage_spec.module).ok_or_else(|| {
                PipelineError::InvalidConfiguration(format!("Unknown pipeline module: {}", stage_spec.module))
            })?;
            let id = stage_spec
                .id
                .clone()
                .unwrap_or_else(|| (index + 1).to_string());
            stages.push(StageEntry {
                id,
                module: stage_spec.module.clone(),
                config_text: stage_spec.config_text()?,
                service,
            });
        }

        for (i, a) in stages.iter().enumerate() {
            if stages.iter().skip(i + 1).any(|b| b.id == a.id) {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "Duplicate stage id: {}",
                    a.id
                )));
            }
        }

        Ok(PipelineDriver { stages })
    }

    /// Stage ids in pipeline order.
    pub fn stage_ids(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.id.as_str()).collect()
    }

    /// Runs the whole job against a fresh runtime.
    pub fn run(&mut self, flow: &mut DataFlow) -> JobOutcome {
        // Stage initialization, in order, once each.
        for entry in &self.stages {
            if flow.job_aborted() {
                break;
            }
            info!(stage = %entry.id, module = %entry.module, "init");
            if let Err(e) = entry.service.init(flow, &entry.id, &entry.config_text) {
                error!(stage = %entry.id, module = %entry.module, category = e.category(), "init failed: {}", e);
                flow.set_job_aborted();
                flow.release_stage_state(&entry.id);
            }
        }

        // Group rounds.
        'rounds: while !flow.job_finished() && !flow.job_aborted() {
            for entry in &self.stages {
                if let Err(e) = entry.service.process(flow, &entry.id) {
                    error!(stage = %entry.id, module = %entry.module, category = e.category(), "process failed: {}", e);
                    flow.set_job_aborted();
                    flow.release_stage_state(&entry.id);
                    break 'rounds;
                }
                if flow.job_aborted() {
                    break 'rounds;
                }
            }
        }

        // Terminal round: every stage observes the final flags, flushes,
        // and releases its state. Runs under abort as well.
        for entry in &self.stages {
            if let Err(e) = entry.service.process(flow, &entry.id) {
                error!(stage = %entry.id, module = %entry.module, category = e.category(), "cleanup failed: {}", e);
                flow.set_job_aborted();
            }
            flow.release_stage_state(&entry.id);
        }

        if flow.job_aborted() {
            JobOutcome::Aborted
        } else {
            JobOutcome::Completed
        }
    }
}
