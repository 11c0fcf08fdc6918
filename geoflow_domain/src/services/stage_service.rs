// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Service Trait
//!
//! The unified interface every pipeline stage implements, whether it is a
//! source (`gendata`, volumetric `input`, SEG-Y input), a transform
//! (`attrcalc`, `mute`, `scale`), a sink (`output`), or an observer
//! (`attrlist`, `testexpect`).
//!
//! ## Lifecycle contract
//!
//! For each stage the driver calls [`StageService::init`] exactly once
//! before any `process`; then [`StageService::process`] repeatedly, one
//! group per invocation, until the job's finished flag is set - after which
//! `process` is invoked one final time so the stage can flush and release
//! its state. On abort, the data work of subsequent stages is skipped and
//! each stage releases its state at its next `process` entry.
//!
//! ## State and errors
//!
//! Stage implementations are stateless values; their per-job state lives in
//! the runtime's stage-state slot, created in `init` and taken back out in
//! the terminal `process`. Failure is signalled by returning an error: the
//! driver catches it at the stage boundary, logs it with the stage id, and
//! marks the job aborted. Stages never panic on bad input.

use crate::entities::DataFlow;
use crate::PipelineError;

/// One processing stage of a pipeline.
pub trait StageService: Send {
    /// Called exactly once, before any `process`, with the stage's raw
    /// config text. Sources establish schema and axes here; transforms
    /// parse expressions against the schema the sources produced.
    fn init(&self, flow: &mut DataFlow, stage_id: &str, config: &str) -> Result<(), PipelineError>;

    /// Called once per group while the job runs, and one final time after
    /// the finished (or aborted) flag is set for cleanup.
    fn process(&self, flow: &mut DataFlow, stage_id: &str) -> Result<(), PipelineError>;
}
