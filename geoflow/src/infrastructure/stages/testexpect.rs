// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Testexpect Verification Stage
//!
//! Regression verifier: declares the schema it expects and compares the
//! current buffers against expected artifacts every group. Two check
//! patterns exist:
//!
//! - `SAME` - the buffer must be bitwise identical to the little-endian
//!   reference file `<NAME>.DAT` recorded by `testgendata`
//! - `INLINE+CROSSLINE*2.7` - the (float) attribute must equal the
//!   arithmetic combination of the two key buffers, elementwise within a
//!   small epsilon
//!
//! Any mismatch fails the stage, which aborts the job - that is the
//! stage's entire purpose.
//!
//! Config (under `testexpect.`): `primarykey` / `secondarykey`
//! (`{name, first, last, step}`), `tracekey`
//! (`{name, length, pattern}`), optional `attribute[]`
//! (`{name, pattern}`), optional `datadir` (default `.`).

use std::path::PathBuf;
use std::str::FromStr;

use geoflow_domain::entities::DataFlow;
use geoflow_domain::services::StageService;
use geoflow_domain::PipelineError;
use tracing::{debug, info};

use crate::infrastructure::config::ModuleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckPattern {
    Same,
    InlinePlusCrosslineMul,
}

impl FromStr for CheckPattern {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SAME" => Ok(CheckPattern::Same),
            "INLINE+CROSSLINE*2.7" => Ok(CheckPattern::InlinePlusCrosslineMul),
            other => Err(PipelineError::InvalidConfiguration(format!(
                "Unknown check pattern: {}",
                other
            ))),
        }
    }
}

struct Check {
    attr_name: String,
    pattern: CheckPattern,
}

struct TestexpectState {
    checks: Vec<Check>,
    datadir: PathBuf,
}

/// Expected-artifact verification stage.
pub struct TestexpectStage;

fn expect_axis(
    label: &str,
    actual: Option<(i32, i32, usize)>,
    first: i64,
    last: i64,
) -> Result<(), PipelineError> {
    let (min, max, _) = actual
        .ok_or_else(|| PipelineError::InvariantViolation(format!("{} axis is not set", label)))?;
    if min as i64 != first || max as i64 != last {
        return Err(PipelineError::VerificationFailed(format!(
            "{} axis is {}..{}, expected {}..{}",
            label, min, max, first, last
        )));
    }
    Ok(())
}

fn is_equal_float_double(a: f32, b: f64) -> bool {
    let epsilon = (f32::EPSILON * 100.0) as f64;
    ((a as f64) - b).abs() < epsilon
}

impl TestexpectStage {
    fn check_same(flow: &DataFlow, datadir: &PathBuf, name: &str) -> Result<(), PipelineError> {
        let buffer = flow
            .buffer(name)
            .ok_or_else(|| PipelineError::VerificationFailed(format!("Cannot find attribute: {}", name)))?;
        let path = datadir.join(format!("{}.DAT", name));
        let expected = std::fs::read(&path)
            .map_err(|e| PipelineError::IoError(format!("Cannot open reference {}: {}", path.display(), e)))?;
        let actual = buffer.to_le_bytes();
        if expected.len() != actual.len() {
            return Err(PipelineError::VerificationFailed(format!(
                "Attribute {} reference is {} bytes but the buffer holds {}",
                name,
                expected.len(),
                actual.len()
            )));
        }
        if expected != actual {
            return Err(PipelineError::VerificationFailed(format!(
                "Attribute {} differs from its reference data",
                name
            )));
        }
        Ok(())
    }

    fn check_plus_mul(flow: &DataFlow, name: &str) -> Result<(), PipelineError> {
        let values = flow
            .buffer(name)
            .and_then(|b| b.as_f32())
            .ok_or_else(|| {
                PipelineError::VerificationFailed(format!("Attribute {} must be a float buffer", name))
            })?;
        let pkey_name = flow
            .primary_key_name()
            .ok_or_else(|| PipelineError::InvariantViolation("Primary key is not designated".to_string()))?;
        let skey_name = flow
            .secondary_key_name()
            .ok_or_else(|| PipelineError::InvariantViolation("Secondary key is not designated".to_string()))?;
        let inline = flow
            .buffer(pkey_name)
            .and_then(|b| b.as_i32())
            .ok_or_else(|| PipelineError::InvariantViolation("Null primary key buffer".to_string()))?;
        let crossline = flow
            .buffer(skey_name)
            .and_then(|b| b.as_i32())
            .ok_or_else(|| PipelineError::InvariantViolation("Null secondary key buffer".to_string()))?;

        for i in 0..values.len() {
            let expected = inline[i] as f64 + 2.7 * crossline[i] as f64;
            if !is_equal_float_double(values[i], expected) {
                return Err(PipelineError::VerificationFailed(format!(
                    "Attribute {} at index {}: got {}, expected {}",
                    name, i, values[i], expected
                )));
            }
        }
        Ok(())
    }
}

impl StageService for TestexpectStage {
    fn init(&self, flow: &mut DataFlow, stage_id: &str, config: &str) -> Result<(), PipelineError> {
        let config = ModuleConfig::parse(config)?;

        expect_axis(
            "Primary",
            flow.primary_key_axis(),
            config.get_i64("testexpect.primarykey.first")?,
            config.get_i64("testexpect.primarykey.last")?,
        )?;
        expect_axis(
            "Secondary",
            flow.secondary_key_axis(),
            config.get_i64("testexpect.secondarykey.first")?,
            config.get_i64("testexpect.secondarykey.last")?,
        )?;

        let trace_name = config.get_str("testexpect.tracekey.name")?.to_uppercase();
        let trace_length = config.get_i64("testexpect.tracekey.length")? as usize;
        let descriptor = flow
            .descriptor(&trace_name)
            .ok_or_else(|| PipelineError::VerificationFailed(format!("Cannot find attribute: {}", trace_name)))?;
        if descriptor.length() != trace_length {
            return Err(PipelineError::VerificationFailed(format!(
                "Attribute {} length is {}, expected {}",
                trace_name,
                descriptor.length(),
                trace_length
            )));
        }

        let mut checks = vec![Check {
            attr_name: trace_name,
            pattern: CheckPattern::from_str(&config.get_str("testexpect.tracekey.pattern")?)?,
        }];
        if config.has("testexpect.attribute") {
            for i in 0..config.array_len("testexpect.attribute")? {
                let name = config.get_str(&format!("testexpect.attribute.{}.name", i))?.to_uppercase();
                let pattern = CheckPattern::from_str(&config.get_str(&format!("testexpect.attribute.{}.pattern", i))?)?;
                if !flow.has_attribute(&name) {
                    return Err(PipelineError::VerificationFailed(format!(
                        "Cannot find attribute: {}",
                        name
                    )));
                }
                checks.push(Check { attr_name: name, pattern });
            }
        }

        let datadir = if config.has("testexpect.datadir") {
            PathBuf::from(config.get_str("testexpect.datadir")?)
        } else {
            PathBuf::from(".")
        };

        info!(stage = stage_id, checks = checks.len(), "testexpect initialized");
        flow.set_stage_state(stage_id, TestexpectState { checks, datadir });
        Ok(())
    }

    fn process(&self, flow: &mut DataFlow, stage_id: &str) -> Result<(), PipelineError> {
        let Some(state) = flow.take_stage_state::<TestexpectState>(stage_id) else {
            return Ok(());
        };
        if flow.job_finished() || flow.job_aborted() {
            return Ok(());
        }

        for check in &state.checks {
            debug!(stage = stage_id, attr = %check.attr_name, pattern = ?check.pattern, "verifying");
            match check.pattern {
                CheckPattern::Same => Self::check_same(flow, &state.datadir, &check.attr_name)?,
                CheckPattern::InlinePlusCrosslineMul => Self::check_plus_mul(flow, &check.attr_name)?,
            }
        }

        flow.set_stage_state(stage_id, *state);
        Ok(())
    }
}
