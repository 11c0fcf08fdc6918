// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Stages
//!
//! The concrete stage implementations behind the job-file module names:
//!
//! | Module | Role |
//! |---|---|
//! | `gendata` | synthesize a volume from Ormsby/Ricker wavelets |
//! | `input` | read a bricked volume back as the source |
//! | `segyinput` | read a SEG-Y file as the source |
//! | `attrcalc` | expression-driven attribute create/update/remove |
//! | `attrlist` | log the attribute table |
//! | `mute` | time-domain mute with taper window |
//! | `scale` | constant / AGC / spherical-divergence scaling |
//! | `output` | bricked volume sink |
//! | `testgendata` | deterministic/random test source |
//! | `testexpect` | regression verification against expected artifacts |
//!
//! Stage values are stateless; their per-job state lives in the runtime's
//! stage-state slots under the stage id (created in `init`, released in the
//! terminal `process`).

pub mod attrcalc;
pub mod attrlist;
pub mod gendata;
pub mod input;
pub mod mute;
pub mod output;
pub mod scale;
pub mod segyinput;
pub mod testexpect;
pub mod testgendata;

use std::collections::HashMap;

use geoflow_domain::entities::DataFlow;
use geoflow_domain::services::StageService;
use geoflow_domain::value_objects::VectorView;
use geoflow_domain::PipelineError;

/// Instantiates the stage registered under a job-file module name.
pub fn create_stage(module: &str) -> Option<Box<dyn StageService>> {
    match module {
        "gendata" => Some(Box::new(gendata::GendataStage)),
        "input" => Some(Box::new(input::InputStage)),
        "segyinput" => Some(Box::new(segyinput::SegyInputStage)),
        "attrcalc" => Some(Box::new(attrcalc::AttrcalcStage)),
        "attrlist" => Some(Box::new(attrlist::AttrlistStage)),
        "mute" => Some(Box::new(mute::MuteStage)),
        "scale" => Some(Box::new(scale::ScaleStage)),
        "output" => Some(Box::new(output::OutputStage)),
        "testgendata" => Some(Box::new(testgendata::TestgendataStage)),
        "testexpect" => Some(Box::new(testexpect::TestexpectStage)),
        _ => None,
    }
}

/// The runtime's current attribute names, the admissible variable set for
/// expression parsing.
pub(crate) fn admissible_variables(flow: &DataFlow) -> Vec<String> {
    flow.descriptors().iter().map(|d| d.name().to_string()).collect()
}

/// Per-row lengths by attribute name.
pub(crate) fn variable_lengths(flow: &DataFlow) -> HashMap<String, usize> {
    flow.descriptors()
        .iter()
        .map(|d| (d.name().to_string(), d.length()))
        .collect()
}

/// Binds every attribute buffer by name for the evaluator.
pub(crate) fn bind_all_attributes(flow: &DataFlow) -> Result<HashMap<String, VectorView<'_>>, PipelineError> {
    let mut bindings = HashMap::new();
    for descriptor in flow.descriptors() {
        let buffer = flow.buffer(descriptor.name()).ok_or_else(|| {
            PipelineError::InvariantViolation(format!(
                "Runtime returned no buffer for attribute '{}'",
                descriptor.name()
            ))
        })?;
        bindings.insert(descriptor.name().to_string(), buffer.as_view());
    }
    Ok(bindings)
}

/// Group size and trace length, required by every trace-touching stage.
pub(crate) fn group_geometry(flow: &DataFlow) -> Result<(usize, usize), PipelineError> {
    let group_size = flow
        .group_size()
        .ok_or_else(|| PipelineError::InvariantViolation("Group size is not set".to_string()))?;
    let trace_length = flow
        .data_vector_length()
        .ok_or_else(|| PipelineError::InvariantViolation("Volume data attribute is not designated".to_string()))?;
    Ok((group_size, trace_length))
}
