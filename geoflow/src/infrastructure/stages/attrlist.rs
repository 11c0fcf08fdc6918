// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Attrlist Observer Stage
//!
//! Logs the axis summary and the attribute table of the flowing volume.
//! With `attrlist.attributes[]` configured only those names are listed (a
//! missing one fails the stage); without it every attribute is listed.
//! `process` is a no-op - the stage exists for its `init`-time dump.

use geoflow_domain::entities::DataFlow;
use geoflow_domain::services::StageService;
use geoflow_domain::PipelineError;
use tracing::info;

use crate::infrastructure::config::ModuleConfig;

struct AttrlistState;

/// Attribute listing stage.
pub struct AttrlistStage;

fn log_attribute(flow: &DataFlow, stage_id: &str, index: usize, name: &str) -> Result<(), PipelineError> {
    let descriptor = flow
        .descriptor(name)
        .ok_or_else(|| PipelineError::SchemaError(format!("Attribute [{}] cannot be found", name)))?;
    let (min, max) = descriptor.value_range();
    info!(
        stage = stage_id,
        "Attribute {:2}, Name: {:32}, Type: {:6}, Length: {:10}, Min: {:10}, Max: {:10}",
        index,
        descriptor.name(),
        descriptor.format().to_string(),
        descriptor.length(),
        min,
        max
    );
    Ok(())
}

impl StageService for AttrlistStage {
    fn init(&self, flow: &mut DataFlow, stage_id: &str, config: &str) -> Result<(), PipelineError> {
        let config = ModuleConfig::parse(config)?;

        let (pmin, pmax, pnum) = flow
            .primary_key_axis()
            .ok_or_else(|| PipelineError::InvariantViolation("Primary key axis is not set".to_string()))?;
        let (smin, smax, snum) = flow
            .secondary_key_axis()
            .ok_or_else(|| PipelineError::InvariantViolation("Secondary key axis is not set".to_string()))?;
        let (tmin, tmax, tnum) = flow
            .data_axis()
            .ok_or_else(|| PipelineError::InvariantViolation("Data axis is not set".to_string()))?;

        info!(
            stage = stage_id,
            "Primary axis: {}, [{} -- {}], count: {}",
            flow.primary_key_name().unwrap_or(""),
            pmin,
            pmax,
            pnum
        );
        info!(
            stage = stage_id,
            "Secondary axis: {}, [{} -- {}], count: {}",
            flow.secondary_key_name().unwrap_or(""),
            smin,
            smax,
            snum
        );
        info!(
            stage = stage_id,
            "Data axis: {}, [{} -- {}], count: {}",
            flow.volume_data_name().unwrap_or(""),
            tmin,
            tmax,
            tnum
        );
        info!(stage = stage_id, "Group size {}", flow.group_size().unwrap_or(0));

        if config.has("attrlist.attributes") {
            let names = config.get_str_array("attrlist.attributes")?;
            info!(stage = stage_id, "Attribute list:");
            for (i, name) in names.iter().enumerate() {
                log_attribute(flow, stage_id, i, &name.to_uppercase())?;
            }
        } else {
            info!(stage = stage_id, "All attributes:");
            for i in 0..flow.num_attributes() {
                let name = flow.attribute_name(i).unwrap().to_string();
                log_attribute(flow, stage_id, i, &name)?;
            }
        }

        flow.set_stage_state(stage_id, AttrlistState);
        Ok(())
    }

    fn process(&self, flow: &mut DataFlow, stage_id: &str) -> Result<(), PipelineError> {
        if flow.job_finished() || flow.job_aborted() {
            flow.release_stage_state(stage_id);
        }
        Ok(())
    }
}
