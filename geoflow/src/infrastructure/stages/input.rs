// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Input Source Stage - Volumetric Reader
//!
//! Reads a bricked volume back into the pipeline. The `sliceposition`
//! option chooses which store dimension becomes the primary key of the
//! flowing job:
//!
//! - `on_primary_key` (default) - groups are store inlines; every channel
//!   is registered as an attribute
//! - `on_secondary_key` - groups are store crosslines; trace rows run
//!   along the store's primary axis
//! - `on_data_samples` - groups are time slices; trace rows run along the
//!   store's primary axis with the store's secondary axis as the sample
//!   axis; per-trace scalar channels have no meaning in this orientation
//!   and are skipped
//!
//! Config (under `input.`): `url`, `sliceposition`.

use geoflow_domain::entities::DataFlow;
use geoflow_domain::services::StageService;
use geoflow_domain::value_objects::{AxisDescriptor, ElementFormat};
use geoflow_domain::PipelineError;
use tracing::info;

use crate::infrastructure::config::ModuleConfig;
use crate::infrastructure::store::VolumeStore;

struct ChannelRead {
    channel: usize,
    attr_name: String,
}

struct InputState {
    store: VolumeStore,
    /// The store dimension sliced per group (0 samples, 1 secondary,
    /// 2 primary).
    slice_dim: usize,
    pkey_name: String,
    skey_name: String,
    channels: Vec<ChannelRead>,
    pkeys: Vec<i32>,
    skeys: Vec<i32>,
    current_index: usize,
}

/// Bricked-volume source stage.
pub struct InputStage;

fn axis_key_values(axis: &AxisDescriptor) -> Vec<i32> {
    (0..axis.count).map(|i| (axis.value_at(i) + 0.5).floor() as i32).collect()
}

impl StageService for InputStage {
    fn init(&self, flow: &mut DataFlow, stage_id: &str, config: &str) -> Result<(), PipelineError> {
        let config = ModuleConfig::parse(config)?;

        let url = config.get_str("input.url")?;
        if url.is_empty() {
            return Err(PipelineError::InvalidConfiguration("The input URL is empty".to_string()));
        }
        if !std::path::Path::new(&url).exists() {
            return Err(PipelineError::IoError(format!(
                "The input data file {} does not exist",
                url
            )));
        }

        let slice_dim = match config.get_str("input.sliceposition").as_deref() {
            Ok("on_data_samples") => 0,
            Ok("on_secondary_key") => 1,
            Ok("on_primary_key") => 2,
            Ok(other) => {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "Unknown sliceposition: {}",
                    other
                )))
            }
            Err(_) => 2,
        };

        let store = VolumeStore::open(&url)?;
        let layout = store.layout().clone();

        // Rotate the store axes into the flow's primary / secondary / data
        // roles according to the slice position.
        let (pkey_axis, skey_axis, data_axis) = match slice_dim {
            2 => (&layout.primary, &layout.secondary, &layout.data),
            1 => (&layout.secondary, &layout.primary, &layout.data),
            _ => (&layout.data, &layout.primary, &layout.secondary),
        };

        let pkey_name = if pkey_axis.name.is_empty() {
            "INLINE".to_string()
        } else {
            pkey_axis.name.to_uppercase()
        };
        let skey_name = if skey_axis.name.is_empty() {
            "CROSSLINE".to_string()
        } else {
            skey_axis.name.to_uppercase()
        };

        info!(
            stage = stage_id,
            url = %url,
            slice_dim,
            primary = %pkey_name,
            secondary = %skey_name,
            "Reading volume"
        );

        flow.add_attribute(&pkey_name, ElementFormat::Int32, 1)?;
        flow.set_attribute_unit(&pkey_name, &pkey_axis.unit)?;
        flow.set_primary_key_name(&pkey_name)?;
        flow.set_primary_key_axis(pkey_axis.min as i32, pkey_axis.max as i32, pkey_axis.count)?;

        flow.add_attribute(&skey_name, ElementFormat::Int32, 1)?;
        flow.set_attribute_unit(&skey_name, &skey_axis.unit)?;
        flow.set_secondary_key_name(&skey_name)?;
        flow.set_secondary_key_axis(skey_axis.min as i32, skey_axis.max as i32, skey_axis.count)?;

        // The amplitude channel becomes the volume-data attribute, named
        // after the axis serving as the flow's sample axis.
        let amplitude = 0usize;
        let trace_name = if data_axis.name.is_empty() {
            "AMPLITUDE".to_string()
        } else {
            data_axis.name.to_uppercase()
        };
        let trace_length = data_axis.count;
        let trace_format = layout.channels[amplitude].format;
        flow.add_attribute(&trace_name, trace_format, trace_length)?;
        flow.set_attribute_value_range(&trace_name, layout.channels[amplitude].value_range.0, layout.channels[amplitude].value_range.1)?;
        flow.set_volume_data_name(&trace_name)?;
        flow.set_data_axis_unit(&data_axis.unit);

        let mut channels = vec![ChannelRead {
            channel: amplitude,
            attr_name: trace_name.clone(),
        }];

        // Scalar attribute channels only orient meaningfully when trace
        // rows follow a key axis.
        if slice_dim != 0 {
            for (channel, descriptor) in layout.channels.iter().enumerate().skip(1) {
                let attr_name = descriptor.name.to_uppercase();
                flow.add_attribute(&attr_name, descriptor.format, descriptor.sample_count)?;
                flow.set_attribute_value_range(&attr_name, descriptor.value_range.0, descriptor.value_range.1)?;
                channels.push(ChannelRead { channel, attr_name });
            }
        }

        flow.set_data_axis(data_axis.min as f32, data_axis.max as f32, trace_length)?;
        flow.set_group_size(skey_axis.count)?;

        let pkeys = axis_key_values(pkey_axis);
        let skeys = axis_key_values(skey_axis);

        for descriptor in flow.descriptors() {
            info!(
                stage = stage_id,
                "Attribute {:32} {:6} length {}",
                descriptor.name(),
                descriptor.format().to_string(),
                descriptor.length()
            );
        }

        flow.set_stage_state(
            stage_id,
            InputState {
                store,
                slice_dim,
                pkey_name,
                skey_name,
                channels,
                pkeys,
                skeys,
                current_index: 0,
            },
        );
        Ok(())
    }

    fn process(&self, flow: &mut DataFlow, stage_id: &str) -> Result<(), PipelineError> {
        let Some(mut state) = flow.take_stage_state::<InputState>(stage_id) else {
            return Ok(());
        };
        if flow.job_finished() || flow.job_aborted() {
            return Ok(());
        }

        if state.current_index >= state.pkeys.len() {
            flow.set_job_finished();
            flow.set_stage_state(stage_id, *state);
            return Ok(());
        }

        let pkey_value = state.pkeys[state.current_index];
        info!(stage = stage_id, "Process primary key {}", pkey_value);

        flow.buffer_mut(&state.pkey_name)
            .and_then(|b| b.as_i32_mut())
            .ok_or_else(|| PipelineError::InvariantViolation("Null primary key buffer".to_string()))?
            .fill(pkey_value);
        flow.buffer_mut(&state.skey_name)
            .and_then(|b| b.as_i32_mut())
            .ok_or_else(|| PipelineError::InvariantViolation("Null secondary key buffer".to_string()))?
            .copy_from_slice(&state.skeys);

        for read in &state.channels {
            let bytes = state.store.read_slice(read.channel, state.slice_dim, state.current_index)?;
            flow.buffer_mut(&read.attr_name)
                .ok_or_else(|| {
                    PipelineError::InvariantViolation(format!(
                        "Runtime returned no buffer for attribute '{}'",
                        read.attr_name
                    ))
                })?
                .copy_from_le_bytes(&bytes)?;
        }

        state.current_index += 1;
        flow.set_stage_state(stage_id, *state);
        Ok(())
    }
}
