// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Output Sink Stage - Bricked Volume Writer
//!
//! Converts the group-at-a-time stream into a bricked volume file. Each
//! channel (the amplitude plus every selected attribute) owns a sliding
//! window of `2 x brick_size` inline slots and a chunk writer against the
//! store.
//!
//! Per group: append the group's bytes into every window; once the window
//! holds `2 x brick_size` inlines - or this is the final group - emit every
//! brick whose primary range the window covers (skipping bricks whose
//! store hash says they were already written), then slide the window by
//! `brick_size`. The terminal `process` call flushes the store; that flush
//! is attempted under abort as well, so whatever bricks were committed are
//! durable and whole.
//!
//! Config (under `output.`): `url`, `brick_size` (default 64),
//! `lod_levels` (default 0), `compression` (`none`/`zip`, default `none`),
//! `tolerance` (default 0.01), optional `attributes[]` selecting attribute
//! channels (default: every non-key attribute).

use std::path::Path;
use std::str::FromStr;

use geoflow_domain::entities::DataFlow;
use geoflow_domain::services::StageService;
use geoflow_domain::PipelineError;
use tracing::{error, info};

use crate::infrastructure::config::ModuleConfig;
use crate::infrastructure::store::{
    ChannelChunkWriter, ChannelDescriptor, CompressionMethod, SlidingWindow, VolumeLayout, VolumeStore,
};

/// The distinguished channel name of the trace amplitude in the store.
pub const AMPLITUDE_CHANNEL: &str = "Amplitude";

struct ChannelBinding {
    /// Runtime attribute feeding this channel.
    attr_name: String,
    channel: usize,
    window: SlidingWindow,
    writer: ChannelChunkWriter,
}

struct OutputState {
    url: String,
    brick_size: usize,
    num_pkey: usize,
    store: VolumeStore,
    channels: Vec<ChannelBinding>,
    batch_end: usize,
    batch_num: usize,
}

/// Bricked-volume sink stage.
pub struct OutputStage;

impl OutputStage {
    /// Selects the attribute channels: the configured list (validated, keys
    /// and the trace excluded) or every non-key attribute.
    fn select_attributes(flow: &DataFlow, config: &ModuleConfig) -> Result<Vec<String>, PipelineError> {
        let pkey = flow.primary_key_name().unwrap_or_default().to_string();
        let skey = flow.secondary_key_name().unwrap_or_default().to_string();
        let trace = flow.volume_data_name().unwrap_or_default().to_string();
        let excluded = [pkey.as_str(), skey.as_str(), trace.as_str()];

        if config.has("output.attributes") {
            let mut selected = Vec::new();
            for name in config.get_str_array("output.attributes")? {
                let name = name.to_uppercase();
                if excluded.contains(&name.as_str()) {
                    continue;
                }
                if !flow.has_attribute(&name) {
                    return Err(PipelineError::SchemaError(format!(
                        "Output attribute [{}] cannot be found",
                        name
                    )));
                }
                selected.push(name);
            }
            Ok(selected)
        } else {
            Ok(flow
                .descriptors()
                .iter()
                .map(|d| d.name().to_string())
                .filter(|name| !excluded.contains(&name.as_str()))
                .collect())
        }
    }
}

impl StageService for OutputStage {
    fn init(&self, flow: &mut DataFlow, stage_id: &str, config: &str) -> Result<(), PipelineError> {
        let config = ModuleConfig::parse(config)?;

        let url = config.get_str("output.url")?;
        if url.is_empty() {
            return Err(PipelineError::InvalidConfiguration(
                "Output URL is empty".to_string(),
            ));
        }
        if let Some(parent) = Path::new(&url).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(PipelineError::IoError(format!(
                    "Output parent directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        let brick_size = if config.has("output.brick_size") {
            config.get_i64("output.brick_size")? as usize
        } else {
            64
        };
        if brick_size == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "'output.brick_size' must be positive".to_string(),
            ));
        }
        let lod_levels = if config.has("output.lod_levels") {
            config.get_i64("output.lod_levels")? as u32
        } else {
            0
        };
        let compression = if config.has("output.compression") {
            CompressionMethod::from_str(&config.get_str("output.compression")?)?
        } else {
            CompressionMethod::None
        };
        let tolerance = if config.has("output.tolerance") {
            config.get_f32("output.tolerance")?
        } else {
            0.01
        };

        let primary = flow
            .primary_axis_descriptor()
            .ok_or_else(|| PipelineError::InvariantViolation("Primary key axis is not set".to_string()))?
            .clone();
        let secondary = flow
            .secondary_axis_descriptor()
            .ok_or_else(|| PipelineError::InvariantViolation("Secondary key axis is not set".to_string()))?
            .clone();
        let data = flow
            .data_axis_descriptor()
            .ok_or_else(|| PipelineError::InvariantViolation("Data axis is not set".to_string()))?
            .clone();
        let num_pkey = primary.count;

        let trace_name = flow
            .volume_data_name()
            .ok_or_else(|| PipelineError::InvariantViolation("Volume data attribute is not designated".to_string()))?
            .to_string();
        let trace_descriptor = flow.descriptor(&trace_name).unwrap();

        // Channel table: amplitude first, then the selected attributes.
        let mut channels = vec![ChannelDescriptor {
            name: AMPLITUDE_CHANNEL.to_string(),
            format: trace_descriptor.format(),
            sample_count: trace_descriptor.length(),
            value_range: trace_descriptor.value_range(),
        }];
        let mut channel_attrs = vec![trace_name.clone()];
        for name in Self::select_attributes(flow, &config)? {
            let descriptor = flow.descriptor(&name).unwrap();
            info!(stage = stage_id, "Add channel: {}", name);
            channels.push(ChannelDescriptor {
                name: name.clone(),
                format: descriptor.format(),
                sample_count: descriptor.length(),
                value_range: descriptor.value_range(),
            });
            channel_attrs.push(name);
        }

        let layout = VolumeLayout {
            primary,
            secondary: secondary.clone(),
            data,
            brick_size,
            lod_levels,
            compression,
            tolerance,
            channels,
        };

        let store = VolumeStore::create(&url, layout.clone())?;
        let channels = channel_attrs
            .into_iter()
            .enumerate()
            .map(|(channel, attr_name)| {
                let descriptor = &layout.channels[channel];
                let inline_size = descriptor.format.byte_size() * descriptor.sample_count * secondary.count;
                ChannelBinding {
                    attr_name,
                    channel,
                    window: SlidingWindow::new(brick_size, inline_size),
                    writer: ChannelChunkWriter::new(&layout, channel),
                }
            })
            .collect();

        info!(
            stage = stage_id,
            url = %url,
            brick_size,
            lod_levels,
            compression = ?compression,
            "Volume writer initialized"
        );

        flow.set_stage_state(
            stage_id,
            OutputState {
                url,
                brick_size,
                num_pkey,
                store,
                channels,
                batch_end: 0,
                batch_num: 0,
            },
        );
        Ok(())
    }

    fn process(&self, flow: &mut DataFlow, stage_id: &str) -> Result<(), PipelineError> {
        let Some(mut state) = flow.take_stage_state::<OutputState>(stage_id) else {
            return Ok(());
        };

        if flow.job_finished() || flow.job_aborted() {
            // End-of-job flush; attempted under abort as well so committed
            // bricks stay durable and whole.
            match state.store.flush() {
                Ok(()) => info!(stage = stage_id, "Output volume dataset: {}", state.url),
                Err(e) => {
                    error!(stage = stage_id, "Volume store flush failed: {}", e);
                    return Err(e);
                }
            }
            return Ok(());
        }

        state.batch_end += 1;
        state.batch_num += 1;
        let full_window = state.batch_num == 2 * state.brick_size;
        let final_group = state.batch_end == state.num_pkey;

        {
            let state = &mut *state;
            for binding in &mut state.channels {
                let buffer = flow.buffer(&binding.attr_name).ok_or_else(|| {
                    PipelineError::InvariantViolation(format!(
                        "Runtime returned no buffer for attribute '{}'",
                        binding.attr_name
                    ))
                })?;
                binding.window.fill(&buffer.to_le_bytes())?;

                if full_window || final_group {
                    let mut accessor = state.store.page_accessor(binding.channel)?;
                    binding.writer.write_batch(
                        &mut accessor,
                        binding.window.valid_slice(),
                        binding.window.start_idx(),
                        binding.window.valid_count(),
                    )?;
                    accessor.commit();
                }
                if full_window {
                    binding.window.slide()?;
                }
            }
        }

        if full_window {
            state.batch_num -= state.brick_size;
        }

        flow.set_stage_state(stage_id, *state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoflow_domain::value_objects::ElementFormat;

    fn seeded_flow(brick: usize) -> DataFlow {
        let primaries = 4 * brick;
        let mut flow = DataFlow::new();
        flow.add_attribute("INLINE", ElementFormat::Int32, 1).unwrap();
        flow.add_attribute("CROSSLINE", ElementFormat::Int32, 1).unwrap();
        flow.add_attribute("SEISMIC", ElementFormat::Float32, brick).unwrap();
        flow.add_attribute("GAIN", ElementFormat::Float64, 1).unwrap();
        flow.set_primary_key_name("INLINE").unwrap();
        flow.set_secondary_key_name("CROSSLINE").unwrap();
        flow.set_volume_data_name("SEISMIC").unwrap();
        flow.set_primary_key_axis(0, primaries as i32 - 1, primaries).unwrap();
        flow.set_secondary_key_axis(0, brick as i32 - 1, brick).unwrap();
        flow.set_data_axis(0.0, (brick - 1) as f32, brick).unwrap();
        flow.set_group_size(brick).unwrap();
        flow
    }

    fn config(url: &str, brick: usize) -> String {
        format!("output:\n  url: {}\n  brick_size: {}\n", url, brick)
    }

    fn fill_group(flow: &mut DataFlow, pkey: i32, brick: usize) {
        flow.buffer_mut("INLINE").unwrap().as_i32_mut().unwrap().fill(pkey);
        let trace: Vec<f64> = (0..brick * brick).map(|i| (pkey as usize * 1000 + i) as f64).collect();
        flow.buffer_mut("SEISMIC").unwrap().fill_from_f64(&trace).unwrap();
        flow.buffer_mut("GAIN")
            .unwrap()
            .fill_from_f64(&vec![pkey as f64; brick])
            .unwrap();
    }

    #[test]
    fn test_four_bricks_along_primary_each_committed_once() {
        let brick = 2;
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("out.gfv").display().to_string();
        let mut flow = seeded_flow(brick);
        OutputStage.init(&mut flow, "out", &config(&url, brick)).unwrap();

        for pkey in 0..(4 * brick) as i32 {
            fill_group(&mut flow, pkey, brick);
            OutputStage.process(&mut flow, "out").unwrap();
        }
        flow.set_job_finished();
        OutputStage.process(&mut flow, "out").unwrap();

        let store = VolumeStore::open(&url).unwrap();
        let amplitude = store.layout().channel_index(AMPLITUDE_CHANNEL).unwrap();
        let grid = store.layout().chunk_grid(amplitude);
        // secondary and sample extents equal one brick: 4 bricks total.
        assert_eq!(grid.chunk_count(), 4);

        // Every brick was written; the content of inline 5 survives.
        let slice = store.read_slice(amplitude, 2, 5).unwrap();
        for xl in 0..brick {
            for s in 0..brick {
                let offset = (xl * brick + s) * 4;
                let value = f32::from_le_bytes(slice[offset..offset + 4].try_into().unwrap());
                assert_eq!(value, (5000 + xl * brick + s) as f32);
            }
        }

        // Attribute channel rode along.
        let gain = store.layout().channel_index("GAIN").unwrap();
        let slice = store.read_slice(gain, 2, 3).unwrap();
        let value = f64::from_le_bytes(slice[0..8].try_into().unwrap());
        assert_eq!(value, 3.0);
    }

    #[test]
    fn test_partial_tail_is_flushed_on_final_group() {
        // 4 primaries, brick 3: the window never fills; the final group
        // triggers the tail emission.
        let brick = 3;
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("tail.gfv").display().to_string();

        let mut flow = DataFlow::new();
        flow.add_attribute("INLINE", ElementFormat::Int32, 1).unwrap();
        flow.add_attribute("CROSSLINE", ElementFormat::Int32, 1).unwrap();
        flow.add_attribute("SEISMIC", ElementFormat::Float32, 2).unwrap();
        flow.set_primary_key_name("INLINE").unwrap();
        flow.set_secondary_key_name("CROSSLINE").unwrap();
        flow.set_volume_data_name("SEISMIC").unwrap();
        flow.set_primary_key_axis(0, 3, 4).unwrap();
        flow.set_secondary_key_axis(0, 1, 2).unwrap();
        flow.set_data_axis(0.0, 1.0, 2).unwrap();
        flow.set_group_size(2).unwrap();

        OutputStage.init(&mut flow, "out", &config(&url, brick)).unwrap();
        for pkey in 0..4 {
            flow.buffer_mut("INLINE").unwrap().as_i32_mut().unwrap().fill(pkey);
            flow.buffer_mut("SEISMIC")
                .unwrap()
                .fill_from_f64(&vec![pkey as f64; 4])
                .unwrap();
            OutputStage.process(&mut flow, "out").unwrap();
        }
        flow.set_job_finished();
        OutputStage.process(&mut flow, "out").unwrap();

        let store = VolumeStore::open(&url).unwrap();
        let slice = store.read_slice(0, 2, 3).unwrap();
        let value = f32::from_le_bytes(slice[0..4].try_into().unwrap());
        assert_eq!(value, 3.0);
    }

    #[test]
    fn test_missing_parent_directory_fails_init() {
        let mut flow = seeded_flow(2);
        let cfg = config("/definitely/not/here/out.gfv", 2);
        assert!(OutputStage.init(&mut flow, "out", &cfg).is_err());
    }
}
