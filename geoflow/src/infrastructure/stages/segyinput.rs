// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SEG-Y Input Source Stage
//!
//! Sources a volume from a SEG-Y file through the [`SegyReader`]: the two
//! key axes come from the trace-header scan, the sample axis from the
//! binary header, and each `process` serves one inline's traces in
//! crossline order.
//!
//! Config (under `segyinput.`): `url`, optional `dataname` (default
//! `AMPLITUDE`), optional `primarykey.byte` / `secondarykey.byte`
//! (1-based trace-header positions; defaults 189 / 193).

use geoflow_domain::entities::DataFlow;
use geoflow_domain::services::StageService;
use geoflow_domain::value_objects::ElementFormat;
use geoflow_domain::PipelineError;
use tracing::info;

use crate::infrastructure::config::ModuleConfig;
use crate::infrastructure::segy::{SegyReader, DEFAULT_CROSSLINE_BYTE, DEFAULT_INLINE_BYTE};

struct SegyInputState {
    reader: SegyReader,
    trace_name: String,
    current_index: usize,
}

/// SEG-Y source stage.
pub struct SegyInputStage;

impl StageService for SegyInputStage {
    fn init(&self, flow: &mut DataFlow, stage_id: &str, config: &str) -> Result<(), PipelineError> {
        let config = ModuleConfig::parse(config)?;

        let url = config.get_str("segyinput.url")?;
        let inline_byte = if config.has("segyinput.primarykey.byte") {
            config.get_i64("segyinput.primarykey.byte")? as usize
        } else {
            DEFAULT_INLINE_BYTE
        };
        let crossline_byte = if config.has("segyinput.secondarykey.byte") {
            config.get_i64("segyinput.secondarykey.byte")? as usize
        } else {
            DEFAULT_CROSSLINE_BYTE
        };
        let trace_name = if config.has("segyinput.dataname") {
            config.get_str("segyinput.dataname")?.to_uppercase()
        } else {
            "AMPLITUDE".to_string()
        };

        let reader = SegyReader::open(&url, inline_byte, crossline_byte)?;
        let inline_count = reader.inline_values().len();
        let crossline_count = reader.crossline_values().len();
        let sample_count = reader.sample_count();
        let max_time_ms = reader.sample_interval_us() * 0.001 * (sample_count - 1) as f32;

        info!(
            stage = stage_id,
            url = %url,
            inline_count,
            crossline_count,
            sample_count,
            "SEG-Y volume opened"
        );

        flow.add_attribute("INLINE", ElementFormat::Int32, 1)?;
        flow.add_attribute("CROSSLINE", ElementFormat::Int32, 1)?;
        flow.set_primary_key_name("INLINE")?;
        flow.set_secondary_key_name("CROSSLINE")?;

        flow.add_attribute(&trace_name, ElementFormat::Float32, sample_count)?;
        flow.set_volume_data_name(&trace_name)?;
        flow.set_data_axis_unit("ms");

        flow.set_group_size(crossline_count)?;
        flow.set_data_axis(0.0, max_time_ms, sample_count)?;
        flow.set_primary_key_axis(
            reader.inline_values()[0],
            *reader.inline_values().last().unwrap(),
            inline_count,
        )?;
        flow.set_secondary_key_axis(
            reader.crossline_values()[0],
            *reader.crossline_values().last().unwrap(),
            crossline_count,
        )?;

        flow.set_stage_state(
            stage_id,
            SegyInputState {
                reader,
                trace_name,
                current_index: 0,
            },
        );
        Ok(())
    }

    fn process(&self, flow: &mut DataFlow, stage_id: &str) -> Result<(), PipelineError> {
        let Some(mut state) = flow.take_stage_state::<SegyInputState>(stage_id) else {
            return Ok(());
        };
        if flow.job_finished() || flow.job_aborted() {
            return Ok(());
        }

        if state.current_index >= state.reader.inline_values().len() {
            flow.set_job_finished();
            flow.set_stage_state(stage_id, *state);
            return Ok(());
        }

        let inline = state.reader.inline_values()[state.current_index];
        info!(stage = stage_id, "Process primary key {}", inline);

        flow.buffer_mut("INLINE")
            .and_then(|b| b.as_i32_mut())
            .ok_or_else(|| PipelineError::InvariantViolation("Null primary key buffer".to_string()))?
            .fill(inline);
        let crosslines: Vec<i32> = state.reader.crossline_values().to_vec();
        flow.buffer_mut("CROSSLINE")
            .and_then(|b| b.as_i32_mut())
            .ok_or_else(|| PipelineError::InvariantViolation("Null secondary key buffer".to_string()))?
            .copy_from_slice(&crosslines);

        let trace = flow
            .buffer_mut(&state.trace_name)
            .and_then(|b| b.as_f32_mut())
            .ok_or_else(|| PipelineError::InvariantViolation("Null trace buffer".to_string()))?;
        state.reader.read_inline(state.current_index, trace)?;

        state.current_index += 1;
        flow.set_stage_state(stage_id, *state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // 2 inlines x 2 crosslines x 3 IEEE samples; see the segy module tests
    // for the value scheme (il*100 + xl*10 + s).
    fn build_segy() -> Vec<u8> {
        let mut data = vec![0u8; 3600];
        data[3200 + 16..3200 + 18].copy_from_slice(&2000u16.to_be_bytes());
        data[3200 + 20..3200 + 22].copy_from_slice(&3u16.to_be_bytes());
        data[3200 + 24..3200 + 26].copy_from_slice(&5u16.to_be_bytes());
        for inline in 1..=2i32 {
            for crossline in 1..=2i32 {
                let mut header = vec![0u8; 240];
                header[188..192].copy_from_slice(&inline.to_be_bytes());
                header[192..196].copy_from_slice(&crossline.to_be_bytes());
                data.extend_from_slice(&header);
                for sample in 0..3 {
                    let value = (inline * 100 + crossline * 10 + sample) as f32;
                    data.extend_from_slice(&value.to_bits().to_be_bytes());
                }
            }
        }
        data
    }

    #[test]
    fn test_segy_source_streams_inlines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&build_segy()).unwrap();
        let cfg = format!("segyinput:\n  url: {}\n", file.path().display());

        let mut flow = DataFlow::new();
        SegyInputStage.init(&mut flow, "segy", &cfg).unwrap();

        assert_eq!(flow.primary_key_axis(), Some((1, 2, 2)));
        assert_eq!(flow.secondary_key_axis(), Some((1, 2, 2)));
        assert_eq!(flow.group_size(), Some(2));
        // 3 samples at 2000 us: 0..4 ms.
        assert_eq!(flow.data_axis(), Some((0.0, 4.0, 3)));

        SegyInputStage.process(&mut flow, "segy").unwrap();
        assert_eq!(flow.buffer("INLINE").unwrap().as_i32().unwrap(), &[1, 1]);
        assert_eq!(flow.buffer("CROSSLINE").unwrap().as_i32().unwrap(), &[1, 2]);
        let trace = flow.buffer("AMPLITUDE").unwrap().as_f32().unwrap();
        assert_eq!(trace, &[110.0, 111.0, 112.0, 120.0, 121.0, 122.0]);

        SegyInputStage.process(&mut flow, "segy").unwrap();
        let trace = flow.buffer("AMPLITUDE").unwrap().as_f32().unwrap();
        assert_eq!(&trace[..3], &[210.0, 211.0, 212.0]);

        SegyInputStage.process(&mut flow, "segy").unwrap();
        assert!(flow.job_finished());
    }
}
