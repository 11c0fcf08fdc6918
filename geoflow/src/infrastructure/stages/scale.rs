// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Scale Transform Stage
//!
//! Rescales the trace amplitudes with exactly one of three methods:
//!
//! - `scale.method.factor.value` - constant multiplicative factor, applied
//!   in the trace's native element type for float formats and through the
//!   `f64` intermediate for integer formats
//! - `scale.method.agc.window_size` - automatic gain control: each sample
//!   is divided by the mean absolute value over a window centered on it
//!   (radius `max(1, round(window / sample_interval / 2))` samples);
//!   samples whose window sums to zero become zero
//! - `scale.method.diverge.{a,v}` - spherical divergence: each sample is
//!   multiplied by `t^a * v` with `t` the sample's axis value
//!
//! AGC and divergence widen every sample to `f64`, compute, and narrow
//! back to the storage format.

use geoflow_domain::entities::DataFlow;
use geoflow_domain::services::StageService;
use geoflow_domain::value_objects::AttributeBuffer;
use geoflow_domain::PipelineError;
use tracing::info;

use crate::infrastructure::config::ModuleConfig;
use crate::infrastructure::stages::group_geometry;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScaleMethod {
    Factor { value: f64 },
    Agc { window_size: f64 },
    Diverge { a: f64, v: f64 },
}

struct ScaleState {
    method: ScaleMethod,
}

/// Applies AGC over one trace: `out[y] = in[y] * n / sum(|in|)` across the
/// window of `radius` samples on either side of `y`.
pub(crate) fn agc_trace(input: &[f64], output: &mut [f64], radius: usize) {
    let height = input.len();
    let mut sum = 0.0f64;
    let mut n = 0usize;

    for value in input.iter().take(radius.min(height)) {
        sum += value.abs();
        n += 1;
    }

    for y in 0..height {
        if y > radius {
            sum -= input[y - radius - 1].abs();
            n -= 1;
        }
        if y + radius < height {
            sum += input[y + radius].abs();
            n += 1;
        }
        output[y] = if sum != 0.0 && n > 0 {
            input[y] * n as f64 / sum
        } else {
            0.0
        };
    }
}

/// Trace amplitude scaling stage.
pub struct ScaleStage;

impl ScaleStage {
    fn apply_factor(buffer: &mut AttributeBuffer, factor: f64) -> Result<(), PipelineError> {
        match buffer {
            AttributeBuffer::Float32(values) => {
                let factor = factor as f32;
                values.iter_mut().for_each(|v| *v *= factor);
                Ok(())
            }
            AttributeBuffer::Float64(values) => {
                values.iter_mut().for_each(|v| *v *= factor);
                Ok(())
            }
            _ => {
                let scaled: Vec<f64> = buffer.to_f64().into_iter().map(|v| v * factor).collect();
                buffer.fill_from_f64(&scaled)
            }
        }
    }

    fn apply_agc(
        buffer: &mut AttributeBuffer,
        group_size: usize,
        trace_length: usize,
        window_size: f64,
        sample_interval: f64,
    ) -> Result<(), PipelineError> {
        if sample_interval <= 0.0 {
            return Err(PipelineError::InvariantViolation(
                "AGC requires a positive sample interval".to_string(),
            ));
        }
        let radius = ((window_size / sample_interval / 2.0).round() as i64).max(1) as usize;

        let input = buffer.to_f64();
        let mut output = vec![0.0f64; input.len()];
        for row in 0..group_size {
            let range = row * trace_length..(row + 1) * trace_length;
            agc_trace(&input[range.clone()], &mut output[range], radius);
        }
        buffer.fill_from_f64(&output)
    }

    fn apply_diverge(
        buffer: &mut AttributeBuffer,
        group_size: usize,
        trace_length: usize,
        origin: f64,
        sample_interval: f64,
        a: f64,
        v: f64,
    ) -> Result<(), PipelineError> {
        let gains: Vec<f64> = (0..trace_length)
            .map(|y| (origin + sample_interval * y as f64).powf(a) * v)
            .collect();

        let mut values = buffer.to_f64();
        for row in 0..group_size {
            for (y, gain) in gains.iter().enumerate() {
                values[row * trace_length + y] *= gain;
            }
        }
        buffer.fill_from_f64(&values)
    }
}

impl StageService for ScaleStage {
    fn init(&self, flow: &mut DataFlow, stage_id: &str, config: &str) -> Result<(), PipelineError> {
        let config = ModuleConfig::parse(config)?;

        let method = if config.has("scale.method.factor") {
            ScaleMethod::Factor {
                value: config.get_f64("scale.method.factor.value")?,
            }
        } else if config.has("scale.method.agc") {
            ScaleMethod::Agc {
                window_size: config.get_f64("scale.method.agc.window_size")?,
            }
        } else if config.has("scale.method.diverge") {
            ScaleMethod::Diverge {
                a: config.get_f64("scale.method.diverge.a")?,
                v: config.get_f64("scale.method.diverge.v")?,
            }
        } else {
            return Err(PipelineError::InvalidConfiguration(
                "Unknown scaling method; expected factor, agc, or diverge".to_string(),
            ));
        };

        info!(stage = stage_id, method = ?method, "scale initialized");
        flow.set_stage_state(stage_id, ScaleState { method });
        Ok(())
    }

    fn process(&self, flow: &mut DataFlow, stage_id: &str) -> Result<(), PipelineError> {
        let Some(state) = flow.take_stage_state::<ScaleState>(stage_id) else {
            return Ok(());
        };
        if flow.job_finished() || flow.job_aborted() {
            return Ok(());
        }

        let (group_size, trace_length) = group_geometry(flow)?;
        let (origin, sample_interval) = {
            let axis = flow
                .data_axis_descriptor()
                .ok_or_else(|| PipelineError::InvariantViolation("Data axis is not set".to_string()))?;
            (axis.min, axis.step())
        };
        let trace_name = flow
            .volume_data_name()
            .ok_or_else(|| PipelineError::InvariantViolation("Volume data attribute is not designated".to_string()))?
            .to_string();
        let buffer = flow.buffer_mut(&trace_name).ok_or_else(|| {
            PipelineError::InvariantViolation(format!("Runtime returned no buffer for '{}'", trace_name))
        })?;

        match state.method {
            ScaleMethod::Factor { value } => Self::apply_factor(buffer, value)?,
            ScaleMethod::Agc { window_size } => {
                Self::apply_agc(buffer, group_size, trace_length, window_size, sample_interval)?
            }
            ScaleMethod::Diverge { a, v } => {
                Self::apply_diverge(buffer, group_size, trace_length, origin, sample_interval, a, v)?
            }
        }

        flow.set_stage_state(stage_id, *state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoflow_domain::value_objects::ElementFormat;

    fn seeded_flow(samples: usize, max_time: f32, trace: &[f64]) -> DataFlow {
        let mut flow = DataFlow::new();
        flow.add_attribute("INLINE", ElementFormat::Int32, 1).unwrap();
        flow.add_attribute("CROSSLINE", ElementFormat::Int32, 1).unwrap();
        flow.add_attribute("SEISMIC", ElementFormat::Float32, samples).unwrap();
        flow.set_primary_key_name("INLINE").unwrap();
        flow.set_secondary_key_name("CROSSLINE").unwrap();
        flow.set_volume_data_name("SEISMIC").unwrap();
        flow.set_data_axis(0.0, max_time, samples).unwrap();
        flow.set_group_size(2).unwrap();
        let full: Vec<f64> = trace.iter().chain(trace.iter()).copied().collect();
        flow.buffer_mut("SEISMIC").unwrap().fill_from_f64(&full).unwrap();
        flow
    }

    #[test]
    fn test_factor_one_is_bitwise_identity() {
        let trace: Vec<f64> = (0..5).map(|i| i as f64 * 0.3 - 0.7).collect();
        let mut flow = seeded_flow(5, 20.0, &trace);
        let before = flow.buffer("SEISMIC").unwrap().clone();

        let cfg = "scale:\n  method:\n    factor:\n      value: 1.0\n";
        ScaleStage.init(&mut flow, "scale", cfg).unwrap();
        ScaleStage.process(&mut flow, "scale").unwrap();
        assert_eq!(flow.buffer("SEISMIC").unwrap(), &before);
    }

    #[test]
    fn test_factor_scales_every_sample() {
        let mut flow = seeded_flow(3, 2.0, &[1.0, -2.0, 4.0]);
        let cfg = "scale:\n  method:\n    factor:\n      value: 2.5\n";
        ScaleStage.init(&mut flow, "scale", cfg).unwrap();
        ScaleStage.process(&mut flow, "scale").unwrap();
        let values = flow.buffer("SEISMIC").unwrap().as_f32().unwrap();
        assert_eq!(&values[..3], &[2.5, -5.0, 10.0]);
        assert_eq!(&values[3..], &[2.5, -5.0, 10.0]);
    }

    #[test]
    fn test_agc_of_constant_trace_is_flat_unit_gain() {
        // The windowed mean of a constant trace equals the sample value,
        // so the gain-corrected output is 1 everywhere.
        let trace = vec![4.0f64; 11];
        let mut flow = seeded_flow(11, 10.0, &trace);
        let cfg = "scale:\n  method:\n    agc:\n      window_size: 4.0\n";
        ScaleStage.init(&mut flow, "scale", cfg).unwrap();
        ScaleStage.process(&mut flow, "scale").unwrap();
        let values = flow.buffer("SEISMIC").unwrap().as_f32().unwrap();
        assert!(values.iter().all(|v| *v == 1.0), "{:?}", values);
    }

    #[test]
    fn test_agc_zero_window_sum_yields_zero() {
        let mut input = vec![0.0f64; 8];
        let mut output = vec![9.0f64; 8];
        agc_trace(&input, &mut output, 2);
        assert!(output.iter().all(|v| *v == 0.0));

        input[7] = 3.0;
        agc_trace(&input, &mut output, 1);
        assert_eq!(output[0], 0.0);
        assert_eq!(output[7], 2.0); // 3 * 2 / 3 over the clipped window
    }

    #[test]
    fn test_diverge_matches_t_pow_a_times_v() {
        // Constant 1.0 trace, a=2, v=1, axis 0..10 in 11 samples: squares.
        let trace = vec![1.0f64; 11];
        let mut flow = seeded_flow(11, 10.0, &trace);
        let cfg = "scale:\n  method:\n    diverge:\n      a: 2.0\n      v: 1.0\n";
        ScaleStage.init(&mut flow, "scale", cfg).unwrap();
        ScaleStage.process(&mut flow, "scale").unwrap();
        let values = flow.buffer("SEISMIC").unwrap().as_f32().unwrap();
        for (i, value) in values[..11].iter().enumerate() {
            assert_eq!(*value, (i * i) as f32);
        }
    }

    #[test]
    fn test_exactly_one_method_required() {
        let mut flow = seeded_flow(3, 2.0, &[1.0, 1.0, 1.0]);
        assert!(ScaleStage.init(&mut flow, "scale", "scale:\n  method: {}\n").is_err());
    }

    #[test]
    fn test_integer_trace_factor_rounds_and_saturates() {
        let mut buffer = AttributeBuffer::zeroed(ElementFormat::Int8, 3);
        buffer.fill_from_f64(&[10.0, -10.0, 100.0]).unwrap();
        ScaleStage::apply_factor(&mut buffer, 2.0).unwrap();
        match buffer {
            AttributeBuffer::Int8(values) => assert_eq!(values, vec![20, -20, i8::MAX]),
            _ => unreachable!(),
        }
    }
}
