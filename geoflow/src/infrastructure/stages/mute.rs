// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Mute Transform Stage
//!
//! Time-domain mute with a linear taper window. Config (under `mute.`):
//!
//! - `compare_direction` - `<` or `>`: which side of the threshold is muted
//! - `threshold.value` (constant integer) or `threshold.expr` (an
//!   expression over scalar attributes, one threshold per group row)
//! - `tapering_window_size` - signed taper width in sample-axis units
//!
//! Per sample, the factor is 1 on the kept side, 0 deep in the mute region,
//! and ramps linearly across the taper: a positive width places the ramp
//! beyond the threshold on the muted side (factor 1 at the threshold,
//! 0 at `threshold +/- width`), a negative width places it on the kept
//! side. A width of zero produces a hard step. The factor vector is
//! multiplied into the trace through the vector kernels and narrowed back
//! to the trace's storage format.

use geoflow_domain::entities::DataFlow;
use geoflow_domain::expression::{
    evaluate_expression, parse_expression, vector_compute_binary, ExprNode, ExprOp,
};
use geoflow_domain::services::StageService;
use geoflow_domain::value_objects::VectorView;
use geoflow_domain::PipelineError;
use tracing::{debug, info};

use crate::infrastructure::config::ModuleConfig;
use crate::infrastructure::stages::{admissible_variables, bind_all_attributes, group_geometry, variable_lengths};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareDirection {
    Less,
    Greater,
}

enum Threshold {
    Value(i64),
    Expr(ExprNode),
}

struct MuteState {
    direction: CompareDirection,
    threshold: Threshold,
    taper_window: i64,
}

/// Computes the per-sample mute factors for one trace.
///
/// `times` are the sample-axis values; `threshold` is this row's threshold.
fn mute_factors_into(
    factors: &mut [f32],
    times: &[f64],
    direction: CompareDirection,
    threshold: f64,
    taper_window: i64,
) {
    let width = taper_window.unsigned_abs() as f64;
    // The taper sits past the threshold on the muted side for positive
    // widths, before it on the kept side for negative widths.
    let (wind_left, wind_right) = match (direction, taper_window >= 0) {
        (CompareDirection::Greater, true) => (threshold, threshold + width),
        (CompareDirection::Greater, false) => (threshold - width, threshold),
        (CompareDirection::Less, true) => (threshold - width, threshold),
        (CompareDirection::Less, false) => (threshold, threshold + width),
    };

    for (factor, &t) in factors.iter_mut().zip(times) {
        *factor = match direction {
            CompareDirection::Greater => {
                if t < wind_left {
                    1.0
                } else if t < wind_right {
                    ((wind_right - t) / width) as f32
                } else {
                    0.0
                }
            }
            CompareDirection::Less => {
                if t <= wind_left {
                    0.0
                } else if t <= wind_right {
                    ((t - wind_left) / width) as f32
                } else {
                    1.0
                }
            }
        };
    }
}

/// Time-domain mute stage.
pub struct MuteStage;

impl StageService for MuteStage {
    fn init(&self, flow: &mut DataFlow, stage_id: &str, config: &str) -> Result<(), PipelineError> {
        let config = ModuleConfig::parse(config)?;

        let direction = match config.get_str("mute.compare_direction")?.as_str() {
            "<" => CompareDirection::Less,
            ">" => CompareDirection::Greater,
            other => {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "compare_direction is invalid: {}",
                    other
                )))
            }
        };

        let threshold = if config.has("mute.threshold.value") {
            Threshold::Value(config.get_i64("mute.threshold.value")?)
        } else if config.has("mute.threshold.expr") {
            let expr = config.get_str("mute.threshold.expr")?.to_uppercase();
            let parsed = parse_expression(&expr, &admissible_variables(flow))?;
            // Threshold expressions combine per-trace scalars only.
            let lengths = variable_lengths(flow);
            for used in &parsed.used_variables {
                if lengths.get(used) != Some(&1) {
                    return Err(PipelineError::SchemaError(format!(
                        "Attribute length should be 1, but {} length = {}",
                        used,
                        lengths.get(used).copied().unwrap_or(0)
                    )));
                }
            }
            Threshold::Expr(parsed.tree)
        } else {
            return Err(PipelineError::InvalidConfiguration(
                "Missing 'mute.threshold.value' or 'mute.threshold.expr'".to_string(),
            ));
        };

        let taper_window = config.get_i64("mute.tapering_window_size")?;

        info!(
            stage = stage_id,
            direction = ?direction,
            taper_window,
            "mute initialized"
        );

        flow.set_stage_state(
            stage_id,
            MuteState {
                direction,
                threshold,
                taper_window,
            },
        );
        Ok(())
    }

    fn process(&self, flow: &mut DataFlow, stage_id: &str) -> Result<(), PipelineError> {
        let Some(state) = flow.take_stage_state::<MuteState>(stage_id) else {
            return Ok(());
        };
        if flow.job_finished() || flow.job_aborted() {
            return Ok(());
        }

        let (group_size, trace_length) = group_geometry(flow)?;
        let data_axis = flow
            .data_axis_descriptor()
            .ok_or_else(|| PipelineError::InvariantViolation("Data axis is not set".to_string()))?;
        let times: Vec<f64> = (0..trace_length).map(|i| data_axis.value_at(i)).collect();

        // 1. One threshold per group row.
        let thresholds: Vec<f64> = match &state.threshold {
            Threshold::Value(value) => vec![*value as f64; group_size],
            Threshold::Expr(tree) => {
                let bindings = bind_all_attributes(flow)?;
                evaluate_expression(tree, &bindings, group_size)?
                    .into_iter()
                    // The original truncates expression thresholds to ints.
                    .map(|v| v as i64 as f64)
                    .collect()
            }
        };

        // 2. Per-sample factors in [0, 1] for the whole group.
        let mut factors = vec![0.0f32; group_size * trace_length];
        for (row, chunk) in factors.chunks_mut(trace_length).enumerate() {
            debug!(stage = stage_id, row, threshold = thresholds[row], "mute window");
            mute_factors_into(chunk, &times, state.direction, thresholds[row], state.taper_window);
        }

        // 3. trace = trace * factor through the kernel family, then narrow
        //    back into the trace's storage format.
        let trace_name = flow
            .volume_data_name()
            .ok_or_else(|| PipelineError::InvariantViolation("Volume data attribute is not designated".to_string()))?
            .to_string();
        let mut result = vec![0.0f64; group_size * trace_length];
        {
            let trace = flow.buffer(&trace_name).ok_or_else(|| {
                PipelineError::InvariantViolation(format!("Runtime returned no buffer for '{}'", trace_name))
            })?;
            vector_compute_binary(
                ExprOp::Mul,
                &mut result,
                trace.as_view(),
                VectorView::Float32(&factors),
            )?;
        }
        flow.buffer_mut(&trace_name)
            .ok_or_else(|| {
                PipelineError::InvariantViolation(format!("Runtime returned no buffer for '{}'", trace_name))
            })?
            .fill_from_f64(&result)?;

        flow.set_stage_state(stage_id, *state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoflow_domain::value_objects::ElementFormat;

    fn seeded_flow(trace_value: f32) -> DataFlow {
        let mut flow = DataFlow::new();
        flow.add_attribute("INLINE", ElementFormat::Int32, 1).unwrap();
        flow.add_attribute("CROSSLINE", ElementFormat::Int32, 1).unwrap();
        flow.add_attribute("SEISMIC", ElementFormat::Float32, 41).unwrap();
        flow.set_primary_key_name("INLINE").unwrap();
        flow.set_secondary_key_name("CROSSLINE").unwrap();
        flow.set_volume_data_name("SEISMIC").unwrap();
        flow.set_data_axis(0.0, 20000.0, 41).unwrap();
        flow.set_group_size(2).unwrap();
        flow.buffer_mut("SEISMIC")
            .unwrap()
            .fill_from_f64(&vec![trace_value as f64; 82])
            .unwrap();
        flow
    }

    #[test]
    fn test_factors_ramp_beyond_threshold_for_positive_width() {
        // Sample axis 0..20000 step 500: ramp from 1 at t=3000 to 0 at
        // t=5000, 1 below, 0 above.
        let times: Vec<f64> = (0..41).map(|i| i as f64 * 500.0).collect();
        let mut factors = vec![0.0f32; 41];
        mute_factors_into(&mut factors, &times, CompareDirection::Greater, 3000.0, 2000);

        for (i, &t) in times.iter().enumerate() {
            let expected = if t < 3000.0 {
                1.0
            } else if t < 5000.0 {
                ((5000.0 - t) / 2000.0) as f32
            } else {
                0.0
            };
            assert_eq!(factors[i], expected, "at t={}", t);
        }
        assert_eq!(factors[6], 1.0); // t = 3000
        assert_eq!(factors[8], 0.5); // t = 4000
        assert_eq!(factors[10], 0.0); // t = 5000
    }

    #[test]
    fn test_zero_width_is_a_step() {
        let times: Vec<f64> = (0..5).map(|i| i as f64).collect();
        let mut factors = vec![9.0f32; 5];
        mute_factors_into(&mut factors, &times, CompareDirection::Greater, 2.0, 0);
        assert_eq!(factors, vec![1.0, 1.0, 0.0, 0.0, 0.0]);

        mute_factors_into(&mut factors, &times, CompareDirection::Less, 2.0, 0);
        assert_eq!(factors, vec![0.0, 0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_negative_width_tapers_on_the_kept_side() {
        let times: Vec<f64> = (0..5).map(|i| i as f64 * 1000.0).collect();
        let mut factors = vec![0.0f32; 5];
        mute_factors_into(&mut factors, &times, CompareDirection::Greater, 2000.0, -2000);
        assert_eq!(factors, vec![1.0, 0.5, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_constant_threshold_scales_the_trace() {
        let mut flow = seeded_flow(100.0);
        let cfg = "mute:\n  compare_direction: \">\"\n  threshold:\n    value: 3000\n  tapering_window_size: 2000\n";
        MuteStage.init(&mut flow, "mute", cfg).unwrap();
        MuteStage.process(&mut flow, "mute").unwrap();

        let trace = flow.buffer("SEISMIC").unwrap().as_f32().unwrap();
        for row in 0..2 {
            let trace = &trace[row * 41..(row + 1) * 41];
            assert_eq!(trace[0], 100.0);
            assert_eq!(trace[6], 100.0);
            assert_eq!(trace[8], 50.0);
            assert_eq!(trace[10], 0.0);
            assert_eq!(trace[40], 0.0);
        }
    }

    #[test]
    fn test_out_of_range_threshold_with_zero_window_is_identity() {
        let mut flow = seeded_flow(7.25);
        let before = flow.buffer("SEISMIC").unwrap().clone();
        let cfg = "mute:\n  compare_direction: \"<\"\n  threshold:\n    value: -1000\n  tapering_window_size: 0\n";
        MuteStage.init(&mut flow, "mute", cfg).unwrap();
        MuteStage.process(&mut flow, "mute").unwrap();
        assert_eq!(flow.buffer("SEISMIC").unwrap(), &before);
    }

    #[test]
    fn test_expression_threshold_uses_scalar_attributes() {
        let mut flow = seeded_flow(10.0);
        flow.buffer_mut("CROSSLINE")
            .unwrap()
            .fill_from_f64(&[1.0, 9.0])
            .unwrap();
        // Row thresholds 1000 and 9000; full mute below threshold.
        let cfg = "mute:\n  compare_direction: \"<\"\n  threshold:\n    expr: \"CROSSLINE * 1000\"\n  tapering_window_size: 0\n";
        MuteStage.init(&mut flow, "mute", cfg).unwrap();
        MuteStage.process(&mut flow, "mute").unwrap();

        let trace = flow.buffer("SEISMIC").unwrap().as_f32().unwrap();
        // Row 0: muted for t <= 1000 (samples 0..=2).
        assert_eq!(trace[0], 0.0);
        assert_eq!(trace[2], 0.0);
        assert_eq!(trace[3], 10.0);
        // Row 1: muted for t <= 9000 (samples 0..=18).
        assert_eq!(trace[41 + 18], 0.0);
        assert_eq!(trace[41 + 19], 10.0);
    }

    #[test]
    fn test_vector_attribute_in_threshold_expr_fails() {
        let mut flow = seeded_flow(1.0);
        let cfg = "mute:\n  compare_direction: \"<\"\n  threshold:\n    expr: \"SEISMIC\"\n  tapering_window_size: 0\n";
        assert!(MuteStage.init(&mut flow, "mute", cfg).is_err());
    }
}
