// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Gendata Source Stage
//!
//! Synthesizes a volume: establishes the schema and the three axes from its
//! config, builds one template trace out of Ormsby and/or Ricker wavelets,
//! and streams it across the whole primary-key range, one group per
//! `process` call.
//!
//! Config (under `gendata.`): `maxtime` (ms), `sinterval` (microseconds),
//! `dataname`, `primarykey.{name,first,last,step}`,
//! `secondarykey.{name,first,last,step}`, and optionally
//! `signal.ormsby.{f1,f2,f3,f4,gate,times[]}` and/or
//! `signal.ricker.{pfreq,gate,times[]}`. Wavelet times and gates are in
//! milliseconds, frequencies in Hz.

use geoflow_domain::entities::DataFlow;
use geoflow_domain::services::StageService;
use geoflow_domain::value_objects::ElementFormat;
use geoflow_domain::PipelineError;
use tracing::info;

use crate::infrastructure::config::ModuleConfig;

const PI: f32 = 3.141_592_654;

// Near zero, sin(x)/x is replaced by its series head; the cutoff keeps the
// relative error below f32 resolution.
// Ref: https://www.fitzgibbon.ie/floating-point-equality
fn simple_sinc(x: f32) -> f32 {
    if x.abs() < 0.040_601_544_1 {
        1.0 - (x * x) * (1.0 / 6.0)
    } else {
        x.sin() / x
    }
}

/// Adds Ormsby wavelets at the given times to a template trace.
///
/// `sinterval` is in microseconds, `times` and `gate` in milliseconds.
pub fn add_ormsby_to_trace(
    trc: &mut [f32],
    times: &[f32],
    f1: f32,
    f2: f32,
    f3: f32,
    f4: f32,
    sinterval: f32,
    gate: f32,
) {
    // Samples per millisecond, and the interval in seconds.
    let reverse_si = 1000.0 / sinterval;
    let si_sec = sinterval * 1e-6;

    let pi_f1 = PI * f1;
    let pi_f2 = PI * f2;
    let pi_f3 = PI * f3;
    let pi_f4 = PI * f4;
    let reverse_f2_f1 = 1.0 / (f2 - f1);
    let reverse_f4_f3 = 1.0 / (f4 - f3);

    let gate_length = (gate * reverse_si).floor() as i64;
    let trace_length = trc.len() as i64;

    for time in times {
        let time_index = (time * reverse_si).floor() as i64;
        let gate_beg = (time_index - gate_length / 2).max(0);
        let gate_end = gate_beg + gate_length;
        let gate_end = if gate_end > trace_length {
            trace_length - 1
        } else {
            gate_end
        };

        for k in gate_beg..gate_end {
            let delta = (k - time_index) as f32 * si_sec;
            let tmp1 = simple_sinc(pi_f1 * delta);
            let tmp2 = simple_sinc(pi_f2 * delta);
            let tmp3 = simple_sinc(pi_f3 * delta);
            let tmp4 = simple_sinc(pi_f4 * delta);
            let ormsby = reverse_f2_f1 * ((pi_f1 * f1) * tmp1.powi(2) - (pi_f2 * f2) * tmp2.powi(2))
                - reverse_f4_f3 * ((pi_f3 * f3) * tmp3.powi(2) - (pi_f4 * f4) * tmp4.powi(2));
            trc[k as usize] += ormsby;
        }
    }
}

/// Adds Ricker wavelets at the given times to a template trace.
pub fn add_ricker_to_trace(trc: &mut [f32], times: &[f32], peak_freq: f32, sinterval: f32, gate: f32) {
    let pi_peak_freq = peak_freq * PI;
    let gate_length = (gate / (sinterval * 0.001)).floor() as i64;
    let trace_length = trc.len() as i64;

    for time in times {
        let time_index = (time / (sinterval * 0.001)).floor() as i64;
        let gate_beg = (time_index - gate_length / 2).max(0);
        let gate_end = gate_beg + gate_length;
        let gate_end = if gate_end > trace_length {
            trace_length - 1
        } else {
            gate_end
        };

        for k in gate_beg..gate_end {
            let delta = (k - time_index) as f32 * sinterval * 1e-6;
            let arg = (pi_peak_freq * delta) * (pi_peak_freq * delta);
            trc[k as usize] += (1.0 - 2.0 * arg) * (-arg).exp();
        }
    }
}

struct GendataState {
    pkey_name: String,
    skey_name: String,
    trace_name: String,
    lpkey: i64,
    pkinc: i64,
    fskey: i64,
    skinc: i64,
    num_skey: usize,
    trace_data: Vec<f32>,
    current_pkey: i64,
}

/// Synthesized-volume source stage.
pub struct GendataStage;

impl GendataStage {
    fn parse_key_range(config: &ModuleConfig, prefix: &str) -> Result<(String, i64, i64, i64), PipelineError> {
        let name = config.get_str(&format!("{}.name", prefix))?.to_uppercase();
        let first = config.get_i64(&format!("{}.first", prefix))?;
        let last = config.get_i64(&format!("{}.last", prefix))?;
        let step = config.get_i64(&format!("{}.step", prefix))?;
        if step == 0 {
            return Err(PipelineError::InvalidConfiguration(format!(
                "'{}.step' must not be zero",
                prefix
            )));
        }
        if (last - first) % step != 0 || (last - first) / step < 0 {
            return Err(PipelineError::InvalidConfiguration(format!(
                "'{}' range {}..{} is not reachable with step {}",
                prefix, first, last, step
            )));
        }
        Ok((name, first, last, step))
    }

    fn add_signals(
        config: &ModuleConfig,
        stage_id: &str,
        max_time: i64,
        sinterval: i64,
        trace: &mut [f32],
    ) -> Result<(), PipelineError> {
        if config.has("gendata.signal.ormsby") {
            let f1 = config.get_f32("gendata.signal.ormsby.f1")?;
            let f2 = config.get_f32("gendata.signal.ormsby.f2")?;
            let f3 = config.get_f32("gendata.signal.ormsby.f3")?;
            let f4 = config.get_f32("gendata.signal.ormsby.f4")?;
            let gate = config.get_f32("gendata.signal.ormsby.gate")?;
            if gate > max_time as f32 {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "Ormsby gate {} ms exceeds maxtime {} ms",
                    gate, max_time
                )));
            }
            let times = config.get_f32_array("gendata.signal.ormsby.times")?;
            if times.is_empty() {
                return Err(PipelineError::InvalidConfiguration(
                    "No valid Ormsby times given".to_string(),
                ));
            }
            info!(
                stage = stage_id,
                f1, f2, f3, f4, gate, "Adding {} Ormsby wavelet(s)", times.len()
            );
            add_ormsby_to_trace(trace, &times, f1, f2, f3, f4, sinterval as f32, gate);
        }

        if config.has("gendata.signal.ricker") {
            let pfreq = config.get_f32("gendata.signal.ricker.pfreq")?;
            let gate = config.get_f32("gendata.signal.ricker.gate")?;
            if gate > max_time as f32 {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "Ricker gate {} ms exceeds maxtime {} ms",
                    gate, max_time
                )));
            }
            let times = config.get_f32_array("gendata.signal.ricker.times")?;
            if times.is_empty() {
                return Err(PipelineError::InvalidConfiguration(
                    "No valid Ricker times given".to_string(),
                ));
            }
            info!(stage = stage_id, pfreq, gate, "Adding {} Ricker wavelet(s)", times.len());
            add_ricker_to_trace(trace, &times, pfreq, sinterval as f32, gate);
        }

        Ok(())
    }
}

impl StageService for GendataStage {
    fn init(&self, flow: &mut DataFlow, stage_id: &str, config: &str) -> Result<(), PipelineError> {
        let config = ModuleConfig::parse(config)?;

        let max_time = config.get_i64("gendata.maxtime")?;
        let sinterval = config.get_i64("gendata.sinterval")?;
        if max_time <= 0 || sinterval <= 0 {
            return Err(PipelineError::InvalidConfiguration(
                "'gendata.maxtime' and 'gendata.sinterval' must be positive".to_string(),
            ));
        }

        let (pkey_name, fpkey, lpkey, pkinc) = Self::parse_key_range(&config, "gendata.primarykey")?;
        let (skey_name, fskey, lskey, skinc) = Self::parse_key_range(&config, "gendata.secondarykey")?;
        let trace_name = config.get_str("gendata.dataname")?.to_uppercase();

        let num_pkey = ((lpkey - fpkey) / pkinc + 1) as usize;
        let num_skey = ((lskey - fskey) / skinc + 1) as usize;

        // Sampling interval is in microseconds, maxtime in milliseconds.
        let trace_length = (max_time as f32 / (sinterval as f32 * 0.001)) as usize + 1;

        info!(
            stage = stage_id,
            primary = %pkey_name,
            secondary = %skey_name,
            data = %trace_name,
            num_pkey,
            num_skey,
            trace_length,
            "gendata: maxtime {} ms, sinterval {} us",
            max_time,
            sinterval
        );

        flow.add_attribute(&pkey_name, ElementFormat::Int32, 1)?;
        flow.add_attribute(&skey_name, ElementFormat::Int32, 1)?;
        flow.set_primary_key_name(&pkey_name)?;
        flow.set_secondary_key_name(&skey_name)?;

        flow.add_attribute(&trace_name, ElementFormat::Float32, trace_length)?;
        flow.set_volume_data_name(&trace_name)?;
        flow.set_data_axis_unit("ms");

        flow.set_group_size(num_skey)?;
        flow.set_data_axis(0.0, max_time as f32, trace_length)?;
        flow.set_primary_key_axis(fpkey as i32, lpkey as i32, num_pkey)?;
        flow.set_secondary_key_axis(fskey as i32, lskey as i32, num_skey)?;
        flow.set_attribute_value_range(&trace_name, -1.0, 1.0)?;

        let mut trace_data = vec![0.0f32; trace_length];
        Self::add_signals(&config, stage_id, max_time, sinterval, &mut trace_data)?;

        flow.set_stage_state(
            stage_id,
            GendataState {
                pkey_name,
                skey_name,
                trace_name,
                lpkey,
                pkinc,
                fskey,
                skinc,
                num_skey,
                trace_data,
                current_pkey: fpkey,
            },
        );
        Ok(())
    }

    fn process(&self, flow: &mut DataFlow, stage_id: &str) -> Result<(), PipelineError> {
        let Some(mut state) = flow.take_stage_state::<GendataState>(stage_id) else {
            return Ok(());
        };
        if flow.job_finished() || flow.job_aborted() {
            // Terminal call: dropping the state releases it.
            return Ok(());
        }

        // Past the last primary key: mark end of data. The state stays for
        // the terminal round.
        let past_end = if state.pkinc > 0 {
            state.current_pkey > state.lpkey
        } else {
            state.current_pkey < state.lpkey
        };
        if past_end {
            flow.set_job_finished();
            flow.set_stage_state(stage_id, *state);
            return Ok(());
        }

        let pkey = flow
            .buffer_mut(&state.pkey_name)
            .and_then(|b| b.as_i32_mut())
            .ok_or_else(|| PipelineError::InvariantViolation("Null primary key buffer".to_string()))?;
        pkey.fill(state.current_pkey as i32);

        let skey = flow
            .buffer_mut(&state.skey_name)
            .and_then(|b| b.as_i32_mut())
            .ok_or_else(|| PipelineError::InvariantViolation("Null secondary key buffer".to_string()))?;
        for (i, value) in skey.iter_mut().enumerate() {
            *value = (state.fskey + i as i64 * state.skinc) as i32;
        }

        info!(stage = stage_id, "Process primary key {}", state.current_pkey);

        let trace = flow
            .buffer_mut(&state.trace_name)
            .and_then(|b| b.as_f32_mut())
            .ok_or_else(|| PipelineError::InvariantViolation("Null trace buffer".to_string()))?;
        let trace_length = state.trace_data.len();
        for row in 0..state.num_skey {
            trace[row * trace_length..(row + 1) * trace_length].copy_from_slice(&state.trace_data);
        }

        state.current_pkey += state.pkinc;
        flow.set_stage_state(stage_id, *state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
gendata:
  maxtime: 20
  sinterval: 5000
  dataname: seismic
  primarykey:
    name: inline
    first: 10
    last: 12
    step: 1
  secondarykey:
    name: crossline
    first: 20
    last: 22
    step: 1
"#;

    fn run_one_group(flow: &mut DataFlow) {
        GendataStage.init(flow, "gen", CONFIG).unwrap();
        GendataStage.process(flow, "gen").unwrap();
    }

    #[test]
    fn test_init_builds_schema_and_axes() {
        let mut flow = DataFlow::new();
        GendataStage.init(&mut flow, "gen", CONFIG).unwrap();

        assert_eq!(flow.primary_key_name(), Some("INLINE"));
        assert_eq!(flow.secondary_key_name(), Some("CROSSLINE"));
        assert_eq!(flow.volume_data_name(), Some("SEISMIC"));
        assert_eq!(flow.group_size(), Some(3));
        // maxtime 20 ms at 5000 us sampling: 5 samples.
        assert_eq!(flow.data_vector_length(), Some(5));
        assert_eq!(flow.primary_key_axis(), Some((10, 12, 3)));
        assert_eq!(flow.data_axis(), Some((0.0, 20.0, 5)));
    }

    #[test]
    fn test_process_fills_keys_and_traces() {
        let mut flow = DataFlow::new();
        run_one_group(&mut flow);

        assert_eq!(flow.buffer("INLINE").unwrap().as_i32().unwrap(), &[10, 10, 10]);
        assert_eq!(flow.buffer("CROSSLINE").unwrap().as_i32().unwrap(), &[20, 21, 22]);
        let trace = flow.buffer("SEISMIC").unwrap().as_f32().unwrap();
        assert_eq!(trace.len(), 15);
        assert!(trace.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_cursor_reaches_end_and_finishes() {
        let mut flow = DataFlow::new();
        GendataStage.init(&mut flow, "gen", CONFIG).unwrap();
        for _ in 0..3 {
            GendataStage.process(&mut flow, "gen").unwrap();
            assert!(!flow.job_finished());
        }
        GendataStage.process(&mut flow, "gen").unwrap();
        assert!(flow.job_finished());
    }

    #[test]
    fn test_missing_option_fails_init() {
        let mut flow = DataFlow::new();
        let err = GendataStage.init(&mut flow, "gen", "gendata: {maxtime: 20}").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_ricker_peak_is_at_the_requested_time() {
        let mut trace = vec![0.0f32; 41];
        // 4 ms sampling, peak at 80 ms, 40 ms gate.
        add_ricker_to_trace(&mut trace, &[80.0], 25.0, 4000.0, 40.0);
        assert_eq!(trace[20], 1.0);
        assert!(trace[20] > trace[19] && trace[20] > trace[21]);
        // Outside the gate nothing was touched.
        assert_eq!(trace[0], 0.0);
        assert_eq!(trace[40], 0.0);
    }

    #[test]
    fn test_ormsby_adds_energy_inside_the_gate() {
        let mut trace = vec![0.0f32; 101];
        add_ormsby_to_trace(&mut trace, &[100.0], 5.0, 10.0, 40.0, 45.0, 2000.0, 40.0);
        let peak_index = 50;
        assert!(trace[peak_index] != 0.0);
        assert_eq!(trace[0], 0.0);
        assert_eq!(trace[100], 0.0);
    }
}
