// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Testgendata Source Stage
//!
//! Deterministic/random test source for regression pipelines. Registers
//! the same schema shape as `gendata`, fills every configured attribute
//! from a data descriptor, and records each generated buffer as a
//! little-endian `<NAME>.DAT` reference file for `testexpect` to compare
//! against.
//!
//! Config (under `testgendata.`): `primarykey` / `secondarykey`
//! (`{name, first, last, step}`), `tracekey`
//! (`{name, tmin, tmax, length, data}`), optional `attribute[]`
//! (`{name, length, data}`), optional `datadir` (default `.`). A data
//! descriptor is either `random: {min, max, type}` or
//! `sequence: {min, max, step, type}`; sequences wrap at their bounds and
//! are generated once, random data is regenerated every group.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use geoflow_domain::entities::DataFlow;
use geoflow_domain::services::StageService;
use geoflow_domain::value_objects::{AttributeBuffer, ElementFormat};
use geoflow_domain::PipelineError;
use rand::Rng;
use tracing::{debug, info};

use crate::infrastructure::config::ModuleConfig;

/// How an attribute's values are produced.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DataPattern {
    Random { min: f64, max: f64 },
    Sequence { min: f64, max: f64, step: f64 },
}

impl DataPattern {
    fn parse(config: &ModuleConfig, prefix: &str) -> Result<(Self, ElementFormat), PipelineError> {
        if config.has(&format!("{}.random", prefix)) {
            let min = config.get_f64(&format!("{}.random.min", prefix))?;
            let max = config.get_f64(&format!("{}.random.max", prefix))?;
            if min > max {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "'{}.random' min exceeds max",
                    prefix
                )));
            }
            let format = ElementFormat::from_str(&config.get_str(&format!("{}.random.type", prefix))?)?;
            Ok((DataPattern::Random { min, max }, format))
        } else if config.has(&format!("{}.sequence", prefix)) {
            let min = config.get_f64(&format!("{}.sequence.min", prefix))?;
            let max = config.get_f64(&format!("{}.sequence.max", prefix))?;
            let step = config.get_f64(&format!("{}.sequence.step", prefix))?;
            let format = ElementFormat::from_str(&config.get_str(&format!("{}.sequence.type", prefix))?)?;
            Ok((DataPattern::Sequence { min, max, step }, format))
        } else {
            Err(PipelineError::InvalidConfiguration(format!(
                "'{}' should be random or sequence",
                prefix
            )))
        }
    }
}

/// Fills buffers from data descriptors and records reference files.
pub(crate) struct DataGenerator {
    datadir: PathBuf,
}

impl DataGenerator {
    pub(crate) fn new(datadir: impl Into<PathBuf>) -> Self {
        DataGenerator {
            datadir: datadir.into(),
        }
    }

    fn reference_path(&self, name: &str) -> PathBuf {
        self.datadir.join(format!("{}.DAT", name))
    }

    /// Generates `length` values per the pattern into the buffer and saves
    /// the little-endian image as the attribute's reference file.
    pub(crate) fn generate(
        &self,
        name: &str,
        pattern: &DataPattern,
        buffer: &mut AttributeBuffer,
    ) -> Result<(), PipelineError> {
        let length = buffer.len();
        let values: Vec<f64> = match pattern {
            DataPattern::Random { min, max } => {
                let mut rng = rand::rng();
                (0..length).map(|_| rng.random_range(*min..=*max)).collect()
            }
            DataPattern::Sequence { min, max, step } => {
                let mut current = *min;
                (0..length)
                    .map(|_| {
                        let value = current;
                        current += step;
                        if *step >= 0.0 && current > *max {
                            current = *min;
                        } else if *step < 0.0 && current < *min {
                            current = *max;
                        }
                        value
                    })
                    .collect()
            }
        };
        buffer.fill_from_f64(&values)?;

        let path = self.reference_path(name);
        std::fs::write(&path, buffer.to_le_bytes())
            .map_err(|e| PipelineError::IoError(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(())
    }
}

struct AttrSpec {
    name: String,
    pattern: DataPattern,
}

struct TestgendataState {
    pkey_name: String,
    skey_name: String,
    lpkey: i64,
    pkinc: i64,
    skeys: Vec<i32>,
    attrs: Vec<AttrSpec>,
    generator: DataGenerator,
    current_pkey: i64,
}

/// Test-data source stage.
pub struct TestgendataStage;

fn parse_key(config: &ModuleConfig, prefix: &str) -> Result<(String, i64, i64, i64), PipelineError> {
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
    Ok((name, first, last, step))
}

impl StageService for TestgendataStage {
    fn init(&self, flow: &mut DataFlow, stage_id: &str, config: &str) -> Result<(), PipelineError> {
        let config = ModuleConfig::parse(config)?;

        let (pkey_name, fpkey, lpkey, pkinc) = parse_key(&config, "testgendata.primarykey")?;
        let (skey_name, fskey, lskey, skinc) = parse_key(&config, "testgendata.secondarykey")?;
        let num_pkey = ((lpkey - fpkey) / pkinc + 1) as usize;
        let num_skey = ((lskey - fskey) / skinc + 1) as usize;

        let trace_name = config.get_str("testgendata.tracekey.name")?.to_uppercase();
        let tmin = config.get_f32("testgendata.tracekey.tmin")?;
        let tmax = config.get_f32("testgendata.tracekey.tmax")?;
        let trace_length = config.get_i64("testgendata.tracekey.length")? as usize;
        let (trace_pattern, _trace_format) = DataPattern::parse(&config, "testgendata.tracekey.data")?;

        let datadir = if config.has("testgendata.datadir") {
            config.get_str("testgendata.datadir")?
        } else {
            ".".to_string()
        };
        if !Path::new(&datadir).is_dir() {
            return Err(PipelineError::IoError(format!(
                "testgendata datadir does not exist: {}",
                datadir
            )));
        }

        info!(
            stage = stage_id,
            primary = %pkey_name,
            secondary = %skey_name,
            trace = %trace_name,
            num_pkey,
            num_skey,
            trace_length,
            "testgendata initialized"
        );

        flow.add_attribute(&pkey_name, ElementFormat::Int32, 1)?;
        flow.add_attribute(&skey_name, ElementFormat::Int32, 1)?;
        flow.set_primary_key_name(&pkey_name)?;
        flow.set_secondary_key_name(&skey_name)?;

        // The trace attribute itself is always 32-bit float, whatever the
        // generator pattern produces.
        flow.add_attribute(&trace_name, ElementFormat::Float32, trace_length)?;
        flow.set_volume_data_name(&trace_name)?;
        flow.set_data_axis_unit("ms");

        flow.set_group_size(num_skey)?;
        flow.set_data_axis(tmin, tmax, trace_length)?;
        flow.set_primary_key_axis(fpkey as i32, lpkey as i32, num_pkey)?;
        flow.set_secondary_key_axis(fskey as i32, lskey as i32, num_skey)?;

        let mut attrs = vec![AttrSpec {
            name: trace_name,
            pattern: trace_pattern,
        }];

        if config.has("testgendata.attribute") {
            let count = config.array_len("testgendata.attribute")?;
            for i in 0..count {
                let prefix = format!("testgendata.attribute.{}", i);
                let name = config.get_str(&format!("{}.name", prefix))?.to_uppercase();
                let length = config.get_i64(&format!("{}.length", prefix))? as usize;
                let (pattern, format) = DataPattern::parse(&config, &format!("{}.data", prefix))?;
                debug!(stage = stage_id, attr = %name, "testgendata attribute");
                flow.add_attribute(&name, format, length)?;
                attrs.push(AttrSpec { name, pattern });
            }
        }

        let generator = DataGenerator::new(&datadir);
        // Sequences are generated once and stay; random data is refreshed
        // per group in process.
        for spec in &attrs {
            let buffer = spec_buffer(flow, &spec.name)?;
            generator.generate(&spec.name, &spec.pattern, buffer)?;
        }

        let skeys: Vec<i32> = (0..num_skey).map(|i| (fskey + i as i64 * skinc) as i32).collect();
        flow.set_stage_state(
            stage_id,
            TestgendataState {
                pkey_name,
                skey_name,
                lpkey,
                pkinc,
                skeys,
                attrs,
                generator,
                current_pkey: fpkey,
            },
        );
        Ok(())
    }

    fn process(&self, flow: &mut DataFlow, stage_id: &str) -> Result<(), PipelineError> {
        let Some(mut state) = flow.take_stage_state::<TestgendataState>(stage_id) else {
            return Ok(());
        };
        if flow.job_finished() || flow.job_aborted() {
            return Ok(());
        }

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

        flow.buffer_mut(&state.pkey_name)
            .and_then(|b| b.as_i32_mut())
            .ok_or_else(|| PipelineError::InvariantViolation("Null primary key buffer".to_string()))?
            .fill(state.current_pkey as i32);
        flow.buffer_mut(&state.skey_name)
            .and_then(|b| b.as_i32_mut())
            .ok_or_else(|| PipelineError::InvariantViolation("Null secondary key buffer".to_string()))?
            .copy_from_slice(&state.skeys);

        info!(stage = stage_id, "Process primary key {}", state.current_pkey);

        for spec in &state.attrs {
            if matches!(spec.pattern, DataPattern::Random { .. }) {
                let buffer = spec_buffer(flow, &spec.name)?;
                state.generator.generate(&spec.name, &spec.pattern, buffer)?;
            }
        }

        state.current_pkey += state.pkinc;
        flow.set_stage_state(stage_id, *state);
        Ok(())
    }
}

fn spec_buffer<'a>(flow: &'a mut DataFlow, name: &str) -> Result<&'a mut AttributeBuffer, PipelineError> {
    flow.buffer_mut(name)
        .ok_or_else(|| PipelineError::InvariantViolation(format!("Runtime returned no buffer for '{}'", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(datadir: &str) -> String {
        format!(
            r#"
testgendata:
  datadir: {}
  primarykey: {{name: inline, first: 1, last: 2, step: 1}}
  secondarykey: {{name: crossline, first: 1, last: 3, step: 1}}
  tracekey:
    name: seismic
    tmin: 0.0
    tmax: 4.0
    length: 5
    data:
      sequence: {{min: 0.0, max: 3.0, step: 1.0, type: float}}
  attribute:
    - name: offset
      length: 1
      data:
        random: {{min: 100, max: 200, type: int32}}
"#,
            datadir
        )
    }

    #[test]
    fn test_sequence_wraps_at_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let generator = DataGenerator::new(dir.path());
        let mut buffer = AttributeBuffer::zeroed(ElementFormat::Float32, 6);
        generator
            .generate(
                "SEQ",
                &DataPattern::Sequence {
                    min: 0.0,
                    max: 3.0,
                    step: 1.0,
                },
                &mut buffer,
            )
            .unwrap();
        assert_eq!(buffer.as_f32().unwrap(), &[0.0, 1.0, 2.0, 3.0, 0.0, 1.0]);
        assert!(dir.path().join("SEQ.DAT").exists());
    }

    #[test]
    fn test_random_respects_bounds_and_writes_reference() {
        let dir = tempfile::tempdir().unwrap();
        let generator = DataGenerator::new(dir.path());
        let mut buffer = AttributeBuffer::zeroed(ElementFormat::Int32, 64);
        generator
            .generate("RND", &DataPattern::Random { min: 100.0, max: 200.0 }, &mut buffer)
            .unwrap();
        assert!(buffer.as_i32().unwrap().iter().all(|v| (100..=200).contains(v)));
        let reference = std::fs::read(dir.path().join("RND.DAT")).unwrap();
        assert_eq!(reference, buffer.to_le_bytes());
    }

    #[test]
    fn test_schema_and_groups() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir.path().display().to_string());
        let mut flow = DataFlow::new();
        TestgendataStage.init(&mut flow, "tg", &cfg).unwrap();

        assert_eq!(flow.group_size(), Some(3));
        assert_eq!(flow.data_vector_length(), Some(5));
        assert!(flow.has_attribute("OFFSET"));

        TestgendataStage.process(&mut flow, "tg").unwrap();
        assert_eq!(flow.buffer("INLINE").unwrap().as_i32().unwrap(), &[1, 1, 1]);
        assert_eq!(flow.buffer("CROSSLINE").unwrap().as_i32().unwrap(), &[1, 2, 3]);
        // The sequence trace stays as generated at init.
        let trace = flow.buffer("SEISMIC").unwrap().as_f32().unwrap();
        assert_eq!(&trace[..5], &[0.0, 1.0, 2.0, 3.0, 0.0]);

        TestgendataStage.process(&mut flow, "tg").unwrap();
        TestgendataStage.process(&mut flow, "tg").unwrap();
        assert!(flow.job_finished());
    }
}
