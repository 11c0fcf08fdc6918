// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Module Configuration
//!
//! Every stage receives its configuration as a single YAML text blob. This
//! module wraps the parsed document and resolves the dotted keys the stages
//! ask for (`mute.threshold.expr`, `gendata.primarykey.first`, ...) plus
//! enumerable arrays (`attrlist.attributes`, `gendata.signal.ormsby.times`).
//!
//! Lookups return [`PipelineError::InvalidConfiguration`] naming the key on
//! a miss or a type mismatch, so a stage can propagate the error untouched
//! and the job log still tells the user which option was wrong.

use geoflow_domain::PipelineError;
use serde_yaml::Value;

/// Parsed per-stage configuration with dotted-key access.
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    root: Value,
}

impl ModuleConfig {
    /// Parses a YAML text blob.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let root: Value = serde_yaml::from_str(text)
            .map_err(|e| PipelineError::InvalidConfiguration(format!("Failed to parse stage config: {}", e)))?;
        Ok(ModuleConfig { root })
    }

    /// Wraps an already-parsed YAML value (used by the job-file driver).
    pub fn from_value(root: Value) -> Self {
        ModuleConfig { root }
    }

    /// Navigates a dotted key through nested mappings; numeric segments
    /// index into sequences (`attribute.0.name`).
    pub fn node(&self, key: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in key.split('.') {
            current = match current {
                Value::Sequence(seq) => seq.get(segment.parse::<usize>().ok()?)?,
                other => other.get(segment)?,
            };
        }
        Some(current)
    }

    /// Whether the dotted key exists (whatever its value).
    pub fn has(&self, key: &str) -> bool {
        self.node(key).is_some()
    }

    /// String value at `key`.
    pub fn get_str(&self, key: &str) -> Result<String, PipelineError> {
        match self.node(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(_) => Err(Self::type_error(key, "a string")),
            None => Err(Self::missing(key)),
        }
    }

    /// Integer value at `key`.
    pub fn get_i64(&self, key: &str) -> Result<i64, PipelineError> {
        match self.node(key) {
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| Self::type_error(key, "an integer")),
            Some(_) => Err(Self::type_error(key, "an integer")),
            None => Err(Self::missing(key)),
        }
    }

    /// Float value at `key` (integers widen).
    pub fn get_f64(&self, key: &str) -> Result<f64, PipelineError> {
        match self.node(key) {
            Some(Value::Number(n)) => n.as_f64().ok_or_else(|| Self::type_error(key, "a number")),
            Some(_) => Err(Self::type_error(key, "a number")),
            None => Err(Self::missing(key)),
        }
    }

    pub fn get_f32(&self, key: &str) -> Result<f32, PipelineError> {
        self.get_f64(key).map(|v| v as f32)
    }

    /// Number of elements in the sequence at `key`.
    pub fn array_len(&self, key: &str) -> Result<usize, PipelineError> {
        match self.node(key) {
            Some(Value::Sequence(seq)) => Ok(seq.len()),
            Some(_) => Err(Self::type_error(key, "a sequence")),
            None => Err(Self::missing(key)),
        }
    }

    /// The sequence at `key` as floats.
    pub fn get_f32_array(&self, key: &str) -> Result<Vec<f32>, PipelineError> {
        match self.node(key) {
            Some(Value::Sequence(seq)) => seq
                .iter()
                .map(|v| {
                    v.as_f64()
                        .map(|f| f as f32)
                        .ok_or_else(|| Self::type_error(key, "a sequence of numbers"))
                })
                .collect(),
            Some(_) => Err(Self::type_error(key, "a sequence")),
            None => Err(Self::missing(key)),
        }
    }

    /// The sequence at `key` as strings.
    pub fn get_str_array(&self, key: &str) -> Result<Vec<String>, PipelineError> {
        match self.node(key) {
            Some(Value::Sequence(seq)) => seq
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(|s| s.to_string())
                        .ok_or_else(|| Self::type_error(key, "a sequence of strings"))
                })
                .collect(),
            Some(_) => Err(Self::type_error(key, "a sequence")),
            None => Err(Self::missing(key)),
        }
    }

    fn missing(key: &str) -> PipelineError {
        PipelineError::InvalidConfiguration(format!("Missing config option '{}'", key))
    }

    fn type_error(key: &str, expected: &str) -> PipelineError {
        PipelineError::InvalidConfiguration(format!("Config option '{}' is not {}", key, expected))
    }
}
