// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Axis Descriptor Value Object
//!
//! Describes one of the three axes of a seismic volume: the primary key
//! axis (inline), the secondary key axis (crossline), or the sample axis
//! (time or depth). The key axes carry integer endpoints; the sample axis
//! carries float endpoints. All three are fixed after the first stage that
//! configures them.

use crate::PipelineError;
use serde::{Deserialize, Serialize};

/// One axis of a volume: name, unit, endpoints, and sample count.
///
/// The step between consecutive axis values is implicit:
/// `(max - min) / (count - 1)`, and 0 for a single-value axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisDescriptor {
    pub name: String,
    pub unit: String,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl AxisDescriptor {
    /// Creates an axis descriptor, validating the sample count.
    pub fn new(
        name: impl Into<String>,
        unit: impl Into<String>,
        min: f64,
        max: f64,
        count: usize,
    ) -> Result<Self, PipelineError> {
        if count == 0 {
            return Err(PipelineError::InvalidConfiguration(format!(
                "Axis count must be positive, got 0 for axis range {}..{}",
                min, max
            )));
        }
        Ok(AxisDescriptor {
            name: name.into(),
            unit: unit.into(),
            min,
            max,
            count,
        })
    }

    /// Implicit axis step: `(max - min) / (count - 1)`.
    pub fn step(&self) -> f64 {
        if self.count <= 1 {
            0.0
        } else {
            (self.max - self.min) / (self.count as f64 - 1.0)
        }
    }

    /// Axis value at sample index `i`.
    pub fn value_at(&self, i: usize) -> f64 {
        self.min + self.step() * i as f64
    }
}
