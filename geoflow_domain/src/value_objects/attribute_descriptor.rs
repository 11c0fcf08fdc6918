// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Attribute Descriptor Value Object
//!
//! A named, typed, fixed-length-per-row buffer description. A length of 1
//! identifies a scalar (per-trace) attribute; a length greater than 1
//! identifies a vector attribute. The trace amplitude is the distinguished
//! vector attribute whose length equals the sample count.
//!
//! Attribute names are case-folded to upper case at every boundary of the
//! runtime; descriptors therefore always carry upper-case names.

use crate::value_objects::ElementFormat;
use crate::PipelineError;
use serde::{Deserialize, Serialize};

/// Schema entry for one attribute of the flowing volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    name: String,
    format: ElementFormat,
    length: usize,
    unit: String,
    value_range: (f32, f32),
}

impl AttributeDescriptor {
    /// Creates a descriptor, folding the name to upper case and validating
    /// the name and per-row length.
    pub fn new(name: &str, format: ElementFormat, length: usize) -> Result<Self, PipelineError> {
        if !is_valid_attribute_name(name) {
            return Err(PipelineError::SchemaError(format!(
                "Attribute name is invalid, it must start with a letter or an underscore: '{}'",
                name
            )));
        }
        if length == 0 {
            return Err(PipelineError::SchemaError(format!(
                "Attribute '{}' must have a positive per-row length",
                name
            )));
        }
        Ok(AttributeDescriptor {
            name: name.to_uppercase(),
            format,
            length,
            unit: String::new(),
            value_range: (0.0, 0.0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> ElementFormat {
        self.format
    }

    /// Elements per group row; 1 for scalar attributes.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn value_range(&self) -> (f32, f32) {
        self.value_range
    }

    /// A scalar attribute carries one value per trace.
    pub fn is_scalar(&self) -> bool {
        self.length == 1
    }

    pub(crate) fn set_unit(&mut self, unit: &str) {
        self.unit = unit.to_string();
    }

    pub(crate) fn set_value_range(&mut self, min: f32, max: f32) {
        self.value_range = (min, max);
    }
}

/// Validates the attribute naming rule shared with expression variables:
/// the first character must be alphabetic or an underscore.
pub fn is_valid_attribute_name(name: &str) -> bool {
    name.chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_upper_cased() {
        let d = AttributeDescriptor::new("inline", ElementFormat::Int32, 1).unwrap();
        assert_eq!(d.name(), "INLINE");
        assert!(d.is_scalar());
    }

    #[test]
    fn test_invalid_names_rejected() {
        assert!(AttributeDescriptor::new("", ElementFormat::Int32, 1).is_err());
        assert!(AttributeDescriptor::new("2FAST", ElementFormat::Int32, 1).is_err());
        assert!(AttributeDescriptor::new("_OK", ElementFormat::Int32, 1).is_ok());
    }

    #[test]
    fn test_zero_length_rejected() {
        assert!(AttributeDescriptor::new("TRACE", ElementFormat::Float32, 0).is_err());
    }
}
