// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Element Format Value Object
//!
//! The closed set of storage formats an attribute buffer can carry. Every
//! buffer, every attribute, and every expression operand is tagged with one
//! of the six formats; conversions between them always go through a 64-bit
//! float intermediate.
//!
//! ## Narrowing Rules
//!
//! Narrowing from the `f64` intermediate rounds to the nearest integer (ties
//! away from zero) and saturates at the destination range. NaN narrows to 0
//! for integer destinations. These rules are centralized in [`narrow_f64`]
//! and the [`Element`] trait so that every kernel and every buffer store
//! behaves identically.

use crate::PipelineError;
use serde::{Deserialize, Serialize};

/// Storage format of a single buffer element.
///
/// A closed enumeration: signed 8-, 16-, 32-, and 64-bit integers plus
/// 32- and 64-bit IEEE floats. The integer formats are signed even though
/// key attributes only ever hold non-negative values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementFormat {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl ElementFormat {
    /// Size of one element in bytes.
    pub fn byte_size(&self) -> usize {
        match self {
            ElementFormat::Int8 => 1,
            ElementFormat::Int16 => 2,
            ElementFormat::Int32 => 4,
            ElementFormat::Int64 => 8,
            ElementFormat::Float32 => 4,
            ElementFormat::Float64 => 8,
        }
    }

    /// Whether the format is an integer format.
    ///
    /// Only integer-format attributes may be designated as primary or
    /// secondary keys.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ElementFormat::Int8 | ElementFormat::Int16 | ElementFormat::Int32 | ElementFormat::Int64
        )
    }
}

impl std::fmt::Display for ElementFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementFormat::Int8 => write!(f, "int8"),
            ElementFormat::Int16 => write!(f, "int16"),
            ElementFormat::Int32 => write!(f, "int32"),
            ElementFormat::Int64 => write!(f, "int64"),
            ElementFormat::Float32 => write!(f, "float"),
            ElementFormat::Float64 => write!(f, "double"),
        }
    }
}

impl std::str::FromStr for ElementFormat {
    type Err = PipelineError;

    /// Parses the job-file spellings. Both the long names (`int32`, `float`,
    /// `double`) and the register-style aliases (`i32`, `r32`, `r64`) are
    /// accepted, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "int8" | "i8" => Ok(ElementFormat::Int8),
            "int16" | "i16" => Ok(ElementFormat::Int16),
            "int32" | "i32" => Ok(ElementFormat::Int32),
            "int64" | "i64" => Ok(ElementFormat::Int64),
            "float" | "float32" | "r32" | "f32" => Ok(ElementFormat::Float32),
            "double" | "float64" | "r64" | "f64" => Ok(ElementFormat::Float64),
            _ => Err(PipelineError::InvalidConfiguration(format!(
                "Unknown element format: {}",
                s
            ))),
        }
    }
}

/// A type that can live in an attribute buffer.
///
/// Widening is exact for every format except `Int64`, whose extreme values
/// lose precision in `f64`; narrowing applies the rounding and saturation
/// rules described in the module docs.
pub trait Element: Copy + Default + PartialEq + Send + Sync + 'static {
    const FORMAT: ElementFormat;

    fn widen(self) -> f64;
    fn narrow(value: f64) -> Self;
}

macro_rules! impl_integer_element {
    ($ty:ty, $fmt:expr) => {
        impl Element for $ty {
            const FORMAT: ElementFormat = $fmt;

            fn widen(self) -> f64 {
                self as f64
            }

            fn narrow(value: f64) -> Self {
                // `as` saturates on overflow and maps NaN to 0; rounding
                // first gives ties-away-from-zero semantics.
                value.round() as $ty
            }
        }
    };
}

impl_integer_element!(i8, ElementFormat::Int8);
impl_integer_element!(i16, ElementFormat::Int16);
impl_integer_element!(i32, ElementFormat::Int32);
impl_integer_element!(i64, ElementFormat::Int64);

impl Element for f32 {
    const FORMAT: ElementFormat = ElementFormat::Float32;

    fn widen(self) -> f64 {
        self as f64
    }

    fn narrow(value: f64) -> Self {
        value as f32
    }
}

impl Element for f64 {
    const FORMAT: ElementFormat = ElementFormat::Float64;

    fn widen(self) -> f64 {
        self
    }

    fn narrow(value: f64) -> Self {
        value
    }
}

/// Narrows an `f64` into the given element type.
///
/// Thin free-function wrapper over [`Element::narrow`] for call sites that
/// already have the concrete type in hand.
pub fn narrow_f64<T: Element>(value: f64) -> T {
    T::narrow(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_byte_sizes() {
        assert_eq!(ElementFormat::Int8.byte_size(), 1);
        assert_eq!(ElementFormat::Int16.byte_size(), 2);
        assert_eq!(ElementFormat::Int32.byte_size(), 4);
        assert_eq!(ElementFormat::Int64.byte_size(), 8);
        assert_eq!(ElementFormat::Float32.byte_size(), 4);
        assert_eq!(ElementFormat::Float64.byte_size(), 8);
    }

    #[test]
    fn test_parse_spellings() {
        assert_eq!(ElementFormat::from_str("int32").unwrap(), ElementFormat::Int32);
        assert_eq!(ElementFormat::from_str("R32").unwrap(), ElementFormat::Float32);
        assert_eq!(ElementFormat::from_str("double").unwrap(), ElementFormat::Float64);
        assert_eq!(ElementFormat::from_str("Float").unwrap(), ElementFormat::Float32);
        assert!(ElementFormat::from_str("complex").is_err());
    }

    #[test]
    fn test_narrow_rounds_to_nearest_away_from_zero() {
        assert_eq!(narrow_f64::<i32>(1.4), 1);
        assert_eq!(narrow_f64::<i32>(1.5), 2);
        assert_eq!(narrow_f64::<i32>(2.5), 3);
        assert_eq!(narrow_f64::<i32>(-1.5), -2);
    }

    #[test]
    fn test_narrow_saturates() {
        assert_eq!(narrow_f64::<i8>(300.0), i8::MAX);
        assert_eq!(narrow_f64::<i8>(-300.0), i8::MIN);
        assert_eq!(narrow_f64::<i16>(1e9), i16::MAX);
        assert_eq!(narrow_f64::<i64>(1e30), i64::MAX);
        assert_eq!(narrow_f64::<i64>(-1e30), i64::MIN);
    }

    #[test]
    fn test_narrow_nan_to_zero_for_integers() {
        assert_eq!(narrow_f64::<i32>(f64::NAN), 0);
    }

    #[test]
    fn test_narrow_float_is_cast() {
        assert_eq!(narrow_f64::<f32>(1.25), 1.25f32);
        assert_eq!(narrow_f64::<f64>(-0.5), -0.5);
    }

    #[test]
    fn test_only_integer_formats_are_keys() {
        assert!(ElementFormat::Int32.is_integer());
        assert!(!ElementFormat::Float32.is_integer());
        assert!(!ElementFormat::Float64.is_integer());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_narrow_inverts_widen_for_int16(value in any::<i16>()) {
                prop_assert_eq!(narrow_f64::<i16>(value.widen()), value);
            }

            #[test]
            fn prop_integer_narrowing_rounds_and_saturates(value in -1.0e12f64..1.0e12) {
                let narrowed = narrow_f64::<i16>(value) as f64;
                let expected = value.round().clamp(i16::MIN as f64, i16::MAX as f64);
                prop_assert_eq!(narrowed, expected);
            }
        }
    }
}
