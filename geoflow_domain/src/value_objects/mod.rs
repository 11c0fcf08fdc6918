// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Value Objects
//!
//! Immutable, self-validating objects describing the data model of a
//! flowing volume:
//!
//! - [`ElementFormat`] - the closed set of six storage formats
//! - [`AttributeDescriptor`] - name, format, per-row length, unit, range
//! - [`AxisDescriptor`] - one of the three volume axes with implicit step
//! - [`AttributeBuffer`] / [`VectorView`] - the owned per-attribute slab
//!   and its borrowed typed views

pub mod attribute_buffer;
pub mod attribute_descriptor;
pub mod axis_descriptor;
pub mod element_format;

pub use attribute_buffer::{AttributeBuffer, VectorView};
pub use attribute_descriptor::{is_valid_attribute_name, AttributeDescriptor};
pub use axis_descriptor::AxisDescriptor;
pub use element_format::{narrow_f64, Element, ElementFormat};
