// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Attribute Buffer
//!
//! The contiguous, mutably-owned slab backing one attribute for one group:
//! `length x group_size` elements in the attribute's element format. Row
//! `r` of the group occupies the contiguous run
//! `[r * length, (r + 1) * length)`.
//!
//! Buffers are allocated once (when the group size is set, or when an
//! attribute is added after that point) and live for the whole job; stages
//! read and write them in place between `process` calls.
//!
//! ## Conversions
//!
//! Every cross-format path goes through `f64`: [`AttributeBuffer::to_f64`]
//! widens, [`AttributeBuffer::fill_from_f64`] performs the single narrowing
//! step with round-to-nearest / saturate semantics. The little-endian byte
//! views exist for the volume store, whose sliding windows and brick pages
//! operate on raw bytes.

use crate::value_objects::element_format::{Element, ElementFormat};
use crate::PipelineError;

/// Borrowed, typed view over a buffer or a slice of one.
///
/// Views are what the expression evaluator binds variables to and what the
/// vector kernels consume; they never own data.
#[derive(Debug, Clone, Copy)]
pub enum VectorView<'a> {
    Int8(&'a [i8]),
    Int16(&'a [i16]),
    Int32(&'a [i32]),
    Int64(&'a [i64]),
    Float32(&'a [f32]),
    Float64(&'a [f64]),
}

impl<'a> VectorView<'a> {
    pub fn format(&self) -> ElementFormat {
        match self {
            VectorView::Int8(_) => ElementFormat::Int8,
            VectorView::Int16(_) => ElementFormat::Int16,
            VectorView::Int32(_) => ElementFormat::Int32,
            VectorView::Int64(_) => ElementFormat::Int64,
            VectorView::Float32(_) => ElementFormat::Float32,
            VectorView::Float64(_) => ElementFormat::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            VectorView::Int8(s) => s.len(),
            VectorView::Int16(s) => s.len(),
            VectorView::Int32(s) => s.len(),
            VectorView::Int64(s) => s.len(),
            VectorView::Float32(s) => s.len(),
            VectorView::Float64(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `i` widened to `f64`.
    pub fn get_f64(&self, i: usize) -> f64 {
        match self {
            VectorView::Int8(s) => s[i].widen(),
            VectorView::Int16(s) => s[i].widen(),
            VectorView::Int32(s) => s[i].widen(),
            VectorView::Int64(s) => s[i].widen(),
            VectorView::Float32(s) => s[i].widen(),
            VectorView::Float64(s) => s[i].widen(),
        }
    }
}

/// Owned slab of elements in one of the six element formats.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeBuffer {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

macro_rules! buffer_dispatch {
    ($self:expr, $slice:ident => $body:expr) => {
        match $self {
            AttributeBuffer::Int8($slice) => $body,
            AttributeBuffer::Int16($slice) => $body,
            AttributeBuffer::Int32($slice) => $body,
            AttributeBuffer::Int64($slice) => $body,
            AttributeBuffer::Float32($slice) => $body,
            AttributeBuffer::Float64($slice) => $body,
        }
    };
}

impl AttributeBuffer {
    /// Allocates a zero-filled buffer of `len` elements.
    pub fn zeroed(format: ElementFormat, len: usize) -> Self {
        match format {
            ElementFormat::Int8 => AttributeBuffer::Int8(vec![0; len]),
            ElementFormat::Int16 => AttributeBuffer::Int16(vec![0; len]),
            ElementFormat::Int32 => AttributeBuffer::Int32(vec![0; len]),
            ElementFormat::Int64 => AttributeBuffer::Int64(vec![0; len]),
            ElementFormat::Float32 => AttributeBuffer::Float32(vec![0.0; len]),
            ElementFormat::Float64 => AttributeBuffer::Float64(vec![0.0; len]),
        }
    }

    pub fn format(&self) -> ElementFormat {
        match self {
            AttributeBuffer::Int8(_) => ElementFormat::Int8,
            AttributeBuffer::Int16(_) => ElementFormat::Int16,
            AttributeBuffer::Int32(_) => ElementFormat::Int32,
            AttributeBuffer::Int64(_) => ElementFormat::Int64,
            AttributeBuffer::Float32(_) => ElementFormat::Float32,
            AttributeBuffer::Float64(_) => ElementFormat::Float64,
        }
    }

    pub fn len(&self) -> usize {
        buffer_dispatch!(self, s => s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total size of the slab in bytes.
    pub fn byte_len(&self) -> usize {
        self.len() * self.format().byte_size()
    }

    /// Borrowed typed view over the whole buffer.
    pub fn as_view(&self) -> VectorView<'_> {
        match self {
            AttributeBuffer::Int8(s) => VectorView::Int8(s),
            AttributeBuffer::Int16(s) => VectorView::Int16(s),
            AttributeBuffer::Int32(s) => VectorView::Int32(s),
            AttributeBuffer::Int64(s) => VectorView::Int64(s),
            AttributeBuffer::Float32(s) => VectorView::Float32(s),
            AttributeBuffer::Float64(s) => VectorView::Float64(s),
        }
    }

    /// Widens the whole buffer into a fresh `f64` vector.
    pub fn to_f64(&self) -> Vec<f64> {
        buffer_dispatch!(self, s => s.iter().map(|v| v.widen()).collect())
    }

    /// Narrows `src` into this buffer, element by element.
    ///
    /// This is the single explicit narrowing step of the engine: the source
    /// is always the `f64` intermediate, and lengths must match exactly.
    pub fn fill_from_f64(&mut self, src: &[f64]) -> Result<(), PipelineError> {
        if src.len() != self.len() {
            return Err(PipelineError::EvaluationError(format!(
                "Cannot narrow {} values into a buffer of {} elements",
                src.len(),
                self.len()
            )));
        }
        buffer_dispatch!(self, s => {
            for (dst, v) in s.iter_mut().zip(src) {
                *dst = Element::narrow(*v);
            }
        });
        Ok(())
    }

    /// Serializes the buffer to little-endian bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        match self {
            AttributeBuffer::Int8(s) => out.extend(s.iter().map(|v| *v as u8)),
            AttributeBuffer::Int16(s) => s.iter().for_each(|v| out.extend(v.to_le_bytes())),
            AttributeBuffer::Int32(s) => s.iter().for_each(|v| out.extend(v.to_le_bytes())),
            AttributeBuffer::Int64(s) => s.iter().for_each(|v| out.extend(v.to_le_bytes())),
            AttributeBuffer::Float32(s) => s.iter().for_each(|v| out.extend(v.to_le_bytes())),
            AttributeBuffer::Float64(s) => s.iter().for_each(|v| out.extend(v.to_le_bytes())),
        }
        out
    }

    /// Overwrites the buffer from little-endian bytes.
    pub fn copy_from_le_bytes(&mut self, bytes: &[u8]) -> Result<(), PipelineError> {
        if bytes.len() != self.byte_len() {
            return Err(PipelineError::InvariantViolation(format!(
                "Byte slice of {} bytes does not match buffer of {} bytes",
                bytes.len(),
                self.byte_len()
            )));
        }
        match self {
            AttributeBuffer::Int8(s) => {
                for (dst, b) in s.iter_mut().zip(bytes) {
                    *dst = *b as i8;
                }
            }
            AttributeBuffer::Int16(s) => {
                for (dst, c) in s.iter_mut().zip(bytes.chunks_exact(2)) {
                    *dst = i16::from_le_bytes([c[0], c[1]]);
                }
            }
            AttributeBuffer::Int32(s) => {
                for (dst, c) in s.iter_mut().zip(bytes.chunks_exact(4)) {
                    *dst = i32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                }
            }
            AttributeBuffer::Int64(s) => {
                for (dst, c) in s.iter_mut().zip(bytes.chunks_exact(8)) {
                    *dst = i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]);
                }
            }
            AttributeBuffer::Float32(s) => {
                for (dst, c) in s.iter_mut().zip(bytes.chunks_exact(4)) {
                    *dst = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                }
            }
            AttributeBuffer::Float64(s) => {
                for (dst, c) in s.iter_mut().zip(bytes.chunks_exact(8)) {
                    *dst = f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]);
                }
            }
        }
        Ok(())
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            AttributeBuffer::Int32(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32_mut(&mut self) -> Option<&mut [i32]> {
        match self {
            AttributeBuffer::Int32(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            AttributeBuffer::Float32(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        match self {
            AttributeBuffer::Float32(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            AttributeBuffer::Float64(s) => Some(s),
            _ => None,
        }
    }
}
