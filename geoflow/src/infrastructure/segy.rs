// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SEG-Y Reader
//!
//! Minimal big-endian SEG-Y support for the `segyinput` source stage: the
//! 3200-byte textual header is skipped (EBCDIC decoding is out of scope),
//! the 400-byte binary header provides the sampling interval, trace length
//! and sample format, and the trace headers provide the inline/crossline
//! keys at configurable byte offsets. Sample formats 1 (IBM float) and
//! 5 (IEEE float) are accepted; both widen to `f32`.
//!
//! The reader scans every trace header once at open time to establish the
//! two key axes, then serves whole inlines in crossline order. A missing
//! `(inline, crossline)` cell reads as a zero trace.

use std::collections::HashMap;
use std::path::Path;

use geoflow_domain::PipelineError;

const TEXT_HEADER_LEN: usize = 3200;
const BINARY_HEADER_LEN: usize = 400;
const TRACE_HEADER_LEN: usize = 240;

/// Default trace-header byte positions (1-based, SEG-Y rev1 3D poststack).
pub const DEFAULT_INLINE_BYTE: usize = 189;
pub const DEFAULT_CROSSLINE_BYTE: usize = 193;

/// Converts an IBM System/370 single-precision float.
fn ibm_to_f32(bits: u32) -> f32 {
    if bits & 0x7fff_ffff == 0 {
        return 0.0;
    }
    let sign = if bits >> 31 == 1 { -1.0f64 } else { 1.0 };
    let exponent = ((bits >> 24) & 0x7f) as i32 - 64;
    let mantissa = (bits & 0x00ff_ffff) as f64 / 16_777_216.0;
    (sign * mantissa * 16f64.powi(exponent)) as f32
}

fn be_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

fn be_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

/// Sample encoding of the trace payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleFormat {
    IbmFloat,
    IeeeFloat,
}

impl SampleFormat {
    fn from_code(code: u16) -> Result<Self, PipelineError> {
        match code {
            1 => Ok(SampleFormat::IbmFloat),
            5 => Ok(SampleFormat::IeeeFloat),
            other => Err(PipelineError::InvalidConfiguration(format!(
                "Unsupported SEG-Y sample format code {}",
                other
            ))),
        }
    }
}

/// An opened SEG-Y file with both key axes established.
pub struct SegyReader {
    data: Vec<u8>,
    sample_count: usize,
    sample_interval_us: f32,
    format: SampleFormat,
    inline_values: Vec<i32>,
    crossline_values: Vec<i32>,
    /// `(inline, crossline)` cell to absolute trace payload offset.
    trace_offsets: HashMap<(i32, i32), usize>,
}

impl SegyReader {
    /// Opens and scans a SEG-Y file.
    ///
    /// `inline_byte` / `crossline_byte` are 1-based trace-header positions
    /// of the two 4-byte big-endian keys.
    pub fn open(path: impl AsRef<Path>, inline_byte: usize, crossline_byte: usize) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| PipelineError::IoError(format!("Failed to open {}: {}", path.display(), e)))?;

        if data.len() < TEXT_HEADER_LEN + BINARY_HEADER_LEN {
            return Err(PipelineError::IoError(format!(
                "{} is too short for a SEG-Y file",
                path.display()
            )));
        }
        if inline_byte == 0 || inline_byte + 3 > TRACE_HEADER_LEN || crossline_byte == 0
            || crossline_byte + 3 > TRACE_HEADER_LEN
        {
            return Err(PipelineError::InvalidConfiguration(
                "Key byte positions must lie inside the 240-byte trace header".to_string(),
            ));
        }

        let binary = &data[TEXT_HEADER_LEN..TEXT_HEADER_LEN + BINARY_HEADER_LEN];
        let sample_interval_us = be_u16(binary, 16) as f32;
        let sample_count = be_u16(binary, 20) as usize;
        let format = SampleFormat::from_code(be_u16(binary, 24))?;
        if sample_count == 0 || sample_interval_us <= 0.0 {
            return Err(PipelineError::IoError(
                "SEG-Y binary header has no sample geometry".to_string(),
            ));
        }

        let trace_len = TRACE_HEADER_LEN + sample_count * 4;
        let body = &data[TEXT_HEADER_LEN + BINARY_HEADER_LEN..];
        if body.is_empty() || body.len() % trace_len != 0 {
            return Err(PipelineError::IoError(format!(
                "SEG-Y trace section of {} bytes is not a whole number of {}-byte traces",
                body.len(),
                trace_len
            )));
        }

        let mut inline_values: Vec<i32> = Vec::new();
        let mut crossline_values: Vec<i32> = Vec::new();
        let mut trace_offsets = HashMap::new();
        for trace in 0..body.len() / trace_len {
            let header_start = TEXT_HEADER_LEN + BINARY_HEADER_LEN + trace * trace_len;
            let inline = be_i32(&data, header_start + inline_byte - 1);
            let crossline = be_i32(&data, header_start + crossline_byte - 1);
            if !inline_values.contains(&inline) {
                inline_values.push(inline);
            }
            if !crossline_values.contains(&crossline) {
                crossline_values.push(crossline);
            }
            trace_offsets.insert((inline, crossline), header_start + TRACE_HEADER_LEN);
        }
        inline_values.sort_unstable();
        crossline_values.sort_unstable();

        Ok(SegyReader {
            data,
            sample_count,
            sample_interval_us,
            format,
            inline_values,
            crossline_values,
            trace_offsets,
        })
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Sampling interval in microseconds.
    pub fn sample_interval_us(&self) -> f32 {
        self.sample_interval_us
    }

    pub fn inline_values(&self) -> &[i32] {
        &self.inline_values
    }

    pub fn crossline_values(&self) -> &[i32] {
        &self.crossline_values
    }

    /// Reads one whole inline, crossline-ordered, into `out`
    /// (`crossline_count x sample_count` floats). Missing cells are zero.
    pub fn read_inline(&self, inline_index: usize, out: &mut [f32]) -> Result<(), PipelineError> {
        let inline = *self.inline_values.get(inline_index).ok_or_else(|| {
            PipelineError::IoError(format!("Inline index {} out of range", inline_index))
        })?;
        let expected = self.crossline_values.len() * self.sample_count;
        if out.len() != expected {
            return Err(PipelineError::InvariantViolation(format!(
                "Inline buffer of {} samples does not match {}",
                out.len(),
                expected
            )));
        }

        for (row, &crossline) in self.crossline_values.iter().enumerate() {
            let dst = &mut out[row * self.sample_count..(row + 1) * self.sample_count];
            match self.trace_offsets.get(&(inline, crossline)) {
                None => dst.fill(0.0),
                Some(&offset) => {
                    for (i, value) in dst.iter_mut().enumerate() {
                        let bits = u32::from_be_bytes([
                            self.data[offset + i * 4],
                            self.data[offset + i * 4 + 1],
                            self.data[offset + i * 4 + 2],
                            self.data[offset + i * 4 + 3],
                        ]);
                        *value = match self.format {
                            SampleFormat::IbmFloat => ibm_to_f32(bits),
                            SampleFormat::IeeeFloat => f32::from_bits(bits),
                        };
                    }
                }
            }
        }
        Ok(())
    }
}
