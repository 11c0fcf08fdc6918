// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sliding Window
//!
//! A rolling band of `2 x brick_size` inline slots used to assemble bricks
//! from the group-at-a-time stream. Each slot holds one inline's worth of
//! per-channel payload (`element_size x elements_per_inline` bytes).
//!
//! The window covers the contiguous global inline range
//! `[start_idx, start_idx + valid_count)`. A fill writes into slot
//! `valid_count` and increments it; a slide moves the upper `brick_size`
//! slots down over the lower half, advances `start_idx` by `brick_size`,
//! and resets `valid_count` to `brick_size`. The valid count never exceeds
//! the window capacity.

use geoflow_domain::PipelineError;

/// Byte-level rolling band over consecutive inline slices of one channel.
#[derive(Debug)]
pub struct SlidingWindow {
    buffer: Vec<u8>,
    brick_size: usize,
    inline_size: usize,
    capacity: usize,
    start_idx: usize,
    valid_count: usize,
}

impl SlidingWindow {
    /// Creates a window of `2 x brick_size` slots of `inline_size` bytes.
    pub fn new(brick_size: usize, inline_size: usize) -> Self {
        let capacity = 2 * brick_size;
        SlidingWindow {
            buffer: vec![0u8; capacity * inline_size],
            brick_size,
            inline_size,
            capacity,
            start_idx: 0,
            valid_count: 0,
        }
    }

    /// Global inline index of slot 0.
    pub fn start_idx(&self) -> usize {
        self.start_idx
    }

    /// Number of filled slots.
    pub fn valid_count(&self) -> usize {
        self.valid_count
    }

    pub fn is_full(&self) -> bool {
        self.valid_count >= self.capacity
    }

    pub fn inline_size(&self) -> usize {
        self.inline_size
    }

    /// Whether the global inline index currently lies inside the window.
    pub fn contains(&self, global_idx: usize) -> bool {
        global_idx >= self.start_idx && global_idx < self.start_idx + self.valid_count
    }

    /// Appends one inline slice into slot `valid_count`.
    pub fn fill(&mut self, data: &[u8]) -> Result<(), PipelineError> {
        if data.len() != self.inline_size {
            return Err(PipelineError::InvariantViolation(format!(
                "Inline slice of {} bytes does not match window slot size {}",
                data.len(),
                self.inline_size
            )));
        }
        if self.is_full() {
            return Err(PipelineError::InvariantViolation(
                "Sliding window is full; slide before filling".to_string(),
            ));
        }
        let offset = self.valid_count * self.inline_size;
        self.buffer[offset..offset + self.inline_size].copy_from_slice(data);
        self.valid_count += 1;
        Ok(())
    }

    /// Slides the window: the upper `brick_size` slots move down over the
    /// lower half, the start index advances by `brick_size`.
    pub fn slide(&mut self) -> Result<(), PipelineError> {
        if self.valid_count < self.brick_size {
            return Err(PipelineError::InvariantViolation(format!(
                "Cannot slide a window holding {} of {} slots",
                self.valid_count, self.brick_size
            )));
        }
        let move_size = self.brick_size * self.inline_size;
        self.buffer.copy_within(move_size..2 * move_size, 0);
        self.start_idx += self.brick_size;
        self.valid_count = self.brick_size;
        Ok(())
    }

    /// The filled part of the window: `valid_count` consecutive inline
    /// slices starting at the global index [`SlidingWindow::start_idx`].
    pub fn valid_slice(&self) -> &[u8] {
        &self.buffer[..self.valid_count * self.inline_size]
    }

    /// Raw bytes of one inline by global index, if inside the window.
    pub fn inline_data(&self, global_idx: usize) -> Option<&[u8]> {
        if !self.contains(global_idx) {
            return None;
        }
        let offset = (global_idx - self.start_idx) * self.inline_size;
        Some(&self.buffer[offset..offset + self.inline_size])
    }
}
