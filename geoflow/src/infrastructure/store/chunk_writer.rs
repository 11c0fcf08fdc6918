// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Channel Chunk Writer
//!
//! Converts a batch of consecutive inline slices (the valid part of a
//! channel's sliding window) into committed brick pages of the volume
//! store.
//!
//! For every chunk of the channel the writer checks three things before
//! touching it: the chunk has never been written (`chunk hash == 0`), its
//! primary range lies entirely inside the batch, and the batch geometry is
//! coherent. It then creates a page, copies one contiguous run of samples
//! per `(inline, crossline)` pair through the page's pitch vector, and
//! commits the page. Each brick is emitted exactly once per job; emission
//! order follows the chunk index, which is monotonic in the inline chunk
//! coordinate within each batch.

use geoflow_domain::PipelineError;
use tracing::debug;

use crate::infrastructure::store::volume_store::{PageAccessor, VolumeLayout};

/// Writes whole bricks of one channel from inline-ordered batch data.
#[derive(Debug, Clone)]
pub struct ChannelChunkWriter {
    channel_name: String,
    element_size: usize,
    sample_count: usize,
    secondary_count: usize,
    primary_count: usize,
}

impl ChannelChunkWriter {
    pub fn new(layout: &VolumeLayout, channel: usize) -> Self {
        let descriptor = &layout.channels[channel];
        ChannelChunkWriter {
            channel_name: descriptor.name.clone(),
            element_size: descriptor.format.byte_size(),
            sample_count: descriptor.sample_count,
            secondary_count: layout.secondary.count,
            primary_count: layout.primary.count,
        }
    }

    /// Emits every not-yet-written brick whose primary range lies inside
    /// `[batch_start, batch_start + batch_count)`.
    ///
    /// `batch` holds `batch_count` inline slices, sample-fastest then
    /// secondary, exactly as the sliding window stores them.
    pub fn write_batch(
        &self,
        accessor: &mut PageAccessor<'_>,
        batch: &[u8],
        batch_start: usize,
        batch_count: usize,
    ) -> Result<(), PipelineError> {
        if batch_count == 0 {
            return Err(PipelineError::InvariantViolation(
                "Empty batch passed to the chunk writer".to_string(),
            ));
        }
        let inline_bytes = self.secondary_count * self.sample_count * self.element_size;
        if batch.len() != batch_count * inline_bytes {
            return Err(PipelineError::InvariantViolation(format!(
                "Batch of {} bytes does not match {} inlines of {} bytes for channel '{}'",
                batch.len(),
                batch_count,
                inline_bytes,
                self.channel_name
            )));
        }
        if batch_start + batch_count > self.primary_count {
            return Err(PipelineError::InvariantViolation(format!(
                "Batch inline range {}..{} exceeds the volume extent {}",
                batch_start,
                batch_start + batch_count,
                self.primary_count
            )));
        }

        let batch_end = batch_start + batch_count;
        for chunk in 0..accessor.chunk_count() {
            // Only ever write uninitialized chunks; this is the at-most-once
            // predicate, and it also tolerates resumed partial outputs.
            if accessor.chunk_volume_data_hash(chunk) != 0 {
                continue;
            }
            let (min, max) = accessor.chunk_min_max(chunk);
            if !(min[2] >= batch_start && max[2] <= batch_end) {
                continue;
            }
            self.emit_chunk(accessor, chunk, batch, batch_start)?;
        }
        Ok(())
    }

    fn emit_chunk(
        &self,
        accessor: &mut PageAccessor<'_>,
        chunk: usize,
        batch: &[u8],
        batch_start: usize,
    ) -> Result<(), PipelineError> {
        let (min, max) = accessor.chunk_min_max(chunk);
        let mut page = accessor.create_page(chunk)?;
        debug!(
            channel = %self.channel_name,
            chunk,
            "Emitting brick covering inlines {}..{}",
            min[2],
            max[2]
        );

        let run = (max[0] - min[0]) * self.element_size;
        for il in min[2]..max[2] {
            for xl in min[1]..max[1] {
                let src = (((il - batch_start) * self.secondary_count + xl) * self.sample_count + min[0])
                    * self.element_size;
                let dst = ((il - min[2]) * page.pitch[2] + (xl - min[1]) * page.pitch[1]) * self.element_size;
                page.data[dst..dst + run].copy_from_slice(&batch[src..src + run]);
            }
        }

        accessor.commit_page(chunk, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::volume_store::{
        ChannelDescriptor, CompressionMethod, VolumeStore,
    };
    use geoflow_domain::value_objects::{AxisDescriptor, ElementFormat};

    fn layout(brick: usize, samples: usize, secondaries: usize, primaries: usize) -> VolumeLayout {
        VolumeLayout {
            primary: AxisDescriptor::new("INLINE", "", 0.0, (primaries - 1) as f64, primaries).unwrap(),
            secondary: AxisDescriptor::new("CROSSLINE", "", 0.0, (secondaries - 1) as f64, secondaries).unwrap(),
            data: AxisDescriptor::new("TIME", "ms", 0.0, (samples - 1) as f64, samples).unwrap(),
            brick_size: brick,
            lod_levels: 0,
            compression: CompressionMethod::None,
            tolerance: 0.01,
            channels: vec![ChannelDescriptor {
                name: "Amplitude".to_string(),
                format: ElementFormat::Int8,
                sample_count: samples,
                value_range: (0.0, 0.0),
            }],
        }
    }

    #[test]
    fn test_only_fully_covered_bricks_are_emitted() {
        let mut store = VolumeStore::create("/tmp/unused3.gfv", layout(2, 2, 2, 4)).unwrap();
        let writer = ChannelChunkWriter::new(&store.layout().clone(), 0);
        let mut accessor = store.page_accessor(0).unwrap();

        // Batch covers inlines 0..3: only the inline-chunk 0..2 is complete.
        let inline_bytes = 2 * 2;
        let batch = vec![7u8; 3 * inline_bytes];
        writer.write_batch(&mut accessor, &batch, 0, 3).unwrap();

        let written: Vec<bool> = (0..accessor.chunk_count())
            .map(|c| accessor.chunk_volume_data_hash(c) != 0)
            .collect();
        assert_eq!(written, vec![true, false]);
    }

    #[test]
    fn test_emitted_brick_content_respects_pitch() {
        let mut store = VolumeStore::create("/tmp/unused4.gfv", layout(2, 3, 2, 2)).unwrap();
        let writer = ChannelChunkWriter::new(&store.layout().clone(), 0);
        let mut accessor = store.page_accessor(0).unwrap();

        // Element (il, xl, s) = 36*il + 6*xl + s, two inlines.
        let mut batch = Vec::new();
        for il in 0..2u8 {
            for xl in 0..2u8 {
                for s in 0..3u8 {
                    batch.push(36 * il + 6 * xl + s);
                }
            }
        }
        writer.write_batch(&mut accessor, &batch, 0, 2).unwrap();

        // First chunk covers samples 0..2, both crosslines, both inlines.
        let (min, max) = accessor.chunk_min_max(0);
        assert_eq!((min, max), ([0, 0, 0], [2, 2, 2]));
        // Second chunk holds the clipped sample 2 run.
        assert_ne!(accessor.chunk_volume_data_hash(1), 0);

        let slice = store.read_slice(0, 2, 1).unwrap();
        let expected: Vec<u8> = vec![36, 37, 38, 42, 43, 44];
        assert_eq!(slice, expected);
    }

    #[test]
    fn test_batch_geometry_is_validated() {
        let mut store = VolumeStore::create("/tmp/unused5.gfv", layout(2, 2, 2, 4)).unwrap();
        let writer = ChannelChunkWriter::new(&store.layout().clone(), 0);
        let mut accessor = store.page_accessor(0).unwrap();
        assert!(writer.write_batch(&mut accessor, &[0u8; 5], 0, 1).is_err());
        assert!(writer.write_batch(&mut accessor, &[0u8; 8], 3, 2).is_err());
    }

    #[test]
    fn test_rewritten_batches_skip_emitted_bricks() {
        let mut store = VolumeStore::create("/tmp/unused6.gfv", layout(2, 2, 2, 2)).unwrap();
        let writer = ChannelChunkWriter::new(&store.layout().clone(), 0);
        let mut accessor = store.page_accessor(0).unwrap();

        let batch_a = vec![1u8; 2 * 4];
        writer.write_batch(&mut accessor, &batch_a, 0, 2).unwrap();
        let hash = accessor.chunk_volume_data_hash(0);

        // A second batch over the same range must not touch the brick.
        let batch_b = vec![2u8; 2 * 4];
        writer.write_batch(&mut accessor, &batch_b, 0, 2).unwrap();
        assert_eq!(accessor.chunk_volume_data_hash(0), hash);
    }
}
