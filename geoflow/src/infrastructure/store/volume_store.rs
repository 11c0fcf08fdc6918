// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bricked Volume Store
//!
//! The on-disk volumetric store the `output` stage writes and the `input`
//! stage reads back. A volume file holds a JSON metadata header (axes,
//! channels, brick size, LOD level count, compression method), a chunk
//! directory, and the chunk payloads, raw or deflate-compressed.
//!
//! ## Chunk layout
//!
//! Each channel is cut into cubical bricks of side `brick_size` along the
//! three dimensions (sample, secondary, primary), with edge bricks clipped
//! to the volume extents. The linear chunk index runs sample-fastest:
//! `index = (primary_chunk * nx + secondary_chunk) * ns + sample_chunk`.
//! Within a chunk page, elements are addressed through the pitch vector
//! `[1, sample_extent, sample_extent * secondary_extent]`.
//!
//! ## At-most-once bricks
//!
//! The directory keeps a crc32 content hash per chunk; hash 0 means the
//! chunk was never written. Writers check that predicate before emitting a
//! brick, so a brick lands in the store whole, exactly once, or not at all.
//!
//! LOD pyramids are recorded in the metadata but not materialized here;
//! downsampling belongs to the store's consumers of that metadata, not to
//! the pipeline core.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use geoflow_domain::value_objects::{AxisDescriptor, ElementFormat};
use geoflow_domain::PipelineError;
use serde::{Deserialize, Serialize};

const MAGIC: &[u8; 8] = b"GFVSTORE";
const VERSION: u32 = 1;

/// Brick payload compression method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    None,
    Zip,
}

impl std::str::FromStr for CompressionMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(CompressionMethod::None),
            "zip" => Ok(CompressionMethod::Zip),
            _ => Err(PipelineError::InvalidConfiguration(format!(
                "Unknown compression method: {}",
                s
            ))),
        }
    }
}

/// One channel of the volume: the amplitude or a per-trace attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: String,
    pub format: ElementFormat,
    /// Extent along the fastest dimension: the trace length for the
    /// amplitude channel, the per-row attribute length otherwise.
    pub sample_count: usize,
    pub value_range: (f32, f32),
}

/// Volume-wide layout: axes, brick geometry, and the channel table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeLayout {
    pub primary: AxisDescriptor,
    pub secondary: AxisDescriptor,
    pub data: AxisDescriptor,
    pub brick_size: usize,
    pub lod_levels: u32,
    pub compression: CompressionMethod,
    pub tolerance: f32,
    pub channels: Vec<ChannelDescriptor>,
}

impl VolumeLayout {
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }

    /// The chunk grid of one channel.
    pub fn chunk_grid(&self, channel: usize) -> ChunkGrid {
        ChunkGrid {
            brick_size: self.brick_size,
            dims: [
                self.channels[channel].sample_count,
                self.secondary.count,
                self.primary.count,
            ],
        }
    }
}

/// Brick grid geometry of one channel: dimension extents and brick side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkGrid {
    pub brick_size: usize,
    /// Voxel extents, sample/secondary/primary order.
    pub dims: [usize; 3],
}

impl ChunkGrid {
    /// Chunk counts per dimension (ceiling division).
    pub fn counts(&self) -> [usize; 3] {
        [
            self.dims[0].div_ceil(self.brick_size),
            self.dims[1].div_ceil(self.brick_size),
            self.dims[2].div_ceil(self.brick_size),
        ]
    }

    pub fn chunk_count(&self) -> usize {
        let [ns, nx, ni] = self.counts();
        ns * nx * ni
    }

    /// Voxel bounds of a chunk: `(min, max)` per dimension, max exclusive,
    /// clipped to the volume extents.
    pub fn chunk_min_max(&self, index: usize) -> ([usize; 3], [usize; 3]) {
        let [ns, nx, _] = self.counts();
        let s = index % ns;
        let x = (index / ns) % nx;
        let i = index / (ns * nx);
        let min = [s * self.brick_size, x * self.brick_size, i * self.brick_size];
        let max = [
            (min[0] + self.brick_size).min(self.dims[0]),
            (min[1] + self.brick_size).min(self.dims[1]),
            (min[2] + self.brick_size).min(self.dims[2]),
        ];
        (min, max)
    }

    /// Number of elements in a chunk page (clipped extents).
    pub fn page_elements(&self, index: usize) -> usize {
        let (min, max) = self.chunk_min_max(index);
        (max[0] - min[0]) * (max[1] - min[1]) * (max[2] - min[2])
    }

    /// Per-dimension element stride inside a chunk page.
    pub fn pitch(&self, index: usize) -> [usize; 3] {
        let (min, max) = self.chunk_min_max(index);
        [1, max[0] - min[0], (max[0] - min[0]) * (max[1] - min[1])]
    }
}

/// A writable brick page: zeroed element bytes plus the pitch vector.
#[derive(Debug)]
pub struct Page {
    pub data: Vec<u8>,
    pub pitch: [usize; 3],
}

#[derive(Debug, Clone, Default)]
struct ChunkSlot {
    hash: u64,
    data: Vec<u8>,
}

#[derive(Debug)]
struct DirEntry {
    offset: u64,
    stored_len: u64,
    hash: u64,
}

/// An open bricked volume, in memory until flushed.
#[derive(Debug)]
pub struct VolumeStore {
    layout: VolumeLayout,
    path: PathBuf,
    chunks: Vec<Vec<ChunkSlot>>,
}

impl VolumeStore {
    /// Creates a new, empty volume for writing.
    pub fn create(path: impl AsRef<Path>, layout: VolumeLayout) -> Result<Self, PipelineError> {
        if layout.brick_size == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "Brick size must be positive".to_string(),
            ));
        }
        if layout.channels.is_empty() {
            return Err(PipelineError::StoreError("Volume has no channels".to_string()));
        }
        let chunks = (0..layout.channels.len())
            .map(|c| vec![ChunkSlot::default(); layout.chunk_grid(c).chunk_count()])
            .collect();
        Ok(VolumeStore {
            layout,
            path: path.as_ref().to_path_buf(),
            chunks,
        })
    }

    pub fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The content hash of a chunk; 0 means never written.
    pub fn chunk_hash(&self, channel: usize, chunk: usize) -> u64 {
        self.chunks[channel][chunk].hash
    }

    /// Page-level access to one channel.
    pub fn page_accessor(&mut self, channel: usize) -> Result<PageAccessor<'_>, PipelineError> {
        if channel >= self.layout.channels.len() {
            return Err(PipelineError::StoreError(format!(
                "Channel index {} out of range",
                channel
            )));
        }
        Ok(PageAccessor { store: self, channel })
    }

    /// Writes the volume file atomically (temp file + rename).
    pub fn flush(&self) -> Result<(), PipelineError> {
        let meta = serde_json::to_vec(&self.layout)
            .map_err(|e| PipelineError::SerializationError(e.to_string()))?;

        // Compress payloads first so directory offsets are known.
        let mut payloads: Vec<Vec<u8>> = Vec::new();
        let mut dir: Vec<DirEntry> = Vec::new();
        let dir_entries: usize = self.chunks.iter().map(|c| c.len()).sum();
        let header_len = MAGIC.len() + 4 + 4 + meta.len();
        let dir_len = dir_entries * 24;
        let mut offset = (header_len + dir_len) as u64;

        for channel in &self.chunks {
            for slot in channel {
                if slot.hash == 0 {
                    dir.push(DirEntry {
                        offset: 0,
                        stored_len: 0,
                        hash: 0,
                    });
                    continue;
                }
                let stored = match self.layout.compression {
                    CompressionMethod::None => slot.data.clone(),
                    CompressionMethod::Zip => {
                        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                        encoder
                            .write_all(&slot.data)
                            .and_then(|_| encoder.finish())
                            .map_err(|e| PipelineError::StoreError(format!("Chunk compression failed: {}", e)))?
                    }
                };
                dir.push(DirEntry {
                    offset,
                    stored_len: stored.len() as u64,
                    hash: slot.hash,
                });
                offset += stored.len() as u64;
                payloads.push(stored);
            }
        }

        let mut out = Vec::with_capacity(offset as usize);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&(meta.len() as u32).to_le_bytes());
        out.extend_from_slice(&meta);
        for entry in &dir {
            out.extend_from_slice(&entry.offset.to_le_bytes());
            out.extend_from_slice(&entry.stored_len.to_le_bytes());
            out.extend_from_slice(&entry.hash.to_le_bytes());
        }
        for payload in &payloads {
            out.extend_from_slice(payload);
        }

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &out)
            .map_err(|e| PipelineError::StoreError(format!("Failed to write {}: {}", tmp_path.display(), e)))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| PipelineError::StoreError(format!("Failed to rename into {}: {}", self.path.display(), e)))?;
        Ok(())
    }

    /// Opens an existing volume file, loading every written chunk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| PipelineError::IoError(format!("Failed to open {}: {}", path.display(), e)))?;

        fn take<'a>(bytes: &'a [u8], cursor: &mut usize, n: usize, path: &Path) -> Result<&'a [u8], PipelineError> {
            if *cursor + n > bytes.len() {
                return Err(PipelineError::StoreError(format!(
                    "Truncated volume file {}",
                    path.display()
                )));
            }
            let slice = &bytes[*cursor..*cursor + n];
            *cursor += n;
            Ok(slice)
        }

        let mut cursor = 0usize;
        if take(&bytes, &mut cursor, MAGIC.len(), path)? != MAGIC {
            return Err(PipelineError::StoreError(format!(
                "{} is not a bricked volume file",
                path.display()
            )));
        }
        let version = u32::from_le_bytes(take(&bytes, &mut cursor, 4, path)?.try_into().unwrap());
        if version != VERSION {
            return Err(PipelineError::StoreError(format!(
                "Unsupported volume file version {}",
                version
            )));
        }
        let meta_len = u32::from_le_bytes(take(&bytes, &mut cursor, 4, path)?.try_into().unwrap()) as usize;
        let layout: VolumeLayout = serde_json::from_slice(take(&bytes, &mut cursor, meta_len, path)?)
            .map_err(|e| PipelineError::SerializationError(e.to_string()))?;

        let mut chunks: Vec<Vec<ChunkSlot>> = Vec::new();
        let mut dir: Vec<DirEntry> = Vec::new();
        for channel in 0..layout.channels.len() {
            let count = layout.chunk_grid(channel).chunk_count();
            chunks.push(vec![ChunkSlot::default(); count]);
            for _ in 0..count {
                let raw = take(&bytes, &mut cursor, 24, path)?;
                dir.push(DirEntry {
                    offset: u64::from_le_bytes(raw[0..8].try_into().unwrap()),
                    stored_len: u64::from_le_bytes(raw[8..16].try_into().unwrap()),
                    hash: u64::from_le_bytes(raw[16..24].try_into().unwrap()),
                });
            }
        }

        let mut flat_index = 0usize;
        for channel in 0..layout.channels.len() {
            let grid = layout.chunk_grid(channel);
            let element_size = layout.channels[channel].format.byte_size();
            for chunk in 0..grid.chunk_count() {
                let entry = &dir[flat_index];
                flat_index += 1;
                if entry.hash == 0 {
                    continue;
                }
                let start = entry.offset as usize;
                let end = start + entry.stored_len as usize;
                if end > bytes.len() {
                    return Err(PipelineError::StoreError(format!(
                        "Chunk payload out of bounds in {}",
                        path.display()
                    )));
                }
                let stored = &bytes[start..end];
                let expected = grid.page_elements(chunk) * element_size;
                let data = match layout.compression {
                    CompressionMethod::None => stored.to_vec(),
                    CompressionMethod::Zip => {
                        let mut decoder = ZlibDecoder::new(stored);
                        let mut data = Vec::with_capacity(expected);
                        decoder
                            .read_to_end(&mut data)
                            .map_err(|e| PipelineError::StoreError(format!("Chunk decompression failed: {}", e)))?;
                        data
                    }
                };
                if data.len() != expected {
                    return Err(PipelineError::StoreError(format!(
                        "Chunk {} of channel {} has {} bytes, expected {}",
                        chunk, channel, data.len(), expected
                    )));
                }
                if crc32fast::hash(&data).max(1) as u64 != entry.hash {
                    return Err(PipelineError::StoreError(format!(
                        "Hash mismatch on chunk {} of channel {}",
                        chunk, channel
                    )));
                }
                chunks[channel][chunk] = ChunkSlot {
                    hash: entry.hash,
                    data,
                };
            }
        }

        Ok(VolumeStore {
            layout,
            path: path.to_path_buf(),
            chunks,
        })
    }

    /// Reads one slice of a channel perpendicular to `dim`.
    ///
    /// The returned bytes are ordered with the higher remaining dimension
    /// major: a primary slice (`dim == 2`) comes back `[secondary][sample]`,
    /// a secondary slice (`dim == 1`) `[primary][sample]`, and a sample
    /// slice (`dim == 0`) `[primary][secondary]`. Unwritten bricks read as
    /// zeros.
    pub fn read_slice(&self, channel: usize, dim: usize, index: usize) -> Result<Vec<u8>, PipelineError> {
        if channel >= self.layout.channels.len() {
            return Err(PipelineError::StoreError(format!(
                "Channel index {} out of range",
                channel
            )));
        }
        if dim > 2 {
            return Err(PipelineError::StoreError(format!("Slice dimension {} out of range", dim)));
        }
        let grid = self.layout.chunk_grid(channel);
        if index >= grid.dims[dim] {
            return Err(PipelineError::StoreError(format!(
                "Slice index {} out of range for dimension {} of extent {}",
                index, dim, grid.dims[dim]
            )));
        }
        let element_size = self.layout.channels[channel].format.byte_size();
        let (major_dim, minor_dim) = match dim {
            2 => (1, 0),
            1 => (2, 0),
            _ => (2, 1),
        };
        let mut out = vec![0u8; grid.dims[major_dim] * grid.dims[minor_dim] * element_size];

        for chunk in 0..grid.chunk_count() {
            let (min, max) = grid.chunk_min_max(chunk);
            if index < min[dim] || index >= max[dim] {
                continue;
            }
            let slot = &self.chunks[channel][chunk];
            if slot.hash == 0 {
                continue;
            }
            let pitch = grid.pitch(chunk);
            for major in min[major_dim]..max[major_dim] {
                if minor_dim == 0 {
                    // Contiguous run of samples.
                    let mut voxel = [0usize; 3];
                    voxel[dim] = index - min[dim];
                    voxel[major_dim] = major - min[major_dim];
                    voxel[minor_dim] = 0;
                    let src = (voxel[0] + voxel[1] * pitch[1] + voxel[2] * pitch[2]) * element_size;
                    let run = (max[0] - min[0]) * element_size;
                    let dst = (major * grid.dims[0] + min[0]) * element_size;
                    out[dst..dst + run].copy_from_slice(&slot.data[src..src + run]);
                } else {
                    // Sample slice: gather element by element along the
                    // secondary dimension.
                    for minor in min[minor_dim]..max[minor_dim] {
                        let voxel = [
                            index - min[0],
                            minor - min[1],
                            major - min[2],
                        ];
                        let src = (voxel[0] + voxel[1] * pitch[1] + voxel[2] * pitch[2]) * element_size;
                        let dst = (major * grid.dims[1] + minor) * element_size;
                        out[dst..dst + element_size].copy_from_slice(&slot.data[src..src + element_size]);
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Per-channel page accessor: the writer-facing interface of the store.
#[derive(Debug)]
pub struct PageAccessor<'a> {
    store: &'a mut VolumeStore,
    channel: usize,
}

impl<'a> PageAccessor<'a> {
    pub fn chunk_count(&self) -> usize {
        self.store.layout.chunk_grid(self.channel).chunk_count()
    }

    /// Voxel bounds of a chunk, max exclusive.
    pub fn chunk_min_max(&self, chunk: usize) -> ([usize; 3], [usize; 3]) {
        self.store.layout.chunk_grid(self.channel).chunk_min_max(chunk)
    }

    /// The content hash of a chunk; 0 means never written.
    pub fn chunk_volume_data_hash(&self, chunk: usize) -> u64 {
        self.store.chunks[self.channel][chunk].hash
    }

    /// Allocates a zeroed page for a chunk together with its pitch vector.
    pub fn create_page(&self, chunk: usize) -> Result<Page, PipelineError> {
        let grid = self.store.layout.chunk_grid(self.channel);
        if chunk >= grid.chunk_count() {
            return Err(PipelineError::StoreError(format!("Chunk index {} out of range", chunk)));
        }
        let element_size = self.store.layout.channels[self.channel].format.byte_size();
        Ok(Page {
            data: vec![0u8; grid.page_elements(chunk) * element_size],
            pitch: grid.pitch(chunk),
        })
    }

    /// Commits a filled page: hashes it and retains it for the flush.
    ///
    /// Re-committing an already-written chunk is an invariant violation;
    /// bricks are emitted exactly once.
    pub fn commit_page(&mut self, chunk: usize, page: Page) -> Result<(), PipelineError> {
        let slot = &mut self.store.chunks[self.channel][chunk];
        if slot.hash != 0 {
            return Err(PipelineError::InvariantViolation(format!(
                "Chunk {} of channel '{}' was already written",
                chunk, self.store.layout.channels[self.channel].name
            )));
        }
        // crc32 can legitimately be zero; pin the uninitialized marker.
        slot.hash = crc32fast::hash(&page.data).max(1) as u64;
        slot.data = page.data;
        Ok(())
    }

    /// Terminates the accessor. Pages are durable once committed, so this
    /// is a synchronization point only; the store-level flush writes the
    /// file.
    pub fn commit(self) {}
}
