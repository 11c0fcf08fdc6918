// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dataflow Runtime
//!
//! The container at the heart of the pipeline: one [`DataFlow`] per job,
//! owning the attribute schema, the per-attribute buffers, the three axis
//! descriptors, the group size, the per-stage opaque state slots, and the
//! job control flags. Stages receive it as `&mut` from the driver, so
//! exactly one stage touches it at a time - the single-threaded cooperative
//! contract of the engine is enforced by the borrow checker rather than by
//! locks.
//!
//! ## Schema lifecycle
//!
//! A source stage is the only producer of schema and axes; the runtime has
//! no defaults. The expected order (and the one the invariant checks
//! enforce) is:
//!
//! 1. `add_attribute` for the primary key, secondary key and trace data,
//!    then designate the three by name;
//! 2. set the three axis descriptors;
//! 3. `set_group_size`, which allocates a contiguous buffer for every
//!    registered attribute (adding an attribute later allocates that
//!    buffer immediately).
//!
//! Axes and the group size are fixed once set. Attribute names are folded
//! to upper case at every entry point. Buffers are never reallocated
//! during a job: a stage may cache row offsets freely between `process`
//! calls.
//!
//! ## Group contract
//!
//! One `process` invocation handles one group: a single primary-key value,
//! `group_size` secondary-key values, and one row per secondary key in
//! every attribute buffer. Buffer sizes therefore always equal
//! `length x group_size` elements.

use std::any::Any;
use std::collections::HashMap;

use crate::value_objects::{AttributeBuffer, AttributeDescriptor, AxisDescriptor, ElementFormat};
use crate::PipelineError;

/// Process-wide job state for one pipeline run.
///
/// See the module documentation for the lifecycle. All name-taking methods
/// fold their arguments to upper case.
#[derive(Default)]
pub struct DataFlow {
    attributes: Vec<AttributeDescriptor>,
    buffers: HashMap<String, AttributeBuffer>,
    primary_axis: Option<AxisDescriptor>,
    secondary_axis: Option<AxisDescriptor>,
    data_axis: Option<AxisDescriptor>,
    data_axis_unit: String,
    primary_key_name: Option<String>,
    secondary_key_name: Option<String>,
    volume_data_name: Option<String>,
    group_size: Option<usize>,
    stage_state: HashMap<String, Box<dyn Any + Send>>,
    finished: bool,
    aborted: bool,
}

impl DataFlow {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------------
    // Schema and axes
    // ---------------------------------------------------------------------

    /// Registers a new attribute.
    ///
    /// Fails when the (upper-cased) name is already registered or invalid.
    /// When the group size is already set the buffer is allocated
    /// immediately, zero-filled.
    pub fn add_attribute(
        &mut self,
        name: &str,
        format: ElementFormat,
        length: usize,
    ) -> Result<(), PipelineError> {
        let descriptor = AttributeDescriptor::new(name, format, length)?;
        if self.has_attribute(descriptor.name()) {
            return Err(PipelineError::SchemaError(format!(
                "Attribute name exists: {}",
                descriptor.name()
            )));
        }
        if let Some(group_size) = self.group_size {
            let buffer = Self::allocate(&descriptor, group_size)?;
            self.buffers.insert(descriptor.name().to_string(), buffer);
        }
        self.attributes.push(descriptor);
        Ok(())
    }

    /// Removes an attribute and its buffer.
    ///
    /// The designated key and volume-data attributes cannot be removed.
    pub fn delete_attribute(&mut self, name: &str) -> Result<(), PipelineError> {
        let name = name.to_uppercase();
        let index = self
            .attributes
            .iter()
            .position(|d| d.name() == name)
            .ok_or_else(|| PipelineError::SchemaError(format!("Attribute not found: {}", name)))?;
        let designated = [
            self.primary_key_name.as_deref(),
            self.secondary_key_name.as_deref(),
            self.volume_data_name.as_deref(),
        ];
        if designated.iter().any(|d| *d == Some(name.as_str())) {
            return Err(PipelineError::SchemaError(format!(
                "Cannot remove designated key or volume-data attribute: {}",
                name
            )));
        }
        self.attributes.remove(index);
        self.buffers.remove(&name);
        Ok(())
    }

    /// Designates the primary-key attribute; it must be a scalar integer.
    pub fn set_primary_key_name(&mut self, name: &str) -> Result<(), PipelineError> {
        let name = self.validate_key_attribute(name)?;
        self.primary_key_name = Some(name);
        Ok(())
    }

    /// Designates the secondary-key attribute; it must be a scalar integer.
    pub fn set_secondary_key_name(&mut self, name: &str) -> Result<(), PipelineError> {
        let name = self.validate_key_attribute(name)?;
        self.secondary_key_name = Some(name);
        Ok(())
    }

    /// Designates the volume-data (trace amplitude) attribute.
    pub fn set_volume_data_name(&mut self, name: &str) -> Result<(), PipelineError> {
        let name = name.to_uppercase();
        let descriptor = self
            .descriptor(&name)
            .ok_or_else(|| PipelineError::SchemaError(format!("Attribute not found: {}", name)))?;
        if let Some(axis) = &self.data_axis {
            if descriptor.length() != axis.count {
                return Err(PipelineError::InvariantViolation(format!(
                    "Volume data attribute '{}' has length {} but the data axis has {} samples",
                    name,
                    descriptor.length(),
                    axis.count
                )));
            }
        }
        self.volume_data_name = Some(name);
        Ok(())
    }

    /// Sets the primary key axis; fixed once set.
    pub fn set_primary_key_axis(&mut self, min: i32, max: i32, count: usize) -> Result<(), PipelineError> {
        if self.primary_axis.is_some() {
            return Err(PipelineError::InvariantViolation(
                "Primary key axis is already set".to_string(),
            ));
        }
        let name = self.primary_key_name.clone().unwrap_or_default();
        self.primary_axis = Some(AxisDescriptor::new(name, "", min as f64, max as f64, count)?);
        Ok(())
    }

    /// Sets the secondary key axis; fixed once set. The count must agree
    /// with the group size when that is already known.
    pub fn set_secondary_key_axis(&mut self, min: i32, max: i32, count: usize) -> Result<(), PipelineError> {
        if self.secondary_axis.is_some() {
            return Err(PipelineError::InvariantViolation(
                "Secondary key axis is already set".to_string(),
            ));
        }
        if let Some(group_size) = self.group_size {
            if group_size != count {
                return Err(PipelineError::InvariantViolation(format!(
                    "Secondary key axis count {} does not match group size {}",
                    count, group_size
                )));
            }
        }
        let name = self.secondary_key_name.clone().unwrap_or_default();
        self.secondary_axis = Some(AxisDescriptor::new(name, "", min as f64, max as f64, count)?);
        Ok(())
    }

    /// Sets the sample (data) axis; fixed once set. The count must agree
    /// with the volume-data attribute length when that is designated.
    pub fn set_data_axis(&mut self, min: f32, max: f32, count: usize) -> Result<(), PipelineError> {
        if self.data_axis.is_some() {
            return Err(PipelineError::InvariantViolation("Data axis is already set".to_string()));
        }
        if let Some(volume_name) = &self.volume_data_name {
            if let Some(descriptor) = self.descriptor(volume_name) {
                if descriptor.length() != count {
                    return Err(PipelineError::InvariantViolation(format!(
                        "Data axis has {} samples but volume data attribute '{}' has length {}",
                        count,
                        volume_name,
                        descriptor.length()
                    )));
                }
            }
        }
        let name = self.volume_data_name.clone().unwrap_or_default();
        self.data_axis = Some(AxisDescriptor::new(
            name,
            self.data_axis_unit.clone(),
            min as f64,
            max as f64,
            count,
        )?);
        Ok(())
    }

    /// Sets the unit of the sample axis (callable before the axis itself).
    pub fn set_data_axis_unit(&mut self, unit: &str) {
        self.data_axis_unit = unit.to_string();
        if let Some(axis) = &mut self.data_axis {
            axis.unit = unit.to_string();
        }
    }

    pub fn set_attribute_unit(&mut self, name: &str, unit: &str) -> Result<(), PipelineError> {
        let name = name.to_uppercase();
        self.descriptor_mut(&name)
            .ok_or_else(|| PipelineError::SchemaError(format!("Attribute not found: {}", name)))?
            .set_unit(unit);
        Ok(())
    }

    pub fn set_attribute_value_range(&mut self, name: &str, min: f32, max: f32) -> Result<(), PipelineError> {
        let name = name.to_uppercase();
        self.descriptor_mut(&name)
            .ok_or_else(|| PipelineError::SchemaError(format!("Attribute not found: {}", name)))?
            .set_value_range(min, max);
        Ok(())
    }

    /// Sets the group size and allocates the buffer for every registered
    /// attribute. Fixed once set.
    pub fn set_group_size(&mut self, group_size: usize) -> Result<(), PipelineError> {
        if self.group_size.is_some() {
            return Err(PipelineError::InvariantViolation("Group size is already set".to_string()));
        }
        if group_size == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "Group size must be positive".to_string(),
            ));
        }
        if let Some(axis) = &self.secondary_axis {
            if axis.count != group_size {
                return Err(PipelineError::InvariantViolation(format!(
                    "Group size {} does not match secondary key axis count {}",
                    group_size, axis.count
                )));
            }
        }
        for descriptor in &self.attributes {
            let buffer = Self::allocate(descriptor, group_size)?;
            self.buffers.insert(descriptor.name().to_string(), buffer);
        }
        self.group_size = Some(group_size);
        Ok(())
    }

    fn allocate(descriptor: &AttributeDescriptor, group_size: usize) -> Result<AttributeBuffer, PipelineError> {
        // Widen before multiplying so huge volumes cannot overflow the
        // element count computation.
        let elements = (descriptor.length() as u64)
            .checked_mul(group_size as u64)
            .ok_or_else(|| {
                PipelineError::InvariantViolation(format!(
                    "Buffer size overflow for attribute '{}'",
                    descriptor.name()
                ))
            })?;
        Ok(AttributeBuffer::zeroed(descriptor.format(), elements as usize))
    }

    fn validate_key_attribute(&self, name: &str) -> Result<String, PipelineError> {
        let name = name.to_uppercase();
        let descriptor = self
            .descriptor(&name)
            .ok_or_else(|| PipelineError::SchemaError(format!("Attribute not found: {}", name)))?;
        if !descriptor.format().is_integer() {
            return Err(PipelineError::SchemaError(format!(
                "Key attribute '{}' must have an integer format, got {}",
                name,
                descriptor.format()
            )));
        }
        if !descriptor.is_scalar() {
            return Err(PipelineError::SchemaError(format!(
                "Key attribute '{}' must be scalar (length 1), got length {}",
                name,
                descriptor.length()
            )));
        }
        Ok(name)
    }

    // ---------------------------------------------------------------------
    // Per-group access
    // ---------------------------------------------------------------------

    pub fn num_attributes(&self) -> usize {
        self.attributes.len()
    }

    /// Attribute name at insertion-order index `i`.
    pub fn attribute_name(&self, i: usize) -> Option<&str> {
        self.attributes.get(i).map(|d| d.name())
    }

    /// Descriptors in insertion order (observable by stages).
    pub fn descriptors(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn descriptor(&self, name: &str) -> Option<&AttributeDescriptor> {
        let name = name.to_uppercase();
        self.attributes.iter().find(|d| d.name() == name)
    }

    fn descriptor_mut(&mut self, name: &str) -> Option<&mut AttributeDescriptor> {
        self.attributes.iter_mut().find(|d| d.name() == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.descriptor(name).is_some()
    }

    /// Read access to an attribute's buffer; `None` before allocation.
    pub fn buffer(&self, name: &str) -> Option<&AttributeBuffer> {
        self.buffers.get(&name.to_uppercase())
    }

    /// Write access to an attribute's buffer; `None` before allocation.
    pub fn buffer_mut(&mut self, name: &str) -> Option<&mut AttributeBuffer> {
        self.buffers.get_mut(&name.to_uppercase())
    }

    pub fn group_size(&self) -> Option<usize> {
        self.group_size
    }

    /// Length of the designated volume-data attribute (the sample count).
    pub fn data_vector_length(&self) -> Option<usize> {
        let name = self.volume_data_name.as_deref()?;
        self.descriptor(name).map(|d| d.length())
    }

    pub fn primary_key_name(&self) -> Option<&str> {
        self.primary_key_name.as_deref()
    }

    pub fn secondary_key_name(&self) -> Option<&str> {
        self.secondary_key_name.as_deref()
    }

    pub fn volume_data_name(&self) -> Option<&str> {
        self.volume_data_name.as_deref()
    }

    pub fn primary_key_axis(&self) -> Option<(i32, i32, usize)> {
        self.primary_axis.as_ref().map(|a| (a.min as i32, a.max as i32, a.count))
    }

    pub fn secondary_key_axis(&self) -> Option<(i32, i32, usize)> {
        self.secondary_axis
            .as_ref()
            .map(|a| (a.min as i32, a.max as i32, a.count))
    }

    pub fn data_axis(&self) -> Option<(f32, f32, usize)> {
        self.data_axis.as_ref().map(|a| (a.min as f32, a.max as f32, a.count))
    }

    pub fn primary_axis_descriptor(&self) -> Option<&AxisDescriptor> {
        self.primary_axis.as_ref()
    }

    pub fn secondary_axis_descriptor(&self) -> Option<&AxisDescriptor> {
        self.secondary_axis.as_ref()
    }

    pub fn data_axis_descriptor(&self) -> Option<&AxisDescriptor> {
        self.data_axis.as_ref()
    }

    // ---------------------------------------------------------------------
    // Stage state and control
    // ---------------------------------------------------------------------

    /// Stores opaque per-stage state under the stage id.
    pub fn set_stage_state<T: Any + Send>(&mut self, stage_id: &str, state: T) {
        self.stage_state.insert(stage_id.to_string(), Box::new(state));
    }

    /// Mutable access to a stage's state, if present and of type `T`.
    pub fn stage_state_mut<T: Any>(&mut self, stage_id: &str) -> Option<&mut T> {
        self.stage_state.get_mut(stage_id).and_then(|s| s.downcast_mut::<T>())
    }

    /// Takes a stage's state out of the runtime, ending its lifecycle.
    pub fn take_stage_state<T: Any>(&mut self, stage_id: &str) -> Option<Box<T>> {
        let state = self.stage_state.remove(stage_id)?;
        match state.downcast::<T>() {
            Ok(state) => Some(state),
            Err(state) => {
                // Wrong type requested: put it back untouched.
                self.stage_state.insert(stage_id.to_string(), state);
                None
            }
        }
    }

    /// Drops a stage's state regardless of its type.
    pub fn release_stage_state(&mut self, stage_id: &str) {
        self.stage_state.remove(stage_id);
    }

    /// Marks the job aborted; terminal, no resume.
    pub fn set_job_aborted(&mut self) {
        self.aborted = true;
    }

    /// Marks the job finished (end of data).
    pub fn set_job_finished(&mut self) {
        self.finished = true;
    }

    pub fn job_finished(&self) -> bool {
        self.finished
    }

    pub fn job_aborted(&self) -> bool {
        self.aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured_flow() -> DataFlow {
        let mut flow = DataFlow::new();
        flow.add_attribute("inline", ElementFormat::Int32, 1).unwrap();
        flow.add_attribute("crossline", ElementFormat::Int32, 1).unwrap();
        flow.add_attribute("amplitude", ElementFormat::Float32, 5).unwrap();
        flow.set_primary_key_name("inline").unwrap();
        flow.set_secondary_key_name("crossline").unwrap();
        flow.set_volume_data_name("amplitude").unwrap();
        flow.set_primary_key_axis(10, 12, 3).unwrap();
        flow.set_secondary_key_axis(20, 22, 3).unwrap();
        flow.set_data_axis(0.0, 20.0, 5).unwrap();
        flow.set_group_size(3).unwrap();
        flow
    }

    #[test]
    fn test_names_are_case_folded() {
        let flow = configured_flow();
        assert!(flow.has_attribute("INLINE"));
        assert!(flow.has_attribute("Inline"));
        assert_eq!(flow.primary_key_name(), Some("INLINE"));
        assert_eq!(flow.attribute_name(2), Some("AMPLITUDE"));
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let mut flow = configured_flow();
        let err = flow.add_attribute("INLINE", ElementFormat::Int32, 1).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaError(_)));
    }

    #[test]
    fn test_buffer_sizes_match_schema() {
        let flow = configured_flow();
        let amplitude = flow.buffer("amplitude").unwrap();
        assert_eq!(amplitude.len(), 5 * 3);
        assert_eq!(amplitude.byte_len(), 5 * 3 * 4);
        assert_eq!(flow.buffer("inline").unwrap().len(), 3);
        assert_eq!(flow.data_vector_length(), Some(5));
    }

    #[test]
    fn test_add_after_group_size_allocates_immediately() {
        let mut flow = configured_flow();
        flow.add_attribute("gain", ElementFormat::Float64, 1).unwrap();
        assert_eq!(flow.buffer("gain").unwrap().len(), 3);
    }

    #[test]
    fn test_key_attribute_must_be_scalar_integer() {
        let mut flow = DataFlow::new();
        flow.add_attribute("trace", ElementFormat::Float32, 10).unwrap();
        flow.add_attribute("flt", ElementFormat::Float32, 1).unwrap();
        assert!(flow.set_primary_key_name("trace").is_err());
        assert!(flow.set_primary_key_name("flt").is_err());
    }

    #[test]
    fn test_axes_are_fixed_once_set() {
        let mut flow = configured_flow();
        assert!(flow.set_primary_key_axis(0, 1, 2).is_err());
        assert!(flow.set_data_axis(0.0, 1.0, 5).is_err());
        assert!(flow.set_group_size(3).is_err());
    }

    #[test]
    fn test_data_axis_count_must_match_volume_length() {
        let mut flow = DataFlow::new();
        flow.add_attribute("amp", ElementFormat::Float32, 5).unwrap();
        flow.set_volume_data_name("amp").unwrap();
        assert!(flow.set_data_axis(0.0, 20.0, 7).is_err());
        assert!(flow.set_data_axis(0.0, 20.0, 5).is_ok());
    }

    #[test]
    fn test_group_size_must_match_secondary_axis() {
        let mut flow = DataFlow::new();
        flow.add_attribute("xl", ElementFormat::Int32, 1).unwrap();
        flow.set_secondary_key_name("xl").unwrap();
        flow.set_secondary_key_axis(0, 9, 10).unwrap();
        assert!(flow.set_group_size(4).is_err());
        assert!(flow.set_group_size(10).is_ok());
    }

    #[test]
    fn test_delete_attribute() {
        let mut flow = configured_flow();
        flow.add_attribute("extra", ElementFormat::Int16, 1).unwrap();
        flow.delete_attribute("extra").unwrap();
        assert!(!flow.has_attribute("extra"));
        assert!(flow.delete_attribute("extra").is_err());
        // Designated attributes are protected.
        assert!(flow.delete_attribute("inline").is_err());
        assert!(flow.delete_attribute("amplitude").is_err());
    }

    #[test]
    fn test_stage_state_lifecycle() {
        let mut flow = DataFlow::new();
        flow.set_stage_state("s1", vec![1u8, 2, 3]);
        assert_eq!(flow.stage_state_mut::<Vec<u8>>("s1").unwrap().len(), 3);
        // Wrong type neither returns nor destroys the state.
        assert!(flow.take_stage_state::<String>("s1").is_none());
        let state = flow.take_stage_state::<Vec<u8>>("s1").unwrap();
        assert_eq!(*state, vec![1, 2, 3]);
        assert!(flow.stage_state_mut::<Vec<u8>>("s1").is_none());
    }

    #[test]
    fn test_control_flags() {
        let mut flow = DataFlow::new();
        assert!(!flow.job_finished() && !flow.job_aborted());
        flow.set_job_finished();
        assert!(flow.job_finished());
        flow.set_job_aborted();
        assert!(flow.job_aborted());
    }

    #[test]
    fn test_axis_step_through_descriptor() {
        let flow = configured_flow();
        let axis = flow.data_axis_descriptor().unwrap();
        assert_eq!(axis.step(), 5.0);
        assert_eq!(flow.primary_key_axis(), Some((10, 12, 3)));
    }
}
