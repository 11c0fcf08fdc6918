// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # GeoFlow Domain
//!
//! The domain layer of the GeoFlow seismic pipeline: pure business logic
//! with no I/O, no logging, and no configuration parsing.
//!
//! ## Module Structure
//!
//! - [`value_objects`] - element formats, attribute and axis descriptors,
//!   and the typed attribute buffers with their borrowed views
//! - [`entities`] - the [`entities::DataFlow`] runtime container owning
//!   schema, buffers, axes, stage state and the job control flags
//! - [`expression`] - tokenizer, recursive-descent parser, typed vector
//!   kernels and the tree-walking evaluator behind the attribute
//!   expressions
//! - [`services`] - the [`services::StageService`] trait implemented by
//!   every pipeline stage
//! - [`error`] - the [`PipelineError`] shared by all layers
//!
//! ## Data model in one paragraph
//!
//! A volume is organized along three axes - primary key (inline),
//! secondary key (crossline), and samples (time/depth) - and carries a
//! variable set of per-trace attributes alongside the trace amplitude.
//! Processing is group-at-a-time: one primary-key value per `process`
//! call, all secondary-key rows materialized in contiguous per-attribute
//! buffers owned by the runtime for the life of the job.

pub mod entities;
pub mod error;
pub mod expression;
pub mod services;
pub mod value_objects;

pub use error::PipelineError;
