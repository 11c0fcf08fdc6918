// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # GeoFlow
//!
//! A single-process pipeline for three-dimensional seismic volumes. A
//! volume flows group-at-a-time (one primary-key value per step, all
//! secondary-key rows materialized) from a source stage through stateless
//! transforms into a bricked, optionally compressed volume file.
//!
//! ## Layers
//!
//! - **Domain** (`geoflow-domain`) - element formats, attribute buffers,
//!   the dataflow runtime, and the expression engine
//! - **Application** ([`application`]) - the job-file model and the
//!   pipeline driver
//! - **Infrastructure** ([`infrastructure`]) - stage implementations, the
//!   volume store, SEG-Y reading, and config parsing
//!
//! ## Running a job
//!
//! ```rust,no_run
//! use geoflow::application::{JobOutcome, JobSpec, PipelineDriver};
//! use geoflow_domain::entities::DataFlow;
//!
//! let spec = JobSpec::from_file("job.yaml")?;
//! let mut driver = PipelineDriver::from_spec(&spec)?;
//! let mut flow = DataFlow::new();
//! match driver.run(&mut flow) {
//!     JobOutcome::Completed => {}
//!     JobOutcome::Aborted => std::process::exit(1),
//! }
//! # Ok::<(), geoflow_domain::PipelineError>(())
//! ```

pub mod application;
pub mod infrastructure;
