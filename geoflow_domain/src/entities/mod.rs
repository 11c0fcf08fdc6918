// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Entities
//!
//! Mutable objects with identity over the life of a job. The central one
//! is [`DataFlow`], the per-job runtime container every stage reads and
//! writes through.

pub mod dataflow;

pub use dataflow::DataFlow;
