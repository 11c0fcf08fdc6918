// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the error type shared by every layer of the GeoFlow
//! pipeline. It categorizes failures along the lines a job actually fails:
//! bad configuration, schema violations, expression parse and evaluation
//! failures, I/O and store trouble, and internal invariant breakage.
//!
//! ## Error Categories
//!
//! - **Configuration** - missing key, malformed value, value out of range,
//!   unknown option
//! - **Schema** - attribute not found, attribute already exists, invalid
//!   name, length mismatch across expression variables
//! - **Parse** - tokenization failure, unexpected token, unknown variable,
//!   trailing input after an expression (parse errors are accumulated by the
//!   parser and reported together in a single message)
//! - **Evaluation** - missing binding at eval time, unsupported operand
//!   format, length mismatch inside a kernel
//! - **I/O / Store** - source file missing or unreadable, destination path
//!   invalid, bricked-store call failing
//! - **Invariant** - null buffer, group size not set, axis not set, hash
//!   mismatch on an already-emitted brick
//!
//! ## Propagation
//!
//! Errors raised inside a stage are caught at the stage entry by the
//! pipeline driver, logged with the stage id and the [`PipelineError::category`],
//! and converted into the runtime's aborted flag. There is no partial
//! recovery: once a job is aborted, subsequent stages release their state
//! and return.

use thiserror::Error;

/// Domain-specific errors for the seismic pipeline system.
///
/// Each variant carries a descriptive message; the variant itself encodes
/// the failure category so the driver and tests can match on the kind of
/// failure without parsing message text.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Expression parse error: {0}")]
    ParseError(String),

    #[error("Expression evaluation error: {0}")]
    EvaluationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Volume store error: {0}")]
    StoreError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl PipelineError {
    /// Gets the error category, the coarse label the driver logs next to
    /// the stage id when a stage aborts the job.
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::InvalidConfiguration(_) => "configuration",
            PipelineError::SchemaError(_) => "schema",
            PipelineError::ParseError(_) => "parse",
            PipelineError::EvaluationError(_) => "evaluation",
            PipelineError::IoError(_) => "io",
            PipelineError::StoreError(_) => "store",
            PipelineError::SerializationError(_) => "serialization",
            PipelineError::VerificationFailed(_) => "verification",
            PipelineError::InvariantViolation(_) => "invariant",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        assert_eq!(PipelineError::InvalidConfiguration("x".into()).category(), "configuration");
        assert_eq!(PipelineError::SchemaError("x".into()).category(), "schema");
        assert_eq!(PipelineError::ParseError("x".into()).category(), "parse");
        assert_eq!(PipelineError::InvariantViolation("x".into()).category(), "invariant");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PipelineError = io.into();
        assert!(matches!(err, PipelineError::IoError(_)));
        assert!(err.to_string().contains("missing"));
        assert_eq!(err.category(), "io");
    }
}
