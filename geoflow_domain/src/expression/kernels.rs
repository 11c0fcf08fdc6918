// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Typed Vector Kernels
//!
//! Per-element compute across the six element formats. Each kernel reads
//! its operands in their native format, widens both to `f64`, applies the
//! operator closure, and stores into a `f64` result buffer. The result
//! format of every kernel is fixed at 64-bit float; the one narrowing step
//! back to a storage format is [`AttributeBuffer::fill_from_f64`]
//! (`crate::value_objects::AttributeBuffer::fill_from_f64`), performed
//! exactly once by the caller.
//!
//! The dispatch table of the original design (operator x result format x
//! operand formats) is realized here as a macro sweep over the 36 binary
//! format pairs and 6 unary formats, expanding to monomorphic loops; the
//! result-format axis collapses because the result type is `&mut [f64]` by
//! construction.
//!
//! ## Operator semantics on `f64`
//!
//! `+ - * /` are IEEE with one documented departure: division by exactly
//! zero produces zero. `SQRT` of a negative operand and `LOG` of a
//! non-positive operand produce zero. `POW`, `ABS`, `EXP`, `SIN`, `COS`,
//! `TAN` are the standard library functions.

use crate::value_objects::{Element, VectorView};
use crate::PipelineError;
use serde::{Deserialize, Serialize};

/// Operators usable in attribute expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Sin,
    Cos,
    Tan,
    Log,
    Sqrt,
    Abs,
    Exp,
}

impl ExprOp {
    /// Whether the operator takes two operands.
    pub fn is_binary(&self) -> bool {
        matches!(self, ExprOp::Add | ExprOp::Sub | ExprOp::Mul | ExprOp::Div | ExprOp::Pow)
    }

    /// Source spelling of the operator.
    pub fn name(&self) -> &'static str {
        match self {
            ExprOp::Add => "+",
            ExprOp::Sub => "-",
            ExprOp::Mul => "*",
            ExprOp::Div => "/",
            ExprOp::Pow => "POW",
            ExprOp::Sin => "SIN",
            ExprOp::Cos => "COS",
            ExprOp::Tan => "TAN",
            ExprOp::Log => "LOG",
            ExprOp::Sqrt => "SQRT",
            ExprOp::Abs => "ABS",
            ExprOp::Exp => "EXP",
        }
    }

    /// Looks an operator up by its upper-case source spelling.
    pub fn from_word(word: &str) -> Option<ExprOp> {
        match word {
            "+" => Some(ExprOp::Add),
            "-" => Some(ExprOp::Sub),
            "*" => Some(ExprOp::Mul),
            "/" => Some(ExprOp::Div),
            "POW" => Some(ExprOp::Pow),
            "SIN" => Some(ExprOp::Sin),
            "COS" => Some(ExprOp::Cos),
            "TAN" => Some(ExprOp::Tan),
            "LOG" => Some(ExprOp::Log),
            "SQRT" => Some(ExprOp::Sqrt),
            "ABS" => Some(ExprOp::Abs),
            "EXP" => Some(ExprOp::Exp),
            _ => None,
        }
    }

    /// Applies a binary operator closure on widened operands.
    fn apply_binary(self, a: f64, b: f64) -> f64 {
        match self {
            ExprOp::Add => a + b,
            ExprOp::Sub => a - b,
            ExprOp::Mul => a * b,
            // Division by exactly zero yields zero, not NaN/Inf.
            ExprOp::Div => {
                if b == 0.0 {
                    0.0
                } else {
                    a / b
                }
            }
            ExprOp::Pow => a.powf(b),
            _ => f64::NAN,
        }
    }

    /// Applies a unary operator closure on a widened operand.
    fn apply_unary(self, a: f64) -> f64 {
        match self {
            ExprOp::Sin => a.sin(),
            ExprOp::Cos => a.cos(),
            ExprOp::Tan => a.tan(),
            ExprOp::Log => {
                if a <= 0.0 {
                    0.0
                } else {
                    a.ln()
                }
            }
            ExprOp::Sqrt => {
                if a < 0.0 {
                    0.0
                } else {
                    a.sqrt()
                }
            }
            ExprOp::Abs => a.abs(),
            ExprOp::Exp => a.exp(),
            _ => f64::NAN,
        }
    }
}

fn compute_binary_typed<FT: Element, ST: Element>(
    op: ExprOp,
    out: &mut [f64],
    first: &[FT],
    second: &[ST],
) -> Result<(), PipelineError> {
    if first.len() != out.len() || second.len() != out.len() {
        return Err(PipelineError::EvaluationError(format!(
            "Operand length mismatch for '{}': result={}, first={}, second={}",
            op.name(),
            out.len(),
            first.len(),
            second.len()
        )));
    }
    for i in 0..out.len() {
        out[i] = op.apply_binary(first[i].widen(), second[i].widen());
    }
    Ok(())
}

fn compute_unary_typed<FT: Element>(
    op: ExprOp,
    out: &mut [f64],
    operand: &[FT],
) -> Result<(), PipelineError> {
    if operand.len() != out.len() {
        return Err(PipelineError::EvaluationError(format!(
            "Operand length mismatch for '{}': result={}, operand={}",
            op.name(),
            out.len(),
            operand.len()
        )));
    }
    for i in 0..out.len() {
        out[i] = op.apply_unary(operand[i].widen());
    }
    Ok(())
}

// The registration sweep: one arm per (first, second) format pair.
macro_rules! binary_sweep {
    ($op:expr, $out:expr, $first:expr, $second:expr; $(($fa:ident, $fb:ident)),+ $(,)?) => {
        match ($first, $second) {
            $(
                (VectorView::$fa(a), VectorView::$fb(b)) => compute_binary_typed($op, $out, a, b),
            )+
        }
    };
}

macro_rules! unary_sweep {
    ($op:expr, $out:expr, $operand:expr; $($fa:ident),+ $(,)?) => {
        match $operand {
            $(
                VectorView::$fa(a) => compute_unary_typed($op, $out, a),
            )+
        }
    };
}

/// Computes `out[i] = op(first[i], second[i])` for a binary operator.
///
/// # Errors
///
/// Fails when the operator is not binary or when any operand length differs
/// from the result length.
pub fn vector_compute_binary(
    op: ExprOp,
    out: &mut [f64],
    first: VectorView<'_>,
    second: VectorView<'_>,
) -> Result<(), PipelineError> {
    if !op.is_binary() {
        return Err(PipelineError::EvaluationError(format!(
            "Operator '{}' is not binary",
            op.name()
        )));
    }
    binary_sweep!(op, out, first, second;
        (Int8, Int8), (Int8, Int16), (Int8, Int32), (Int8, Int64), (Int8, Float32), (Int8, Float64),
        (Int16, Int8), (Int16, Int16), (Int16, Int32), (Int16, Int64), (Int16, Float32), (Int16, Float64),
        (Int32, Int8), (Int32, Int16), (Int32, Int32), (Int32, Int64), (Int32, Float32), (Int32, Float64),
        (Int64, Int8), (Int64, Int16), (Int64, Int32), (Int64, Int64), (Int64, Float32), (Int64, Float64),
        (Float32, Int8), (Float32, Int16), (Float32, Int32), (Float32, Int64), (Float32, Float32), (Float32, Float64),
        (Float64, Int8), (Float64, Int16), (Float64, Int32), (Float64, Int64), (Float64, Float32), (Float64, Float64),
    )
}

/// Computes `out[i] = op(operand[i])` for a unary operator.
///
/// # Errors
///
/// Fails when the operator is not unary or when the operand length differs
/// from the result length.
pub fn vector_compute_unary(
    op: ExprOp,
    out: &mut [f64],
    operand: VectorView<'_>,
) -> Result<(), PipelineError> {
    if op.is_binary() {
        return Err(PipelineError::EvaluationError(format!(
            "Operator '{}' is not unary",
            op.name()
        )));
    }
    unary_sweep!(op, out, operand; Int8, Int16, Int32, Int64, Float32, Float64)
}
