// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Expression Evaluator
//!
//! Walks a parsed expression tree once, dispatching to the typed vector
//! kernels against a named set of input buffers, and produces the result as
//! a 64-bit float buffer. Narrowing the result into the caller's storage
//! format is the caller's explicit second step
//! (`AttributeBuffer::fill_from_f64`), so the single rounding point of the
//! engine stays visible at the call site.
//!
//! Per node:
//!
//! - NUMBER broadcasts the constant across a scratch buffer
//! - VARIABLE resolves to the bound input view without copying
//! - UNARY / BINARY evaluate children into scratch buffers and invoke the
//!   dispatched kernel into the current scratch
//!
//! Failures (missing binding, operand length mismatch, arity mismatch) are
//! surfaced as [`PipelineError::EvaluationError`] and abort evaluation.

use std::collections::HashMap;

use crate::expression::kernels::{vector_compute_binary, vector_compute_unary};
use crate::expression::tree::ExprNode;
use crate::value_objects::VectorView;
use crate::PipelineError;

/// A node result: either a borrowed input binding or an owned scratch.
enum Evaluated<'a> {
    Borrowed(VectorView<'a>),
    Owned(Vec<f64>),
}

impl<'a> Evaluated<'a> {
    fn view(&self) -> VectorView<'_> {
        match self {
            Evaluated::Borrowed(view) => *view,
            Evaluated::Owned(values) => VectorView::Float64(values),
        }
    }
}

/// Evaluates `tree` over `bindings`, producing `length` doubles.
///
/// Every binding the tree references must be present in `bindings` and hold
/// exactly `length` elements (the kernels verify the lengths on dispatch).
///
/// # Errors
///
/// Returns [`PipelineError::EvaluationError`] for a missing binding, a
/// zero result length, or any kernel failure.
pub fn evaluate_expression(
    tree: &ExprNode,
    bindings: &HashMap<String, VectorView<'_>>,
    length: usize,
) -> Result<Vec<f64>, PipelineError> {
    if length == 0 {
        return Err(PipelineError::EvaluationError(
            "Result length must be positive".to_string(),
        ));
    }

    let result = evaluate_node(tree, bindings, length)?;
    Ok(match result {
        Evaluated::Owned(values) => values,
        // The root was a bare variable: widen it into the result buffer.
        Evaluated::Borrowed(view) => {
            if view.len() != length {
                return Err(PipelineError::EvaluationError(format!(
                    "Binding length {} does not match result length {}",
                    view.len(),
                    length
                )));
            }
            (0..length).map(|i| view.get_f64(i)).collect()
        }
    })
}

fn evaluate_node<'a>(
    node: &'a ExprNode,
    bindings: &'a HashMap<String, VectorView<'a>>,
    length: usize,
) -> Result<Evaluated<'a>, PipelineError> {
    match node {
        ExprNode::Number(value) => Ok(Evaluated::Owned(vec![*value; length])),

        ExprNode::Variable(name) => bindings
            .get(name)
            .map(|view| Evaluated::Borrowed(*view))
            .ok_or_else(|| {
                PipelineError::EvaluationError(format!("Variable '{}' not found in provided bindings", name))
            }),

        ExprNode::Unary { op, operand } => {
            let operand = evaluate_node(operand, bindings, length)?;
            let mut scratch = vec![0.0; length];
            vector_compute_unary(*op, &mut scratch, operand.view())?;
            Ok(Evaluated::Owned(scratch))
        }

        ExprNode::Binary { op, left, right } => {
            let left = evaluate_node(left, bindings, length)?;
            let right = evaluate_node(right, bindings, length)?;
            let mut scratch = vec![0.0; length];
            vector_compute_binary(*op, &mut scratch, left.view(), right.view())?;
            Ok(Evaluated::Owned(scratch))
        }
    }
}
