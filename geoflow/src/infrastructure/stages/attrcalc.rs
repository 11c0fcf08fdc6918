// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Attrcalc Transform Stage
//!
//! Expression-driven attribute CRUD. Config (under `attrcalc.`):
//!
//! - `attrname` - the target attribute (upper-cased)
//! - `action` - `create`, `update`, or `remove`
//! - `expr` - the expression over existing attribute names (`create` and
//!   `update`)
//! - `type` - the element format of a created attribute
//!
//! `create` infers the per-row element count as the common length of every
//! variable the expression references (disagreement fails the stage, and a
//! constant-only expression has no length to infer from). `update`
//! requires the expression length to match the target. `remove` deletes
//! the attribute during `init` and leaves `process` a no-op.
//!
//! Each `process` gathers every attribute buffer into the evaluator's
//! binding, evaluates over the whole group, and narrows the `f64` result
//! into the target buffer.

use std::str::FromStr;

use geoflow_domain::entities::DataFlow;
use geoflow_domain::expression::{evaluate_expression, parse_expression, ExprNode};
use geoflow_domain::services::StageService;
use geoflow_domain::value_objects::ElementFormat;
use geoflow_domain::PipelineError;
use tracing::info;

use crate::infrastructure::config::ModuleConfig;
use crate::infrastructure::stages::{admissible_variables, bind_all_attributes, variable_lengths};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Create,
    Update,
    Remove,
}

impl FromStr for Action {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "remove" => Ok(Action::Remove),
            _ => Err(PipelineError::InvalidConfiguration(format!(
                "attrcalc action is invalid: {}",
                s
            ))),
        }
    }
}

struct AttrcalcState {
    name: String,
    action: Action,
    tree: ExprNode,
    /// Per-row length of the target attribute.
    target_length: usize,
}

/// Attribute create/update/remove stage.
pub struct AttrcalcStage;

impl StageService for AttrcalcStage {
    fn init(&self, flow: &mut DataFlow, stage_id: &str, config: &str) -> Result<(), PipelineError> {
        let config = ModuleConfig::parse(config)?;

        let name = config.get_str("attrcalc.attrname")?.to_uppercase();
        let action = Action::from_str(&config.get_str("attrcalc.action")?)?;

        if action == Action::Remove {
            flow.delete_attribute(&name)?;
            info!(stage = stage_id, attr = %name, "attrcalc: removed attribute");
            return Ok(());
        }

        let expr = config.get_str("attrcalc.expr")?.to_uppercase();
        let lengths = variable_lengths(flow);
        let mut variables = admissible_variables(flow);

        let format = match action {
            Action::Create => {
                if flow.has_attribute(&name) {
                    return Err(PipelineError::SchemaError(format!("Attr name exists: {}", name)));
                }
                // A created name becomes admissible inside its own
                // expression only in so far as the grammar allows; the
                // original admits it for parsing symmetry with update.
                variables.push(name.clone());
                Some(ElementFormat::from_str(&config.get_str("attrcalc.type")?)?)
            }
            Action::Update => {
                if !flow.has_attribute(&name) {
                    return Err(PipelineError::SchemaError(format!(
                        "Failed to find the attr to update: {}",
                        name
                    )));
                }
                None
            }
            Action::Remove => unreachable!(),
        };

        let parsed = parse_expression(&expr, &variables)?;

        // All referenced variables must agree on their per-row length.
        let mut common_length: Option<(String, usize)> = None;
        for used in &parsed.used_variables {
            let length = *lengths.get(used).ok_or_else(|| {
                PipelineError::SchemaError(format!("Expression references unknown attribute '{}'", used))
            })?;
            match &common_length {
                None => common_length = Some((used.clone(), length)),
                Some((first_name, first_length)) => {
                    if *first_length != length {
                        return Err(PipelineError::SchemaError(format!(
                            "Attribute lengths should be the same, but {} = {} vs {} = {}",
                            first_name, first_length, used, length
                        )));
                    }
                }
            }
        }

        let target_length = match action {
            Action::Create => {
                let (_, length) = common_length.ok_or_else(|| {
                    PipelineError::SchemaError(
                        "Cannot infer the length of a created attribute from a constant expression".to_string(),
                    )
                })?;
                flow.add_attribute(&name, format.unwrap(), length)?;
                length
            }
            Action::Update => {
                let target_length = flow.descriptor(&name).map(|d| d.length()).unwrap();
                if let Some((_, length)) = common_length {
                    if length != target_length {
                        return Err(PipelineError::SchemaError(format!(
                            "Expression length {} does not match attribute '{}' length {}",
                            length, name, target_length
                        )));
                    }
                }
                target_length
            }
            Action::Remove => unreachable!(),
        };

        info!(
            stage = stage_id,
            attr = %name,
            action = ?action,
            expr = %parsed.tree.to_source(),
            "attrcalc initialized"
        );

        flow.set_stage_state(
            stage_id,
            AttrcalcState {
                name,
                action,
                tree: parsed.tree,
                target_length,
            },
        );
        Ok(())
    }

    fn process(&self, flow: &mut DataFlow, stage_id: &str) -> Result<(), PipelineError> {
        let Some(state) = flow.take_stage_state::<AttrcalcState>(stage_id) else {
            return Ok(());
        };
        if flow.job_finished() || flow.job_aborted() {
            return Ok(());
        }
        debug_assert!(state.action != Action::Remove);

        let group_size = flow
            .group_size()
            .ok_or_else(|| PipelineError::InvariantViolation("Group size is not set".to_string()))?;
        let result_length = state.target_length * group_size;

        let result = {
            let bindings = bind_all_attributes(flow)?;
            evaluate_expression(&state.tree, &bindings, result_length)?
        };

        flow.buffer_mut(&state.name)
            .ok_or_else(|| {
                PipelineError::InvariantViolation(format!("Runtime returned no buffer for '{}'", state.name))
            })?
            .fill_from_f64(&result)?;

        flow.set_stage_state(stage_id, *state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_flow() -> DataFlow {
        let mut flow = DataFlow::new();
        flow.add_attribute("INLINE", ElementFormat::Int32, 1).unwrap();
        flow.add_attribute("CROSSLINE", ElementFormat::Int32, 1).unwrap();
        flow.add_attribute("SEISMIC", ElementFormat::Float32, 4).unwrap();
        flow.set_primary_key_name("INLINE").unwrap();
        flow.set_secondary_key_name("CROSSLINE").unwrap();
        flow.set_volume_data_name("SEISMIC").unwrap();
        flow.set_group_size(3).unwrap();
        flow.buffer_mut("INLINE")
            .unwrap()
            .fill_from_f64(&[10.0, 10.0, 10.0])
            .unwrap();
        flow.buffer_mut("CROSSLINE")
            .unwrap()
            .fill_from_f64(&[20.0, 21.0, 22.0])
            .unwrap();
        flow
    }

    fn config(action: &str, name: &str, expr: &str, ty: &str) -> String {
        format!(
            "attrcalc:\n  attrname: {}\n  action: {}\n  expr: \"{}\"\n  type: {}\n",
            name, action, expr, ty
        )
    }

    #[test]
    fn test_create_evaluates_expression_per_row() {
        let mut flow = seeded_flow();
        let cfg = config("create", "attr", "INLINE + CROSSLINE * 2.7", "r32");
        AttrcalcStage.init(&mut flow, "calc", &cfg).unwrap();
        AttrcalcStage.process(&mut flow, "calc").unwrap();

        let values = flow.buffer("ATTR").unwrap().as_f32().unwrap();
        for (i, s) in [20.0f64, 21.0, 22.0].iter().enumerate() {
            assert_eq!(values[i], (10.0 + s * 2.7) as f32);
        }
    }

    #[test]
    fn test_create_existing_name_fails() {
        let mut flow = seeded_flow();
        let cfg = config("create", "INLINE", "CROSSLINE", "i32");
        assert!(AttrcalcStage.init(&mut flow, "calc", &cfg).is_err());
    }

    #[test]
    fn test_create_length_mismatch_fails() {
        let mut flow = seeded_flow();
        let cfg = config("create", "BAD", "INLINE + SEISMIC", "r32");
        let err = AttrcalcStage.init(&mut flow, "calc", &cfg).unwrap_err();
        assert!(err.to_string().contains("lengths should be the same"));
    }

    #[test]
    fn test_create_constant_only_expression_fails() {
        let mut flow = seeded_flow();
        let cfg = config("create", "CONST", "1 + 2", "r32");
        assert!(AttrcalcStage.init(&mut flow, "calc", &cfg).is_err());
    }

    #[test]
    fn test_update_is_bit_identical_for_self_assignment() {
        let mut flow = seeded_flow();
        flow.buffer_mut("SEISMIC")
            .unwrap()
            .fill_from_f64(&(0..12).map(|i| i as f64 * 0.25).collect::<Vec<_>>())
            .unwrap();
        let before = flow.buffer("SEISMIC").unwrap().clone();

        let cfg = config("update", "SEISMIC", "SEISMIC", "r32");
        AttrcalcStage.init(&mut flow, "calc", &cfg).unwrap();
        AttrcalcStage.process(&mut flow, "calc").unwrap();

        assert_eq!(flow.buffer("SEISMIC").unwrap(), &before);
    }

    #[test]
    fn test_update_missing_attribute_fails() {
        let mut flow = seeded_flow();
        let cfg = config("update", "GHOST", "INLINE", "i32");
        assert!(AttrcalcStage.init(&mut flow, "calc", &cfg).is_err());
    }

    #[test]
    fn test_remove_deletes_attribute_and_process_is_noop() {
        let mut flow = seeded_flow();
        flow.add_attribute("EXTRA", ElementFormat::Int16, 1).unwrap();
        let cfg = config("remove", "EXTRA", "", "i32");
        AttrcalcStage.init(&mut flow, "calc", &cfg).unwrap();
        assert!(!flow.has_attribute("EXTRA"));
        AttrcalcStage.process(&mut flow, "calc").unwrap();
    }

    #[test]
    fn test_invalid_action_fails() {
        let mut flow = seeded_flow();
        let cfg = config("explode", "X", "INLINE", "i32");
        assert!(AttrcalcStage.init(&mut flow, "calc", &cfg).is_err());
    }

    #[test]
    fn test_invalid_create_name_fails() {
        let mut flow = seeded_flow();
        let cfg = config("create", "9LIVES", "INLINE", "i32");
        assert!(AttrcalcStage.init(&mut flow, "calc", &cfg).is_err());
    }
}
