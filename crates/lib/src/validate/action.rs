//! Action objects: buttons attached to templates, carousels and quick replies.

use serde_json::Value;

use super::primitives::{validate_string_param, validate_url};
use super::ValidationError;

/// Validate a single action object. `path` locates the action in error
/// messages. Default actions (tap targets of a whole element) carry no label.
pub fn validate_action_object(
    action: &Value,
    path: &str,
    is_default_action: bool,
) -> Result<(), ValidationError> {
    let obj = action
        .as_object()
        .ok_or_else(|| ValidationError::new(format!("{} must be an object", path)))?;

    let kind = validate_string_param(obj.get("type"), &format!("{}.type", path), None)?;
    if !is_default_action {
        validate_string_param(obj.get("label"), &format!("{}.label", path), None)?;
    }

    match kind {
        "postback" => {
            validate_string_param(obj.get("postback"), &format!("{}.postback", path), None)?;
        }
        "uri" => {
            validate_url(obj.get("uri"), &format!("{}.uri", path), None)?;
        }
        "copy" => {
            validate_string_param(obj.get("copyText"), &format!("{}.copyText", path), None)?;
        }
        "message" | "camera" | "cameraRoll" | "location" => {}
        other => {
            return Err(ValidationError::new(format!(
                "{}.type has unsupported value: {}",
                path, other
            )))
        }
    }
    Ok(())
}

/// Validate an optional action field.
///
/// With `is_nested`, `actions` must be a grid (array of rows, each an array of
/// actions). Otherwise a single action object or a flat array is accepted.
/// Absent or null is always fine.
pub fn validate_action(actions: Option<&Value>, is_nested: bool) -> Result<(), ValidationError> {
    let actions = match actions {
        None | Some(Value::Null) => return Ok(()),
        Some(v) => v,
    };

    if is_nested {
        let rows = actions
            .as_array()
            .ok_or_else(|| ValidationError::new("parameter 'actions' must be an array of rows"))?;
        for (row_index, row) in rows.iter().enumerate() {
            let cells = row.as_array().ok_or_else(|| {
                ValidationError::new(format!("actions[{}] must be an array", row_index))
            })?;
            for (col_index, cell) in cells.iter().enumerate() {
                validate_action_object(cell, &format!("actions[{}][{}]", row_index, col_index), false)?;
            }
        }
        return Ok(());
    }

    match actions {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                validate_action_object(item, &format!("actions[{}]", index), false)?;
            }
            Ok(())
        }
        Value::Object(_) => validate_action_object(actions, "action", false),
        _ => Err(ValidationError::new(
            "action must be an object or an array of objects",
        )),
    }
}
