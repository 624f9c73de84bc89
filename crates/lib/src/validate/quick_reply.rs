use serde_json::Value;

use super::action::validate_action;
use super::ValidationError;

/// Validate a quick reply block: a non-empty `items` array where every item
/// has an `action` and, optionally, an HTTPS `imageUrl`.
pub fn validate_quick_reply(quick_reply: &Value) -> Result<(), ValidationError> {
    let obj = quick_reply
        .as_object()
        .ok_or_else(|| ValidationError::new("parameter 'quickReply' must be an object"))?;

    let items = match obj.get("items") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => {
            return Err(ValidationError::new(
                "parameter 'quickReply.items' must be an array with at least one item",
            ))
        }
    };

    for (index, item) in items.iter().enumerate() {
        let number = index + 1;
        let action = match item.get("action") {
            Some(a) if !a.is_null() => a,
            _ => {
                return Err(ValidationError::new(format!(
                    "quick reply item {} requires 'action'",
                    number
                )))
            }
        };

        if let Some(image_url) = item.get("imageUrl").filter(|v| !v.is_null()) {
            let is_https = image_url
                .as_str()
                .map(|s| s.starts_with("https://"))
                .unwrap_or(false);
            if !is_https {
                return Err(ValidationError::new(format!(
                    "quick reply item {} 'imageUrl' must be an HTTPS URL",
                    number
                )));
            }
        }

        validate_action(Some(action), false)
            .map_err(|e| e.context(format!("quick reply item {} has an invalid action", number)))?;
    }
    Ok(())
}
