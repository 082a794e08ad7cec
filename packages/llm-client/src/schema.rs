//! JSON schema generation for tool arguments.
//!
//! Uses the `schemars` crate to derive schemas from Rust types so tool
//! definitions never drift from the structs that decode their arguments.

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

/// Types whose JSON schema can be handed to an OpenAI-compatible endpoint.
///
/// Automatically implemented for any `JsonSchema + DeserializeOwned` type.
pub trait ToolSchema: JsonSchema + DeserializeOwned {
    /// Generate the schema, with `additionalProperties: false` enforced on
    /// every object node (required by strict function-calling modes).
    fn tool_schema() -> serde_json::Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();
        ensure_no_additional_properties(&mut value);
        value
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> ToolSchema for T {}

/// Recursively set `additionalProperties: false` on all object schemas.
fn ensure_no_additional_properties(value: &mut serde_json::Value) {
    if let serde_json::Value::Object(map) = value {
        if map.get("type") == Some(&serde_json::Value::String("object".to_string())) {
            map.insert(
                "additionalProperties".to_string(),
                serde_json::Value::Bool(false),
            );
        }
        for (_, v) in map.iter_mut() {
            ensure_no_additional_properties(v);
        }
    } else if let serde_json::Value::Array(arr) = value {
        for item in arr.iter_mut() {
            ensure_no_additional_properties(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct SaveArgs {
        title: String,
        url: String,
        published_date: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    struct BatchArgs {
        items: Vec<SaveArgs>,
    }

    #[test]
    fn test_schema_generation() {
        let schema = BatchArgs::tool_schema();
        assert!(schema.is_object());
    }

    #[test]
    fn test_additional_properties_false() {
        let schema = BatchArgs::tool_schema();
        let schema_str = serde_json::to_string(&schema).unwrap();
        assert!(schema_str.contains("additionalProperties"));
    }
}
