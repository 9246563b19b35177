//! Layer merging for verifier configuration.
//!
//! Tables merge key by key, everything else (arrays included) is replaced
//! by the later layer. A `disabled_algorithms` list in a config file
//! therefore replaces the builtin list rather than extending it.

use serde_json::{Map, Value};

/// Overlay `layer` onto `target` in place.
pub fn merge_into(target: &mut Value, layer: Value) {
    match (target, layer) {
        (Value::Object(target_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (slot, layer) => *slot = layer,
    }
}

/// Fold layers in precedence order, lowest first.
pub fn merge_layers<I>(layers: I) -> Value
where
    I: IntoIterator<Item = Value>,
{
    let mut merged = Value::Object(Map::new());
    for layer in layers {
        merge_into(&mut merged, layer);
    }
    merged
}

/// Convert a parsed TOML document into the JSON value model.
pub fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}
