use serde_json::Value;

/// Id used when the server cannot tell us which model it serves.
pub const FALLBACK_MODEL_ID: &str = "local-model";

pub(crate) const MODELS_PATH: &str = "v1/models";

/// First usable model id in a `/v1/models` body.
///
/// Looks at `data[]` entries (`id`, then `name`, then `model`) and then at
/// `models[]`, where bare strings are accepted too.
pub fn pick_model_id(payload: &Value) -> Option<String> {
    fn entry_id(item: &Value) -> Option<&str> {
        ["id", "name", "model"]
            .iter()
            .filter_map(|key| item.get(*key))
            .find(|v| !is_falsy(v))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    let from_data = payload
        .get("data")
        .and_then(Value::as_array)
        .and_then(|items| items.iter().filter(|item| item.is_object()).find_map(entry_id));

    let from_models = || {
        payload
            .get("models")
            .and_then(Value::as_array)
            .and_then(|items| {
                items.iter().find_map(|item| match item {
                    Value::Object(_) => entry_id(item),
                    Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()),
                    _ => None,
                })
            })
    };

    from_data.or_else(from_models).map(str::to_string)
}

/// Empty strings, `null`, `false`, zero and empty containers do not count as an id.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}
