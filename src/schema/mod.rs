use jsonschema::{JSONSchema, ValidationError};
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde_json::{Map, Value};

/// Shape of the JSON a model call must return, derived from the Rust type
/// the response is deserialized into.
///
/// Held as a draft-07 JSON Schema with every subschema inlined. The same
/// value is rendered into the OpenAPI subset Gemini accepts for
/// `responseSchema` and used to check parsed responses locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    json: Value,
}

impl Schema {
    pub fn of<T: JsonSchema + ?Sized>() -> Self {
        let root = SchemaSettings::draft07()
            .with(|s| s.inline_subschemas = true)
            .into_generator()
            .into_root_schema_for::<T>();
        // `false` rejects every response.
        let json = serde_json::to_value(root).unwrap_or(Value::Bool(false));
        Self { json }
    }

    /// Gemini `responseSchema`: uppercase type names, and only the keywords
    /// the endpoint understands.
    pub fn to_gemini(&self) -> Value {
        gemini_node(&self.json)
    }

    /// Returns the location and reason of the first violation.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        let compiled = JSONSchema::compile(&self.json).map_err(|e| format!("invalid schema: {e}"))?;
        let first = match compiled.validate(value) {
            Ok(()) => return Ok(()),
            Err(mut errors) => errors.next().map(|e| describe(&e)),
        };
        Err(first.unwrap_or_else(|| "response does not match schema".into()))
    }
}

fn describe(e: &ValidationError<'_>) -> String {
    let path = e.instance_path.to_string();
    let path = if path.is_empty() { "/".to_string() } else { path };
    format!("{path}: {e}")
}

fn gemini_node(node: &Value) -> Value {
    let Value::Object(map) = node else {
        return node.clone();
    };
    let mut out = Map::new();

    match map.get("type") {
        Some(Value::String(ty)) => {
            out.insert("type".into(), Value::String(ty.to_uppercase()));
        }
        Some(Value::Array(types)) => {
            if let Some(ty) = types.iter().filter_map(Value::as_str).find(|t| *t != "null") {
                out.insert("type".into(), Value::String(ty.to_uppercase()));
            }
            if types.iter().any(|t| t == "null") {
                out.insert("nullable".into(), Value::Bool(true));
            }
        }
        _ => {}
    }
    if let Some(Value::Object(props)) = map.get("properties") {
        let props = props.iter().map(|(k, v)| (k.clone(), gemini_node(v))).collect();
        out.insert("properties".into(), Value::Object(props));
    }
    if let Some(items) = map.get("items") {
        out.insert("items".into(), gemini_node(items));
    }
    for key in ["required", "enum"] {
        if let Some(v) = map.get(key) {
            out.insert(key.into(), v.clone());
        }
    }
    Value::Object(out)
}
