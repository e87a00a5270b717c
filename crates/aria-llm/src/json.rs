//! JSON extraction from raw model output, schema validation, and example
//! generation for the output-format prompt block.

use serde_json::{Map, Value};

/// Extract a JSON object from raw model output.
///
/// Tries, in order: a fenced ```json``` code block, the first balanced
/// `{…}` span, the entire body. The first successful parse wins.
pub fn extract_json(content: &str) -> Option<Value> {
    if let Some(block) = fenced_block(content) {
        if let Ok(v) = serde_json::from_str(block.trim()) {
            return Some(v);
        }
    }
    if let Some(span) = balanced_span(content) {
        if let Ok(v) = serde_json::from_str(span) {
            return Some(v);
        }
    }
    serde_json::from_str(content.trim()).ok()
}

/// Content of the first fenced code block (with or without a `json` tag).
fn fenced_block(content: &str) -> Option<&str> {
    let open = content.find("```")?;
    let after_fence = &content[open + 3..];
    // Skip a language tag on the opening line.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

/// The first balanced `{…}` span, honoring strings and escapes.
fn balanced_span(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let bytes = content.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Validate `data` against a schema of `{key: {type, required?, properties?}}`
/// entries. Returns human-readable violations (empty = valid).
///
/// Checks: every schema key carrying a `required` marker must be present;
/// type tags (`string`, `boolean`, `integer`, `object`, `["string","null"]`)
/// must match; nested `properties` recurse.
pub fn validate_schema(data: &Value, schema: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(schema_map) = schema.as_object() else {
        return errors;
    };
    let data_map = data.as_object();
    validate_level(data_map, schema_map, "", &mut errors);
    errors
}

fn validate_level(
    data: Option<&Map<String, Value>>,
    schema: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<String>,
) {
    for (key, subschema) in schema {
        let current = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };

        let value = data.and_then(|m| m.get(key));
        let Some(value) = value else {
            if is_required(subschema) {
                errors.push(format!("'{current}' is a required field"));
            }
            continue;
        };

        if let Some(type_tag) = subschema.get("type") {
            if !type_matches(value, type_tag) {
                errors.push(format!(
                    "'{current}' must be of type {type_tag}, got {}",
                    type_name(value)
                ));
            }
        }

        if let Some(props) = subschema.get("properties").and_then(|p| p.as_object()) {
            let required: Vec<&str> = subschema
                .get("required")
                .and_then(|r| r.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
                .unwrap_or_default();
            let nested = value.as_object();
            for (prop_key, prop_schema) in props {
                let prop_path = format!("{current}.{prop_key}");
                let prop_value = nested.and_then(|m| m.get(prop_key));
                let Some(prop_value) = prop_value else {
                    if required.contains(&prop_key.as_str()) || is_required(prop_schema) {
                        errors.push(format!("'{prop_path}' is a required field"));
                    }
                    continue;
                };
                if let Some(type_tag) = prop_schema.get("type") {
                    if !type_matches(prop_value, type_tag) {
                        errors.push(format!(
                            "'{prop_path}' must be of type {type_tag}, got {}",
                            type_name(prop_value)
                        ));
                    }
                }
            }
        }
    }
}

fn is_required(subschema: &Value) -> bool {
    match subschema.get("required") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Array(a)) => !a.is_empty(),
        _ => false,
    }
}

fn type_matches(value: &Value, type_tag: &Value) -> bool {
    match type_tag {
        Value::String(t) => match t.as_str() {
            "object" => value.is_object(),
            "string" => value.is_string(),
            "boolean" => value.is_boolean(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "array" => value.is_array(),
            "null" => value.is_null(),
            _ => true,
        },
        // Union tags like ["string", "null"].
        Value::Array(tags) => tags.iter().any(|t| type_matches(value, t)),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render a skeleton example object from a schema, using each property's
/// description as the placeholder value. Shown to the model inside the
/// output-format prompt block.
pub fn generate_example(schema: &Value) -> Value {
    let Some(schema_map) = schema.as_object() else {
        return Value::Null;
    };
    let mut example = Map::new();
    for (key, subschema) in schema_map {
        example.insert(key.clone(), example_value(key, subschema));
    }
    Value::Object(example)
}

fn example_value(key: &str, subschema: &Value) -> Value {
    match subschema.get("type") {
        Some(Value::String(t)) if t == "object" => {
            let mut nested = Map::new();
            if let Some(props) = subschema.get("properties").and_then(|p| p.as_object()) {
                for (prop_key, prop_schema) in props {
                    nested.insert(prop_key.clone(), example_value(prop_key, prop_schema));
                }
            }
            Value::Object(nested)
        }
        Some(Value::String(t)) if t == "string" => Value::String(
            subschema
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or(key)
                .to_string(),
        ),
        Some(Value::String(t)) if t == "boolean" => Value::Bool(false),
        Some(Value::String(t)) if t == "integer" => Value::Number(
            subschema
                .get("default")
                .and_then(|d| d.as_i64())
                .unwrap_or(60)
                .into(),
        ),
        Some(Value::Array(_)) => Value::Null,
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_fenced_json_first() {
        let content = "Here you go:\n```json\n{\"a\": 1}\n```\nignored {\"b\": 2}";
        assert_eq!(extract_json(content), Some(json!({"a": 1})));
    }

    #[test]
    fn extracts_untagged_fence() {
        let content = "```\n{\"a\": true}\n```";
        assert_eq!(extract_json(content), Some(json!({"a": true})));
    }

    #[test]
    fn falls_back_to_balanced_span() {
        let content = "preamble {\"nested\": {\"x\": \"y\"}} trailing";
        assert_eq!(extract_json(content), Some(json!({"nested": {"x": "y"}})));
    }

    #[test]
    fn balanced_span_ignores_braces_inside_strings() {
        let content = "x {\"text\": \"curly } brace\"} y";
        assert_eq!(
            extract_json(content),
            Some(json!({"text": "curly } brace"}))
        );
    }

    #[test]
    fn parses_whole_body_last() {
        assert_eq!(extract_json("  [1, 2, 3] "), Some(json!([1, 2, 3])));
    }

    #[test]
    fn plain_text_yields_none() {
        assert_eq!(extract_json("hello!"), None);
    }

    fn schema() -> Value {
        json!({
            "planning": {
                "type": "object",
                "properties": {
                    "requires_tool": {"type": "boolean"},
                    "tool_name": {"type": ["string", "null"]},
                    "reasoning": {"type": "string"}
                },
                "required": ["requires_tool", "reasoning"]
            },
            "response": {"type": "string", "required": true},
            "inactivity_timeout": {"type": "integer", "default": 60}
        })
    }

    #[test]
    fn valid_payload_passes() {
        let data = json!({
            "planning": {"requires_tool": false, "tool_name": null, "reasoning": "chat"},
            "response": "hi!",
            "inactivity_timeout": 60
        });
        assert!(validate_schema(&data, &schema()).is_empty());
    }

    #[test]
    fn missing_required_nested_field_fails() {
        let data = json!({
            "planning": {"requires_tool": false},
            "response": "hi!",
            "inactivity_timeout": 60
        });
        let errors = validate_schema(&data, &schema());
        assert!(errors.iter().any(|e| e.contains("planning.reasoning")));
    }

    #[test]
    fn wrong_type_fails() {
        let data = json!({
            "planning": {"requires_tool": "yes", "reasoning": "r"},
            "response": "hi!",
            "inactivity_timeout": "soon"
        });
        let errors = validate_schema(&data, &schema());
        assert!(errors.iter().any(|e| e.contains("planning.requires_tool")));
        assert!(errors.iter().any(|e| e.contains("inactivity_timeout")));
    }

    #[test]
    fn union_type_accepts_null() {
        let data = json!({
            "planning": {"requires_tool": false, "tool_name": null, "reasoning": "r"},
            "response": "x",
            "inactivity_timeout": -1
        });
        assert!(validate_schema(&data, &schema()).is_empty());
    }

    #[test]
    fn example_mirrors_schema_shape() {
        let example = generate_example(&schema());
        assert!(example["planning"]["requires_tool"].is_boolean());
        assert!(example["response"].is_string());
        assert_eq!(example["inactivity_timeout"], json!(60));
    }
}
