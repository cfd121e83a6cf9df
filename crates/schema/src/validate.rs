//! Validation and coercion of raw values against a declared schema.

use crate::error::{FieldError, ValidationError};
use crate::schema::{Field, FieldType, Schema};
use serde_json::{Map, Value};

impl Schema {
    /// Validate a structured value against this schema.
    ///
    /// Returns the coerced object on success. All field-level violations are
    /// collected before failing, so one re-prompt can report every problem.
    /// Undeclared fields are dropped from the output rather than rejected.
    pub fn validate(&self, raw: &Value) -> Result<Value, ValidationError> {
        let Some(object) = raw.as_object() else {
            return Err(ValidationError::root(format!(
                "expected a JSON object, got {}",
                type_name(raw)
            )));
        };

        let mut coerced = Map::new();
        let mut errors = Vec::new();
        for field in self.fields() {
            match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        errors.push(FieldError::new(&field.name, "missing required field"));
                    }
                }
                Some(value) => match coerce(field, value) {
                    Ok(value) => {
                        if let Err(err) = check_constraints(field, &value) {
                            errors.push(err);
                        } else {
                            coerced.insert(field.name.clone(), value);
                        }
                    }
                    Err(err) => errors.push(err),
                },
            }
        }

        if errors.is_empty() {
            Ok(Value::Object(coerced))
        } else {
            Err(ValidationError::new(errors))
        }
    }

    /// Extract a JSON object from raw model text, then validate it.
    ///
    /// Models routinely wrap their answer in markdown fences or surrounding
    /// prose despite instructions; both are tolerated here.
    pub fn validate_text(&self, text: &str) -> Result<Value, ValidationError> {
        let Some(candidate) = extract_json(text) else {
            return Err(ValidationError::root("no JSON object found in response"));
        };
        let value: Value = serde_json::from_str(candidate)
            .map_err(|e| ValidationError::root(format!("malformed JSON: {e}")))?;
        self.validate(&value)
    }
}

/// Locate the JSON object inside free-form model text.
fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    // Fenced block first: take the body between the first pair of fences.
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            let fenced = body[..end].trim();
            if !fenced.is_empty() {
                return Some(fenced);
            }
        }
    }

    // Otherwise the widest brace-delimited span.
    let open = trimmed.find('{')?;
    let close = trimmed.rfind('}')?;
    (close > open).then(|| &trimmed[open..=close])
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Coerce a raw value to the field's declared type.
fn coerce(field: &Field, value: &Value) -> Result<Value, FieldError> {
    coerce_type(&field.ty, value, &field.name)
}

fn coerce_type(ty: &FieldType, value: &Value, path: &str) -> Result<Value, FieldError> {
    let mismatch = || {
        FieldError::new(
            path,
            format!("expected {}, got {}", ty.name(), type_name(value)),
        )
    };

    match ty {
        FieldType::String => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(mismatch()),
        },
        FieldType::Integer => match value {
            Value::Number(n) => n
                .as_i64()
                .map(Value::from)
                .ok_or_else(|| FieldError::new(path, "expected integer, got a fraction")),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        FieldType::Number => match value {
            Value::Number(n) => n.as_f64().map(Value::from).ok_or_else(mismatch),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        FieldType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        FieldType::Array(inner) => match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(coerce_type(inner, item, &format!("{path}[{i}]"))?);
                }
                Ok(Value::Array(out))
            }
            _ => Err(mismatch()),
        },
        FieldType::Object => match value {
            Value::Object(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
    }
}

/// Check declared constraints against an already-coerced value.
fn check_constraints(field: &Field, value: &Value) -> Result<(), FieldError> {
    let c = &field.constraints;
    let err = |message: String| FieldError::new(&field.name, message);

    if let Some(n) = value.as_f64() {
        if let Some(min) = c.minimum
            && n < min
        {
            return Err(err(format!("must be at least {min}, got {n}")));
        }
        if let Some(max) = c.maximum
            && n > max
        {
            return Err(err(format!("must be at most {max}, got {n}")));
        }
    }

    let length = match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    };
    if let Some(len) = length {
        if let Some(min) = c.min_length
            && len < min
        {
            return Err(err(format!("length must be at least {min}, got {len}")));
        }
        if let Some(max) = c.max_length
            && len > max
        {
            return Err(err(format!("length must be at most {max}, got {len}")));
        }
    }

    if let Some(pattern) = &c.pattern
        && let Value::String(s) = value
        && !pattern.is_match(s)
    {
        return Err(err(format!("must match /{}/", pattern.as_str())));
    }

    if !c.one_of.is_empty() && !c.one_of.contains(value) {
        let values: Vec<String> = c.one_of.iter().map(Value::to_string).collect();
        return Err(err(format!("must be one of {}", values.join(", "))));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> Schema {
        Schema::new("person")
            .field(Field::new("name", FieldType::String))
            .field(Field::new("age", FieldType::Integer).minimum(0.0))
    }

    #[test]
    fn valid_input_round_trips() {
        let input = json!({"name": "Ann", "age": 5});
        let coerced = person().validate(&input).unwrap();
        assert_eq!(coerced, input);
    }

    #[test]
    fn missing_required_field_is_the_only_error() {
        let err = person().validate(&json!({"age": 3})).unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].field, "name");
        assert_eq!(err.errors[0].message, "missing required field");
    }

    #[test]
    fn all_violations_reported_at_once() {
        let err = person()
            .validate(&json!({"name": 1.5, "age": -2}))
            .unwrap_err();
        // name coerces (number to string), age violates the minimum
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].field, "age");

        let err = person().validate(&json!({"age": "not a number"})).unwrap_err();
        let fields: Vec<&str> = err.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["name", "age"]);
    }

    #[test]
    fn numeric_string_coerces_to_integer() {
        let coerced = person()
            .validate(&json!({"name": "Ann", "age": "41"}))
            .unwrap();
        assert_eq!(coerced["age"], 41);
    }

    #[test]
    fn fractional_value_rejected_for_integer_field() {
        let err = person()
            .validate(&json!({"name": "Ann", "age": 4.5}))
            .unwrap_err();
        assert_eq!(err.errors[0].field, "age");
    }

    #[test]
    fn undeclared_fields_are_dropped() {
        let coerced = person()
            .validate(&json!({"name": "Ann", "age": 5, "note": "extra"}))
            .unwrap();
        assert!(coerced.get("note").is_none());
    }

    #[test]
    fn optional_field_may_be_absent_or_null() {
        let schema = Schema::new("note")
            .field(Field::new("text", FieldType::String))
            .field(Field::new("tag", FieldType::String).optional());
        let coerced = schema.validate(&json!({"text": "hi", "tag": null})).unwrap();
        assert_eq!(coerced, json!({"text": "hi"}));
    }

    #[test]
    fn array_elements_validated_against_inner_type() {
        let schema = Schema::new("tags").field(Field::new(
            "tags",
            FieldType::Array(Box::new(FieldType::String)),
        ));
        let coerced = schema.validate(&json!({"tags": ["a", 2]})).unwrap();
        assert_eq!(coerced["tags"], json!(["a", "2"]));

        let err = schema.validate(&json!({"tags": [true, {}]})).unwrap_err();
        assert_eq!(err.errors[0].field, "tags[1]");
    }

    #[test]
    fn enumeration_constraint_enforced() {
        let schema = Schema::new("unit").field(
            Field::new("scale", FieldType::String).one_of([json!("celsius"), json!("fahrenheit")]),
        );
        assert!(schema.validate(&json!({"scale": "celsius"})).is_ok());
        let err = schema.validate(&json!({"scale": "kelvin"})).unwrap_err();
        assert!(err.errors[0].message.contains("one of"));
    }

    #[test]
    fn pattern_constraint_enforced() {
        let schema = Schema::new("id").field(
            Field::new("code", FieldType::String).matches(regex::Regex::new("^[A-Z]{3}$").unwrap()),
        );
        assert!(schema.validate(&json!({"code": "ABC"})).is_ok());
        assert!(schema.validate(&json!({"code": "abc"})).is_err());
    }

    #[test]
    fn validate_text_accepts_fenced_json() {
        let text = "Here you go:\n```json\n{\"name\": \"Ann\", \"age\": 5}\n```\nAnything else?";
        let coerced = person().validate_text(text).unwrap();
        assert_eq!(coerced, json!({"name": "Ann", "age": 5}));
    }

    #[test]
    fn validate_text_accepts_surrounding_prose() {
        let text = "Sure! {\"name\": \"Ann\", \"age\": 5} as requested.";
        assert!(person().validate_text(text).is_ok());
    }

    #[test]
    fn validate_text_reports_missing_object() {
        let err = person().validate_text("no json here").unwrap_err();
        assert_eq!(err.errors[0].field, "$");
    }

    #[test]
    fn non_object_root_rejected() {
        let err = person().validate(&json!([1, 2])).unwrap_err();
        assert!(err.errors[0].message.contains("expected a JSON object"));
    }
}
