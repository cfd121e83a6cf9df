//! Schema declaration and rendering.

use regex::Regex;
use serde_json::{Map, Value, json};
use std::fmt::Write as _;

/// The type a field's value must conform to.
#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// Homogeneous array with a declared element type.
    Array(Box<FieldType>),
    /// Opaque JSON object, passed through unvalidated.
    Object,
}

impl FieldType {
    /// Stable lowercase name used in prompts and error messages.
    pub fn name(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::Integer => "integer".to_string(),
            Self::Number => "number".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Array(inner) => format!("array of {}", inner.name()),
            Self::Object => "object".to_string(),
        }
    }

    fn json_schema(&self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::Integer => json!({"type": "integer"}),
            Self::Number => json!({"type": "number"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::Array(inner) => json!({"type": "array", "items": inner.json_schema()}),
            Self::Object => json!({"type": "object"}),
        }
    }
}

/// Value constraints checked after type coercion.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    /// Inclusive lower bound for numeric fields.
    pub minimum: Option<f64>,
    /// Inclusive upper bound for numeric fields.
    pub maximum: Option<f64>,
    /// Minimum length for strings (characters) and arrays (elements).
    pub min_length: Option<usize>,
    /// Maximum length for strings (characters) and arrays (elements).
    pub max_length: Option<usize>,
    /// Regex the full string value must match.
    pub pattern: Option<Regex>,
    /// Closed set of admissible values.
    pub one_of: Vec<Value>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self.minimum.is_none()
            && self.maximum.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.pattern.is_none()
            && self.one_of.is_empty()
    }
}

/// One declared field of a [`Schema`].
///
/// Fields are required by default; use [`Field::optional`] to relax that.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
    pub description: Option<String>,
    pub constraints: Constraints,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            description: None,
            constraints: Constraints::default(),
        }
    }

    /// Mark this field as optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Attach a description shown in prompts.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn minimum(mut self, minimum: f64) -> Self {
        self.constraints.minimum = Some(minimum);
        self
    }

    pub fn maximum(mut self, maximum: f64) -> Self {
        self.constraints.maximum = Some(maximum);
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        self.constraints.min_length = Some(len);
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.constraints.max_length = Some(len);
        self
    }

    /// Require string values to match `pattern` in full.
    pub fn matches(mut self, pattern: Regex) -> Self {
        self.constraints.pattern = Some(pattern);
        self
    }

    /// Restrict values to a closed set.
    pub fn one_of(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.constraints.one_of = values.into_iter().collect();
        self
    }

    /// Render the parenthesized qualifier list for prompts, e.g.
    /// `(integer, optional, minimum 0)`.
    fn qualifiers(&self) -> String {
        let mut parts = vec![
            self.ty.name(),
            if self.required { "required" } else { "optional" }.to_string(),
        ];
        let c = &self.constraints;
        if let Some(min) = c.minimum {
            parts.push(format!("minimum {min}"));
        }
        if let Some(max) = c.maximum {
            parts.push(format!("maximum {max}"));
        }
        if let Some(len) = c.min_length {
            parts.push(format!("min length {len}"));
        }
        if let Some(len) = c.max_length {
            parts.push(format!("max length {len}"));
        }
        if let Some(pattern) = &c.pattern {
            parts.push(format!("matching /{}/", pattern.as_str()));
        }
        if !c.one_of.is_empty() {
            let values: Vec<String> = c.one_of.iter().map(Value::to_string).collect();
            parts.push(format!("one of {}", values.join(", ")));
        }
        parts.join(", ")
    }
}

/// A named, ordered set of declared fields.
///
/// Created once per call site and read-only afterwards. The field order given
/// at construction is the order used everywhere: prompt rendering, JSON
/// Schema properties, and the coerced output map.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field declaration.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Deterministic natural-language rendering used inside prompts.
    ///
    /// Two calls on the same schema produce identical text, so assembled
    /// prompts stay reproducible and cacheable.
    pub fn describe(&self) -> String {
        let mut out = format!(
            "Respond with a single JSON object matching \"{}\". \
             Do not wrap it in prose or code fences.\nFields:",
            self.name
        );
        for field in &self.fields {
            let _ = write!(out, "\n- \"{}\" ({})", field.name, field.qualifiers());
            if let Some(desc) = &field.description {
                let _ = write!(out, ": {desc}");
            }
        }
        out
    }

    /// JSON Schema rendering for providers with native structured-output or
    /// tool declarations.
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            let mut prop = field.ty.json_schema();
            let c = &field.constraints;
            if let Some(min) = c.minimum {
                prop["minimum"] = json!(min);
            }
            if let Some(max) = c.maximum {
                prop["maximum"] = json!(max);
            }
            if let Some(len) = c.min_length {
                prop["minLength"] = json!(len);
            }
            if let Some(len) = c.max_length {
                prop["maxLength"] = json!(len);
            }
            if let Some(pattern) = &c.pattern {
                prop["pattern"] = json!(pattern.as_str());
            }
            if !c.one_of.is_empty() {
                prop["enum"] = Value::Array(c.one_of.clone());
            }
            if let Some(desc) = &field.description {
                prop["description"] = json!(desc);
            }
            properties.insert(field.name.clone(), prop);
            if field.required {
                required.push(Value::String(field.name.clone()));
            }
        }
        json!({
            "type": "object",
            "title": self.name,
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}
