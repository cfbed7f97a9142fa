//! Parameter schema language for tools.
//!
//! Each tool declares a `ParamSchema`: typed fields with per-field
//! descriptions (the LM reads them as documentation), ranges, enums,
//! confirm literals and cross-field refinements. The registry validates
//! raw arguments against the schema before a tool's `execute` is ever
//! entered; the same schema renders to a JSON-Schema object for LM
//! advertising.

use serde_json::{json, Map, Value};

type RefineFn = Box<dyn Fn(&Map<String, Value>) -> Result<(), String> + Send + Sync>;

/// Field type with its constraints.
pub enum FieldKind {
    String {
        min_len: Option<usize>,
        max_len: Option<usize>,
    },
    Integer {
        min: Option<i64>,
        max: Option<i64>,
    },
    Number,
    Boolean,
    /// Exact-value string; the confirm-literal gate.
    Literal(&'static str),
    Enum(&'static [&'static str]),
    StringArray,
}

/// One declared parameter.
pub struct Field {
    name: &'static str,
    description: String,
    kind: FieldKind,
    required: bool,
}

impl Field {
    pub fn string(name: &'static str, description: impl Into<String>) -> Self {
        Self {
            name,
            description: description.into(),
            kind: FieldKind::String {
                min_len: None,
                max_len: None,
            },
            required: true,
        }
    }

    pub fn integer(name: &'static str, description: impl Into<String>) -> Self {
        Self {
            name,
            description: description.into(),
            kind: FieldKind::Integer {
                min: None,
                max: None,
            },
            required: true,
        }
    }

    /// Integer constrained to `min..=max`. Numeric fields interpolated into
    /// commands must come through here so the range check runs pre-dispatch.
    pub fn integer_range(
        name: &'static str,
        description: impl Into<String>,
        min: i64,
        max: i64,
    ) -> Self {
        Self {
            name,
            description: description.into(),
            kind: FieldKind::Integer {
                min: Some(min),
                max: Some(max),
            },
            required: true,
        }
    }

    pub fn number(name: &'static str, description: impl Into<String>) -> Self {
        Self {
            name,
            description: description.into(),
            kind: FieldKind::Number,
            required: true,
        }
    }

    pub fn boolean(name: &'static str, description: impl Into<String>) -> Self {
        Self {
            name,
            description: description.into(),
            kind: FieldKind::Boolean,
            required: true,
        }
    }

    /// Confirm literal: the argument must equal `value` exactly. The system
    /// never fills these on the LM's behalf.
    pub fn literal(name: &'static str, value: &'static str, description: impl Into<String>) -> Self {
        Self {
            name,
            description: description.into(),
            kind: FieldKind::Literal(value),
            required: true,
        }
    }

    pub fn enumeration(
        name: &'static str,
        values: &'static [&'static str],
        description: impl Into<String>,
    ) -> Self {
        Self {
            name,
            description: description.into(),
            kind: FieldKind::Enum(values),
            required: true,
        }
    }

    pub fn string_array(name: &'static str, description: impl Into<String>) -> Self {
        Self {
            name,
            description: description.into(),
            kind: FieldKind::StringArray,
            required: true,
        }
    }

    /// Mark the field optional; `null` and absent are both accepted.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn json_schema(&self) -> Value {
        let mut spec = match &self.kind {
            FieldKind::String { min_len, max_len } => {
                let mut s = json!({"type": "string"});
                if let Some(min) = min_len {
                    s["minLength"] = json!(min);
                }
                if let Some(max) = max_len {
                    s["maxLength"] = json!(max);
                }
                s
            }
            FieldKind::Integer { min, max } => {
                let mut s = json!({"type": "integer"});
                if let Some(min) = min {
                    s["minimum"] = json!(min);
                }
                if let Some(max) = max {
                    s["maximum"] = json!(max);
                }
                s
            }
            FieldKind::Number => json!({"type": "number"}),
            FieldKind::Boolean => json!({"type": "boolean"}),
            FieldKind::Literal(value) => json!({"type": "string", "const": value}),
            FieldKind::Enum(values) => json!({"type": "string", "enum": values}),
            FieldKind::StringArray => json!({"type": "array", "items": {"type": "string"}}),
        };
        spec["description"] = json!(self.description);
        spec
    }

    fn validate(&self, value: &Value, errors: &mut Vec<String>) -> Option<Value> {
        match &self.kind {
            FieldKind::String { min_len, max_len } => match value.as_str() {
                Some(s) => {
                    if let Some(min) = min_len {
                        if s.len() < *min {
                            errors.push(format!("{}: must be at least {} characters", self.name, min));
                            return None;
                        }
                    }
                    if let Some(max) = max_len {
                        if s.len() > *max {
                            errors.push(format!("{}: must be at most {} characters", self.name, max));
                            return None;
                        }
                    }
                    Some(value.clone())
                }
                None => {
                    errors.push(format!("{}: must be a string", self.name));
                    None
                }
            },
            FieldKind::Integer { min, max } => match value.as_i64() {
                Some(n) => {
                    if let Some(lo) = min {
                        if n < *lo {
                            errors.push(format!("{}: must be at least {}", self.name, lo));
                            return None;
                        }
                    }
                    if let Some(hi) = max {
                        if n > *hi {
                            errors.push(format!("{}: must be at most {}", self.name, hi));
                            return None;
                        }
                    }
                    Some(json!(n))
                }
                None => {
                    errors.push(format!("{}: must be an integer", self.name));
                    None
                }
            },
            FieldKind::Number => match value.as_f64() {
                Some(n) => Some(json!(n)),
                None => {
                    errors.push(format!("{}: must be a number", self.name));
                    None
                }
            },
            FieldKind::Boolean => match value.as_bool() {
                Some(b) => Some(json!(b)),
                None => {
                    errors.push(format!("{}: must be a boolean", self.name));
                    None
                }
            },
            FieldKind::Literal(expected) => match value.as_str() {
                Some(s) if s == *expected => Some(value.clone()),
                _ => {
                    errors.push(format!("{}: must be exactly \"{}\"", self.name, expected));
                    None
                }
            },
            FieldKind::Enum(values) => match value.as_str() {
                Some(s) if values.contains(&s) => Some(value.clone()),
                _ => {
                    errors.push(format!(
                        "{}: must be one of [{}]",
                        self.name,
                        values.join(", ")
                    ));
                    None
                }
            },
            FieldKind::StringArray => match value.as_array() {
                Some(items) if items.iter().all(|i| i.is_string()) => Some(value.clone()),
                _ => {
                    errors.push(format!("{}: must be an array of strings", self.name));
                    None
                }
            },
        }
    }
}

/// Schema for one tool's parameter object.
pub struct ParamSchema {
    fields: Vec<Field>,
    refinements: Vec<(String, RefineFn)>,
}

impl Default for ParamSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamSchema {
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            refinements: Vec::new(),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Cross-field predicate run after per-field validation. `label` names
    /// the check in the JSON-Schema description.
    pub fn refine<F>(mut self, label: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.refinements.push((label.into(), Box::new(check)));
        self
    }

    /// Require at least one of `names` to be present.
    pub fn at_least_one_of(self, names: &'static [&'static str]) -> Self {
        let message = format!("at least one of [{}] must be provided", names.join(", "));
        self.refine(message.clone(), move |params| {
            if names.iter().any(|n| params.contains_key(*n)) {
                Ok(())
            } else {
                Err(message.clone())
            }
        })
    }

    /// Validate raw arguments.
    ///
    /// Unknown fields are dropped (legacy callers may still send
    /// `organization_id`; the authorized context is authoritative). On
    /// failure all field messages are aggregated into one error string.
    pub fn validate(&self, raw: &Value) -> Result<Value, String> {
        let empty = Map::new();
        let input = match raw {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err("parameters must be a JSON object".to_string()),
        };

        let mut errors: Vec<String> = Vec::new();
        let mut validated = Map::new();

        for field in &self.fields {
            match input.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        errors.push(format!("{}: is required", field.name));
                    }
                }
                Some(value) => {
                    if let Some(v) = field.validate(value, &mut errors) {
                        validated.insert(field.name.to_string(), v);
                    }
                }
            }
        }

        if errors.is_empty() {
            for (_, check) in &self.refinements {
                if let Err(message) = check(&validated) {
                    errors.push(message);
                }
            }
        }

        if errors.is_empty() {
            Ok(Value::Object(validated))
        } else {
            Err(errors.join("; "))
        }
    }

    /// Render as a JSON-Schema object for the LM tool catalog.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required: Vec<&str> = Vec::new();

        for field in &self.fields {
            properties.insert(field.name.to_string(), field.json_schema());
            if field.required {
                required.push(field.name);
            }
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
            "additionalProperties": false,
        });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        if !self.refinements.is_empty() {
            let notes: Vec<&str> = self.refinements.iter().map(|(l, _)| l.as_str()).collect();
            schema["description"] = json!(notes.join("; "));
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ParamSchema {
        ParamSchema::new()
            .field(Field::string("name", "Resource name"))
            .field(Field::integer_range("port", "Published port", 1, 65535).optional())
            .field(Field::enumeration("protocol", &["tcp", "udp"], "Protocol").optional())
            .field(Field::literal("confirm", "CONFIRM_CHANGE", "Type CONFIRM_CHANGE"))
    }

    #[test]
    fn accepts_valid_params() {
        let out = sample()
            .validate(&json!({
                "name": "web",
                "port": 8080,
                "confirm": "CONFIRM_CHANGE"
            }))
            .unwrap();
        assert_eq!(out["name"], "web");
        assert_eq!(out["port"], 8080);
    }

    #[test]
    fn aggregates_all_field_errors() {
        let err = sample()
            .validate(&json!({"port": 700000, "protocol": "icmp"}))
            .unwrap_err();
        assert!(err.contains("name: is required"));
        assert!(err.contains("port: must be at most 65535"));
        assert!(err.contains("protocol: must be one of"));
        assert!(err.contains("confirm"));
    }

    #[test]
    fn literal_mismatch_is_rejected() {
        let err = sample()
            .validate(&json!({"name": "web", "confirm": "yes"}))
            .unwrap_err();
        assert!(err.contains("must be exactly \"CONFIRM_CHANGE\""));
    }

    #[test]
    fn unknown_fields_are_dropped() {
        let out = sample()
            .validate(&json!({
                "name": "web",
                "confirm": "CONFIRM_CHANGE",
                "organization_id": "org-hijack"
            }))
            .unwrap();
        assert!(out.get("organization_id").is_none());
    }

    #[test]
    fn null_optional_is_skipped() {
        let out = sample()
            .validate(&json!({"name": "web", "port": null, "confirm": "CONFIRM_CHANGE"}))
            .unwrap();
        assert!(out.get("port").is_none());
    }

    #[test]
    fn refinement_requires_updatable_field() {
        let schema = ParamSchema::new()
            .field(Field::string("id", "Target id"))
            .field(Field::string("name", "New name").optional())
            .field(Field::string("description", "New description").optional())
            .at_least_one_of(&["name", "description"]);

        let err = schema.validate(&json!({"id": "p-1"})).unwrap_err();
        assert!(err.contains("at least one of"));

        assert!(schema.validate(&json!({"id": "p-1", "name": "x"})).is_ok());
    }

    #[test]
    fn json_schema_carries_descriptions_and_const() {
        let schema = sample().to_json_schema();
        assert_eq!(schema["properties"]["confirm"]["const"], "CONFIRM_CHANGE");
        assert_eq!(schema["properties"]["name"]["description"], "Resource name");
        assert_eq!(schema["properties"]["port"]["maximum"], 65535);
        assert_eq!(schema["required"], json!(["name", "confirm"]));
    }
}
