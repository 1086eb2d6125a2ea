use jsonschema::Draft;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::Contract;
use crate::parameter_style::RawParameter;

/// Failure of a value conformity check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The value does not conform to the schema, with the reasons given by the schema validator.
    #[error("{}", .0.join(", "))]
    Violation(Vec<String>),

    /// The schema itself could not be compiled.
    #[error("schema could not be compiled: {0}")]
    Compilation(String),
}

/// Check values against the schemas of a [Contract].
///
/// The `components` of the contract are injected next to each checked schema so that
/// `#/components/...` references resolve, OpenAPI 3.0 `nullable` flags are rewritten as
/// `null` type unions, and the JSON Schema draft follows the contract OpenAPI version.
pub struct SchemaChecker<'a> {
    contract: &'a Contract,
    components: Value,
    draft: Draft,
    rewrite_nullable: bool,
}

impl<'a> SchemaChecker<'a> {
    /// [SchemaChecker] factory
    pub fn new(contract: &'a Contract) -> Self {
        let mut components = contract.components().clone();
        let rewrite_nullable = contract.openapi_version().starts_with("3.0");
        let draft = if rewrite_nullable {
            normalize_nullable_schemas(&mut components);
            Draft::Draft4
        } else {
            Draft::Draft202012
        };

        Self {
            contract,
            components,
            draft,
            rewrite_nullable,
        }
    }

    /// Validates conformity of a value against a schema
    pub fn check(&self, value: &Value, schema: &Value) -> Result<(), SchemaError> {
        let schema = match schema {
            Value::Bool(true) | Value::Null => return Ok(()),
            Value::Bool(false) => {
                return Err(SchemaError::Violation(vec![format!(
                    "{value} is not allowed by a false schema"
                )]));
            }
            Value::Object(schema) => schema,
            other => return Err(SchemaError::Compilation(format!("{other} is not a schema"))),
        };

        let mut schema = Value::Object(schema.clone());
        if self.rewrite_nullable {
            normalize_nullable_schemas(&mut schema);
        }
        if let Some(schema) = schema.as_object_mut() {
            schema.insert("components".to_string(), self.components.clone());
        }

        let validator = jsonschema::options()
            .with_draft(self.draft)
            .build(&schema)
            .map_err(|e| SchemaError::Compilation(e.to_string()))?;

        let violations: Vec<String> = validator
            .iter_errors(value)
            .map(|error| {
                let location = error.instance_path.to_string();
                if location.is_empty() {
                    error.to_string()
                } else {
                    format!("{error} at '{location}'")
                }
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Violation(violations))
        }
    }

    /// Convert a raw textual value (from a path, a query, a header or a form field) to the JSON
    /// type declared by its schema.
    ///
    /// Values that can't be converted are kept as strings, so the following [check][Self::check]
    /// reports the type mismatch.
    pub fn coerce(&self, raw: &str, schema: &Value) -> Value {
        match self.declared_type(schema).as_deref() {
            Some("integer") => raw
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(raw.to_string())),
            Some("number") => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(raw.to_string())),
            Some("boolean") => match raw {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(raw.to_string()),
            },
            Some("array") => self.coerce_items(raw.split(',').map(str::trim), schema),
            Some("object") => serde_json::from_str::<Value>(raw)
                .ok()
                .filter(Value::is_object)
                .unwrap_or_else(|| Value::String(raw.to_string())),
            _ => Value::String(raw.to_string()),
        }
    }

    /// Convert several raw values to the items of an array schema.
    pub fn coerce_items<'r, I>(&self, raw_items: I, schema: &Value) -> Value
    where
        I: IntoIterator<Item = &'r str>,
    {
        let items_schema = self.items_schema(schema);

        Value::Array(
            raw_items
                .into_iter()
                .map(|raw| self.coerce(raw, &items_schema))
                .collect(),
        )
    }

    /// Convert the fields of a decoded form to the types of the object schema properties.
    pub fn coerce_fields(&self, fields: &[(String, String)], schema: &Value) -> Value {
        let properties = self
            .contract
            .resolve(schema)
            .map(|s| s["properties"].clone())
            .unwrap_or(Value::Null);

        let mut object = Map::new();
        for (name, raw) in fields {
            let property = &properties[name.as_str()];
            let value = match self.declared_type(property).as_deref() {
                Some("array") => {
                    let mut items = match object.remove(name) {
                        Some(Value::Array(items)) => items,
                        _ => vec![],
                    };
                    items.push(self.coerce(raw, &self.items_schema(property)));
                    Value::Array(items)
                }
                _ => self.coerce(raw, property),
            };
            object.insert(name.clone(), value);
        }

        Value::Object(object)
    }

    /// Convert a parameter split according to its style to the types of its schema.
    pub(crate) fn coerce_parameter(&self, raw: RawParameter, schema: &Value) -> Value {
        match raw {
            RawParameter::Single(raw) => self.coerce(&raw, schema),
            RawParameter::Items(items) => {
                self.coerce_items(items.iter().map(String::as_str), schema)
            }
            RawParameter::Fields(fields) => self.coerce_fields(&fields, schema),
        }
    }

    /// Names of the properties declared by an object schema, following references.
    pub(crate) fn property_names(&self, schema: &Value) -> Vec<String> {
        self.contract
            .resolve(schema)
            .ok()
            .and_then(|schema| schema["properties"].as_object())
            .map(|properties| properties.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// The first non `null` type declared by a schema, following references.
    pub fn declared_type(&self, schema: &Value) -> Option<String> {
        let schema = self.contract.resolve(schema).ok()?;
        match &schema["type"] {
            Value::String(kind) => Some(kind.clone()),
            Value::Array(kinds) => kinds
                .iter()
                .filter_map(Value::as_str)
                .find(|kind| *kind != "null")
                .map(str::to_string),
            _ => None,
        }
    }

    fn items_schema(&self, schema: &Value) -> Value {
        self.contract
            .resolve(schema)
            .map(|s| s["items"].clone())
            .unwrap_or(Value::Null)
    }
}

/// Rewrite the OpenAPI 3.0 `nullable: true` flag into a JSON Schema `null` union.
fn normalize_nullable_schemas(value: &mut Value) {
    if let Value::Object(map) = value {
        if map.get("nullable") == Some(&Value::Bool(true)) {
            map.remove("nullable");
            match map.get("type").cloned() {
                Some(Value::String(kind)) => {
                    map.insert("type".to_string(), json!([kind, "null"]));
                    if let Some(Value::Array(variants)) = map.get_mut("enum") {
                        if !variants.contains(&Value::Null) {
                            variants.push(Value::Null);
                        }
                    }
                }
                _ => {
                    let inner = Value::Object(std::mem::take(map));
                    *value = json!({ "anyOf": [inner, { "type": "null" }] });
                }
            }
        }
    }

    match value {
        Value::Object(map) => map.values_mut().for_each(normalize_nullable_schemas),
        Value::Array(items) => items.iter_mut().for_each(normalize_nullable_schemas),
        _ => {}
    }
}
