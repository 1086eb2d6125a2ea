use anyhow::Context;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

use crate::StdResult;

/// Keys of a path item that hold an operation.
pub(crate) const OPERATION_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

const MAX_REFERENCE_DEPTH: usize = 32;

/// [Contract] reference resolution errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// The reference does not point inside the document or its target does not exist.
    #[error("could not resolve reference '{0}'")]
    UnresolvableReference(String),

    /// Following the reference never reaches a concrete object.
    #[error("reference '{0}' is part of a reference cycle")]
    ReferenceCycle(String),
}

/// An OpenAPI description against which exchanges are validated.
///
/// The document is only read: the routing view returned by [Contract::without_servers] is a
/// copy, so a contract can be shared between many validations.
#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    document: Value,
}

impl Contract {
    /// [Contract] factory
    pub fn new(document: Value) -> Self {
        Self { document }
    }

    /// Build a [Contract] from a YAML (or JSON) text.
    pub fn from_yaml_str(yaml: &str) -> StdResult<Self> {
        let document: Value =
            serde_yaml::from_str(yaml).with_context(|| "Could not parse OpenAPI document")?;

        Ok(Self::new(document))
    }

    /// Build a [Contract] from a YAML (or JSON) file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> StdResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read OpenAPI file '{}'", path.display()))?;

        Self::from_yaml_str(&yaml)
            .with_context(|| format!("Invalid OpenAPI file '{}'", path.display()))
    }

    /// The raw OpenAPI document.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Value of the `openapi` field, `3.0.0` if absent.
    pub fn openapi_version(&self) -> &str {
        self.document["openapi"].as_str().unwrap_or("3.0.0")
    }

    /// Short human readable name of the contract, made of its title and version.
    pub fn display_name(&self) -> String {
        let info = &self.document["info"];
        match (info["title"].as_str(), info["version"].as_str()) {
            (Some(title), Some(version)) => format!("{title} {version}"),
            (Some(title), None) => title.to_string(),
            _ => format!("OpenAPI {}", self.openapi_version()),
        }
    }

    /// The `components` object of the document (`null` if absent).
    pub fn components(&self) -> &Value {
        &self.document["components"]
    }

    /// Return a copy of the contract stripped of every `servers` entry (document, path items and
    /// operations), so that declared hosts and base urls can't interfere with route matching.
    pub fn without_servers(&self) -> Contract {
        let mut document = self.document.clone();
        if let Some(root) = document.as_object_mut() {
            root.remove("servers");
        }
        if let Some(paths) = document.get_mut("paths").and_then(Value::as_object_mut) {
            for path_item in paths.values_mut().filter_map(Value::as_object_mut) {
                path_item.remove("servers");
                for method in OPERATION_METHODS {
                    if let Some(operation) =
                        path_item.get_mut(method).and_then(Value::as_object_mut)
                    {
                        operation.remove("servers");
                    }
                }
            }
        }

        Contract::new(document)
    }

    /// Follow the local `$ref` chain of the given value until a concrete object is reached.
    ///
    /// Values without a `$ref` are returned as is.
    pub fn resolve<'a>(&'a self, value: &'a Value) -> Result<&'a Value, ContractError> {
        let mut current = value;
        for _ in 0..MAX_REFERENCE_DEPTH {
            match current.get("$ref").and_then(Value::as_str) {
                Some(reference) => current = self.lookup(reference)?,
                None => return Ok(current),
            }
        }

        Err(ContractError::ReferenceCycle(
            value["$ref"].as_str().unwrap_or_default().to_string(),
        ))
    }

    fn lookup(&self, reference: &str) -> Result<&Value, ContractError> {
        reference
            .strip_prefix('#')
            .and_then(|pointer| self.document.pointer(pointer))
            .ok_or_else(|| ContractError::UnresolvableReference(reference.to_string()))
    }
}
