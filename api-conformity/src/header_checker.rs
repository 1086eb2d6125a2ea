use serde_json::Value;
use slog::{Logger, debug};
use thiserror::Error;
use warp::http::HeaderMap;
use warp::http::header::CONTENT_TYPE;

use crate::request_validator::parameter_schema;
use crate::{Contract, ContractError, ResponseDefinition, SchemaChecker, SchemaError};

/// Response header failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// A header declared as required is absent or empty.
    #[error("response missing required response header, {0}")]
    MissingRequired(String),

    /// A present header does not conform to its schema.
    #[error("response header '{name}' is invalid: {source}")]
    SchemaViolation {
        /// Header name, as declared
        name: String,

        /// Schema violation
        source: SchemaError,
    },

    /// The contract holds a broken reference.
    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// Check the headers of a response against the ones declared by its [ResponseDefinition].
///
/// Schema validators only check the values they are given: the presence of required headers
/// is enforced here, along with the schema of every declared header present in the response.
pub struct HeaderCompletenessChecker<'a> {
    contract: &'a Contract,
    schema_checker: &'a SchemaChecker<'a>,
    logger: Logger,
}

impl<'a> HeaderCompletenessChecker<'a> {
    /// [HeaderCompletenessChecker] factory
    pub fn new(
        contract: &'a Contract,
        schema_checker: &'a SchemaChecker<'a>,
        logger: Logger,
    ) -> Self {
        Self {
            contract,
            schema_checker,
            logger,
        }
    }

    /// Check the declared headers in declaration order, failing on the first violation.
    pub fn check(
        &self,
        definition: &ResponseDefinition,
        headers: &HeaderMap,
    ) -> Result<(), HeaderError> {
        let Some(declared_headers) = definition.headers() else {
            return Ok(());
        };

        for (name, declaration) in declared_headers {
            if name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
                continue;
            }
            let declaration = self.contract.resolve(declaration)?;
            let is_required = declaration["required"] == Value::Bool(true);

            let raw_value = headers
                .get(name.as_str())
                .map(|value| value.to_str().map(str::trim));
            match raw_value {
                None | Some(Ok("")) if is_required => {
                    debug!(self.logger, "Missing required header"; "header" => name);
                    return Err(HeaderError::MissingRequired(name.clone()));
                }
                None | Some(Ok("")) => continue,
                Some(Err(_)) => {
                    return Err(HeaderError::SchemaViolation {
                        name: name.clone(),
                        source: SchemaError::Violation(vec![
                            "header value is not visible ASCII".to_string(),
                        ]),
                    });
                }
                Some(Ok(raw)) => {
                    let schema = parameter_schema(declaration);
                    let value = self.decode(raw, schema);
                    self.schema_checker.check(&value, schema).map_err(|source| {
                        HeaderError::SchemaViolation {
                            name: name.clone(),
                            source,
                        }
                    })?;
                }
            }
        }

        Ok(())
    }

    /// JSON object and array literals are decoded as such, other values are converted to the
    /// declared type.
    fn decode(&self, raw: &str, schema: &Value) -> Value {
        if raw.starts_with('{') || raw.starts_with('[') {
            if let Ok(value) = serde_json::from_str::<Value>(raw) {
                return value;
            }
        }

        self.schema_checker.coerce(raw, schema)
    }
}
