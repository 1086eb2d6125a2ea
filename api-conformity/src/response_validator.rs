use serde_json::{Map, Value};
use slog::{Logger, debug};
use thiserror::Error;

use crate::request_validator::{declared_media_types, find_media_type, is_json_media_type};
use crate::{
    Contract, ContractError, ExchangeResponse, RequestValidationInput, SchemaChecker, SchemaError,
    ValidatorConfiguration,
};

/// Response conformity failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    /// The operation declares neither the response status nor a `default` response.
    #[error("no response declared for status {0}")]
    NoDefinition(u16),

    /// The response media type is not one of the declared ones.
    #[error("Expected content type '{content_type}' but the contract declares: {}", .declared.join(", "))]
    UnexpectedContentType {
        /// Media type of the response
        content_type: String,

        /// Media types declared for the response
        declared: Vec<String>,
    },

    /// A body is declared but the response has none.
    #[error("Non empty body expected")]
    MissingBody,

    /// The response has a body but none is declared.
    #[error("Expected empty body but got: {0:?}")]
    UnexpectedBody(String),

    /// The body can't be decoded according to its media type.
    #[error("Expected a valid {content_type} body but got: {body:?}")]
    MalformedBody {
        /// Media type of the response
        content_type: String,

        /// Body, lossily decoded as text
        body: String,
    },

    /// The body does not conform to its schema.
    #[error("response body is invalid: {0}")]
    InvalidBody(SchemaError),

    /// The contract holds a broken reference.
    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// The response object declared for a status code, or the `default` one.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDefinition<'a> {
    /// Key under which the response is declared (the status code or `default`)
    pub key: String,

    /// The response object, references resolved
    pub value: &'a Value,
}

impl<'a> ResponseDefinition<'a> {
    /// Resolve the definition of a status code: exact match first, then `default`.
    ///
    /// Status ranges such as `2XX` are not looked at.
    pub fn resolve(
        contract: &'a Contract,
        operation: &'a Value,
        status: u16,
    ) -> Result<Option<Self>, ContractError> {
        let responses = &operation["responses"];
        let status_key = status.to_string();

        let declared = [status_key.as_str(), "default"]
            .into_iter()
            .find_map(|key| responses.get(key).map(|response| (key, response)));

        match declared {
            Some((key, response)) => Ok(Some(Self {
                key: key.to_string(),
                value: contract.resolve(response)?,
            })),
            None => Ok(None),
        }
    }

    /// `true` if this is the `default` response.
    pub fn is_default(&self) -> bool {
        self.key == "default"
    }

    /// Declared headers, in declaration order (empty if none).
    pub fn headers(&self) -> Option<&'a Map<String, Value>> {
        self.value["headers"].as_object()
    }

    /// Declared content, by media type.
    pub fn content(&self) -> &'a Value {
        &self.value["content"]
    }
}

/// Check a response status and body against the operation matched for its request.
pub struct ResponseValidator<'a> {
    contract: &'a Contract,
    schema_checker: &'a SchemaChecker<'a>,
    configuration: &'a ValidatorConfiguration,
    logger: Logger,
}

impl<'a> ResponseValidator<'a> {
    /// [ResponseValidator] factory
    pub fn new(
        contract: &'a Contract,
        schema_checker: &'a SchemaChecker<'a>,
        configuration: &'a ValidatorConfiguration,
        logger: Logger,
    ) -> Self {
        Self {
            contract,
            schema_checker,
            configuration,
            logger,
        }
    }

    /// Validates if a response is valid, returning the definition it was checked against.
    pub fn validate(
        &self,
        input: &RequestValidationInput<'a>,
        response: &ExchangeResponse,
    ) -> Result<ResponseDefinition<'a>, ResponseError> {
        let status = response.status().as_u16();
        let definition =
            ResponseDefinition::resolve(self.contract, input.matched.operation, status)?
                .ok_or(ResponseError::NoDefinition(status))?;
        debug!(
            self.logger, "Response definition resolved";
            "route" => %input.matched, "status" => status, "definition" => &definition.key
        );

        self.validate_body(&definition, response)?;

        Ok(definition)
    }

    fn validate_body(
        &self,
        definition: &ResponseDefinition,
        response: &ExchangeResponse,
    ) -> Result<(), ResponseError> {
        let body = response.body();
        let content = definition.content();
        if content.is_null() {
            return if body.is_empty() {
                Ok(())
            } else {
                Err(ResponseError::UnexpectedBody(
                    String::from_utf8_lossy(body).into_owned(),
                ))
            };
        }

        let content_type = response
            .content_type()
            .unwrap_or_else(|| self.configuration.default_content_type.clone());
        let media_type = find_media_type(content, &content_type).ok_or_else(|| {
            ResponseError::UnexpectedContentType {
                content_type: content_type.clone(),
                declared: declared_media_types(content),
            }
        })?;
        let schema = &media_type["schema"];

        if body.is_empty() {
            return if schema.is_null() {
                Ok(())
            } else {
                Err(ResponseError::MissingBody)
            };
        }

        let value = if is_json_media_type(&content_type) {
            serde_json::from_slice::<Value>(body).map_err(|_| ResponseError::MalformedBody {
                content_type: content_type.clone(),
                body: String::from_utf8_lossy(body).into_owned(),
            })?
        } else if content_type.starts_with("text/") {
            Value::String(String::from_utf8_lossy(body).into_owned())
        } else {
            debug!(self.logger, "Response body not checked"; "content_type" => &content_type);
            return Ok(());
        };

        self.schema_checker
            .check(&value, schema)
            .map_err(ResponseError::InvalidBody)
    }
}
