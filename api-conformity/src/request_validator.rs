use serde_json::Value;
use slog::{Logger, debug};
use thiserror::Error;

use crate::exchange::decode_url_encoded;
use crate::parameter_style::{
    ParameterStyle, ValueKind, collect_query, reads_query_key, split_value,
};
use crate::security::check_security_requirements;
use crate::{
    Contract, ContractError, ExchangeRequest, MatchedOperation, SchemaChecker, SchemaError,
    SecurityError, ValidatorConfiguration,
};

/// Request conformity failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// A required parameter is absent from the request.
    #[error("parameter '{name}' in {location} is required")]
    MissingParameter {
        /// Parameter name
        name: String,

        /// Where the parameter is expected (`path`, `query`, `header` or `cookie`)
        location: String,
    },

    /// A parameter value does not conform to its schema.
    #[error("parameter '{name}' in {location} has an invalid value: {source}")]
    InvalidParameter {
        /// Parameter name
        name: String,

        /// Where the parameter is located
        location: String,

        /// Schema violation
        source: SchemaError,
    },

    /// The parameter declares a style that its location does not support.
    #[error("parameter '{name}' in {location} has an unsupported style '{style}'")]
    UnsupportedParameterStyle {
        /// Parameter name
        name: String,

        /// Where the parameter is located
        location: String,

        /// Declared style
        style: String,
    },

    /// The query holds a parameter that the operation does not declare.
    #[error("Unexpected query parameter '{0}'")]
    UnexpectedQueryParameter(String),

    /// The credentials asked by the operation security requirements are missing.
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// The operation requires a body but the request has none.
    #[error("request body is required")]
    MissingBody,

    /// The request has a body but the operation does not declare any.
    #[error("the operation does not expect a request body but got: {0:?}")]
    UnexpectedBody(String),

    /// The request media type is not one of the declared ones.
    #[error("content type '{content_type}' is not declared, expected one of: {}", .declared.join(", "))]
    UnsupportedContentType {
        /// Media type of the request
        content_type: String,

        /// Media types declared by the operation
        declared: Vec<String>,
    },

    /// The body can't be decoded according to its media type.
    #[error("expected a valid {content_type} body but got: {body:?}")]
    MalformedBody {
        /// Media type of the request
        content_type: String,

        /// Body, lossily decoded as text
        body: String,
    },

    /// The body does not conform to its schema.
    #[error("request body is invalid: {0}")]
    InvalidBody(SchemaError),

    /// The contract holds a broken reference.
    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// A request and the operation it was matched to.
///
/// Built once per validation and shared by the request and the response phases.
#[derive(Debug, Clone)]
pub struct RequestValidationInput<'a> {
    /// The request under validation
    pub request: ExchangeRequest<'a>,

    /// The operation the request was routed to
    pub matched: MatchedOperation<'a>,
}

/// Check the parameters, the credentials and the body of a request against its operation.
pub struct RequestValidator<'a> {
    contract: &'a Contract,
    schema_checker: &'a SchemaChecker<'a>,
    configuration: &'a ValidatorConfiguration,
    logger: Logger,
}

impl<'a> RequestValidator<'a> {
    /// [RequestValidator] factory
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

    /// Validates if a request is valid
    pub fn validate(&self, input: &RequestValidationInput) -> Result<(), RequestError> {
        self.validate_parameters(input)?;
        if self.configuration.reject_unknown_query_parameters {
            self.reject_unknown_query_parameters(input)?;
        }
        if self.configuration.validate_security {
            check_security_requirements(self.contract, input.matched.operation, &input.request)?;
        }
        self.validate_body(input)
    }

    fn validate_parameters(&self, input: &RequestValidationInput) -> Result<(), RequestError> {
        let query_pairs = input.request.query_pairs();

        for parameter in &input.matched.parameters {
            let name = parameter["name"].as_str().unwrap_or_default();
            let location = parameter["in"].as_str().unwrap_or_default();
            let schema = parameter_schema(parameter);

            let value = self.parameter_value(input, &query_pairs, parameter, schema)?;
            let is_required = location == "path" || parameter["required"] == Value::Bool(true);
            match value {
                None if is_required => {
                    debug!(self.logger, "Missing parameter"; "name" => name, "in" => location);
                    return Err(RequestError::MissingParameter {
                        name: name.to_string(),
                        location: location.to_string(),
                    });
                }
                None => continue,
                Some(value) => self.schema_checker.check(&value, schema).map_err(|source| {
                    RequestError::InvalidParameter {
                        name: name.to_string(),
                        location: location.to_string(),
                        source,
                    }
                })?,
            }
        }

        Ok(())
    }

    /// Decode a parameter according to its style, `None` if the request does not carry it.
    fn parameter_value(
        &self,
        input: &RequestValidationInput,
        query_pairs: &[(String, String)],
        parameter: &Value,
        schema: &Value,
    ) -> Result<Option<Value>, RequestError> {
        let name = parameter["name"].as_str().unwrap_or_default();
        let location = parameter["in"].as_str().unwrap_or_default();
        let raw = match location {
            "path" => input.matched.path_params.get(name).cloned(),
            "query" => query_pairs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone()),
            "header" => input
                .request
                .headers()
                .get(name)
                .map(|raw| String::from_utf8_lossy(raw.as_bytes()).into_owned()),
            "cookie" => input.request.cookie(name),
            _ => return Ok(None),
        };

        // Parameters declared with a `content` are JSON encoded
        if parameter.get("content").is_some() {
            return Ok(raw.map(|raw| match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(_) => Value::String(raw),
            }));
        }

        let style = ParameterStyle::of(parameter).map_err(|style| {
            RequestError::UnsupportedParameterStyle {
                name: name.to_string(),
                location: location.to_string(),
                style,
            }
        })?;
        let explode = style.explode(parameter);
        let kind =
            ValueKind::from_declared_type(self.schema_checker.declared_type(schema).as_deref());

        let split = match (location, raw) {
            ("query", _) => collect_query(
                query_pairs,
                name,
                style,
                explode,
                kind,
                &self.schema_checker.property_names(schema),
            ),
            (_, Some(raw)) => Some(split_value(&raw, name, style, explode, kind).map_err(
                |reason| RequestError::InvalidParameter {
                    name: name.to_string(),
                    location: location.to_string(),
                    source: SchemaError::Violation(vec![reason]),
                },
            )?),
            (_, None) => None,
        };

        Ok(split.map(|raw| self.schema_checker.coerce_parameter(raw, schema)))
    }

    fn reject_unknown_query_parameters(
        &self,
        input: &RequestValidationInput,
    ) -> Result<(), RequestError> {
        let declared: Vec<_> = input
            .matched
            .parameters
            .iter()
            .filter(|p| p["in"] == "query")
            .map(|parameter| {
                let name = parameter["name"].as_str().unwrap_or_default();
                let schema = parameter_schema(parameter);
                let style = ParameterStyle::of(parameter).unwrap_or(ParameterStyle::Form);
                let kind = ValueKind::from_declared_type(
                    self.schema_checker.declared_type(schema).as_deref(),
                );
                (
                    name,
                    style,
                    style.explode(parameter),
                    kind,
                    self.schema_checker.property_names(schema),
                )
            })
            .collect();

        match input.request.query_pairs().into_iter().find(|(key, _)| {
            !declared.iter().any(|(name, style, explode, kind, properties)| {
                reads_query_key(key, name, *style, *explode, *kind, properties)
            })
        }) {
            Some((key, _)) => Err(RequestError::UnexpectedQueryParameter(key)),
            None => Ok(()),
        }
    }

    fn validate_body(&self, input: &RequestValidationInput) -> Result<(), RequestError> {
        let body = input.request.body();
        let request_body = match input.matched.operation.get("requestBody") {
            Some(request_body) => self.contract.resolve(request_body)?,
            None if body.is_empty() => return Ok(()),
            None => {
                return Err(RequestError::UnexpectedBody(
                    String::from_utf8_lossy(body).into_owned(),
                ));
            }
        };

        if body.is_empty() {
            return if request_body["required"] == Value::Bool(true) {
                Err(RequestError::MissingBody)
            } else {
                Ok(())
            };
        }

        let content_type = input
            .request
            .content_type()
            .unwrap_or_else(|| self.configuration.default_content_type.clone());
        let media_type = find_media_type(&request_body["content"], &content_type).ok_or_else(
            || RequestError::UnsupportedContentType {
                content_type: content_type.clone(),
                declared: declared_media_types(&request_body["content"]),
            },
        )?;
        let schema = &media_type["schema"];

        let value = if is_json_media_type(&content_type) {
            serde_json::from_slice::<Value>(body).map_err(|_| RequestError::MalformedBody {
                content_type: content_type.clone(),
                body: String::from_utf8_lossy(body).into_owned(),
            })?
        } else if content_type == "application/x-www-form-urlencoded" {
            let fields = decode_url_encoded(&String::from_utf8_lossy(body));
            self.schema_checker.coerce_fields(&fields, schema)
        } else if content_type.starts_with("text/") {
            Value::String(String::from_utf8_lossy(body).into_owned())
        } else {
            debug!(self.logger, "Request body not checked"; "content_type" => &content_type);
            return Ok(());
        };

        self.schema_checker
            .check(&value, schema)
            .map_err(RequestError::InvalidBody)
    }
}

static NO_SCHEMA: Value = Value::Null;

/// Schema of a parameter or a header, either direct or from its single `content` media type.
pub(crate) fn parameter_schema(parameter: &Value) -> &Value {
    match parameter.get("content").and_then(Value::as_object) {
        Some(content) => content
            .values()
            .next()
            .map(|media_type| &media_type["schema"])
            .unwrap_or(&NO_SCHEMA),
        None => &parameter["schema"],
    }
}

/// Look up a media type: exact match, then `type/*`, then `*/*`.
pub(crate) fn find_media_type<'c>(content: &'c Value, content_type: &str) -> Option<&'c Value> {
    let content = content.as_object()?;
    let wildcard_subtype = content_type
        .split_once('/')
        .map(|(kind, _)| format!("{kind}/*"))
        .unwrap_or_default();

    content
        .iter()
        .find(|(declared, _)| declared.to_lowercase() == content_type)
        .or_else(|| content.iter().find(|(declared, _)| **declared == wildcard_subtype))
        .or_else(|| content.iter().find(|(declared, _)| *declared == "*/*"))
        .map(|(_, media_type)| media_type)
}

pub(crate) fn declared_media_types(content: &Value) -> Vec<String> {
    content
        .as_object()
        .map(|content| content.keys().cloned().collect())
        .unwrap_or_default()
}

pub(crate) fn is_json_media_type(content_type: &str) -> bool {
    content_type == "application/json" || content_type.ends_with("+json")
}
