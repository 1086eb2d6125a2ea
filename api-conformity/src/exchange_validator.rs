use slog::{Logger, debug, o};
use warp::http::{Request, Response};
use warp::hyper::body::Bytes;

use crate::{
    Contract, ExchangeRequest, ExchangeResponse, HeaderCompletenessChecker, HeaderError,
    RequestValidationInput, RequestValidator, ResponseError, ResponseValidator, Router,
    SchemaChecker, ValidationError, ValidatorConfiguration,
};

/// Validate a recorded response and the request that produced it against a [Contract].
///
/// Uses the default [ValidatorConfiguration] and does not log, see [ExchangeValidator] for a
/// configurable version.
pub fn validate(
    contract: &Contract,
    response: &Response<Bytes>,
    request: &Request<Bytes>,
) -> Result<(), ValidationError> {
    ExchangeValidator::new(contract, Logger::root(slog::Discard, o!())).validate(response, request)
}

/// Validate exchanges against a [Contract].
///
/// Each validation routes the request, then checks the request, the response and the response
/// headers, stopping at the first failure. Nothing is kept between validations.
pub struct ExchangeValidator<'a> {
    contract: &'a Contract,
    configuration: ValidatorConfiguration,
    logger: Logger,
}

impl<'a> ExchangeValidator<'a> {
    /// [ExchangeValidator] factory
    pub fn new(contract: &'a Contract, logger: Logger) -> Self {
        Self {
            contract,
            configuration: ValidatorConfiguration::default(),
            logger: logger.new(o!("src" => "ExchangeValidator")),
        }
    }

    /// Replace the default configuration.
    pub fn with_configuration(mut self, configuration: ValidatorConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Validate one exchange against several contracts, for example one per supported API
    /// version, failing on the first contract rejecting it.
    pub fn validate_all(
        contracts: &[Contract],
        response: &Response<Bytes>,
        request: &Request<Bytes>,
        logger: Logger,
    ) -> Result<(), (String, ValidationError)> {
        for contract in contracts {
            ExchangeValidator::new(contract, logger.clone())
                .validate(response, request)
                .map_err(|error| (contract.display_name(), error))?;
        }

        Ok(())
    }

    /// Validate a recorded response and the request that produced it.
    pub fn validate(
        &self,
        response: &Response<Bytes>,
        request: &Request<Bytes>,
    ) -> Result<(), ValidationError> {
        let result = self.run(
            &ExchangeResponse::new(response),
            ExchangeRequest::new(request),
        );
        if let Err(error) = &result {
            debug!(self.logger, "Exchange is not valid"; "error" => ?error);
        }

        result
    }

    fn run(
        &self,
        response: &ExchangeResponse,
        request: ExchangeRequest,
    ) -> Result<(), ValidationError> {
        let routable_contract = self.contract.without_servers();
        let router =
            Router::new(&routable_contract).map_err(ValidationError::RouterConstructionFailed)?;

        let matched = router
            .find_route(request.method(), request.path())
            .ok_or_else(|| ValidationError::RouteNotFound {
                method: request.method().to_string(),
                path: request.path().to_string(),
            })?;
        let route = matched.to_string();
        debug!(self.logger, "Route found"; "route" => &route);

        let schema_checker = SchemaChecker::new(&routable_contract);
        let input = RequestValidationInput { request, matched };

        RequestValidator::new(
            &routable_contract,
            &schema_checker,
            &self.configuration,
            self.logger.new(o!("phase" => "request")),
        )
        .validate(&input)
        .map_err(|source| ValidationError::RequestInvalid {
            route: route.clone(),
            source,
        })?;

        let definition = ResponseValidator::new(
            &routable_contract,
            &schema_checker,
            &self.configuration,
            self.logger.new(o!("phase" => "response")),
        )
        .validate(&input, response)
        .map_err(|error| match error {
            ResponseError::NoDefinition(status) => ValidationError::NoResponseDefinition {
                route: route.clone(),
                status,
            },
            source => ValidationError::ResponseInvalid {
                route: route.clone(),
                source,
            },
        })?;

        HeaderCompletenessChecker::new(
            &routable_contract,
            &schema_checker,
            self.logger.new(o!("phase" => "headers")),
        )
        .check(&definition, response.headers())
        .map_err(|error| match error {
            HeaderError::MissingRequired(name) => ValidationError::MissingRequiredHeader {
                route: route.clone(),
                name,
            },
            HeaderError::SchemaViolation { name, source } => {
                ValidationError::HeaderSchemaViolation {
                    route: route.clone(),
                    name,
                    source,
                }
            }
            HeaderError::Contract(error) => ValidationError::ResponseInvalid {
                route: route.clone(),
                source: ResponseError::Contract(error),
            },
        })?;

        debug!(self.logger, "Exchange is valid"; "route" => &route);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use std::sync::Arc;
    use warp::http::{Method, StatusCode};

    use crate::test_tools::{
        TestLogger, build_json_response, build_request, build_response, minimal_contract,
    };
    use crate::{RequestError, SchemaError};

    use super::*;

    const PATHS: &str = r##"
  /pets:
    get:
      parameters:
        - name: limit
          in: query
          required: true
          schema:
            type: integer
      responses:
        "200":
          description: pets
          headers:
            X-Trace-Id:
              required: true
              schema:
                type: string
            X-Page:
              schema:
                type: integer
          content:
            application/json:
              schema:
                type: array
                items:
                  $ref: "#/components/schemas/Pet"
        "204":
          description: no content
    post:
      requestBody:
        required: true
        content:
          application/json:
            schema:
              $ref: "#/components/schemas/Pet"
      responses:
        "201":
          description: created
        default:
          description: error
          content:
            application/json:
              schema:
                $ref: "#/components/schemas/Error"
"##;

    const COMPONENTS: &str = r#"
    Pet:
      type: object
      required: [name]
      properties:
        name:
          type: string
    Error:
      type: object
      required: [message]
      properties:
        message:
          type: string
"#;

    fn contract() -> Contract {
        minimal_contract(PATHS, COMPONENTS)
    }

    fn contract_with_servers() -> Contract {
        let mut document = contract().document().clone();
        document["servers"] = json!([{ "url": "https://api.example.com/v2" }]);
        document["paths"]["/pets"]["servers"] = json!([{ "url": "https://pets.example.com" }]);
        Contract::new(document)
    }

    fn list_pets_response() -> Response<Bytes> {
        let mut response = build_json_response(200, json!([{ "name": "rex" }]));
        response
            .headers_mut()
            .insert("x-trace-id", "abc-123".parse().unwrap());
        response
    }

    fn validator(contract: &Contract) -> ExchangeValidator<'_> {
        ExchangeValidator::new(contract, TestLogger::stdout())
    }

    #[test]
    fn conforming_exchange_is_valid() {
        let contract = contract();

        validator(&contract)
            .validate(
                &list_pets_response(),
                &build_request(Method::GET, "/pets?limit=10", Value::Null),
            )
            .unwrap();
    }

    #[test]
    fn unknown_route_is_not_found_whatever_the_servers() {
        for contract in [contract(), contract_with_servers()] {
            let result = validator(&contract).validate(
                &list_pets_response(),
                &build_request(Method::GET, "/owners", Value::Null),
            );

            assert_eq!(
                Err(ValidationError::RouteNotFound {
                    method: "GET".to_string(),
                    path: "/owners".to_string()
                }),
                result
            );
        }
    }

    #[test]
    fn server_base_path_is_not_stripped_from_request_path() {
        let contract = contract_with_servers();

        let result = validator(&contract).validate(
            &list_pets_response(),
            &build_request(Method::GET, "/v2/pets?limit=10", Value::Null),
        );

        assert!(matches!(
            result,
            Err(ValidationError::RouteNotFound { .. })
        ));
    }

    #[test]
    fn servers_do_not_change_the_outcome_for_a_matched_operation() {
        let exchanges = [
            (
                list_pets_response(),
                build_request(Method::GET, "/pets?limit=10", Value::Null),
            ),
            (
                list_pets_response(),
                build_request(Method::GET, "/pets", Value::Null),
            ),
            (
                build_json_response(200, json!([{ "id": 1 }])),
                build_request(Method::GET, "/pets?limit=1", Value::Null),
            ),
            (
                build_json_response(200, json!([])),
                build_request(Method::GET, "/pets?limit=1", Value::Null),
            ),
        ];
        let with_servers = contract_with_servers();
        let without_servers = contract();

        for (response, request) in &exchanges {
            assert_eq!(
                validator(&without_servers).validate(response, request),
                validator(&with_servers).validate(response, request),
            );
        }
    }

    #[test]
    fn request_without_required_query_parameter_is_invalid() {
        let contract = contract();

        let result = validator(&contract).validate(
            &list_pets_response(),
            &build_request(Method::GET, "/pets", Value::Null),
        );

        assert_eq!(
            Err(ValidationError::RequestInvalid {
                route: "GET /pets".to_string(),
                source: RequestError::MissingParameter {
                    name: "limit".to_string(),
                    location: "query".to_string()
                }
            }),
            result
        );
    }

    #[test]
    fn request_failure_short_circuits_response_validation() {
        let contract = contract();

        let result = validator(&contract).validate(
            &build_response(418, b"abcdefgh"),
            &build_request(Method::POST, "/pets", json!({ "age": 3 })),
        );

        assert!(
            matches!(&result, Err(ValidationError::RequestInvalid { source: RequestError::InvalidBody(_), .. })),
            "unexpected result: {result:?}"
        );
    }

    #[test]
    fn undocumented_status_has_no_response_definition() {
        let contract = contract();

        let result = validator(&contract).validate(
            &build_response(404, b""),
            &build_request(Method::GET, "/pets?limit=10", Value::Null),
        );

        assert_eq!(
            Err(ValidationError::NoResponseDefinition {
                route: "GET /pets".to_string(),
                status: 404
            }),
            result
        );
    }

    #[test]
    fn undocumented_status_falls_back_to_default_definition() {
        let contract = contract();
        let request = build_request(Method::POST, "/pets", json!({ "name": "rex" }));

        validator(&contract)
            .validate(
                &build_json_response(
                    StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                    json!({ "message": "an error occurred" }),
                ),
                &request,
            )
            .unwrap();

        let result = validator(&contract).validate(
            &build_json_response(500, json!({ "code": 500 })),
            &request,
        );
        assert!(
            matches!(&result, Err(ValidationError::ResponseInvalid { source: ResponseError::InvalidBody(_), .. })),
            "unexpected result: {result:?}"
        );
    }

    #[test]
    fn missing_required_header_is_reported() {
        let contract = contract();

        let result = validator(&contract).validate(
            &build_json_response(200, json!([{ "name": "rex" }])),
            &build_request(Method::GET, "/pets?limit=10", Value::Null),
        );

        assert_eq!(
            Err(ValidationError::MissingRequiredHeader {
                route: "GET /pets".to_string(),
                name: "X-Trace-Id".to_string()
            }),
            result
        );
        assert_eq!(
            "response missing required response header on route GET /pets, X-Trace-Id",
            result.unwrap_err().to_string()
        );
    }

    #[test]
    fn header_with_non_conforming_value_is_reported() {
        let contract = contract();
        let request = build_request(Method::GET, "/pets?limit=10", Value::Null);

        let mut response = list_pets_response();
        response
            .headers_mut()
            .insert("x-trace-id", r#"{"id":"abc"}"#.parse().unwrap());
        let result = validator(&contract).validate(&response, &request);
        assert!(
            matches!(&result, Err(ValidationError::HeaderSchemaViolation { name, source: SchemaError::Violation(_), .. }) if name == "X-Trace-Id"),
            "unexpected result: {result:?}"
        );

        let mut response = list_pets_response();
        response
            .headers_mut()
            .insert("x-page", "first".parse().unwrap());
        let result = validator(&contract).validate(&response, &request);
        assert!(
            matches!(&result, Err(ValidationError::HeaderSchemaViolation { name, .. }) if name == "X-Page"),
            "unexpected result: {result:?}"
        );
    }

    #[test]
    fn headers_of_another_status_are_not_checked() {
        let contract = contract();

        validator(&contract)
            .validate(
                &build_response(204, b""),
                &build_request(Method::GET, "/pets?limit=10", Value::Null),
            )
            .unwrap();
    }

    #[test]
    fn validation_is_idempotent() {
        let contract = contract();
        let validator = validator(&contract);
        let response = build_json_response(200, json!([{ "name": "rex" }]));
        let request = build_request(Method::GET, "/pets?limit=10", Value::Null);

        let first = validator.validate(&response, &request);
        let second = validator.validate(&response, &request);

        assert!(first.is_err());
        assert_eq!(first, second);
    }

    #[test]
    fn contract_is_left_untouched() {
        let contract = contract_with_servers();
        let before = contract.clone();

        validate(
            &contract,
            &list_pets_response(),
            &build_request(Method::GET, "/pets?limit=10", Value::Null),
        )
        .unwrap();

        assert_eq!(before, contract);
    }

    #[test]
    fn malformed_contract_fails_router_construction() {
        let contract = Contract::new(json!({ "openapi": "3.0.0" }));

        let result = validate(
            &contract,
            &list_pets_response(),
            &build_request(Method::GET, "/pets", Value::Null),
        );

        assert!(matches!(
            result,
            Err(ValidationError::RouterConstructionFailed(_))
        ));
    }

    #[test]
    fn concurrent_validations_share_one_contract() {
        let contract = Arc::new(contract_with_servers());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let contract = contract.clone();
                std::thread::spawn(move || {
                    let uri = if i % 2 == 0 { "/pets?limit=1" } else { "/pets" };
                    validate(
                        &contract,
                        &list_pets_response(),
                        &build_request(Method::GET, uri, Value::Null),
                    )
                    .is_ok()
                })
            })
            .collect();

        let outcomes: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(
            vec![true, false, true, false, true, false, true, false],
            outcomes
        );
    }

    #[test]
    fn validate_all_names_the_rejecting_contract() {
        let mut strict_document = contract().document().clone();
        strict_document["info"]["version"] = json!("2.0.0");
        strict_document["paths"]["/pets"]["get"]["responses"]["200"]["headers"]["X-Page"]
            ["required"] = json!(true);
        let contracts = vec![contract(), Contract::new(strict_document)];

        let result = ExchangeValidator::validate_all(
            &contracts,
            &list_pets_response(),
            &build_request(Method::GET, "/pets?limit=10", Value::Null),
            TestLogger::stdout(),
        );

        let (name, error) = result.unwrap_err();
        assert_eq!("Minimal Open Api File 2.0.0", name);
        assert!(
            matches!(&error, ValidationError::MissingRequiredHeader { name, .. } if name == "X-Page"),
            "unexpected error: {error:?}"
        );
    }
}
