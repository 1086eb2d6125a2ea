#![warn(missing_docs)]

//! Tools to verify that a recorded HTTP exchange conforms to an OpenAPI contract.
//!
//! Provide:
//! - A [Contract] holding the OpenAPI document, with a servers-free view used for routing.
//! - A [Router] resolving a request to the declared operation and its path parameters.
//! - A [RequestValidator] and a [ResponseValidator] checking parameters, bodies and status
//!   against the matched operation.
//! - A [HeaderCompletenessChecker] enforcing required response headers and their schemas.
//! - The [validate] entry point and the configurable [ExchangeValidator] chaining all the above,
//!   failing on the first violation with a [ValidationError].

mod configuration;
mod contract;
mod error;
mod exchange;
mod exchange_validator;
mod header_checker;
mod parameter_style;
mod request_validator;
mod response_validator;
mod router;
mod schema;
mod security;

#[cfg(test)]
pub(crate) mod test_tools;

pub use configuration::ValidatorConfiguration;
pub use contract::{Contract, ContractError};
pub use error::ValidationError;
pub use exchange::{ExchangeRequest, ExchangeResponse};
pub use exchange_validator::{ExchangeValidator, validate};
pub use header_checker::{HeaderCompletenessChecker, HeaderError};
pub use request_validator::{RequestError, RequestValidationInput, RequestValidator};
pub use response_validator::{ResponseDefinition, ResponseError, ResponseValidator};
pub use router::{MatchedOperation, Router, RouterConstructionError};
pub use schema::{SchemaChecker, SchemaError};
pub use security::SecurityError;

/// Generic error type
pub type StdError = anyhow::Error;

/// Generic result type
pub type StdResult<T> = anyhow::Result<T, StdError>;
