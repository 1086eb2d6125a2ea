use thiserror::Error;

use crate::{RequestError, ResponseError, RouterConstructionError, SchemaError};

/// Failure of an exchange validation, naming the phase that failed and its cause.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The contract can't be turned into a router.
    #[error("could not build a router from the contract: {0}")]
    RouterConstructionFailed(#[source] RouterConstructionError),

    /// No declared operation matches the request method and path.
    #[error("could not find route: {method} {path}")]
    RouteNotFound {
        /// Request method
        method: String,

        /// Request path
        path: String,
    },

    /// The request does not conform to the matched operation.
    #[error("http request is not valid on route {route}: {source}")]
    RequestInvalid {
        /// Matched route
        route: String,

        /// First violation found
        source: RequestError,
    },

    /// The response does not conform to the definition of its status.
    #[error("http response is not valid on route {route}: {source}")]
    ResponseInvalid {
        /// Matched route
        route: String,

        /// First violation found
        source: ResponseError,
    },

    /// Neither the response status nor a `default` response is declared.
    #[error("no response found on route {route} for status {status}")]
    NoResponseDefinition {
        /// Matched route
        route: String,

        /// Actual response status
        status: u16,
    },

    /// A required response header is absent.
    #[error("response missing required response header on route {route}, {name}")]
    MissingRequiredHeader {
        /// Matched route
        route: String,

        /// Header name
        name: String,
    },

    /// A response header does not conform to its schema.
    #[error("response header '{name}' is not valid on route {route}: {source}")]
    HeaderSchemaViolation {
        /// Matched route
        route: String,

        /// Header name
        name: String,

        /// Schema violation
        source: SchemaError,
    },
}
