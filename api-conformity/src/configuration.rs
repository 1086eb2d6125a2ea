use serde::{Deserialize, Serialize};

/// Media type assumed when an exchange does not carry a `Content-Type` header.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Tunable behaviors of an [ExchangeValidator][crate::ExchangeValidator].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfiguration {
    /// Media type used to select a request or response content when the exchange does
    /// not declare one `[default: application/json]`.
    pub default_content_type: String,

    /// Check that the request carries the credentials required by the operation
    /// security requirements `[default: true]`.
    pub validate_security: bool,

    /// Fail when the request query holds a parameter the operation does not declare
    /// `[default: false]`.
    pub reject_unknown_query_parameters: bool,
}

impl Default for ValidatorConfiguration {
    fn default() -> Self {
        Self {
            default_content_type: DEFAULT_CONTENT_TYPE.to_string(),
            validate_security: true,
            reject_unknown_query_parameters: false,
        }
    }
}
