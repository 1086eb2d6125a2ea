use serde_json::Value;
use thiserror::Error;
use warp::http::header::AUTHORIZATION;

use crate::{Contract, ContractError, ExchangeRequest};

/// Security requirement failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// None of the alternative requirements is satisfied by the request.
    #[error("security requirements failed: {}", .reasons.join(" | "))]
    Unsatisfied {
        /// Why each alternative failed
        reasons: Vec<String>,
    },

    /// A requirement names a scheme that `components.securitySchemes` does not define.
    #[error("security scheme '{0}' is not defined")]
    UnknownScheme(String),

    /// A security scheme reference can't be resolved.
    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// Check that a request carries the credentials asked by the security requirements of an
/// operation, falling back to the document level requirements.
///
/// Only the presence of the credentials can be observed, never their validity.
pub(crate) fn check_security_requirements(
    contract: &Contract,
    operation: &Value,
    request: &ExchangeRequest,
) -> Result<(), SecurityError> {
    let requirements = match operation.get("security") {
        Some(requirements) => requirements,
        None => &contract.document()["security"],
    };
    let Some(requirements) = requirements.as_array().filter(|r| !r.is_empty()) else {
        return Ok(());
    };

    let mut reasons = vec![];
    for requirement in requirements {
        match check_requirement(contract, requirement, request)? {
            None => return Ok(()),
            Some(reason) => reasons.push(reason),
        }
    }

    Err(SecurityError::Unsatisfied { reasons })
}

/// Every scheme of a requirement must be satisfied, returns why it is not.
fn check_requirement(
    contract: &Contract,
    requirement: &Value,
    request: &ExchangeRequest,
) -> Result<Option<String>, SecurityError> {
    let Some(schemes) = requirement.as_object() else {
        return Ok(None);
    };

    for scheme_name in schemes.keys() {
        let scheme = &contract.components()["securitySchemes"][scheme_name.as_str()];
        if scheme.is_null() {
            return Err(SecurityError::UnknownScheme(scheme_name.clone()));
        }
        let scheme = contract.resolve(scheme)?;

        if let Some(reason) = check_scheme(scheme, request) {
            return Ok(Some(format!("{scheme_name}: {reason}")));
        }
    }

    Ok(None)
}

fn check_scheme(scheme: &Value, request: &ExchangeRequest) -> Option<String> {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match scheme["type"].as_str().unwrap_or_default() {
        "apiKey" => {
            let name = scheme["name"].as_str().unwrap_or_default();
            let location = scheme["in"].as_str().unwrap_or_default();
            let is_present = match location {
                "header" => request.headers().contains_key(name),
                "query" => request.query_pairs().iter().any(|(key, _)| key == name),
                "cookie" => request.cookie(name).is_some(),
                _ => false,
            };
            (!is_present).then(|| format!("missing api key '{name}' in {location}"))
        }
        "http" => {
            let expected = scheme["scheme"].as_str().unwrap_or_default();
            let provided = authorization.and_then(|value| value.split_whitespace().next());
            match provided {
                Some(provided) if provided.eq_ignore_ascii_case(expected) => None,
                Some(provided) => Some(format!(
                    "expected '{expected}' authorization but got '{provided}'"
                )),
                None => Some("missing authorization header".to_string()),
            }
        }
        "oauth2" | "openIdConnect" => authorization
            .is_none()
            .then(|| "missing authorization header".to_string()),
        _ => None,
    }
}
