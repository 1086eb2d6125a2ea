use percent_encoding::percent_decode_str;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use warp::http::Method;

use crate::contract::OPERATION_METHODS;
use crate::{Contract, ContractError};

/// Errors raised when a [Router] can't be built from a [Contract].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterConstructionError {
    /// The document has no `paths` object.
    #[error("the contract has no 'paths' object")]
    MissingPaths,

    /// A path template is not usable.
    #[error("invalid path template '{template}': {reason}")]
    InvalidPathTemplate {
        /// Path template as declared
        template: String,

        /// What is wrong with it
        reason: String,
    },

    /// A path item or one of its operations is not an object.
    #[error("'{location}' must be an object")]
    NotAnObject {
        /// Location of the faulty value
        location: String,
    },

    /// A parameter is not usable.
    #[error("invalid parameter in '{location}': {reason}")]
    InvalidParameter {
        /// Location of the faulty parameter
        location: String,

        /// What is wrong with it
        reason: String,
    },
}

/// Part of a path segment template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SegmentPart {
    Literal(String),
    Variable(String),
}

/// Compiled path template: one list of parts per `/` separated segment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PathTemplate {
    segments: Vec<Vec<SegmentPart>>,
}

impl PathTemplate {
    fn parse(template: &str) -> Result<Self, RouterConstructionError> {
        let invalid = |reason: &str| RouterConstructionError::InvalidPathTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        let relative = template
            .strip_prefix('/')
            .ok_or_else(|| invalid("it must start with '/'"))?;

        let mut variables = HashSet::new();
        let mut segments = vec![];
        for segment in relative.split('/') {
            let mut parts = vec![];
            let mut rest = segment;
            while !rest.is_empty() {
                match rest.find(['{', '}']) {
                    Some(index) if rest[index..].starts_with('}') => {
                        return Err(invalid("unbalanced '}'"));
                    }
                    Some(index) => {
                        if index > 0 {
                            parts.push(SegmentPart::Literal(rest[..index].to_string()));
                        }
                        let after_brace = &rest[index + 1..];
                        let end = after_brace
                            .find('}')
                            .ok_or_else(|| invalid("unbalanced '{'"))?;
                        let name = &after_brace[..end];
                        if name.is_empty() || name.contains('{') {
                            return Err(invalid("empty or nested variable name"));
                        }
                        if matches!(parts.last(), Some(SegmentPart::Variable(_))) {
                            return Err(invalid("adjacent variables can't be told apart"));
                        }
                        if !variables.insert(name.to_string()) {
                            return Err(invalid(&format!("variable '{name}' is declared twice")));
                        }
                        parts.push(SegmentPart::Variable(name.to_string()));
                        rest = &after_brace[end + 1..];
                    }
                    None => {
                        parts.push(SegmentPart::Literal(rest.to_string()));
                        rest = "";
                    }
                }
            }
            segments.push(parts);
        }

        Ok(Self { segments })
    }

    /// Match a concrete path, returning the extracted and percent-decoded variables on success.
    fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let relative = path.strip_prefix('/')?;
        let concrete_segments: Vec<&str> = relative.split('/').collect();
        if concrete_segments.len() != self.segments.len() {
            return None;
        }

        let mut variables = BTreeMap::new();
        for (parts, concrete) in self.segments.iter().zip(concrete_segments) {
            if !match_segment(parts, concrete, &mut variables) {
                return None;
            }
        }

        Some(
            variables
                .into_iter()
                .map(|(name, raw)| (name, decode_path_value(&raw)))
                .collect(),
        )
    }

    /// Specificity key: one flag per segment, `true` when the segment is fully literal.
    fn specificity(&self) -> Vec<bool> {
        self.segments
            .iter()
            .map(|parts| parts.iter().all(|p| matches!(p, SegmentPart::Literal(_))))
            .collect()
    }
}

/// Percent-decode a path value, values that do not decode to UTF-8 are kept as is.
fn decode_path_value(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn match_segment(
    parts: &[SegmentPart],
    concrete: &str,
    variables: &mut BTreeMap<String, String>,
) -> bool {
    match parts.split_first() {
        None => concrete.is_empty(),
        Some((SegmentPart::Literal(literal), rest)) => concrete
            .strip_prefix(literal.as_str())
            .is_some_and(|remaining| match_segment(rest, remaining, variables)),
        Some((SegmentPart::Variable(name), rest)) => {
            let candidates: Vec<usize> = match rest.first() {
                None => vec![concrete.len()],
                Some(SegmentPart::Literal(next)) => concrete
                    .match_indices(next.as_str())
                    .map(|(index, _)| index)
                    .collect(),
                Some(SegmentPart::Variable(_)) => vec![],
            };
            candidates
                .into_iter()
                .filter(|end| *end > 0)
                .any(|end| {
                    if match_segment(rest, &concrete[end..], variables) {
                        variables.insert(name.clone(), concrete[..end].to_string());
                        true
                    } else {
                        false
                    }
                })
        }
    }
}

struct Route<'a> {
    template_source: &'a str,
    template: PathTemplate,
    method: Method,
    operation: &'a Value,
    parameters: Vec<&'a Value>,
}

/// Operation resolved for a concrete request.
#[derive(Debug, Clone)]
pub struct MatchedOperation<'a> {
    /// Path template of the operation, as declared in the contract
    pub path_template: &'a str,

    /// Method of the operation
    pub method: Method,

    /// The operation object
    pub operation: &'a Value,

    /// Parameters of the path item merged with the ones of the operation, references resolved
    pub parameters: Vec<&'a Value>,

    /// Values of the path template variables
    pub path_params: BTreeMap<String, String>,
}

impl Display for MatchedOperation<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path_template)
    }
}

/// Resolve requests to the operations declared by a [Contract].
///
/// The router only looks at the request path and method, the contract `servers` play no part.
pub struct Router<'a> {
    routes: Vec<Route<'a>>,
}

impl<'a> Router<'a> {
    /// Build a [Router] from the `paths` of a contract.
    pub fn new(contract: &'a Contract) -> Result<Self, RouterConstructionError> {
        let paths = contract.document()["paths"]
            .as_object()
            .ok_or(RouterConstructionError::MissingPaths)?;

        let mut routes = vec![];
        for (template_source, path_item) in paths {
            let template = PathTemplate::parse(template_source)?;
            let path_item = contract.resolve(path_item).map_err(|e| {
                RouterConstructionError::NotAnObject {
                    location: format!("{template_source}: {e}"),
                }
            })?;
            let path_item =
                path_item
                    .as_object()
                    .ok_or_else(|| RouterConstructionError::NotAnObject {
                        location: template_source.clone(),
                    })?;
            let path_parameters = resolve_parameters(
                contract,
                path_item.get("parameters"),
                template_source,
            )?;

            for method in OPERATION_METHODS {
                let Some(operation) = path_item.get(method) else {
                    continue;
                };
                let location = format!("{} {template_source}", method.to_uppercase());
                if !operation.is_object() {
                    return Err(RouterConstructionError::NotAnObject { location });
                }
                let operation_parameters =
                    resolve_parameters(contract, operation.get("parameters"), &location)?;

                routes.push(Route {
                    template_source: template_source.as_str(),
                    template: template.clone(),
                    method: method_from_key(method),
                    operation,
                    parameters: merge_parameters(&path_parameters, operation_parameters),
                });
            }
        }

        Ok(Self { routes })
    }

    /// Find the operation matching the given method and path, the most specific template wins.
    pub fn find_route(&self, method: &Method, path: &str) -> Option<MatchedOperation<'a>> {
        let mut best: Option<(&Route<'a>, BTreeMap<String, String>)> = None;
        let same_method =
            |route: &&Route<'a>| route.method.as_str().eq_ignore_ascii_case(method.as_str());
        for route in self.routes.iter().filter(same_method) {
            let Some(path_params) = route.template.matches(path) else {
                continue;
            };
            let is_more_specific = match &best {
                Some((current, _)) => {
                    route.template.specificity() > current.template.specificity()
                }
                None => true,
            };
            if is_more_specific {
                best = Some((route, path_params));
            }
        }

        best.map(|(route, path_params)| MatchedOperation {
            path_template: route.template_source,
            method: route.method.clone(),
            operation: route.operation,
            parameters: route.parameters.clone(),
            path_params,
        })
    }

    /// Number of declared operations.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// `true` if the contract declares no operation.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn method_from_key(key: &str) -> Method {
    match key {
        "get" => Method::GET,
        "put" => Method::PUT,
        "post" => Method::POST,
        "delete" => Method::DELETE,
        "options" => Method::OPTIONS,
        "head" => Method::HEAD,
        "patch" => Method::PATCH,
        _ => Method::TRACE,
    }
}

fn resolve_parameters<'a>(
    contract: &'a Contract,
    parameters: Option<&'a Value>,
    location: &str,
) -> Result<Vec<&'a Value>, RouterConstructionError> {
    let invalid = |reason: String| RouterConstructionError::InvalidParameter {
        location: location.to_string(),
        reason,
    };

    let Some(parameters) = parameters else {
        return Ok(vec![]);
    };
    let parameters = parameters
        .as_array()
        .ok_or_else(|| invalid("'parameters' must be an array".to_string()))?;

    parameters
        .iter()
        .map(|parameter| {
            let parameter = contract
                .resolve(parameter)
                .map_err(|e: ContractError| invalid(e.to_string()))?;
            if parameter["name"].is_string() && parameter["in"].is_string() {
                Ok(parameter)
            } else {
                Err(invalid(format!(
                    "parameter {parameter} must have a 'name' and an 'in'"
                )))
            }
        })
        .collect()
}

/// Operation parameters override path item parameters sharing their `name` and `in`.
fn merge_parameters<'a>(
    path_parameters: &[&'a Value],
    operation_parameters: Vec<&'a Value>,
) -> Vec<&'a Value> {
    let is_overridden = |parameter: &&Value| {
        operation_parameters
            .iter()
            .any(|p| p["name"] == parameter["name"] && p["in"] == parameter["in"])
    };

    let mut merged: Vec<&'a Value> = path_parameters
        .iter()
        .copied()
        .filter(|p| !is_overridden(p))
        .collect();
    merged.extend(operation_parameters);

    merged
}
