use reqwest::Url;
use warp::http::header::{CONTENT_TYPE, COOKIE};
use warp::http::{HeaderMap, Method, Request, Response, StatusCode};
use warp::hyper::body::Bytes;

/// Base used to turn a request target into a parsable url, only its path and query are read.
const FAKE_BASE_URL: &str = "http://0.0.0.1";

/// Read-only view over a request taking part in an exchange.
#[derive(Debug, Clone)]
pub struct ExchangeRequest<'a> {
    method: &'a Method,
    path: &'a str,
    query: Option<&'a str>,
    headers: &'a HeaderMap,
    body: &'a Bytes,
}

impl<'a> ExchangeRequest<'a> {
    /// [ExchangeRequest] factory
    pub fn new(request: &'a Request<Bytes>) -> Self {
        Self {
            method: request.method(),
            path: request.uri().path(),
            query: request.uri().query(),
            headers: request.headers(),
            body: request.body(),
        }
    }

    /// Request method
    pub fn method(&self) -> &Method {
        self.method
    }

    /// Request path, without its query
    pub fn path(&self) -> &str {
        self.path
    }

    /// Request headers
    pub fn headers(&self) -> &HeaderMap {
        self.headers
    }

    /// Request body
    pub fn body(&self) -> &Bytes {
        self.body
    }

    /// Decoded query pairs, in order of appearance.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        match self.query {
            Some(query) => decode_url_encoded(query),
            None => vec![],
        }
    }

    /// Value of the given cookie, read from the `Cookie` headers.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }

    /// Media type of the body without its parameters, if a `Content-Type` header is set.
    pub fn content_type(&self) -> Option<String> {
        content_type_essence(self.headers)
    }
}

/// Read-only view over a recorded response.
///
/// The body is borrowed from the response, reading it leaves the response usable by its owner.
#[derive(Debug, Clone)]
pub struct ExchangeResponse<'a> {
    status: StatusCode,
    headers: &'a HeaderMap,
    body: &'a Bytes,
}

impl<'a> ExchangeResponse<'a> {
    /// [ExchangeResponse] factory
    pub fn new(response: &'a Response<Bytes>) -> Self {
        Self {
            status: response.status(),
            headers: response.headers(),
            body: response.body(),
        }
    }

    /// Response status code
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers
    pub fn headers(&self) -> &HeaderMap {
        self.headers
    }

    /// Response body
    pub fn body(&self) -> &Bytes {
        self.body
    }

    /// Media type of the body without its parameters, if a `Content-Type` header is set.
    pub fn content_type(&self) -> Option<String> {
        content_type_essence(self.headers)
    }
}

fn content_type_essence(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|essence| essence.trim().to_lowercase())
        .filter(|essence| !essence.is_empty())
}

/// Decode an `application/x-www-form-urlencoded` text (a query or a form body).
pub(crate) fn decode_url_encoded(encoded: &str) -> Vec<(String, String)> {
    match Url::parse(&format!("{FAKE_BASE_URL}/?{encoded}")) {
        Ok(url) => url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect(),
        Err(_) => vec![],
    }
}
