//! Helpers shared by the unit tests.

use serde_json::Value;
use slog::{Drain, Logger};
use slog_async::Async;
use slog_term::{CompactFormat, PlainDecorator};
use std::io;
use std::sync::Arc;
use warp::http::{Method, Request, Response};
use warp::hyper::body::Bytes;

use crate::Contract;

/// Logger for tests, writing to the test output.
pub struct TestLogger;

impl TestLogger {
    fn from_writer<W: io::Write + Send + 'static>(writer: W) -> Logger {
        let decorator = PlainDecorator::new(writer);
        let drain = CompactFormat::new(decorator).build().fuse();
        let drain = Async::new(drain).build().fuse();
        Logger::root(Arc::new(drain), slog::o!())
    }

    pub fn stdout() -> Logger {
        Self::from_writer(slog_term::TestStdoutWriter)
    }
}

/// Build a contract from the given `paths` and `components.schemas` YAML fragments.
pub fn minimal_contract(openapi_paths: &str, openapi_components: &str) -> Contract {
    Contract::from_yaml_str(&format!(
        r#"openapi: "3.0.0"
info:
  version: 1.0.0
  title: Minimal Open Api File

paths:
{openapi_paths}

components:
  schemas:
{openapi_components}
"#
    ))
    .unwrap()
}

/// Build a request, with a JSON body unless `body` is `null`.
pub fn build_request(method: Method, uri: &str, body: Value) -> Request<Bytes> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Value::Null => builder.body(Bytes::new()).unwrap(),
        body => builder
            .header("content-type", "application/json")
            .body(Bytes::from(body.to_string().into_bytes()))
            .unwrap(),
    }
}

pub fn build_json_response(status_code: u16, value: Value) -> Response<Bytes> {
    Response::builder()
        .status(status_code)
        .header("content-type", "application/json")
        .body(Bytes::from(value.to_string().into_bytes()))
        .unwrap()
}

pub fn build_response(status_code: u16, content: &'static [u8]) -> Response<Bytes> {
    Response::builder()
        .status(status_code)
        .body(Bytes::from_static(content))
        .unwrap()
}
