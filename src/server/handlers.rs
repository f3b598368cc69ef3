use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use log::error;
use serde::Serialize;

use super::ServerState;

type Body = Full<Bytes>;

#[derive(Debug, Serialize)]
struct StatusEndpoint<'a> {
    uri: &'a str,
    prober_type: &'a str,
    interval: String,
    retries: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    tag: &'a str,
}

#[derive(Debug, Serialize)]
struct StatusResponse<'a> {
    version: &'static str,
    endpoints: Vec<StatusEndpoint<'a>>,
}

fn response(status: StatusCode, body: impl Into<Bytes>) -> Response<Body> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

fn with_content_type(mut response: Response<Body>, content_type: &'static str) -> Response<Body> {
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

pub fn route<B>(state: &ServerState, req: &Request<B>) -> Response<Body> {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return response(StatusCode::METHOD_NOT_ALLOWED, Bytes::new());
    }

    match req.uri().path() {
        "/metrics" => metrics(state),
        "/live" | "/ready" => ok(),
        "/latency" => latency(state, req.uri().query()),
        "/status" => status(state),
        _ => response(StatusCode::NOT_FOUND, Bytes::new()),
    }
}

fn ok() -> Response<Body> {
    response(StatusCode::OK, Bytes::new())
}

fn metrics(state: &ServerState) -> Response<Body> {
    match state.registry.render() {
        Ok(text) => with_content_type(response(StatusCode::OK, text), prometheus::TEXT_FORMAT),
        Err(err) => {
            error!("Failed to encode metrics: {}", err);
            response(StatusCode::INTERNAL_SERVER_ERROR, Bytes::new())
        }
    }
}

/// Responds with `payloadSize` zero bytes, up to the configured maximum.
fn latency(state: &ServerState, query: Option<&str>) -> Response<Body> {
    let payload_size = query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(key, _)| key == "payloadSize")
            .map(|(_, value)| value.into_owned())
    });

    let Some(payload_size) = payload_size.filter(|s| !s.is_empty()) else {
        return ok();
    };

    let size: usize = match payload_size.parse() {
        Ok(size) => size,
        Err(err) => {
            error!("Invalid payloadSize {:?}: {}", payload_size, err);
            return response(StatusCode::BAD_REQUEST, Bytes::new());
        }
    };

    if size > state.max_payload_size {
        return response(
            StatusCode::BAD_REQUEST,
            format!("Exceeded max allowed payloadSize: {}", state.max_payload_size),
        );
    }

    response(StatusCode::OK, vec![0u8; size])
}

fn status(state: &ServerState) -> Response<Body> {
    let body = StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        endpoints: state
            .endpoints
            .iter()
            .map(|e| StatusEndpoint {
                uri: &e.uri,
                prober_type: &e.prober_type,
                interval: format!("{:?}", e.interval),
                retries: e.retries,
                tag: &e.tag,
            })
            .collect(),
    };

    match serde_json::to_vec(&body) {
        Ok(json) => with_content_type(response(StatusCode::OK, json), "application/json"),
        Err(err) => {
            error!("Failed to encode status: {}", err);
            response(StatusCode::INTERNAL_SERVER_ERROR, Bytes::new())
        }
    }
}
