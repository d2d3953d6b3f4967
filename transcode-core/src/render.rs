//! # Response Renderer
//!
//! Turns the outcome of a call into an HTTP response with a JSON body.
use crate::codec::JsonCodec;
use crate::schema::FieldPath;
use crate::status::Status;
use crate::value::MessageValue;
use bytes::Bytes;
use http::{HeaderValue, Response, StatusCode, header};
use serde_json::json;

pub const APPLICATION_JSON: &str = "application/json";

/// Renders a successful response with HTTP 200.
///
/// With a response-body selector, only that field is rendered. An absent field renders as
/// its default JSON value.
pub fn render_message(
    codec: &JsonCodec<'_>,
    message: &MessageValue,
    response_body: Option<&FieldPath>,
) -> Response<Bytes> {
    let body = match response_body {
        None => codec.encode_message(message),
        Some(path) => match message.get_path(path) {
            Some(value) => codec.encode_value(path.leaf(), value),
            None => codec.default_value(path.leaf()),
        },
    };

    json_response(StatusCode::OK, body)
}

/// Renders a status with the HTTP code from the fixed status table.
///
/// The body carries the original numeric code and message verbatim.
pub fn render_status(status: &Status) -> Response<Bytes> {
    let body = json!({
        "code": status.code(),
        "message": status.message(),
        "details": [],
    });

    json_response(status.http_status(), body)
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    response
}
