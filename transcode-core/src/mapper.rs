//! # Field Mapper
//!
//! Builds the request message for a matched route out of the HTTP request parts.
//!
//! Sources are applied in increasing order of precedence:
//!
//! 1. the JSON body, decoded at the route's body target;
//! 2. query parameters, for routes whose body is not the whole request;
//! 3. path captures.
//!
//! A later source overwrites what an earlier one wrote to the same field, so a resource id
//! taken from the path cannot be overridden by the body.
use crate::codec::{CodecError, JsonCodec};
use crate::route::{BodyTarget, RouteMatch};
use crate::value::MessageValue;

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Request body is not valid JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Produces the request message for `matched`.
///
/// `query` is the raw query string (without `?`). An empty or whitespace-only body is
/// treated as absent.
pub fn build_request(
    codec: &JsonCodec<'_>,
    matched: &RouteMatch<'_>,
    query: Option<&str>,
    body: &[u8],
) -> Result<MessageValue, MapError> {
    let route = matched.route;
    let mut request = MessageValue::new(route.input().clone());

    let has_body = !body.iter().all(u8::is_ascii_whitespace);
    match route.body() {
        BodyTarget::Whole if has_body => {
            let json = parse_body(body)?;
            request = codec.decode_message(route.input(), &json)?;
        }
        BodyTarget::Field(path) if has_body => {
            let json = parse_body(body)?;
            if let Some(value) = codec
                .decode_field(path.leaf(), &json)
                .map_err(|e| e.within(path.as_str()))?
            {
                request.set_path(path, value);
            }
        }
        _ => {}
    }

    if let Some(query) = query.filter(|_| route.body() != &BodyTarget::Whole) {
        apply_query(codec, matched, query, &mut request)?;
    }

    for (path, text) in &matched.captures {
        let value = codec
            .parse_text(path.leaf(), text)
            .map_err(|e| e.within(path.as_str()))?;
        request.set_path(path, value);
    }

    Ok(request)
}

fn parse_body(body: &[u8]) -> Result<serde_json::Value, MapError> {
    serde_json::from_slice(body).map_err(MapError::MalformedJson)
}

fn apply_query(
    codec: &JsonCodec<'_>,
    matched: &RouteMatch<'_>,
    query: &str,
    request: &mut MessageValue,
) -> Result<(), CodecError> {
    let route = matched.route;
    let schema = codec.schema();

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if let BodyTarget::Field(body) = route.body() {
            if body.covers(&key) {
                continue;
            }
        }

        let Ok(path) = schema.resolve_path(route.input(), &key) else {
            tracing::trace!(key = %key, "Ignoring query parameter that names no field");
            continue;
        };

        let field = path.leaf();
        if !field.is_scalar() {
            continue;
        }

        let parsed = codec
            .parse_text(field, &value)
            .map_err(|e| e.within(path.as_str()))?;
        if field.is_repeated() {
            request.push_path(&path, parsed);
        } else {
            request.set_path(&path, parsed);
        }
    }

    Ok(())
}
