//! # Transcoder
//!
//! Ties the engine together: route table lookup, request mapping, dispatch and rendering.
//!
//! A [`Transcoder`] is built once from a [`Schema`] and a [`Dispatcher`] and is then shared
//! read-only between request handling tasks. Per request, the only suspension point is the
//! dispatcher call. Dropping the future returned by [`Transcoder::transcode`] (e.g. because
//! the client went away) drops the in-flight call with it, and an optional deadline turns an
//! overrun into `DEADLINE_EXCEEDED`.
use crate::codec::{CodecOptions, JsonCodec};
use crate::dispatch::Dispatcher;
use crate::mapper::{self, MapError};
use crate::render;
use crate::route::{RouteError, RouteTable};
use crate::schema::Schema;
use crate::status::{Code, Status};
use crate::template::{PathError, RequestPath};
use bytes::Bytes;
use http::{Method, Request, Response, Uri};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct TranscoderOptions {
    pub codec: CodecOptions,
    /// Upper bound for a single dispatcher call.
    pub timeout: Option<Duration>,
}

/// Everything that can go wrong while handling one request.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("No route matches {method} {path}")]
    NotFound { method: Method, path: String },

    #[error("Invalid request path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("Bad request: {0}")]
    BadRequest(#[from] MapError),

    #[error("The call did not complete within {0:?}")]
    DeadlineExceeded(Duration),

    #[error(transparent)]
    Status(#[from] Status),
}

impl TranscodeError {
    /// The status rendered for this error.
    pub fn to_status(&self) -> Status {
        match self {
            TranscodeError::NotFound { .. } => Status::from_code(Code::NotFound, self.to_string()),
            TranscodeError::InvalidPath(_) | TranscodeError::BadRequest(_) => {
                Status::invalid_argument(self.to_string())
            }
            TranscodeError::DeadlineExceeded(_) => Status::deadline_exceeded(self.to_string()),
            TranscodeError::Status(status) => status.clone(),
        }
    }
}

pub struct Transcoder<D> {
    schema: Arc<Schema>,
    routes: RouteTable,
    dispatcher: D,
    options: TranscoderOptions,
}

impl<D: Dispatcher> Transcoder<D> {
    /// Compiles the route table for every binding in `schema`.
    pub fn new(schema: Arc<Schema>, dispatcher: D) -> Result<Self, RouteError> {
        Self::with_options(schema, dispatcher, TranscoderOptions::default())
    }

    pub fn with_options(
        schema: Arc<Schema>,
        dispatcher: D,
        options: TranscoderOptions,
    ) -> Result<Self, RouteError> {
        let routes = RouteTable::from_schema(&schema)?;
        tracing::debug!(routes = routes.len(), "Route table built");

        Ok(Self {
            schema,
            routes,
            dispatcher,
            options,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn codec(&self) -> JsonCodec<'_> {
        JsonCodec::new(&self.schema, self.options.codec)
    }

    /// Handles one request end to end.
    pub async fn transcode(
        &self,
        method: &Method,
        uri: &Uri,
        body: &[u8],
    ) -> Result<Response<Bytes>, TranscodeError> {
        let path = RequestPath::parse(uri.path())?;
        let matched = self
            .routes
            .find(method, &path)
            .ok_or_else(|| TranscodeError::NotFound {
                method: method.clone(),
                path: uri.path().to_string(),
            })?;
        let route = matched.route;

        let codec = self.codec();
        let request = mapper::build_request(&codec, &matched, uri.query(), body)?;

        tracing::debug!(
            method = %route.method().full_name(),
            binding = %route.binding(),
            "Dispatching request"
        );

        let call = self.dispatcher.invoke(route.method(), request);
        let response = match self.options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| TranscodeError::DeadlineExceeded(timeout))?,
            None => call.await,
        }?;

        Ok(render::render_message(&codec, &response, route.response_body()))
    }

    /// Like [`Transcoder::transcode`], rendering failures as JSON error responses.
    pub async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        let (parts, body) = request.into_parts();
        match self.transcode(&parts.method, &parts.uri, &body).await {
            Ok(response) => response,
            Err(err) => {
                let status = err.to_status();
                match &err {
                    TranscodeError::Status(_) | TranscodeError::DeadlineExceeded(_) => {
                        tracing::warn!(
                            method = %parts.method,
                            path = %parts.uri.path(),
                            code = status.code(),
                            "Call failed: {}",
                            status.message()
                        )
                    }
                    _ => tracing::debug!(
                        method = %parts.method,
                        path = %parts.uri.path(),
                        "Rejected request: {err}"
                    ),
                }
                render::render_status(&status)
            }
        }
    }
}

impl<D> std::fmt::Debug for Transcoder<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcoder")
            .field("routes", &self.routes.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
