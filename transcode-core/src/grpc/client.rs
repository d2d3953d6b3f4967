//! # Generic gRPC Client
//!
//! Wraps a `tonic` client so it can call any unary method known only at runtime.
//!
//! The HTTP/2 path (e.g. `/package.Service/Method`) is built from the method descriptor and
//! the messages are carried by [`WireCodec`].
use super::codec::WireCodec;
use crate::BoxError;
use crate::value::MessageValue;
use http_body::Body as HttpBody;
use prost_reflect::MethodDescriptor;
use std::str::FromStr;
use tonic::{
    client::GrpcService,
    transport::{Channel, Endpoint},
};

/// Errors that can occur when setting up the upstream connection.
#[derive(Debug, thiserror::Error)]
pub enum ClientConnectError {
    #[error("Invalid URL '{0}': {1}")]
    InvalidUrl(String, #[source] tonic::transport::Error),
    #[error("Failed to connect to '{0}': {1}")]
    ConnectionFailed(String, #[source] tonic::transport::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum GrpcRequestError {
    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
    #[error("Method '{0}' does not map to a valid gRPC path")]
    InvalidPath(String),
}

/// A dynamic client for unary calls.
#[derive(Debug, Clone)]
pub struct GrpcClient<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl GrpcClient<Channel> {
    /// Connects to `addr` eagerly.
    pub async fn connect(addr: &str) -> Result<Self, ClientConnectError> {
        let channel = endpoint(addr)?
            .connect()
            .await
            .map_err(|e| ClientConnectError::ConnectionFailed(addr.to_string(), e))?;
        Ok(Self::new(channel))
    }

    /// Creates a client that connects on first use.
    pub fn connect_lazy(addr: &str) -> Result<Self, ClientConnectError> {
        Ok(Self::new(endpoint(addr)?.connect_lazy()))
    }
}

fn endpoint(addr: &str) -> Result<Endpoint, ClientConnectError> {
    Endpoint::new(addr.to_string()).map_err(|e| ClientConnectError::InvalidUrl(addr.to_string(), e))
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    /// Performs a unary call.
    ///
    /// # Returns
    /// * `Ok(Ok(MessageValue))` - Successful RPC execution.
    /// * `Ok(Err(Status))` - RPC executed, but server returned an error.
    /// * `Err(GrpcRequestError)` - Failed to send the request.
    pub async fn unary(
        &mut self,
        method: &MethodDescriptor,
        codec: WireCodec,
        payload: MessageValue,
    ) -> Result<Result<MessageValue, tonic::Status>, GrpcRequestError> {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;

        let path = http_path(method)?;
        let request = tonic::Request::new(payload);

        match self.client.unary(request, path, codec).await {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }
}

fn http_path(method: &MethodDescriptor) -> Result<http::uri::PathAndQuery, GrpcRequestError> {
    let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
    http::uri::PathAndQuery::from_str(&path).map_err(|_| GrpcRequestError::InvalidPath(path))
}
