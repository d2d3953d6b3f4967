//! # gRPC Dispatcher
//!
//! A [`Dispatcher`] that forwards every call to an upstream gRPC server.
//!
//! Methods are looked up in the `prost-reflect` pool the engine schema was built from, so the
//! upstream must serve the same services. Statuses returned by the server are passed through
//! with their numeric code; transport failures surface as `UNAVAILABLE`.
use super::client::{ClientConnectError, GrpcClient};
use super::codec::WireCodec;
use crate::codec::CodecOptions;
use crate::dispatch::Dispatcher;
use crate::schema::{MethodDescriptor, Schema};
use crate::status::Status;
use crate::value::MessageValue;
use prost_reflect::DescriptorPool;
use std::future::Future;
use std::sync::Arc;
use tonic::transport::Channel;

#[derive(Debug, Clone)]
pub struct GrpcDispatcher<S = Channel> {
    client: GrpcClient<S>,
    pool: DescriptorPool,
    schema: Arc<Schema>,
    options: CodecOptions,
}

impl GrpcDispatcher<Channel> {
    /// Connects to the upstream server at `addr` before returning.
    pub async fn connect(
        addr: &str,
        pool: DescriptorPool,
        schema: Arc<Schema>,
        options: CodecOptions,
    ) -> Result<Self, ClientConnectError> {
        let client = GrpcClient::connect(addr).await?;
        Ok(Self::with_client(client, pool, schema, options))
    }

    /// Connects to the upstream server on the first call.
    pub fn connect_lazy(
        addr: &str,
        pool: DescriptorPool,
        schema: Arc<Schema>,
        options: CodecOptions,
    ) -> Result<Self, ClientConnectError> {
        let client = GrpcClient::connect_lazy(addr)?;
        Ok(Self::with_client(client, pool, schema, options))
    }
}

impl<S> GrpcDispatcher<S> {
    pub fn with_client(
        client: GrpcClient<S>,
        pool: DescriptorPool,
        schema: Arc<Schema>,
        options: CodecOptions,
    ) -> Self {
        Self {
            client,
            pool,
            schema,
            options,
        }
    }

    fn resolve(
        &self,
        method: &MethodDescriptor,
    ) -> Result<(prost_reflect::MethodDescriptor, WireCodec), Status> {
        let upstream = self
            .pool
            .get_service_by_name(method.service())
            .and_then(|service| service.methods().find(|m| m.name() == method.name()))
            .ok_or_else(|| {
                Status::unimplemented(format!(
                    "Method '{}' is not part of the upstream descriptors",
                    method.full_name()
                ))
            })?;

        let output_type = self.schema.message(method.output_type()).ok_or_else(|| {
            Status::internal(format!("Unknown response type '{}'", method.output_type()))
        })?;

        let codec = WireCodec::new(
            self.schema.clone(),
            self.options,
            upstream.input(),
            upstream.output(),
            output_type.clone(),
        );

        Ok((upstream, codec))
    }
}

impl Dispatcher for GrpcDispatcher<Channel> {
    fn invoke(
        &self,
        method: &MethodDescriptor,
        request: MessageValue,
    ) -> impl Future<Output = Result<MessageValue, Status>> + Send {
        let resolved = self.resolve(method);
        let mut client = self.client.clone();

        async move {
            let (upstream, codec) = resolved?;
            match client.unary(&upstream, codec, request).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(status)) => Err(Status::from(status)),
                Err(err) => {
                    tracing::warn!(method = %upstream.full_name(), "Upstream unavailable: {err}");
                    Err(Status::unavailable(err.to_string()))
                }
            }
        }
    }
}
