//! # Upstream gRPC Transport
//!
//! Forwards transcoded calls to a real gRPC server.
//!
//! Nothing here is generated code: the request and response messages are engine
//! [`crate::value::MessageValue`]s, converted to and from Protobuf bytes on the fly with the
//! `prost-reflect` descriptors of the upstream service.
pub mod client;
pub mod codec;
pub mod dispatcher;

pub use client::{ClientConnectError, GrpcClient, GrpcRequestError};
pub use dispatcher::GrpcDispatcher;
