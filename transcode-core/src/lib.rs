//! # Transcode Core
//!
//! `transcode-core` is the engine behind the `transcode` gateway. It serves gRPC methods as
//! plain HTTP/JSON endpoints: requests are matched against the URL templates declared for
//! each method, turned into typed request messages, handed to a pluggable dispatcher and the
//! result is rendered back as JSON.
//!
//! ## Key Components
//!
//! * **[`template`]:** Compiles URL templates (`/v1/shelves/{shelf}/books/{book.id}`,
//!   `/v1/{name=**}`, `/v1/shelves/{shelf}:verb`) and matches request paths against them.
//! * **[`route`]:** The immutable route table. First registered binding wins.
//! * **[`mapper`]:** Builds request messages out of the body, query string and path captures.
//! * **[`codec`]:** The protobuf JSON mapping (64-bit integers as strings, enums by name,
//!   `Any` with `@type`).
//! * **[`dispatch`]:** The [`Dispatcher`] seam, with an in-process [`HandlerRegistry`].
//! * **[`render`]:** Success and status responses, including the status-to-HTTP table.
//! * **[`Transcoder`]:** Everything above, wired together.
//!
//! ## Upstream gRPC
//!
//! [`grpc::GrpcDispatcher`] forwards calls to a real gRPC server using a dynamic `tonic`
//! codec, and [`reflect::schema_from_pool`] builds a [`Schema`] out of a `prost-reflect`
//! descriptor pool, reading `google.api.http` annotations.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod binding;
pub mod codec;
pub mod dispatch;
pub mod grpc;
pub mod mapper;
pub mod reflect;
pub mod render;
pub mod route;
pub mod schema;
pub mod status;
pub mod template;
pub mod transcoder;
pub mod value;

pub use binding::{HttpBinding, HttpRule};
pub use codec::{CodecOptions, JsonCodec};
pub use dispatch::{Dispatcher, HandlerRegistry};
pub use schema::Schema;
pub use status::{Code, Status};
pub use transcoder::{TranscodeError, Transcoder, TranscoderOptions};
pub use value::{AnyValue, MessageValue, Value};

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
