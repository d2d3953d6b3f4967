//! # Wire Codec
//!
//! A `tonic::codec::Codec` carrying engine messages over the wire.
//!
//! 1. **Encoder**: renders the [`MessageValue`] as protobuf JSON, loads it into a
//!    `prost_reflect::DynamicMessage` of the upstream input type and writes the binary form.
//! 2. **Decoder**: merges the bytes into a `DynamicMessage` of the upstream output type,
//!    serializes it as protobuf JSON and decodes that into a [`MessageValue`].
//!
//! Going through JSON keeps a single set of mapping rules (the engine's codec) for every
//! field kind, `Any` included.
use crate::codec::{CodecOptions, JsonCodec};
use crate::schema::{MessageDescriptor as EngineMessage, Schema};
use crate::value::MessageValue;
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use std::sync::Arc;
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// Shared state of both codec halves.
#[derive(Debug, Clone)]
struct Context {
    schema: Arc<Schema>,
    options: CodecOptions,
}

impl Context {
    fn codec(&self) -> JsonCodec<'_> {
        JsonCodec::new(&self.schema, self.options)
    }
}

pub struct WireCodec {
    context: Context,
    /// Upstream descriptor of the request message.
    input: MessageDescriptor,
    /// Upstream descriptor of the response message.
    output: MessageDescriptor,
    /// Engine descriptor of the response message.
    output_type: Arc<EngineMessage>,
}

impl WireCodec {
    pub fn new(
        schema: Arc<Schema>,
        options: CodecOptions,
        input: MessageDescriptor,
        output: MessageDescriptor,
        output_type: Arc<EngineMessage>,
    ) -> Self {
        Self {
            context: Context { schema, options },
            input,
            output,
            output_type,
        }
    }
}

impl Codec for WireCodec {
    type Encode = MessageValue;
    type Decode = MessageValue;

    type Encoder = WireEncoder;
    type Decoder = WireDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        WireEncoder {
            context: self.context.clone(),
            descriptor: self.input.clone(),
        }
    }

    fn decoder(&mut self) -> Self::Decoder {
        WireDecoder {
            context: self.context.clone(),
            descriptor: self.output.clone(),
            output_type: self.output_type.clone(),
        }
    }
}

pub struct WireEncoder {
    context: Context,
    descriptor: MessageDescriptor,
}

impl Encoder for WireEncoder {
    type Item = MessageValue;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        let message = to_dynamic(&self.context.codec(), &self.descriptor, &item)?;
        message.encode_raw(dst);
        Ok(())
    }
}

pub struct WireDecoder {
    context: Context,
    descriptor: MessageDescriptor,
    output_type: Arc<EngineMessage>,
}

impl Decoder for WireDecoder {
    type Item = MessageValue;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut message = DynamicMessage::new(self.descriptor.clone());
        message
            .merge(src)
            .map_err(|e| Status::internal(format!("Failed to decode Protobuf bytes: {e}")))?;

        from_dynamic(&self.context.codec(), &self.output_type, &message).map(Some)
    }
}

/// Converts an engine message into a `DynamicMessage` of `descriptor`.
pub(crate) fn to_dynamic(
    codec: &JsonCodec<'_>,
    descriptor: &MessageDescriptor,
    message: &MessageValue,
) -> Result<DynamicMessage, Status> {
    let json = codec.encode_message(message);
    DynamicMessage::deserialize(descriptor.clone(), json).map_err(|e| {
        Status::invalid_argument(format!(
            "Request does not match the upstream message '{}': {e}",
            descriptor.full_name()
        ))
    })
}

/// Converts a `DynamicMessage` into an engine message of type `output_type`.
pub(crate) fn from_dynamic(
    codec: &JsonCodec<'_>,
    output_type: &Arc<EngineMessage>,
    message: &DynamicMessage,
) -> Result<MessageValue, Status> {
    let json = serde_json::to_value(message)
        .map_err(|e| Status::internal(format!("Failed to map response to JSON: {e}")))?;

    codec.decode_message(output_type, &json).map_err(|e| {
        Status::internal(format!(
            "Upstream response does not match '{}': {e}",
            output_type.full_name()
        ))
    })
}
