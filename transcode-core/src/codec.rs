//! # JSON Codec
//!
//! Converts between `serde_json` values and [`MessageValue`] trees, following the protobuf
//! JSON mapping:
//!
//! * 64-bit integers are written as decimal strings; strings and integral numbers are read.
//! * Enums are written by name; names and numbers are read.
//! * Bytes are base64 strings.
//! * `Any` is an object with an `@type` key followed by the inlined fields of the packed
//!   message. Unresolvable type identifiers are carried as opaque JSON and written back
//!   unchanged.
//!
//! Errors carry the path of the offending field (e.g. `shelf.books[2].title`).
use crate::schema::{EnumDescriptor, FieldDescriptor, FieldKind, MessageDescriptor, Schema};
use crate::value::{AnyValue, MessageValue, Value};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use serde_json::{Map, Number, Value as JsonValue};
use std::sync::Arc;

const TYPE_KEY: &str = "@type";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    /// Skip JSON keys that do not name a field instead of failing.
    pub ignore_unknown_fields: bool,
    /// Emit declared field names instead of lowerCamelCase JSON names.
    pub use_proto_names: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            ignore_unknown_fields: true,
            use_proto_names: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown field '{field}' in message '{message}'")]
    UnknownField { field: String, message: String },

    #[error("Expected a JSON object for message '{message}', found {found}")]
    NotAnObject { message: String, found: &'static str },

    #[error("Type '{0}' is not part of the schema")]
    UnknownType(String),
}

impl CodecError {
    fn invalid(reason: impl Into<String>) -> Self {
        CodecError::InvalidValue {
            field: String::new(),
            reason: reason.into(),
        }
    }

    /// Re-roots the error under `parent` (a field name, a dotted path, or an `[index]`).
    pub fn within(self, parent: &str) -> Self {
        match self {
            CodecError::InvalidValue { field, reason } => CodecError::InvalidValue {
                field: join_path(parent, &field),
                reason,
            },
            CodecError::UnknownField { field, message } => CodecError::UnknownField {
                field: join_path(parent, &field),
                message,
            },
            CodecError::NotAnObject { found, .. } => CodecError::InvalidValue {
                field: parent.to_string(),
                reason: format!("expected a JSON object, found {found}"),
            },
            other => other,
        }
    }
}

fn join_path(parent: &str, child: &str) -> String {
    if child.is_empty() {
        parent.to_string()
    } else if parent.is_empty() || child.starts_with('[') {
        format!("{parent}{child}")
    } else {
        format!("{parent}.{child}")
    }
}

/// A descriptor-driven JSON codec bound to a [`Schema`].
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec<'s> {
    schema: &'s Schema,
    options: CodecOptions,
}

impl<'s> JsonCodec<'s> {
    pub fn new(schema: &'s Schema, options: CodecOptions) -> Self {
        Self { schema, options }
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    pub fn options(&self) -> CodecOptions {
        self.options
    }

    // --- Decoding ---

    pub fn decode_message(
        &self,
        descriptor: &Arc<MessageDescriptor>,
        json: &JsonValue,
    ) -> Result<MessageValue, CodecError> {
        let JsonValue::Object(object) = json else {
            return Err(CodecError::NotAnObject {
                message: descriptor.full_name().to_string(),
                found: json_type(json),
            });
        };
        self.decode_object(descriptor, object.iter())
    }

    fn decode_object<'j>(
        &self,
        descriptor: &Arc<MessageDescriptor>,
        entries: impl Iterator<Item = (&'j String, &'j JsonValue)>,
    ) -> Result<MessageValue, CodecError> {
        let mut message = MessageValue::new(descriptor.clone());

        for (key, value) in entries {
            let Some((index, field)) = descriptor.field_by_json_name(key) else {
                if self.options.ignore_unknown_fields {
                    continue;
                }
                return Err(CodecError::UnknownField {
                    field: key.clone(),
                    message: descriptor.full_name().to_string(),
                });
            };

            if let Some(value) = self
                .decode_field(field, value)
                .map_err(|e| e.within(field.name()))?
            {
                message.set_index(index, value);
            }
        }

        Ok(message)
    }

    /// Decodes the JSON for one field. `null` yields `None` (the field stays absent).
    ///
    /// Error paths are relative to the field itself.
    pub fn decode_field(
        &self,
        field: &FieldDescriptor,
        json: &JsonValue,
    ) -> Result<Option<Value>, CodecError> {
        if json.is_null() {
            return Ok(None);
        }

        if !field.is_repeated() {
            return self.decode_single(field, json).map(Some);
        }

        let JsonValue::Array(items) = json else {
            return Err(CodecError::invalid(format!(
                "expected a JSON array, found {}",
                json_type(json)
            )));
        };

        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                self.decode_single(field, item)
                    .map_err(|e| e.within(&format!("[{i}]")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|values| Some(Value::List(values)))
    }

    /// Converts a single text token (a path segment or a query parameter value) into a value
    /// of the field's kind.
    pub fn parse_text(&self, field: &FieldDescriptor, text: &str) -> Result<Value, CodecError> {
        let json = match field.kind() {
            FieldKind::Bool => match text {
                "true" => JsonValue::Bool(true),
                "false" => JsonValue::Bool(false),
                _ => {
                    return Err(CodecError::invalid(format!(
                        "expected 'true' or 'false', found '{text}'"
                    )));
                }
            },
            FieldKind::Enum(_) => match text.parse::<i64>() {
                Ok(number) => JsonValue::Number(number.into()),
                Err(_) => JsonValue::String(text.to_string()),
            },
            FieldKind::Message(name) => {
                return Err(CodecError::invalid(format!(
                    "message field of type '{name}' cannot be set from text"
                )));
            }
            FieldKind::Any => {
                return Err(CodecError::invalid("Any field cannot be set from text"));
            }
            _ => JsonValue::String(text.to_string()),
        };
        self.decode_single(field, &json)
    }

    fn decode_single(&self, field: &FieldDescriptor, json: &JsonValue) -> Result<Value, CodecError> {
        match field.kind() {
            FieldKind::Message(type_name) => {
                let descriptor = self
                    .schema
                    .message(type_name)
                    .ok_or_else(|| CodecError::UnknownType(type_name.clone()))?;
                self.decode_message(descriptor, json).map(Value::Message)
            }
            FieldKind::Any => self.decode_any(json).map(Value::Any),
            FieldKind::Enum(type_name) => {
                let descriptor = self
                    .schema
                    .enum_type(type_name)
                    .ok_or_else(|| CodecError::UnknownType(type_name.clone()))?;
                decode_enum(field, descriptor, json).map(Value::Enum)
            }
            kind => decode_scalar(kind, json).map_err(CodecError::invalid),
        }
    }

    fn decode_any(&self, json: &JsonValue) -> Result<AnyValue, CodecError> {
        let JsonValue::Object(object) = json else {
            return Err(CodecError::NotAnObject {
                message: crate::schema::ANY_TYPE_NAME.to_string(),
                found: json_type(json),
            });
        };

        let type_url = object
            .get(TYPE_KEY)
            .and_then(JsonValue::as_str)
            .ok_or_else(|| CodecError::InvalidValue {
                field: TYPE_KEY.to_string(),
                reason: "missing or non-string type identifier".to_string(),
            })?;

        match self.schema.resolve_any(type_url) {
            Some(descriptor) => {
                let fields = object.iter().filter(|(key, _)| key.as_str() != TYPE_KEY);
                let message = self.decode_object(descriptor, fields)?;
                Ok(AnyValue::Known {
                    type_url: type_url.to_string(),
                    message,
                })
            }
            None => {
                tracing::debug!(type_url, "Keeping Any payload with unknown type as opaque JSON");
                Ok(AnyValue::Opaque(object.clone()))
            }
        }
    }

    // --- Encoding ---

    pub fn encode_message(&self, message: &MessageValue) -> JsonValue {
        JsonValue::Object(self.encode_fields(message))
    }

    fn encode_fields(&self, message: &MessageValue) -> Map<String, JsonValue> {
        let mut object = Map::new();
        for (field, value) in message.fields() {
            let key = if self.options.use_proto_names {
                field.name()
            } else {
                field.json_name()
            };
            object.insert(key.to_string(), self.encode_value(field, value));
        }
        object
    }

    pub fn encode_value(&self, field: &FieldDescriptor, value: &Value) -> JsonValue {
        match value {
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int32(n) => JsonValue::from(*n),
            Value::Uint32(n) => JsonValue::from(*n),
            Value::Int64(n) => JsonValue::String(n.to_string()),
            Value::Uint64(n) => JsonValue::String(n.to_string()),
            Value::Float(f) => encode_float(f.to_string().parse().unwrap_or(f64::from(*f))),
            Value::Double(d) => encode_float(*d),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Bytes(bytes) => JsonValue::String(STANDARD.encode(bytes)),
            Value::Enum(number) => self.encode_enum(field, *number),
            Value::Message(message) => self.encode_message(message),
            Value::Any(any) => self.encode_any(any),
            Value::List(items) => {
                JsonValue::Array(items.iter().map(|item| self.encode_value(field, item)).collect())
            }
        }
    }

    /// The JSON written for an absent field when it is rendered on its own.
    pub fn default_value(&self, field: &FieldDescriptor) -> JsonValue {
        if field.is_repeated() {
            return JsonValue::Array(Vec::new());
        }
        match field.kind() {
            FieldKind::Bool => JsonValue::Bool(false),
            FieldKind::Int32 | FieldKind::Uint32 => JsonValue::from(0),
            FieldKind::Int64 | FieldKind::Uint64 => JsonValue::String("0".to_string()),
            FieldKind::Float | FieldKind::Double => JsonValue::from(0),
            FieldKind::String | FieldKind::Bytes => JsonValue::String(String::new()),
            FieldKind::Enum(_) => self.encode_enum(field, 0),
            FieldKind::Message(_) | FieldKind::Any => JsonValue::Object(Map::new()),
        }
    }

    fn encode_enum(&self, field: &FieldDescriptor, number: i32) -> JsonValue {
        let name = match field.kind() {
            FieldKind::Enum(type_name) => self
                .schema
                .enum_type(type_name)
                .and_then(|e| e.name_of(number)),
            _ => None,
        };
        match name {
            Some(name) => JsonValue::String(name.to_string()),
            None => JsonValue::from(number),
        }
    }

    fn encode_any(&self, any: &AnyValue) -> JsonValue {
        match any {
            AnyValue::Opaque(object) => JsonValue::Object(object.clone()),
            AnyValue::Known { type_url, message } => {
                let mut object = Map::new();
                object.insert(TYPE_KEY.to_string(), JsonValue::String(type_url.clone()));
                object.extend(self.encode_fields(message));
                JsonValue::Object(object)
            }
        }
    }
}

fn decode_enum(
    field: &FieldDescriptor,
    descriptor: &EnumDescriptor,
    json: &JsonValue,
) -> Result<i32, CodecError> {
    match json {
        JsonValue::String(name) => descriptor.number_of(name).ok_or_else(|| {
            CodecError::invalid(format!(
                "unknown value '{name}' for enum '{}'",
                descriptor.full_name()
            ))
        }),
        JsonValue::Number(number) => {
            let number = number
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| CodecError::invalid(format!("enum number {number} is out of range")))?;
            if descriptor.name_of(number).is_some() || field.allows_unknown_enum() {
                Ok(number)
            } else {
                Err(CodecError::invalid(format!(
                    "unknown number {number} for enum '{}'",
                    descriptor.full_name()
                )))
            }
        }
        other => Err(CodecError::invalid(format!(
            "expected an enum name or number, found {}",
            json_type(other)
        ))),
    }
}

fn decode_scalar(kind: &FieldKind, json: &JsonValue) -> Result<Value, String> {
    match kind {
        FieldKind::Int32 => decode_integer(json).map(Value::Int32),
        FieldKind::Int64 => decode_integer(json).map(Value::Int64),
        FieldKind::Uint32 => decode_integer(json).map(Value::Uint32),
        FieldKind::Uint64 => decode_integer(json).map(Value::Uint64),
        FieldKind::Float => decode_float(json).map(|f| Value::Float(f as f32)),
        FieldKind::Double => decode_float(json).map(Value::Double),
        FieldKind::Bool => match json {
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            other => Err(format!("expected a boolean, found {}", json_type(other))),
        },
        FieldKind::String => match json {
            JsonValue::String(s) => Ok(Value::String(s.clone())),
            other => Err(format!("expected a string, found {}", json_type(other))),
        },
        FieldKind::Bytes => match json {
            JsonValue::String(s) => decode_base64(s).map(Value::Bytes),
            other => Err(format!("expected a base64 string, found {}", json_type(other))),
        },
        FieldKind::Enum(_) | FieldKind::Message(_) | FieldKind::Any => {
            Err("not a scalar field".to_string())
        }
    }
}

fn decode_integer<T>(json: &JsonValue) -> Result<T, String>
where
    T: TryFrom<i64> + TryFrom<u64> + std::str::FromStr,
{
    let parsed = match json {
        JsonValue::String(s) => s.parse::<T>().ok(),
        JsonValue::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => T::try_from(i).ok(),
            (None, Some(u)) => T::try_from(u).ok(),
            _ => None,
        },
        other => return Err(format!("expected an integer, found {}", json_type(other))),
    };
    parsed.ok_or_else(|| format!("'{json}' is not a valid integer for this field"))
}

fn decode_float(json: &JsonValue) -> Result<f64, String> {
    match json {
        JsonValue::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("'{n}' is not a valid number")),
        JsonValue::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            _ => s.parse().map_err(|_| format!("'{s}' is not a valid number")),
        },
        other => Err(format!("expected a number, found {}", json_type(other))),
    }
}

fn encode_float(value: f64) -> JsonValue {
    if value.is_nan() {
        JsonValue::String("NaN".to_string())
    } else if value.is_infinite() {
        let text = if value > 0.0 { "Infinity" } else { "-Infinity" };
        JsonValue::String(text.to_string())
    } else {
        Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
    }
}

fn decode_base64(text: &str) -> Result<Vec<u8>, String> {
    [STANDARD, URL_SAFE, STANDARD_NO_PAD, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(text).ok())
        .ok_or_else(|| "invalid base64 string".to_string())
}

fn json_type(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
