//! # Dynamic Values
//!
//! The typed payload tree flowing through the engine. A [`MessageValue`] mirrors one
//! [`MessageDescriptor`] instance: one optional slot per declared field, where an empty slot
//! means the field is absent. Repeated fields hold a [`Value::List`].
use crate::schema::{FieldDescriptor, FieldPath, MessageDescriptor};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    /// An enum number. It may not correspond to a declared value when the field tolerates
    /// unknown enum values.
    Enum(i32),
    Message(MessageValue),
    Any(AnyValue),
    List(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) | Value::Enum(n) => Some(i64::from(*n)),
            Value::Int64(n) => Some(*n),
            Value::Uint32(n) => Some(i64::from(*n)),
            Value::Uint64(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageValue> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<MessageValue> for Value {
    fn from(value: MessageValue) -> Self {
        Value::Message(value)
    }
}

/// The payload of an `Any` field.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyValue {
    /// The type identifier resolved to a known message type.
    Known {
        type_url: String,
        message: MessageValue,
    },
    /// The type identifier is unknown; the JSON object is carried as-is.
    Opaque(serde_json::Map<String, serde_json::Value>),
}

impl AnyValue {
    /// Wraps a message using the conventional `type.googleapis.com/` prefix.
    pub fn pack(message: MessageValue) -> Self {
        AnyValue::Known {
            type_url: format!("type.googleapis.com/{}", message.descriptor().full_name()),
            message,
        }
    }

    pub fn type_url(&self) -> Option<&str> {
        match self {
            AnyValue::Known { type_url, .. } => Some(type_url),
            AnyValue::Opaque(object) => object.get("@type").and_then(serde_json::Value::as_str),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Message '{message}' has no field named '{field}'")]
pub struct UnknownFieldError {
    pub message: String,
    pub field: String,
}

#[derive(Debug, Clone)]
pub struct MessageValue {
    descriptor: Arc<MessageDescriptor>,
    fields: Vec<Option<Value>>,
}

impl MessageValue {
    /// Creates a message with every field absent.
    pub fn new(descriptor: Arc<MessageDescriptor>) -> Self {
        let fields = vec![None; descriptor.fields().len()];
        Self { descriptor, fields }
    }

    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let (index, _) = self.descriptor.field_by_name(name)?;
        self.get_index(index)
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)?.as_ref()
    }

    /// Sets a field by name. The value is expected to match the field's kind.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), UnknownFieldError> {
        let (index, _) =
            self.descriptor
                .field_by_name(name)
                .ok_or_else(|| UnknownFieldError {
                    message: self.descriptor.full_name().to_string(),
                    field: name.to_string(),
                })?;
        self.fields[index] = Some(value.into());
        Ok(())
    }

    /// Builder-style [`MessageValue::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self, UnknownFieldError> {
        self.set(name, value)?;
        Ok(self)
    }

    pub fn set_index(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.fields.get_mut(index) {
            *slot = Some(value);
        }
    }

    pub fn clear(&mut self, name: &str) {
        if let Some((index, _)) = self.descriptor.field_by_name(name) {
            self.fields[index] = None;
        }
    }

    /// Present fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldDescriptor, &Value)> {
        self.descriptor
            .fields()
            .iter()
            .zip(&self.fields)
            .filter_map(|(field, value)| value.as_ref().map(|value| (field, value)))
    }

    pub fn get_path(&self, path: &FieldPath) -> Option<&Value> {
        let (last, parents) = path.steps().split_last()?;
        let mut current = self;
        for step in parents {
            current = current.get_index(step.index)?.as_message()?;
        }
        current.get_index(last.index)
    }

    /// Writes `value` at `path`, creating intermediate messages as needed.
    pub fn set_path(&mut self, path: &FieldPath, value: Value) {
        if let Some(slot) = self.slot_mut(path) {
            *slot = Some(value);
        }
    }

    /// Appends `value` to the repeated field at `path`.
    pub fn push_path(&mut self, path: &FieldPath, value: Value) {
        if let Some(slot) = self.slot_mut(path) {
            match slot {
                Some(Value::List(items)) => items.push(value),
                _ => *slot = Some(Value::List(vec![value])),
            }
        }
    }

    fn slot_mut(&mut self, path: &FieldPath) -> Option<&mut Option<Value>> {
        let steps = path.steps();
        let (last, parents) = steps.split_last()?;

        let mut current = self;
        for (i, step) in parents.iter().enumerate() {
            // The next step is declared by the message stored in this step's field.
            let child_descriptor = &steps[i + 1].owner;
            let slot = current.fields.get_mut(step.index)?;
            if !matches!(slot, Some(Value::Message(_))) {
                *slot = Some(Value::Message(MessageValue::new(child_descriptor.clone())));
            }
            current = match slot {
                Some(Value::Message(message)) => message,
                _ => return None,
            };
        }

        current.fields.get_mut(last.index)
    }
}

impl PartialEq for MessageValue {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.full_name() == other.descriptor.full_name() && self.fields == other.fields
    }
}
