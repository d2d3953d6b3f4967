//! # Descriptor Model
//!
//! The in-memory description of the services the transcoder exposes.
//!
//! A [`Schema`] owns every [`ServiceDescriptor`], [`MessageDescriptor`] and [`EnumDescriptor`]
//! known to the engine. Message and enum fields reference their types by fully qualified name,
//! which keeps recursive message types representable without reference cycles. The schema is
//! also the registry used to resolve the type identifier carried by `Any` values.
//!
//! Schemas are built once (by hand through [`SchemaBuilder`], or from a `prost-reflect`
//! descriptor pool via [`crate::reflect`]) and are immutable afterwards.
use crate::binding::HttpBinding;
use std::collections::HashMap;
use std::sync::Arc;

/// Fully qualified name of the well-known `Any` message.
pub const ANY_TYPE_NAME: &str = "google.protobuf.Any";

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Type '{0}' is defined more than once")]
    DuplicateType(String),

    #[error("Service '{0}' is defined more than once")]
    DuplicateService(String),

    #[error("Method '{method}' references unknown message type '{type_name}'")]
    UnknownMethodType { method: String, type_name: String },

    #[error("Field '{field}' of message '{message}' references unknown type '{type_name}'")]
    UnknownFieldType {
        message: String,
        field: String,
        type_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldPathError {
    #[error("Field path is empty")]
    Empty,

    #[error("Field '{segment}' does not exist on message '{message}' (path '{path}')")]
    UnknownField {
        path: String,
        segment: String,
        message: String,
    },

    #[error("Field '{segment}' in path '{path}' is not a singular message and cannot be traversed")]
    NotTraversable { path: String, segment: String },

    #[error("Message type '{0}' is not part of the schema")]
    UnknownMessage(String),
}

/// The semantic type of a field.
///
/// Message and enum kinds carry the fully qualified name of the referenced type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Float,
    Double,
    Bool,
    String,
    Bytes,
    Enum(String),
    Message(String),
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    json_name: String,
    kind: FieldKind,
    repeated: bool,
    allow_unknown_enum: bool,
}

impl FieldDescriptor {
    /// Creates a singular field. The JSON name defaults to the lowerCamelCase form of `name`.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        let json_name = to_lower_camel_case(&name);
        Self {
            name,
            json_name,
            kind,
            repeated: false,
            allow_unknown_enum: false,
        }
    }

    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    /// Keeps unknown enum numbers instead of rejecting them.
    pub fn allow_unknown_enum(mut self) -> Self {
        self.allow_unknown_enum = true;
        self
    }

    pub fn with_json_name(mut self, json_name: impl Into<String>) -> Self {
        self.json_name = json_name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn json_name(&self) -> &str {
        &self.json_name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_repeated(&self) -> bool {
        self.repeated
    }

    pub fn allows_unknown_enum(&self) -> bool {
        self.allow_unknown_enum
    }

    /// Whether a value of this field can be written from a single text token
    /// (a path segment or a query parameter).
    pub fn is_scalar(&self) -> bool {
        !matches!(self.kind, FieldKind::Message(_) | FieldKind::Any)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    full_name: String,
    fields: Vec<FieldDescriptor>,
}

impl MessageDescriptor {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Fully qualified name, e.g. `bookstore.Shelf`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Short name, e.g. `Shelf`.
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit_once('.')
            .map_or(self.full_name.as_str(), |(_, name)| name)
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }

    pub fn field_by_name(&self, name: &str) -> Option<(usize, &FieldDescriptor)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }

    /// Looks a field up by its JSON name first, then by its declared name.
    pub fn field_by_json_name(&self, key: &str) -> Option<(usize, &FieldDescriptor)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.json_name == key)
            .or_else(|| self.field_by_name(key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    full_name: String,
    values: Vec<(String, i32)>,
}

impl EnumDescriptor {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            values: Vec::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, number: i32) -> Self {
        self.values.push((name.into(), number));
        self
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, i32)> {
        self.values.iter().map(|(name, number)| (name.as_str(), *number))
    }

    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, number)| *number)
    }

    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, n)| *n == number)
            .map(|(name, _)| name.as_str())
    }
}

/// An RPC method together with its HTTP bindings.
///
/// The first binding is the primary one; any further entries are additional bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    name: String,
    service: String,
    input_type: String,
    output_type: String,
    bindings: Vec<HttpBinding>,
}

impl MethodDescriptor {
    pub fn new(
        name: impl Into<String>,
        input_type: impl Into<String>,
        output_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            service: String::new(),
            input_type: input_type.into(),
            output_type: output_type.into(),
            bindings: Vec::new(),
        }
    }

    pub fn with_binding(mut self, binding: HttpBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully qualified name of the owning service.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// `package.Service.Method`, the form used by HTTP rule selectors and handler tables.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.service, self.name)
    }

    /// The HTTP/2 path of the method on a gRPC server (e.g. `/package.Service/Method`).
    pub fn grpc_path(&self) -> String {
        format!("/{}/{}", self.service, self.name)
    }

    pub fn input_type(&self) -> &str {
        &self.input_type
    }

    pub fn output_type(&self) -> &str {
        &self.output_type
    }

    pub fn bindings(&self) -> &[HttpBinding] {
        &self.bindings
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    full_name: String,
    methods: Vec<Arc<MethodDescriptor>>,
}

impl ServiceDescriptor {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            methods: Vec::new(),
        }
    }

    pub fn with_method(mut self, mut method: MethodDescriptor) -> Self {
        method.service = self.full_name.clone();
        self.methods.push(Arc::new(method));
        self
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }
}

/// The registry of every service, message and enum the engine knows about.
#[derive(Debug, Default)]
pub struct Schema {
    services: Vec<ServiceDescriptor>,
    messages: HashMap<String, Arc<MessageDescriptor>>,
    enums: HashMap<String, Arc<EnumDescriptor>>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn service(&self, full_name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.full_name == full_name)
    }

    /// Finds a method by its `package.Service.Method` name.
    pub fn method(&self, full_name: &str) -> Option<&Arc<MethodDescriptor>> {
        let (service, method) = full_name.rsplit_once('.')?;
        self.service(service)?
            .methods
            .iter()
            .find(|m| m.name == method)
    }

    pub fn message(&self, full_name: &str) -> Option<&Arc<MessageDescriptor>> {
        self.messages.get(full_name)
    }

    pub fn enum_type(&self, full_name: &str) -> Option<&Arc<EnumDescriptor>> {
        self.enums.get(full_name)
    }

    /// Resolves an `Any` type identifier (e.g. `type.googleapis.com/bookstore.Shelf`)
    /// against the known message types. Only the part after the last `/` is significant.
    pub fn resolve_any(&self, type_url: &str) -> Option<&Arc<MessageDescriptor>> {
        let name = type_url.rsplit_once('/').map_or(type_url, |(_, name)| name);
        self.message(name)
    }

    /// Resolves a dotted field path (e.g. `book.author`) against `root`.
    ///
    /// Every segment but the last must name a singular message field. The resulting
    /// [`FieldPath`] carries field indices, so no name lookups happen when it is applied.
    pub fn resolve_path(
        &self,
        root: &Arc<MessageDescriptor>,
        dotted: &str,
    ) -> Result<FieldPath, FieldPathError> {
        if dotted.is_empty() {
            return Err(FieldPathError::Empty);
        }

        let mut steps = Vec::new();
        let mut owner = root.clone();
        let mut segments = dotted.split('.').peekable();

        while let Some(segment) = segments.next() {
            let (index, field) = owner
                .field_by_name(segment)
                .or_else(|| owner.field_by_json_name(segment))
                .ok_or_else(|| FieldPathError::UnknownField {
                    path: dotted.to_string(),
                    segment: segment.to_string(),
                    message: owner.full_name.clone(),
                })?;
            let field = field.clone();

            steps.push(PathStep {
                index,
                owner: owner.clone(),
            });

            if segments.peek().is_some() {
                owner = match field.kind() {
                    FieldKind::Message(type_name) if !field.is_repeated() => self
                        .message(type_name)
                        .cloned()
                        .ok_or_else(|| FieldPathError::UnknownMessage(type_name.clone()))?,
                    _ => {
                        return Err(FieldPathError::NotTraversable {
                            path: dotted.to_string(),
                            segment: segment.to_string(),
                        });
                    }
                };
            }
        }

        Ok(FieldPath {
            dotted: dotted.to_string(),
            steps,
        })
    }
}

/// Builds a [`Schema`], checking that every referenced type is defined.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    services: Vec<ServiceDescriptor>,
    messages: Vec<MessageDescriptor>,
    enums: Vec<EnumDescriptor>,
}

impl SchemaBuilder {
    pub fn service(mut self, service: ServiceDescriptor) -> Self {
        self.services.push(service);
        self
    }

    pub fn message(mut self, message: MessageDescriptor) -> Self {
        self.messages.push(message);
        self
    }

    pub fn enum_type(mut self, enum_type: EnumDescriptor) -> Self {
        self.enums.push(enum_type);
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut messages = HashMap::with_capacity(self.messages.len());
        for message in self.messages {
            let name = message.full_name.clone();
            if messages.insert(name.clone(), Arc::new(message)).is_some() {
                return Err(SchemaError::DuplicateType(name));
            }
        }

        let mut enums = HashMap::with_capacity(self.enums.len());
        for enum_type in self.enums {
            let name = enum_type.full_name.clone();
            if messages.contains_key(&name) || enums.insert(name.clone(), Arc::new(enum_type)).is_some() {
                return Err(SchemaError::DuplicateType(name));
            }
        }

        for message in messages.values() {
            for field in &message.fields {
                let known = match &field.kind {
                    FieldKind::Message(type_name) => messages.contains_key(type_name),
                    FieldKind::Enum(type_name) => enums.contains_key(type_name),
                    _ => true,
                };
                if !known {
                    let type_name = match &field.kind {
                        FieldKind::Message(name) | FieldKind::Enum(name) => name.clone(),
                        _ => String::new(),
                    };
                    return Err(SchemaError::UnknownFieldType {
                        message: message.full_name.clone(),
                        field: field.name.clone(),
                        type_name,
                    });
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        for service in &self.services {
            if !seen.insert(service.full_name.as_str()) {
                return Err(SchemaError::DuplicateService(service.full_name.clone()));
            }
            for method in &service.methods {
                for type_name in [&method.input_type, &method.output_type] {
                    if !messages.contains_key(type_name) {
                        return Err(SchemaError::UnknownMethodType {
                            method: method.full_name(),
                            type_name: type_name.clone(),
                        });
                    }
                }
            }
        }

        Ok(Schema {
            services: self.services,
            messages,
            enums,
        })
    }
}

/// A dotted field path resolved into field indices.
#[derive(Debug, Clone)]
pub struct FieldPath {
    dotted: String,
    steps: Vec<PathStep>,
}

#[derive(Debug, Clone)]
pub(crate) struct PathStep {
    /// Index of the field within `owner`.
    pub(crate) index: usize,
    /// The message type that declares the field.
    pub(crate) owner: Arc<MessageDescriptor>,
}

impl FieldPath {
    pub fn as_str(&self) -> &str {
        &self.dotted
    }

    /// The descriptor of the field the path ends on.
    pub fn leaf(&self) -> &FieldDescriptor {
        let last = self.steps.last().expect("resolved paths have at least one step");
        &last.owner.fields[last.index]
    }

    pub(crate) fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Whether `dotted` names this field or a field nested below it.
    pub fn covers(&self, dotted: &str) -> bool {
        dotted == self.dotted
            || dotted
                .strip_prefix(self.dotted.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl PartialEq for FieldPath {
    fn eq(&self, other: &Self) -> bool {
        self.dotted == other.dotted
            && self.steps.len() == other.steps.len()
            && self
                .steps
                .iter()
                .zip(&other.steps)
                .all(|(a, b)| a.index == b.index && a.owner.full_name == b.owner.full_name)
    }
}

impl Eq for FieldPath {}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.dotted)
    }
}

/// `shelf_id` -> `shelfId`, following the protobuf JSON name rule.
fn to_lower_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
