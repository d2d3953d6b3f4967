//! # Schema from Descriptor Pools
//!
//! Builds the engine [`Schema`] from a `prost-reflect` [`DescriptorPool`], typically decoded
//! from a binary `FileDescriptorSet` produced by `protoc --descriptor_set_out`.
//!
//! HTTP bindings come from two places:
//!
//! * `google.api.http` method options, when the pool contains the annotation definitions;
//! * explicitly provided [`HttpRule`]s, keyed by selector, which replace the annotation of
//!   the method they select.
//!
//! Streaming methods are skipped, as are map fields (they have no counterpart in the engine
//! value model). Enum fields whose type comes from a proto3 file accept undeclared numbers.
use crate::binding::{HttpRule, RuleError};
use crate::schema::{
    ANY_TYPE_NAME, EnumDescriptor, FieldDescriptor, FieldKind, MessageDescriptor, MethodDescriptor, Schema,
    SchemaError, ServiceDescriptor,
};
use prost_reflect::{DescriptorPool, DynamicMessage, Kind, SerializeOptions, Syntax};
use std::collections::HashMap;

const HTTP_ANNOTATION: &str = "google.api.http";

#[derive(Debug, thiserror::Error)]
pub enum ReflectError {
    #[error("Service '{0}' not found in the descriptor set")]
    ServiceNotFound(String),

    #[error("HTTP rule selector '{0}' does not name a unary method of an exposed service")]
    UnknownSelector(String),

    #[error("Invalid HTTP rule for '{selector}': {source}")]
    InvalidRule {
        selector: String,
        #[source]
        source: RuleError,
    },

    #[error("Invalid 'google.api.http' annotation on '{method}': {reason}")]
    InvalidAnnotation { method: String, reason: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Converts `pool` into a [`Schema`].
///
/// `services` restricts the exposed services (all services when empty). `rules` override the
/// `google.api.http` annotation of the methods they select.
pub fn schema_from_pool(
    pool: &DescriptorPool,
    services: &[String],
    rules: &[HttpRule],
) -> Result<Schema, ReflectError> {
    let mut builder = Schema::builder();

    for message in pool.all_messages().filter(|m| !m.is_map_entry()) {
        builder = builder.message(convert_message(&message));
    }

    for enum_type in pool.all_enums() {
        let mut converted = EnumDescriptor::new(enum_type.full_name());
        for value in enum_type.values() {
            converted = converted.with_value(value.name(), value.number());
        }
        builder = builder.enum_type(converted);
    }

    let selected = if services.is_empty() {
        pool.services().collect::<Vec<_>>()
    } else {
        services
            .iter()
            .map(|name| {
                pool.get_service_by_name(name)
                    .ok_or_else(|| ReflectError::ServiceNotFound(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut overrides: HashMap<&str, &HttpRule> = rules.iter().map(|r| (r.selector.as_str(), r)).collect();
    let annotation = pool.get_extension_by_name(HTTP_ANNOTATION);

    for service in selected {
        let mut converted = ServiceDescriptor::new(service.full_name());

        for method in service.methods() {
            if method.is_client_streaming() || method.is_server_streaming() {
                tracing::warn!(method = %method.full_name(), "Skipping streaming method");
                continue;
            }

            let rule = match overrides.remove(method.full_name()) {
                Some(rule) => Some(rule.clone()),
                None => match &annotation {
                    Some(extension) if method.options().has_extension(extension) => {
                        let options = method.options();
                        let value = options.get_extension(extension);
                        let message = value.as_message().ok_or_else(|| ReflectError::InvalidAnnotation {
                            method: method.full_name().to_string(),
                            reason: "expected an HttpRule message".to_string(),
                        })?;
                        Some(rule_from_annotation(method.full_name(), message)?)
                    }
                    _ => None,
                },
            };

            let mut descriptor =
                MethodDescriptor::new(method.name(), method.input().full_name(), method.output().full_name());

            if let Some(rule) = rule {
                let bindings = rule.bindings().map_err(|source| ReflectError::InvalidRule {
                    selector: method.full_name().to_string(),
                    source,
                })?;
                for binding in bindings {
                    descriptor = descriptor.with_binding(binding);
                }
            }

            converted = converted.with_method(descriptor);
        }

        builder = builder.service(converted);
    }

    if let Some(selector) = overrides.into_keys().next() {
        return Err(ReflectError::UnknownSelector(selector.to_string()));
    }

    Ok(builder.build()?)
}

fn convert_message(message: &prost_reflect::MessageDescriptor) -> MessageDescriptor {
    let mut converted = MessageDescriptor::new(message.full_name());

    for field in message.fields() {
        if field.is_map() {
            tracing::warn!(
                message = %message.full_name(),
                field = %field.name(),
                "Skipping map field"
            );
            continue;
        }

        let kind = match field.kind() {
            Kind::Double => FieldKind::Double,
            Kind::Float => FieldKind::Float,
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => FieldKind::Int32,
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => FieldKind::Int64,
            Kind::Uint32 | Kind::Fixed32 => FieldKind::Uint32,
            Kind::Uint64 | Kind::Fixed64 => FieldKind::Uint64,
            Kind::Bool => FieldKind::Bool,
            Kind::String => FieldKind::String,
            Kind::Bytes => FieldKind::Bytes,
            Kind::Enum(enum_type) => FieldKind::Enum(enum_type.full_name().to_string()),
            Kind::Message(inner) if inner.full_name() == ANY_TYPE_NAME => FieldKind::Any,
            Kind::Message(inner) => FieldKind::Message(inner.full_name().to_string()),
        };

        let mut converted_field = FieldDescriptor::new(field.name(), kind).with_json_name(field.json_name());
        if field.is_list() {
            converted_field = converted_field.repeated();
        }
        // proto3 enums are open: undeclared numbers are valid values
        if let Kind::Enum(enum_type) = field.kind() {
            if enum_type.parent_file().syntax() == Syntax::Proto3 {
                converted_field = converted_field.allow_unknown_enum();
            }
        }
        converted = converted.with_field(converted_field);
    }

    converted
}

/// Reads a `google.api.HttpRule` option value into an [`HttpRule`].
fn rule_from_annotation(method: &str, message: &DynamicMessage) -> Result<HttpRule, ReflectError> {
    let invalid = |reason: String| ReflectError::InvalidAnnotation {
        method: method.to_string(),
        reason,
    };

    let options = SerializeOptions::new().use_proto_field_name(true);
    let json = message
        .serialize_with_options(serde_json::value::Serializer, &options)
        .map_err(|e| invalid(e.to_string()))?;

    let mut rule: HttpRule = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
    rule.selector = method.to_string();
    Ok(rule)
}
