//! # Route Table
//!
//! Every HTTP binding of every method, compiled and resolved against the schema once, in
//! declaration order: methods in schema order, each method's primary binding before its
//! additional bindings.
//!
//! Resolution is "first registered wins": when several bindings match the same request,
//! the one registered earliest is used. [`RouteTable::candidates`] exposes the full set for
//! callers that want to inspect overlaps.
//!
//! The table is immutable once built and is meant to be shared (e.g. behind an `Arc`)
//! between all request handling tasks.
use crate::binding::{BodySelector, HttpBinding};
use crate::schema::{FieldPath, FieldPathError, MessageDescriptor, MethodDescriptor, Schema};
use crate::template::RequestPath;
use http::Method;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Method '{method}' references unknown message type '{type_name}'")]
    UnknownType { method: String, type_name: String },

    #[error("Binding '{binding}' of method '{method}' has an invalid field path: {source}")]
    FieldPath {
        method: String,
        binding: String,
        source: FieldPathError,
    },

    #[error(
        "Binding '{binding}' of method '{method}' captures '{field}', which is not a singular scalar field"
    )]
    NonScalarCapture {
        method: String,
        binding: String,
        field: String,
    },
}

/// Where the HTTP body of a route is decoded to, pre-resolved against the request type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyTarget {
    None,
    Whole,
    Field(FieldPath),
}

/// A binding compiled against its method's request and response types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    method: Arc<MethodDescriptor>,
    binding: HttpBinding,
    binding_index: usize,
    input: Arc<MessageDescriptor>,
    output: Arc<MessageDescriptor>,
    captures: Vec<FieldPath>,
    body: BodyTarget,
    response_body: Option<FieldPath>,
}

impl Route {
    fn compile(
        schema: &Schema,
        method: &Arc<MethodDescriptor>,
        binding: &HttpBinding,
        binding_index: usize,
    ) -> Result<Self, RouteError> {
        let lookup = |type_name: &str| {
            schema
                .message(type_name)
                .cloned()
                .ok_or_else(|| RouteError::UnknownType {
                    method: method.full_name(),
                    type_name: type_name.to_string(),
                })
        };
        let input = lookup(method.input_type())?;
        let output = lookup(method.output_type())?;

        let path_error = |source| RouteError::FieldPath {
            method: method.full_name(),
            binding: binding.to_string(),
            source,
        };

        let mut captures = Vec::new();
        for name in binding.pattern().capture_names() {
            let path = schema.resolve_path(&input, name).map_err(path_error)?;
            let leaf = path.leaf();
            if !leaf.is_scalar() || leaf.is_repeated() {
                return Err(RouteError::NonScalarCapture {
                    method: method.full_name(),
                    binding: binding.to_string(),
                    field: name.to_string(),
                });
            }
            captures.push(path);
        }

        let body = match binding.body() {
            BodySelector::None => BodyTarget::None,
            BodySelector::Whole => BodyTarget::Whole,
            BodySelector::Field(name) => {
                BodyTarget::Field(schema.resolve_path(&input, name).map_err(path_error)?)
            }
        };

        let response_body = binding
            .response_body()
            .map(|name| schema.resolve_path(&output, name))
            .transpose()
            .map_err(path_error)?;

        Ok(Self {
            method: method.clone(),
            binding: binding.clone(),
            binding_index,
            input,
            output,
            captures,
            body,
            response_body,
        })
    }

    pub fn method(&self) -> &Arc<MethodDescriptor> {
        &self.method
    }

    pub fn binding(&self) -> &HttpBinding {
        &self.binding
    }

    /// Position of the binding within its method: `0` for the primary binding.
    pub fn binding_index(&self) -> usize {
        self.binding_index
    }

    pub fn is_additional_binding(&self) -> bool {
        self.binding_index > 0
    }

    pub fn input(&self) -> &Arc<MessageDescriptor> {
        &self.input
    }

    pub fn output(&self) -> &Arc<MessageDescriptor> {
        &self.output
    }

    /// Resolved capture paths, in template order.
    pub fn captures(&self) -> &[FieldPath] {
        &self.captures
    }

    pub fn body(&self) -> &BodyTarget {
        &self.body
    }

    pub fn response_body(&self) -> Option<&FieldPath> {
        self.response_body.as_ref()
    }

    fn matches(&self, method: &Method, path: &RequestPath) -> Option<RouteMatch<'_>> {
        if self.binding.method() != method {
            return None;
        }

        let matched = self.binding.pattern().match_path(path)?;
        let captures = self.captures.iter().zip(matched.captures).collect();

        Some(RouteMatch {
            route: self,
            captures,
            wildcards: matched.wildcards,
        })
    }
}

/// A route together with the values extracted from the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'t> {
    pub route: &'t Route,
    /// `(field path, raw text)` pairs in template order. Text is percent-decoded.
    pub captures: Vec<(&'t FieldPath, String)>,
    /// Values of unnamed `*` and `**` segments.
    pub wildcards: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every binding of every method in `schema`, in declaration order.
    pub fn from_schema(schema: &Schema) -> Result<Self, RouteError> {
        let mut table = Self::new();
        for service in schema.services() {
            for method in service.methods() {
                for binding in method.bindings() {
                    table.register(schema, method, binding)?;
                }
            }
        }
        Ok(table)
    }

    /// Appends a binding of `method`. Bindings registered earlier win ties.
    pub fn register(
        &mut self,
        schema: &Schema,
        method: &Arc<MethodDescriptor>,
        binding: &HttpBinding,
    ) -> Result<(), RouteError> {
        let binding_index = self
            .routes
            .iter()
            .filter(|route| Arc::ptr_eq(&route.method, method))
            .count();

        let route = Route::compile(schema, method, binding, binding_index)?;

        tracing::debug!(
            method = %method.full_name(),
            binding = %binding,
            additional = route.is_additional_binding(),
            "Registered route"
        );

        self.routes.push(route);
        Ok(())
    }

    /// Returns the first registered route matching the request, if any.
    pub fn find(&self, method: &Method, path: &RequestPath) -> Option<RouteMatch<'_>> {
        self.routes.iter().find_map(|route| route.matches(method, path))
    }

    /// Every matching route, in registration order.
    pub fn candidates(&self, method: &Method, path: &RequestPath) -> Vec<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter_map(|route| route.matches(method, path))
            .collect()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
