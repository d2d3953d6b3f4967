//! # HTTP Bindings
//!
//! An [`HttpBinding`] attaches one (HTTP method, URL template, body selector) triple to an
//! RPC method. Bindings are usually declared through [`HttpRule`]s, which mirror the
//! `google.api.HttpRule` message: one primary pattern plus any number of additional bindings.
use crate::template::{TemplateError, UrlPattern};
use http::Method;
use serde::Deserialize;
use std::fmt;

/// Which part of the request message the HTTP body is decoded into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySelector {
    /// The body is ignored.
    None,
    /// `*`: the body is the whole request message.
    Whole,
    /// The body is decoded into the field at this dotted path.
    Field(String),
}

impl BodySelector {
    pub fn parse(selector: Option<&str>) -> Self {
        match selector {
            None | Some("") => BodySelector::None,
            Some("*") => BodySelector::Whole,
            Some(path) => BodySelector::Field(path.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpBinding {
    method: Method,
    pattern: UrlPattern,
    body: BodySelector,
    response_body: Option<String>,
}

impl HttpBinding {
    pub fn new(method: Method, template: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            method,
            pattern: UrlPattern::parse(template)?,
            body: BodySelector::None,
            response_body: None,
        })
    }

    pub fn get(template: &str) -> Result<Self, TemplateError> {
        Self::new(Method::GET, template)
    }

    pub fn post(template: &str) -> Result<Self, TemplateError> {
        Self::new(Method::POST, template)
    }

    pub fn put(template: &str) -> Result<Self, TemplateError> {
        Self::new(Method::PUT, template)
    }

    pub fn patch(template: &str) -> Result<Self, TemplateError> {
        Self::new(Method::PATCH, template)
    }

    pub fn delete(template: &str) -> Result<Self, TemplateError> {
        Self::new(Method::DELETE, template)
    }

    /// Sets the body selector: `*` for the whole request, or a dotted field path.
    pub fn with_body(mut self, selector: &str) -> Self {
        self.body = BodySelector::parse(Some(selector));
        self
    }

    /// Renders only this response field instead of the whole response message.
    pub fn with_response_body(mut self, field: &str) -> Self {
        self.response_body = Some(field.to_string()).filter(|f| !f.is_empty());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &UrlPattern {
        &self.pattern
    }

    pub fn body(&self) -> &BodySelector {
        &self.body
    }

    pub fn response_body(&self) -> Option<&str> {
        self.response_body.as_deref()
    }
}

impl fmt::Display for HttpBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.pattern)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("HTTP rule '{0}' does not declare a pattern")]
    MissingPattern(String),

    #[error("HTTP rule '{0}' declares more than one pattern")]
    MultiplePatterns(String),

    #[error("HTTP rule '{selector}' uses an invalid custom method '{kind}'")]
    InvalidMethod { selector: String, kind: String },

    #[error("Additional bindings of '{0}' cannot declare further additional bindings")]
    NestedAdditionalBindings(String),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// A custom HTTP method pattern, e.g. `{ kind = "HEAD", path = "/v1/shelves" }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomPattern {
    pub kind: String,
    pub path: String,
}

/// The declarative form of a method's HTTP mapping.
///
/// Deserializes from the same shape as the `http.rules` section of a gRPC service
/// configuration, and is also what `google.api.http` annotations are read into.
/// Unknown keys are rejected so a misspelled `body` does not silently drop the mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpRule {
    /// The method this rule applies to (`package.Service.Method`).
    pub selector: String,
    pub get: Option<String>,
    pub put: Option<String>,
    pub post: Option<String>,
    pub delete: Option<String>,
    pub patch: Option<String>,
    pub custom: Option<CustomPattern>,
    pub body: Option<String>,
    pub response_body: Option<String>,
    pub additional_bindings: Vec<HttpRule>,
}

impl HttpRule {
    /// Compiles the rule into its primary binding followed by its additional bindings.
    pub fn bindings(&self) -> Result<Vec<HttpBinding>, RuleError> {
        let mut bindings = vec![self.binding()?];
        for additional in &self.additional_bindings {
            if !additional.additional_bindings.is_empty() {
                return Err(RuleError::NestedAdditionalBindings(self.selector.clone()));
            }
            bindings.push(additional.binding()?);
        }
        Ok(bindings)
    }

    fn binding(&self) -> Result<HttpBinding, RuleError> {
        let mut patterns = [
            (Method::GET, self.get.as_deref()),
            (Method::PUT, self.put.as_deref()),
            (Method::POST, self.post.as_deref()),
            (Method::DELETE, self.delete.as_deref()),
            (Method::PATCH, self.patch.as_deref()),
        ]
        .into_iter()
        .filter_map(|(method, path)| path.map(|path| (method, path.to_string())))
        .collect::<Vec<_>>();

        if let Some(custom) = &self.custom {
            let method = Method::from_bytes(custom.kind.as_bytes()).map_err(|_| {
                RuleError::InvalidMethod {
                    selector: self.selector.clone(),
                    kind: custom.kind.clone(),
                }
            })?;
            patterns.push((method, custom.path.clone()));
        }

        let (method, template) = match patterns.len() {
            0 => return Err(RuleError::MissingPattern(self.selector.clone())),
            1 => patterns.remove(0),
            _ => return Err(RuleError::MultiplePatterns(self.selector.clone())),
        };

        let mut binding = HttpBinding::new(method, &template)?;
        binding.body = BodySelector::parse(self.body.as_deref());
        if let Some(response_body) = &self.response_body {
            binding = binding.with_response_body(response_body);
        }
        Ok(binding)
    }
}
