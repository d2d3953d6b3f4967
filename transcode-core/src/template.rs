//! # URL Templates
//!
//! Compiles the path templates of HTTP bindings (e.g. `/v1/shelves/{shelf}/books/{book.id}`)
//! into a [`UrlPattern`], and parses incoming request paths into a [`RequestPath`] that
//! patterns can be matched against.
//!
//! ## Template syntax
//!
//! ```text
//! Template = "/" [ Segments ] [ ":" Verb ]
//! Segment  = "*" | "**" | LITERAL | "{" FieldPath [ "=" ( "*" | "**" ) ] "}"
//! ```
//!
//! A `**` form consumes every remaining path segment and must therefore come last.
use percent_encoding::percent_decode_str;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("Template '{0}' must start with '/'")]
    MissingLeadingSlash(String),

    #[error("Template '{0}' has unbalanced braces")]
    UnbalancedBraces(String),

    #[error("Template '{0}' contains an empty segment")]
    EmptySegment(String),

    #[error("Template '{template}' has a malformed segment '{segment}'")]
    MalformedSegment { template: String, segment: String },

    #[error("Template '{0}' declares a capture with an empty name")]
    EmptyCaptureName(String),

    #[error("Template '{template}' declares an invalid field path '{name}'")]
    InvalidCaptureName { template: String, name: String },

    #[error("Template '{template}' captures field '{name}' more than once")]
    DuplicateCapture { template: String, name: String },

    #[error("Template '{0}' uses '**' before the last segment")]
    DoubleWildcardNotLast(String),

    #[error(
        "Template '{template}' uses unsupported variable pattern '{pattern}', only '*' and '**' are allowed"
    )]
    UnsupportedVariablePattern { template: String, pattern: String },

    #[error("Template '{template}' declares an invalid custom verb '{verb}'")]
    InvalidVerb { template: String, verb: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("Request path '{0}' is not absolute")]
    NotAbsolute(String),

    #[error("Request path segment '{0}' is not valid percent-encoded UTF-8")]
    InvalidEncoding(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// `{field}` or `{field=*}`: one segment written to `field`.
    Capture(String),
    /// `*`: one segment, discarded.
    SingleWildcard,
    /// `**`: every remaining segment, discarded.
    DoubleWildcard,
    /// `{field=**}`: every remaining segment written to `field`.
    CaptureRest(String),
}

impl Segment {
    fn is_multi(&self) -> bool {
        matches!(self, Segment::DoubleWildcard | Segment::CaptureRest(_))
    }

    fn capture_name(&self) -> Option<&str> {
        match self {
            Segment::Capture(name) | Segment::CaptureRest(name) => Some(name),
            _ => None,
        }
    }
}

/// A compiled URL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    template: String,
    segments: Vec<Segment>,
    verb: Option<String>,
}

/// Values extracted by a successful [`UrlPattern::match_path`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMatch {
    /// Values of the named captures, in template order.
    pub captures: Vec<String>,
    /// Values matched by unnamed `*` and `**` segments, in template order.
    pub wildcards: Vec<String>,
}

impl UrlPattern {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let rest = template
            .strip_prefix('/')
            .ok_or_else(|| TemplateError::MissingLeadingSlash(template.to_string()))?;

        let parts = split_top_level(template, rest)?;
        let (path, verb) = (parts.path, parts.verb);

        if let Some(verb) = verb {
            if verb.is_empty() || verb.contains('/') {
                return Err(TemplateError::InvalidVerb {
                    template: template.to_string(),
                    verb: verb.to_string(),
                });
            }
        }

        let mut segments = Vec::with_capacity(path.len());
        for part in path {
            segments.push(parse_segment(template, part)?);
        }

        if let Some(pos) = segments.iter().position(Segment::is_multi) {
            if pos + 1 != segments.len() {
                return Err(TemplateError::DoubleWildcardNotLast(template.to_string()));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for name in segments.iter().filter_map(Segment::capture_name) {
            if !seen.insert(name) {
                return Err(TemplateError::DuplicateCapture {
                    template: template.to_string(),
                    name: name.to_string(),
                });
            }
        }

        Ok(Self {
            template: template.to_string(),
            segments,
            verb: verb.map(str::to_string),
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn verb(&self) -> Option<&str> {
        self.verb.as_deref()
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Field paths of the named captures, in template order.
    pub fn capture_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(Segment::capture_name)
    }

    /// Matches a request path, returning the captured values.
    ///
    /// The custom verb must match exactly: a pattern without a verb never matches a path
    /// carrying one, and the other way around. Single-segment positions never match a
    /// segment whose decoded form contains `/`.
    pub fn match_path(&self, path: &RequestPath) -> Option<PathMatch> {
        if self.verb.as_deref() != path.verb() {
            return None;
        }

        let actual = path.segments();
        let mut result = PathMatch::default();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::DoubleWildcard => {
                    result.wildcards.push(actual.get(i..)?.join("/"));
                    return Some(result);
                }
                Segment::CaptureRest(_) => {
                    let rest = actual.get(i..).filter(|rest| !rest.is_empty())?;
                    result.captures.push(rest.join("/"));
                    return Some(result);
                }
                _ => {}
            }

            let value = actual.get(i)?;
            match segment {
                Segment::Literal(literal) if literal == value => {}
                Segment::Capture(_) if is_single_value(value) => result.captures.push(value.clone()),
                Segment::SingleWildcard if is_single_value(value) => {
                    result.wildcards.push(value.clone())
                }
                _ => return None,
            }
        }

        (actual.len() == self.segments.len()).then_some(result)
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

fn is_single_value(value: &str) -> bool {
    !value.is_empty() && !value.contains('/')
}

struct TemplateParts<'a> {
    path: Vec<&'a str>,
    verb: Option<&'a str>,
}

/// Splits the template body on top-level `/` and extracts a trailing `:verb`,
/// ignoring separators that appear inside braces.
fn split_top_level<'a>(template: &str, rest: &'a str) -> Result<TemplateParts<'a>, TemplateError> {
    let mut depth = 0usize;
    let mut colon = None;

    for (i, c) in rest.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| TemplateError::UnbalancedBraces(template.to_string()))?
            }
            ':' if depth == 0 => colon = Some(i),
            _ => {}
        }
    }
    if depth != 0 {
        return Err(TemplateError::UnbalancedBraces(template.to_string()));
    }

    let (body, verb) = match colon {
        Some(i) => (&rest[..i], Some(&rest[i + 1..])),
        None => (rest, None),
    };

    let mut path = Vec::new();
    if !body.is_empty() {
        let mut depth = 0usize;
        let mut start = 0;
        for (i, c) in body.char_indices() {
            match c {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                '/' if depth == 0 => {
                    path.push(&body[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }
        path.push(&body[start..]);
    }

    Ok(TemplateParts { path, verb })
}

fn parse_segment(template: &str, part: &str) -> Result<Segment, TemplateError> {
    let malformed = || TemplateError::MalformedSegment {
        template: template.to_string(),
        segment: part.to_string(),
    };

    match part {
        "" => Err(TemplateError::EmptySegment(template.to_string())),
        "*" => Ok(Segment::SingleWildcard),
        "**" => Ok(Segment::DoubleWildcard),
        _ if part.starts_with('{') => {
            let inner = part
                .strip_prefix('{')
                .and_then(|p| p.strip_suffix('}'))
                .ok_or_else(malformed)?;
            let (name, pattern) = match inner.split_once('=') {
                Some((name, pattern)) => (name, Some(pattern)),
                None => (inner, None),
            };

            if name.is_empty() {
                return Err(TemplateError::EmptyCaptureName(template.to_string()));
            }
            if !is_field_path(name) {
                return Err(TemplateError::InvalidCaptureName {
                    template: template.to_string(),
                    name: name.to_string(),
                });
            }

            match pattern {
                None | Some("*") => Ok(Segment::Capture(name.to_string())),
                Some("**") => Ok(Segment::CaptureRest(name.to_string())),
                Some(pattern) => Err(TemplateError::UnsupportedVariablePattern {
                    template: template.to_string(),
                    pattern: pattern.to_string(),
                }),
            }
        }
        _ if part.contains(['{', '}', '*']) => Err(malformed()),
        _ => Ok(Segment::Literal(part.to_string())),
    }
}

fn is_field_path(name: &str) -> bool {
    name.split('.').all(|ident| {
        let mut chars = ident.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// An incoming request path split into percent-decoded segments and an optional custom verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
    segments: Vec<String>,
    verb: Option<String>,
}

impl RequestPath {
    /// Parses the path component of a request URI (no query string).
    ///
    /// The custom verb is whatever follows the last `:` of the final segment. Segments
    /// are split on the raw `/` before decoding, so an encoded `%2F` stays inside its segment.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let rest = raw
            .strip_prefix('/')
            .ok_or_else(|| PathError::NotAbsolute(raw.to_string()))?;

        let last_start = rest.rfind('/').map_or(0, |i| i + 1);
        let (body, verb) = match rest[last_start..].rfind(':') {
            Some(colon) if last_start + colon + 1 < rest.len() => {
                let at = last_start + colon;
                (&rest[..at], Some(decode(&rest[at + 1..])?))
            }
            _ => (rest, None),
        };

        let segments = if body.is_empty() {
            Vec::new()
        } else {
            body.split('/').map(decode).collect::<Result<_, _>>()?
        };

        Ok(Self { segments, verb })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn verb(&self) -> Option<&str> {
        self.verb.as_deref()
    }
}

fn decode(segment: &str) -> Result<String, PathError> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| PathError::InvalidEncoding(segment.to_string()))
}
