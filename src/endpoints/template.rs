//! Response templates.
//!
//! A template is literal text with `{...}` placeholders:
//!
//! ```text
//! {name}              path parameter
//! {query.page}        query string parameter
//! {body.user.name}    field of the JSON request body (dotted path)
//! {request.method}    also request.path and request.id
//! {state.count}       field of the snapshot (stateful endpoints only)
//! {{ and }}           literal braces
//! ```
//!
//! Templates are parsed once at load time; rendering never guesses a value
//! for a placeholder it cannot resolve.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::routing::matcher::is_identifier;

/// Request metadata fields exposed to templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestField {
    Method,
    Path,
    Id,
}

/// A parsed placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    Param(String),
    Query(String),
    Body(Vec<String>),
    State(Vec<String>),
    Request(RequestField),
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::Param(name) => write!(f, "{name}"),
            Placeholder::Query(name) => write!(f, "query.{name}"),
            Placeholder::Body(path) => write!(f, "body.{}", path.join(".")),
            Placeholder::State(path) => write!(f, "state.{}", path.join(".")),
            Placeholder::Request(RequestField::Method) => f.write_str("request.method"),
            Placeholder::Request(RequestField::Path) => f.write_str("request.path"),
            Placeholder::Request(RequestField::Id) => f.write_str("request.id"),
        }
    }
}

impl Placeholder {
    fn parse(text: &str) -> Result<Self, TemplateSyntaxError> {
        let parts: Vec<&str> = text.split('.').collect();
        let well_formed = match parts.split_first() {
            Some((head, rest)) => {
                is_identifier(head) && rest.iter().all(|p| is_identifier(p) || is_index(p))
            }
            None => false,
        };
        if !well_formed {
            return Err(TemplateSyntaxError::InvalidPlaceholder(text.to_string()));
        }

        let owned = |rest: &[&str]| rest.iter().map(|p| p.to_string()).collect::<Vec<_>>();
        match parts.as_slice() {
            [name] => Ok(Placeholder::Param(name.to_string())),
            ["query", name] => Ok(Placeholder::Query(name.to_string())),
            ["body", rest @ ..] => Ok(Placeholder::Body(owned(rest))),
            ["state", rest @ ..] => Ok(Placeholder::State(owned(rest))),
            ["request", "method"] => Ok(Placeholder::Request(RequestField::Method)),
            ["request", "path"] => Ok(Placeholder::Request(RequestField::Path)),
            ["request", "id"] => Ok(Placeholder::Request(RequestField::Id)),
            ["query" | "request", ..] => {
                Err(TemplateSyntaxError::InvalidPlaceholder(text.to_string()))
            }
            [namespace, ..] => Err(TemplateSyntaxError::UnknownNamespace(namespace.to_string())),
            [] => Err(TemplateSyntaxError::InvalidPlaceholder(text.to_string())),
        }
    }
}

/// Errors detected while parsing a template at load time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateSyntaxError {
    #[error("unclosed '{{' at byte {0}")]
    Unclosed(usize),

    #[error("unmatched '}}' at byte {0}; write '}}}}' for a literal brace")]
    UnmatchedClose(usize),

    #[error("invalid placeholder '{{{0}}}'")]
    InvalidPlaceholder(String),

    #[error("unknown placeholder namespace '{0}'")]
    UnknownNamespace(String),
}

/// Errors raised while rendering a template for a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unresolved placeholder '{{{placeholder}}}': {reason}")]
    Unresolved {
        placeholder: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Placeholder(Placeholder),
}

/// A parsed response template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

/// Values a template can draw from when rendering.
#[derive(Debug, Clone, Copy)]
pub struct TemplateScope<'a> {
    pub params: &'a HashMap<String, String>,
    pub query: &'a HashMap<String, String>,
    pub body: Option<&'a Value>,
    pub state: Option<&'a BTreeMap<String, Value>>,
    pub method: &'a str,
    pub path: &'a str,
    pub request_id: &'a str,
}

impl Template {
    /// Parse template source.
    pub fn parse(source: &str) -> Result<Self, TemplateSyntaxError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            match c {
                '{' => {
                    if matches!(chars.peek(), Some((_, '{'))) {
                        chars.next();
                        literal.push('{');
                        continue;
                    }
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(TemplateSyntaxError::Unclosed(offset));
                    }
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(Part::Placeholder(Placeholder::parse(&name)?));
                }
                '}' => {
                    if matches!(chars.peek(), Some((_, '}'))) {
                        chars.next();
                        literal.push('}');
                        continue;
                    }
                    return Err(TemplateSyntaxError::UnmatchedClose(offset));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.parts.iter().filter_map(|p| match p {
            Part::Placeholder(ph) => Some(ph),
            Part::Literal(_) => None,
        })
    }

    /// Whether rendering needs the parsed JSON request body.
    pub fn references_body(&self) -> bool {
        self.placeholders().any(|p| matches!(p, Placeholder::Body(_)))
    }

    /// Substitute every placeholder, failing on the first unresolved one.
    pub fn render(&self, scope: &TemplateScope<'_>) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Placeholder(placeholder) => out.push_str(&resolve(placeholder, scope)?),
            }
        }
        Ok(out)
    }
}

fn resolve(placeholder: &Placeholder, scope: &TemplateScope<'_>) -> Result<String, TemplateError> {
    let unresolved = |reason| TemplateError::Unresolved {
        placeholder: placeholder.to_string(),
        reason,
    };

    match placeholder {
        Placeholder::Param(name) => scope
            .params
            .get(name)
            .cloned()
            .ok_or_else(|| unresolved("path parameter is not bound")),
        Placeholder::Query(name) => scope
            .query
            .get(name)
            .cloned()
            .ok_or_else(|| unresolved("query parameter is missing")),
        Placeholder::Body(path) => {
            let body = scope.body.ok_or_else(|| unresolved("request has no JSON body"))?;
            lookup(body, path)
                .map(value_to_text)
                .ok_or_else(|| unresolved("request body has no such field"))
        }
        Placeholder::State(path) => {
            let state = scope.state.ok_or_else(|| unresolved("no snapshot state in scope"))?;
            let (first, rest) = path
                .split_first()
                .ok_or_else(|| unresolved("empty state path"))?;
            state
                .get(first)
                .and_then(|value| lookup(value, rest))
                .map(value_to_text)
                .ok_or_else(|| unresolved("snapshot has no such field"))
        }
        Placeholder::Request(RequestField::Method) => Ok(scope.method.to_string()),
        Placeholder::Request(RequestField::Path) => Ok(scope.path.to_string()),
        Placeholder::Request(RequestField::Id) => Ok(scope.request_id.to_string()),
    }
}

fn is_index(part: &str) -> bool {
    !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit())
}

fn lookup<'v>(value: &'v Value, path: &[String]) -> Option<&'v Value> {
    path.iter().try_fold(value, |node, key| match node {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
