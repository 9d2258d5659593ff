//! Endpoint entry validation.
//!
//! # Responsibilities
//! - Turn raw YAML entries into [`EndpointDefinition`]s
//! - Check methods, path patterns, behavior tags and their required fields
//! - Check template placeholders against the declared path
//! - Detect duplicate `(method, path)` declarations
//!
//! # Design Decisions
//! - Pure function over the parsed document; no I/O
//! - Returns every error found, each tagged with entry index and field
//! - Fields that belong to another behavior type are rejected, not ignored

use std::collections::HashMap;
use std::fmt;

use axum::http::HeaderValue;

use crate::endpoints::definition::{
    Behavior, EndpointDefinition, HttpMethod, ImageBehavior, Mutation, Rgba, StatefulBehavior,
};
use crate::endpoints::schema::{RawBehavior, RawEndpoint, RawMutation};
use crate::endpoints::template::{Placeholder, Template};
use crate::routing::matcher::PathPattern;
use crate::routing::RESERVED_PREFIX;
use crate::snapshot::is_valid_key;

/// Largest canvas side accepted in an endpoint file.
pub const MAX_CANVAS_DIMENSION: i64 = 8192;

const DEFAULT_FONT_SIZE: f32 = 24.0;
const DEFAULT_PADDING: u32 = 8;
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// A problem with one entry of the endpoint file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryError {
    pub index: usize,
    pub field: String,
    pub message: String,
}

impl EntryError {
    pub fn new(index: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            index,
            field: field.into(),
            message: message.into(),
        }
    }

    fn from_serde(index: usize, error: &serde_yaml::Error) -> Self {
        let message = error.to_string();
        // serde names the offending key between backticks
        let field = message
            .split('`')
            .nth(1)
            .map(str::to_string)
            .unwrap_or_else(|| "entry".to_string());
        Self::new(index, field, message)
    }
}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry {}: `{}` {}", self.index, self.field, self.message)
    }
}

struct Collector {
    index: usize,
    errors: Vec<EntryError>,
}

impl Collector {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(EntryError::new(self.index, field, message));
    }

    fn required<T>(&mut self, value: Option<T>, field: &str) -> Option<T> {
        if value.is_none() {
            self.push(field, "is required");
        }
        value
    }

    fn reject_foreign(
        &mut self,
        present: Vec<&'static str>,
        allowed: &[&str],
        prefix: &str,
        kind: &str,
    ) {
        for field in present {
            if !allowed.contains(&field) {
                self.push(format!("{prefix}.{field}"), format!("is not valid for '{kind}'"));
            }
        }
    }
}

/// Validate every entry of an endpoint document.
pub fn validate_entries(
    entries: &[serde_yaml::Value],
) -> Result<Vec<EndpointDefinition>, Vec<EntryError>> {
    let mut errors = Vec::new();
    let mut definitions = Vec::new();
    let mut declared: HashMap<(HttpMethod, String), usize> = HashMap::new();

    for (index, entry) in entries.iter().enumerate() {
        let raw: RawEndpoint = match serde_yaml::from_value(entry.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                errors.push(EntryError::from_serde(index, &e));
                continue;
            }
        };

        match validate_entry(index, raw) {
            Ok(definition) => {
                let key = (definition.method, definition.path.shape());
                if let Some(first) = declared.get(&key) {
                    errors.push(EntryError::new(
                        index,
                        "path",
                        format!(
                            "duplicates entry {first}: {} {} is already declared",
                            definition.method, definition.path
                        ),
                    ));
                } else {
                    declared.insert(key, index);
                    definitions.push(definition);
                }
            }
            Err(mut entry_errors) => errors.append(&mut entry_errors),
        }
    }

    if errors.is_empty() {
        Ok(definitions)
    } else {
        Err(errors)
    }
}

fn validate_entry(index: usize, raw: RawEndpoint) -> Result<EndpointDefinition, Vec<EntryError>> {
    let mut c = Collector {
        index,
        errors: Vec::new(),
    };

    let method = c.required(raw.method, "method").and_then(|name| {
        let parsed = HttpMethod::parse(&name);
        if parsed.is_none() {
            c.push(
                "method",
                format!("unsupported method '{name}' (expected GET, POST, PUT, DELETE or PATCH)"),
            );
        }
        parsed
    });

    let path = c.required(raw.path, "path").and_then(|p| match PathPattern::parse(&p) {
        Ok(pattern) if pattern.first_literal() == Some(RESERVED_PREFIX) => {
            c.push("path", format!("'/{RESERVED_PREFIX}' is reserved for built-in routes"));
            None
        }
        Ok(pattern) => Some(pattern),
        Err(e) => {
            c.push("path", format!("'{p}' is malformed: {e}"));
            None
        }
    });

    let status = raw.status.unwrap_or(200);
    if !(100..=599).contains(&status) {
        c.push("status", format!("{status} is not a valid HTTP status code"));
    }

    let behavior = c
        .required(raw.response, "response")
        .and_then(|b| validate_behavior(&mut c, b, path.as_ref()));

    if let Some(content_type) = &raw.content_type {
        if content_type.trim().is_empty() {
            c.push("content_type", "must not be empty");
        } else if HeaderValue::from_str(content_type).is_err() {
            c.push(
                "content_type",
                format!("'{content_type}' is not a valid header value"),
            );
        }
    }

    match (method, path, behavior) {
        (Some(method), Some(path), Some(behavior)) if c.errors.is_empty() => {
            let content_type = raw
                .content_type
                .unwrap_or_else(|| default_content_type(&behavior).to_string());
            Ok(EndpointDefinition {
                index,
                method,
                path,
                status,
                content_type,
                behavior,
            })
        }
        _ => Err(c.errors),
    }
}

fn default_content_type(behavior: &Behavior) -> &'static str {
    match behavior {
        Behavior::Static { .. } | Behavior::Templated { .. } => TEXT_CONTENT_TYPE,
        Behavior::Image(_) => "image/png",
        Behavior::Stateful(stateful) if stateful.template.is_some() => TEXT_CONTENT_TYPE,
        Behavior::Stateful(_) => "application/json",
    }
}

fn validate_behavior(
    c: &mut Collector,
    raw: RawBehavior,
    path: Option<&PathPattern>,
) -> Option<Behavior> {
    let Some(kind) = raw.kind.clone() else {
        c.push("response.type", "is required (static, template, image or stateful)");
        return None;
    };
    let present = raw.present_fields();

    match kind.as_str() {
        "static" => {
            c.reject_foreign(present, &["body"], "response", "static");
            let body = c.required(raw.body, "response.body")?;
            Some(Behavior::Static { body })
        }
        "template" => {
            c.reject_foreign(present, &["template"], "response", "template");
            let source = c.required(raw.template, "response.template")?;
            let template = check_template(c, "response.template", &source, path, false)?;
            Some(Behavior::Templated { template })
        }
        "image" => {
            c.reject_foreign(
                present,
                &[
                    "template",
                    "font",
                    "canvas",
                    "font_size",
                    "foreground",
                    "background",
                    "padding",
                    "max_text_len",
                ],
                "response",
                "image",
            );
            validate_image(c, raw, path).map(Behavior::Image)
        }
        "stateful" => {
            let allowed = &["snapshot", "mutation", "template"];
            c.reject_foreign(present, allowed, "response", "stateful");
            validate_stateful(c, raw, path).map(Behavior::Stateful)
        }
        other => {
            c.push(
                "response.type",
                format!(
                    "unknown behavior type '{other}' (expected static, template, image or stateful)"
                ),
            );
            None
        }
    }
}

fn validate_image(
    c: &mut Collector,
    raw: RawBehavior,
    path: Option<&PathPattern>,
) -> Option<ImageBehavior> {
    let template = c
        .required(raw.template, "response.template")
        .and_then(|source| check_template(c, "response.template", &source, path, false));

    let font = c.required(raw.font, "response.font").and_then(|font| {
        if font.trim().is_empty() {
            c.push("response.font", "must not be empty");
            None
        } else {
            Some(font)
        }
    });

    let canvas = c.required(raw.canvas, "response.canvas");
    let (width, height) = match canvas {
        Some(canvas) => (
            check_dimension(c, "response.canvas.width", canvas.width),
            check_dimension(c, "response.canvas.height", canvas.height),
        ),
        None => (None, None),
    };

    let font_size = raw.font_size.unwrap_or(DEFAULT_FONT_SIZE);
    if !(font_size.is_finite() && font_size > 0.0) {
        c.push("response.font_size", format!("{font_size} must be a positive number"));
    } else if let Some(height) = height.filter(|h| font_size > *h as f32) {
        c.push(
            "response.font_size",
            format!("{font_size} is larger than the canvas height {height}"),
        );
    }

    let foreground = check_color(c, "response.foreground", raw.foreground, Rgba::BLACK);
    let background = check_color(c, "response.background", raw.background, Rgba::WHITE);

    if raw.max_text_len == Some(0) {
        c.push("response.max_text_len", "must be positive");
    }

    Some(ImageBehavior {
        template: template?,
        font: font?,
        width: width?,
        height: height?,
        font_size,
        foreground: foreground?,
        background: background?,
        padding: raw.padding.unwrap_or(DEFAULT_PADDING),
        max_text_len: raw.max_text_len,
    })
}

fn check_dimension(c: &mut Collector, field: &str, value: Option<i64>) -> Option<u32> {
    let value = c.required(value, field)?;
    if value <= 0 || value > MAX_CANVAS_DIMENSION {
        c.push(field, format!("{value} must be between 1 and {MAX_CANVAS_DIMENSION}"));
        return None;
    }
    u32::try_from(value).ok()
}

fn check_color(
    c: &mut Collector,
    field: &str,
    value: Option<String>,
    default: Rgba,
) -> Option<Rgba> {
    match value {
        None => Some(default),
        Some(text) => {
            let parsed = Rgba::parse_hex(&text);
            if parsed.is_none() {
                c.push(field, format!("'{text}' is not a #rrggbb or #rrggbbaa color"));
            }
            parsed
        }
    }
}

fn validate_stateful(
    c: &mut Collector,
    raw: RawBehavior,
    path: Option<&PathPattern>,
) -> Option<StatefulBehavior> {
    let snapshot = c.required(raw.snapshot, "response.snapshot").and_then(|key| {
        if is_valid_key(&key) {
            Some(key)
        } else {
            c.push(
                "response.snapshot",
                format!(
                    "'{key}' must use only letters, digits, '_', '-' or '.' and not start with '.'"
                ),
            );
            None
        }
    });

    let mutation = match raw.mutation {
        Some(m) => validate_mutation(c, m, path),
        None => Some(Mutation::Read),
    };

    let template = match raw.template {
        Some(source) => Some(check_template(c, "response.template", &source, path, true)?),
        None => None,
    };

    Some(StatefulBehavior {
        snapshot: snapshot?,
        mutation: mutation?,
        template,
    })
}

fn validate_mutation(
    c: &mut Collector,
    raw: RawMutation,
    path: Option<&PathPattern>,
) -> Option<Mutation> {
    let op = c.required(raw.op.clone(), "response.mutation.op")?;
    let allowed: &[&str] = match op.as_str() {
        "read" | "reset" => &[],
        "increment" => &["field", "by"],
        "append" => &["field", "value", "max_len"],
        "set" => &["field"],
        other => {
            c.push(
                "response.mutation.op",
                format!(
                    "unknown mutation '{other}' (expected read, increment, append, set or reset)"
                ),
            );
            return None;
        }
    };
    c.reject_foreign(raw.present_fields(), allowed, "response.mutation", &op);

    if let Some(field) = &raw.field {
        if field.is_empty() {
            c.push("response.mutation.field", "must not be empty");
            return None;
        }
    }

    match op.as_str() {
        "read" => Some(Mutation::Read),
        "reset" => Some(Mutation::Reset),
        "increment" => Some(Mutation::Increment {
            field: raw.field.unwrap_or_else(|| "value".to_string()),
            by: raw.by.unwrap_or(1),
        }),
        "append" => {
            if raw.max_len == Some(0) {
                c.push("response.mutation.max_len", "must be positive");
                return None;
            }
            let value = match raw.value {
                Some(source) => {
                    let field = "response.mutation.value";
                    Some(check_template(c, field, &source, path, false)?)
                }
                None => None,
            };
            Some(Mutation::Append {
                field: raw.field.unwrap_or_else(|| "items".to_string()),
                value,
                max_len: raw.max_len,
            })
        }
        _ => Some(Mutation::Set { field: raw.field }),
    }
}

fn check_template(
    c: &mut Collector,
    field: &str,
    source: &str,
    path: Option<&PathPattern>,
    allow_state: bool,
) -> Option<Template> {
    let template = match Template::parse(source) {
        Ok(template) => template,
        Err(e) => {
            c.push(field, e.to_string());
            return None;
        }
    };

    let before = c.errors.len();
    for placeholder in template.placeholders() {
        match placeholder {
            Placeholder::Param(name) => {
                if let Some(path) = path {
                    if !path.has_param(name) {
                        c.push(
                            field,
                            format!("placeholder '{{{name}}}' is not a parameter of {path}"),
                        );
                    }
                }
            }
            Placeholder::State(_) if !allow_state => {
                c.push(
                    field,
                    format!(
                        "placeholder '{{{placeholder}}}' is only available to stateful responses"
                    ),
                );
            }
            _ => {}
        }
    }

    if c.errors.len() == before {
        Some(template)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(yaml: &str) -> Vec<serde_yaml::Value> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_valid_entries() {
        let defs = validate_entries(&entries(
            r#"
- method: get
  path: /hello/{name}
  response: { type: template, template: "Hello, {name}!" }
- method: POST
  path: /counter
  response:
    type: stateful
    snapshot: counter
    mutation: { op: increment }
"#,
        ))
        .unwrap();

        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].method, HttpMethod::Get);
        assert_eq!(defs[0].status, 200);
        assert_eq!(defs[0].content_type, TEXT_CONTENT_TYPE);
        assert_eq!(defs[1].content_type, "application/json");
        match &defs[1].behavior {
            Behavior::Stateful(s) => {
                assert_eq!(s.snapshot, "counter");
                assert!(matches!(
                    &s.mutation,
                    Mutation::Increment { field, by: 1 } if field == "value"
                ));
            }
            other => panic!("unexpected behavior {other:?}"),
        }
    }

    #[test]
    fn test_missing_fields_are_reported_with_index() {
        let errors = validate_entries(&entries(
            r#"
- method: GET
  path: /ok
  response: { type: static, body: ok }
- method: GET
  response: { type: static }
"#,
        ))
        .unwrap_err();

        assert!(errors.contains(&EntryError::new(1, "path", "is required")));
        assert!(errors.contains(&EntryError::new(1, "response.body", "is required")));
        assert!(errors.iter().all(|e| e.index == 1));
    }

    #[test]
    fn test_duplicate_method_and_path() {
        let errors = validate_entries(&entries(
            r#"
- { method: GET, path: "/a/{x}", response: { type: static, body: one } }
- { method: POST, path: "/a/{x}", response: { type: static, body: two } }
- { method: GET, path: "/a/{y}", response: { type: static, body: three } }
"#,
        ))
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].index, 2);
        assert_eq!(errors[0].field, "path");
        assert!(errors[0].message.contains("duplicates entry 0"));
    }

    #[test]
    fn test_unknown_tag_and_unknown_keys() {
        let errors = validate_entries(&entries(
            r#"
- { method: GET, path: /a, response: { type: echo } }
- { method: GET, path: /b, colour: red, response: { type: static, body: x } }
- { method: GET, path: /c, response: { type: static, body: x, font: a.ttf } }
"#,
        ))
        .unwrap_err();

        assert_eq!(errors[0].index, 0);
        assert_eq!(errors[0].field, "response.type");
        assert_eq!(errors[1].index, 1);
        assert_eq!(errors[1].field, "colour");
        assert_eq!(errors[2], EntryError::new(2, "response.font", "is not valid for 'static'"));
    }

    #[test]
    fn test_template_placeholders_checked_against_path() {
        let errors = validate_entries(&entries(
            r#"
- { method: GET, path: "/hello/{name}", response: { type: template, template: "Hi {nmae}" } }
- { method: GET, path: /s, response: { type: template, template: "{state.count}" } }
"#,
        ))
        .unwrap_err();

        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("{nmae}"));
        assert!(errors[1].message.contains("only available to stateful"));
    }

    #[test]
    fn test_image_requires_canvas_and_font() {
        let errors = validate_entries(&entries(
            r#"
- method: GET
  path: /badge
  response:
    type: image
    template: badge
    canvas: { width: 0, height: 40 }
"#,
        ))
        .unwrap_err();

        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["response.font", "response.canvas.width"]);
    }

    #[test]
    fn test_font_size_cannot_exceed_canvas() {
        let errors = validate_entries(&entries(
            r#"
- method: GET
  path: /badge
  response:
    type: image
    template: badge
    font: a.ttf
    canvas: { width: 10, height: 10 }
    font_size: 20000
"#,
        ))
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "response.font_size");
        assert!(errors[0].message.contains("canvas height 10"));
    }

    #[test]
    fn test_content_type_must_be_a_header_value() {
        let errors = validate_entries(&entries(
            "- { method: GET, path: /a, content_type: \"text/plain\\nx: y\", \
             response: { type: static, body: a } }\n",
        ))
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "content_type");
        assert!(errors[0].message.contains("not a valid header value"));
    }

    #[test]
    fn test_reserved_prefix_and_bad_method() {
        let errors = validate_entries(&entries(
            r#"
- { method: GET, path: /_engine/health, response: { type: static, body: x } }
- { method: HEAD, path: /x, response: { type: static, body: x } }
"#,
        ))
        .unwrap_err();

        assert_eq!(errors[0].field, "path");
        assert!(errors[0].message.contains("reserved"));
        assert_eq!(errors[1].field, "method");
    }

    #[test]
    fn test_snapshot_key_and_mutation_checks() {
        let errors = validate_entries(&entries(
            r#"
- { method: POST, path: /a, response: { type: stateful, snapshot: "../etc" } }
- { method: POST, path: /b, response: { type: stateful, snapshot: b, mutation: { op: explode } } }
- method: POST
  path: /c
  response: { type: stateful, snapshot: c, mutation: { op: reset, by: 2 } }
"#,
        ))
        .unwrap_err();

        assert_eq!(errors[0].field, "response.snapshot");
        assert_eq!(errors[1].field, "response.mutation.op");
        assert_eq!(errors[2].field, "response.mutation.by");
    }
}
