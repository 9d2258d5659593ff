//! Validated, immutable endpoint definitions.

use std::fmt;

use serde::Serialize;

use crate::endpoints::template::Template;
use crate::routing::matcher::PathPattern;

/// HTTP methods an endpoint can be declared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }

    /// Parse a method name from the endpoint file, ignoring ASCII case.
    pub fn parse(name: &str) -> Option<Self> {
        Self::from_request(&name.to_ascii_uppercase())
    }

    /// Parse a request method. Method names are case-sensitive on the wire.
    pub fn from_request(name: &str) -> Option<Self> {
        match name {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "DELETE" => Some(HttpMethod::Delete),
            "PATCH" => Some(HttpMethod::Patch),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded endpoint. Identified by `(method, path)`.
#[derive(Debug, Clone)]
pub struct EndpointDefinition {
    /// Position of the entry in the source file.
    pub index: usize,
    pub method: HttpMethod,
    pub path: PathPattern,
    pub status: u16,
    pub content_type: String,
    pub behavior: Behavior,
}

/// What an endpoint does when matched.
#[derive(Debug, Clone)]
pub enum Behavior {
    Static { body: String },
    Templated { template: Template },
    Image(ImageBehavior),
    Stateful(StatefulBehavior),
}

impl Behavior {
    /// The `type` tag used in the endpoint file.
    pub fn kind(&self) -> &'static str {
        match self {
            Behavior::Static { .. } => "static",
            Behavior::Templated { .. } => "template",
            Behavior::Image(_) => "image",
            Behavior::Stateful(_) => "stateful",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageBehavior {
    pub template: Template,
    pub font: String,
    pub width: u32,
    pub height: u32,
    pub font_size: f32,
    pub foreground: Rgba,
    pub background: Rgba,
    pub padding: u32,
    pub max_text_len: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct StatefulBehavior {
    /// Snapshot key shared by every endpoint that names it.
    pub snapshot: String,
    pub mutation: Mutation,
    /// Optional response body; defaults to the JSON record.
    pub template: Option<Template>,
}

/// Declared change applied to a snapshot.
#[derive(Debug, Clone)]
pub enum Mutation {
    Read,
    Increment {
        field: String,
        by: i64,
    },
    /// Push onto a list; the value is the rendered template or the JSON body.
    Append {
        field: String,
        value: Option<Template>,
        max_len: Option<usize>,
    },
    /// Store the JSON body under `field`, or merge a body object key by key.
    Set {
        field: Option<String>,
    },
    Reset,
}

impl Mutation {
    pub fn op(&self) -> &'static str {
        match self {
            Mutation::Read => "read",
            Mutation::Increment { .. } => "increment",
            Mutation::Append { .. } => "append",
            Mutation::Set { .. } => "set",
            Mutation::Reset => "reset",
        }
    }
}

/// An RGBA color parsed from `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const BLACK: Rgba = Rgba([0, 0, 0, 255]);
    pub const WHITE: Rgba = Rgba([255, 255, 255, 255]);

    pub fn parse_hex(text: &str) -> Option<Self> {
        let hex = text.strip_prefix('#')?;
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
        Some(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
    }
}

/// Serializable view of a definition for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub index: usize,
    pub method: HttpMethod,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub status: u16,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
}

impl EndpointDefinition {
    pub fn summary(&self) -> RouteSummary {
        let snapshot = match &self.behavior {
            Behavior::Stateful(stateful) => Some(stateful.snapshot.clone()),
            _ => None,
        };
        RouteSummary {
            index: self.index,
            method: self.method,
            path: self.path.as_str().to_string(),
            kind: self.behavior.kind(),
            status: self.status,
            content_type: self.content_type.clone(),
            snapshot,
        }
    }
}
