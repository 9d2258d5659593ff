//! Path pattern parsing and segment matching.
//!
//! # Responsibilities
//! - Parse declared paths into literal and `{name}` parameter segments
//! - Match concrete request segments against a pattern
//! - Bind parameter names to the decoded segment values
//!
//! # Design Decisions
//! - Literal matching is case-sensitive
//! - Declared literals and request segments are both compared percent-decoded,
//!   so `/café` is reached by `/caf%C3%A9`
//! - A parameter matches exactly one non-empty segment
//! - No regex: matching is a single pass over the segments

use std::fmt;
use thiserror::Error;

/// One segment of a declared path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

impl Segment {
    pub fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }
}

/// Reasons a declared path can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("path must start with '/'")]
    MissingLeadingSlash,

    #[error("path has an empty segment at position {0}")]
    EmptySegment(usize),

    #[error("segment '{0}' is not a literal or a whole '{{name}}' parameter")]
    InvalidSegment(String),

    #[error("parameter '{0}' appears more than once")]
    DuplicateParam(String),

    #[error("segment '{0}' does not decode to UTF-8 without '/'")]
    InvalidEncoding(String),
}

/// A compiled path pattern such as `/hello/{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse a declared path.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let rest = raw.strip_prefix('/').ok_or(PatternError::MissingLeadingSlash)?;

        let mut segments = Vec::new();
        if !rest.is_empty() {
            for (position, part) in rest.split('/').enumerate() {
                if part.is_empty() {
                    return Err(PatternError::EmptySegment(position));
                }
                segments.push(parse_segment(part)?);
            }
        }

        let mut seen: Vec<&str> = Vec::new();
        for segment in &segments {
            if let Segment::Param(name) = segment {
                if seen.contains(&name.as_str()) {
                    return Err(PatternError::DuplicateParam(name.clone()));
                }
                seen.push(name);
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The path exactly as declared.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of literal (non-parameter) segments, used for tie-breaking.
    pub fn literal_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_literal()).count()
    }

    /// True when the pattern has no parameters.
    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(Segment::is_literal)
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.param_names().any(|p| p == name)
    }

    /// First literal segment, if the path starts with one.
    pub fn first_literal(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Literal(lit)) => Some(lit),
            _ => None,
        }
    }

    /// The pattern with parameter names erased (`/a/{}`).
    ///
    /// Two patterns with the same shape can never be told apart by a request.
    pub fn shape(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut shape = String::new();
        for segment in &self.segments {
            shape.push('/');
            match segment {
                Segment::Literal(lit) => shape.push_str(lit),
                Segment::Param(_) => shape.push_str("{}"),
            }
        }
        shape
    }

    /// Literal segments, decoded. Empty for the root path.
    pub fn literal_key(&self) -> Option<Vec<String>> {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(lit) => Some(lit.clone()),
                Segment::Param(_) => None,
            })
            .collect()
    }

    /// Match decoded request segments, returning `(name, value)` bindings.
    pub fn match_segments<'p, S: AsRef<str>>(
        &self,
        segments: &'p [S],
    ) -> Option<Vec<(&str, &'p str)>> {
        if segments.len() != self.segments.len() {
            return None;
        }

        let mut bindings = Vec::new();
        for (pattern, actual) in self.segments.iter().zip(segments) {
            let actual = actual.as_ref();
            match pattern {
                Segment::Literal(lit) => {
                    if lit != actual {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if actual.is_empty() {
                        return None;
                    }
                    bindings.push((name.as_str(), actual));
                }
            }
        }
        Some(bindings)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split a request path into segments. The root path has none.
pub fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

/// Split and percent-decode a request path.
///
/// Returns the first segment that is not valid percent-encoded UTF-8 as the error.
pub fn decode_path(path: &str) -> Result<Vec<String>, String> {
    split_path(path)
        .into_iter()
        .map(|raw| {
            urlencoding::decode(raw)
                .map(|decoded| decoded.into_owned())
                .map_err(|_| raw.to_string())
        })
        .collect()
}

/// Identifier rule shared by parameter names and template placeholders.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn parse_segment(part: &str) -> Result<Segment, PatternError> {
    if let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
        if is_identifier(inner) {
            return Ok(Segment::Param(inner.to_string()));
        }
        return Err(PatternError::InvalidSegment(part.to_string()));
    }
    if part.contains('{') || part.contains('}') {
        return Err(PatternError::InvalidSegment(part.to_string()));
    }
    match urlencoding::decode(part) {
        Ok(decoded) if !decoded.contains('/') => Ok(Segment::Literal(decoded.into_owned())),
        _ => Err(PatternError::InvalidEncoding(part.to_string())),
    }
}
