//! Endpoint file loading.

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use thiserror::Error;

use crate::endpoints::definition::EndpointDefinition;
use crate::endpoints::validation::{validate_entries, EntryError};
use crate::routing::RouteTable;

/// Error type for endpoint file loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read endpoint file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("endpoint file is not valid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("endpoint file must be a list of entries or a mapping with an `endpoints` list")]
    Shape,

    #[error("unknown top-level key `{0}` (only `endpoints` is allowed)")]
    UnknownKey(String),

    #[error("{}", describe(.0))]
    Invalid(Vec<EntryError>),
}

fn describe(errors: &[EntryError]) -> String {
    let noun = if errors.len() == 1 { "entry" } else { "entries" };
    let mut out = format!("{} invalid endpoint {noun}: ", errors.len());
    for (i, err) in errors.iter().enumerate() {
        if i > 0 {
            out.push_str("; ");
        }
        out.push_str(&err.to_string());
    }
    out
}

/// Parse and validate an endpoint document into definitions.
pub fn parse_definitions(source: &str) -> Result<Vec<EndpointDefinition>, LoadError> {
    let document: Value = serde_yaml::from_str(source)?;

    let entries = match document {
        Value::Null => Vec::new(),
        Value::Sequence(entries) => entries,
        Value::Mapping(mut mapping) => {
            let entries = match mapping.remove("endpoints") {
                Some(Value::Sequence(entries)) => entries,
                Some(Value::Null) => Vec::new(),
                Some(_) | None => return Err(LoadError::Shape),
            };
            if let Some((key, _)) = mapping.into_iter().next() {
                let name = key.as_str().map(str::to_string).unwrap_or_else(|| format!("{key:?}"));
                return Err(LoadError::UnknownKey(name));
            }
            entries
        }
        _ => return Err(LoadError::Shape),
    };

    validate_entries(&entries).map_err(LoadError::Invalid)
}

/// Load an endpoint document into a route table.
///
/// Either every entry is valid and a table is returned, or nothing is.
pub fn load(source: &str) -> Result<RouteTable, LoadError> {
    let definitions = parse_definitions(source)?;
    Ok(RouteTable::build(definitions))
}

/// Load and validate an endpoint file from disk.
pub fn load_file(path: &Path) -> Result<RouteTable, LoadError> {
    let source = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load(&source)
}
