//! Stateful behavior: apply a declared mutation to a snapshot.
//!
//! Everything that depends on the request (body parsing, value templates) is
//! resolved into a [`Change`] before the snapshot lock is taken, so the code
//! running under the lock is a pure function of the current data.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::endpoints::{Mutation, StatefulBehavior};
use crate::handlers::request::EndpointRequest;
use crate::handlers::{scope_for, ExecutionError};
use crate::snapshot::{SnapshotError, SnapshotRecord, SnapshotStore};

/// A mutation with all request inputs already resolved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Change {
    Read,
    Increment {
        field: String,
        by: i64,
    },
    Append {
        field: String,
        value: Value,
        max_len: Option<usize>,
    },
    Put {
        field: String,
        value: Value,
    },
    Merge(Map<String, Value>),
    Reset,
}

impl Change {
    pub(crate) fn resolve(
        mutation: &Mutation,
        params: &HashMap<String, String>,
        request: &EndpointRequest,
    ) -> Result<Self, ExecutionError> {
        match mutation {
            Mutation::Read => Ok(Change::Read),
            Mutation::Reset => Ok(Change::Reset),
            Mutation::Increment { field, by } => Ok(Change::Increment {
                field: field.clone(),
                by: *by,
            }),
            Mutation::Append {
                field,
                value,
                max_len,
            } => {
                let value = match value {
                    Some(template) => {
                        let body = if template.references_body() {
                            request.json_body()?
                        } else {
                            None
                        };
                        let scope = scope_for(params, request, body.as_ref(), None);
                        Value::String(template.render(&scope)?)
                    }
                    None => required_body(request, "append")?,
                };
                Ok(Change::Append {
                    field: field.clone(),
                    value,
                    max_len: *max_len,
                })
            }
            Mutation::Set { field: Some(field) } => Ok(Change::Put {
                field: field.clone(),
                value: required_body(request, "set")?,
            }),
            Mutation::Set { field: None } => match required_body(request, "set")? {
                Value::Object(map) => Ok(Change::Merge(map)),
                other => Err(ExecutionError::BadRequest(format!(
                    "set without a field needs a JSON object body, got {}",
                    json_type(&other)
                ))),
            },
        }
    }

    /// Apply to `data`. Fails without side effects visible to the store.
    pub(crate) fn apply(
        self,
        key: &str,
        data: &mut BTreeMap<String, Value>,
    ) -> Result<(), SnapshotError> {
        match self {
            Change::Read => Ok(()),
            Change::Reset => {
                data.clear();
                Ok(())
            }
            Change::Increment { field, by } => {
                let current = match data.get(&field) {
                    None => 0,
                    Some(value) => value.as_i64().ok_or_else(|| SnapshotError::TypeMismatch {
                        key: key.to_string(),
                        field: field.clone(),
                        expected: "integer",
                        found: json_type(value),
                    })?,
                };
                let next = current.checked_add(by).ok_or_else(|| SnapshotError::Overflow {
                    key: key.to_string(),
                    field: field.clone(),
                })?;
                data.insert(field, Value::from(next));
                Ok(())
            }
            Change::Append {
                field,
                value,
                max_len,
            } => {
                let list = data
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                let found = json_type(list);
                let Value::Array(items) = list else {
                    return Err(SnapshotError::TypeMismatch {
                        key: key.to_string(),
                        field,
                        expected: "array",
                        found,
                    });
                };
                items.push(value);
                if let Some(max) = max_len {
                    if items.len() > max {
                        let excess = items.len() - max;
                        items.drain(..excess);
                    }
                }
                Ok(())
            }
            Change::Put { field, value } => {
                data.insert(field, value);
                Ok(())
            }
            Change::Merge(map) => {
                data.extend(map);
                Ok(())
            }
        }
    }
}

/// Run a stateful behavior and return the resulting record.
pub(crate) async fn run(
    store: &SnapshotStore,
    behavior: &StatefulBehavior,
    params: &HashMap<String, String>,
    request: &EndpointRequest,
) -> Result<SnapshotRecord, ExecutionError> {
    let key = behavior.snapshot.as_str();
    let change = Change::resolve(&behavior.mutation, params, request)?;

    let record = match change {
        Change::Read => store.get(key).await?,
        change => store.mutate(key, |data| change.apply(key, data)).await?,
    };
    Ok(record)
}

fn required_body(request: &EndpointRequest, op: &str) -> Result<Value, ExecutionError> {
    request
        .json_body()?
        .ok_or_else(|| ExecutionError::BadRequest(format!("{op} requires a JSON request body")))
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
