//! Behavior execution.
//!
//! # Data Flow
//! ```text
//! RouteMatch + EndpointRequest
//!     → Executor::execute (dispatch on Behavior)
//!         static    → declared body
//!         template  → Template::render
//!         image     → Template::render → ImageRenderer (blocking pool)
//!         stateful  → stateful.rs → SnapshotStore::mutate → record or template
//!     → EndpointResponse
//! ```
//!
//! # Design Decisions
//! - The executor never sees HTTP types; the facade converts at the edge
//! - A request body is parsed only when the behavior needs it
//! - No error is turned into a default response

pub mod request;
pub mod stateful;

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::endpoints::{Behavior, EndpointDefinition, ImageBehavior, TemplateError, TemplateScope};
use crate::render::{ImageRenderer, RenderError, RenderSpec};
use crate::routing::RouteMatch;
use crate::snapshot::{SnapshotError, SnapshotStore};

pub use request::{EndpointRequest, EndpointResponse};

/// Why a matched endpoint could not produce its response.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("{0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Runs endpoint behaviors against shared resources.
#[derive(Debug, Clone)]
pub struct Executor {
    snapshots: SnapshotStore,
    renderer: ImageRenderer,
}

impl Executor {
    pub fn new(snapshots: SnapshotStore, renderer: ImageRenderer) -> Self {
        Self {
            snapshots,
            renderer,
        }
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn renderer(&self) -> &ImageRenderer {
        &self.renderer
    }

    /// Produce the response for a matched request.
    pub async fn execute(
        &self,
        matched: &RouteMatch,
        request: &EndpointRequest,
    ) -> Result<EndpointResponse, ExecutionError> {
        let definition: &EndpointDefinition = &matched.definition;
        let params = &matched.params;

        let body = match &definition.behavior {
            Behavior::Static { body } => body.clone().into_bytes(),
            Behavior::Templated { template } => {
                let json = if template.references_body() {
                    request.json_body()?
                } else {
                    None
                };
                let scope = scope_for(params, request, json.as_ref(), None);
                template.render(&scope)?.into_bytes()
            }
            Behavior::Image(image) => self.render_image(image, params, request).await?,
            Behavior::Stateful(behavior) => {
                let record = stateful::run(&self.snapshots, behavior, params, request).await?;
                match &behavior.template {
                    Some(template) => {
                        let json = if template.references_body() {
                            request.json_body()?
                        } else {
                            None
                        };
                        let scope = scope_for(params, request, json.as_ref(), Some(&record.data));
                        template.render(&scope)?.into_bytes()
                    }
                    None => serde_json::to_vec(&record)
                        .map_err(|e| ExecutionError::Internal(e.to_string()))?,
                }
            }
        };

        Ok(EndpointResponse {
            status: definition.status,
            content_type: definition.content_type.clone(),
            body,
        })
    }

    async fn render_image(
        &self,
        image: &ImageBehavior,
        params: &HashMap<String, String>,
        request: &EndpointRequest,
    ) -> Result<Vec<u8>, ExecutionError> {
        let json = if image.template.references_body() {
            request.json_body()?
        } else {
            None
        };
        let text = image
            .template
            .render(&scope_for(params, request, json.as_ref(), None))?;

        let spec = RenderSpec {
            text,
            font: image.font.clone(),
            width: image.width,
            height: image.height,
            font_size: image.font_size,
            foreground: image.foreground.0,
            background: image.background.0,
            padding: image.padding,
            max_text_len: image.max_text_len,
        };

        let renderer = self.renderer.clone();
        let png = tokio::task::spawn_blocking(move || renderer.render(&spec))
            .await
            .map_err(|e| ExecutionError::Internal(format!("render task failed: {e}")))??;
        Ok(png)
    }
}

/// Build the template scope for a request.
pub(crate) fn scope_for<'a>(
    params: &'a HashMap<String, String>,
    request: &'a EndpointRequest,
    body: Option<&'a Value>,
    state: Option<&'a std::collections::BTreeMap<String, Value>>,
) -> TemplateScope<'a> {
    TemplateScope {
        params,
        query: &request.query,
        body,
        state,
        method: request.method.as_str(),
        path: &request.path,
        request_id: &request.request_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{PersistenceMode, RenderConfig};
    use crate::endpoints::{load, HttpMethod};
    use crate::routing::RouteTable;
    use serde_json::json;

    struct Fixture {
        _dir: tempfile::TempDir,
        table: RouteTable,
        executor: Executor,
    }

    fn fixture(yaml: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path(), PersistenceMode::WriteThrough);
        let renderer = ImageRenderer::new(&RenderConfig {
            fonts_dir: dir.path().join("fonts"),
            ..RenderConfig::default()
        });
        Fixture {
            table: load(yaml).unwrap(),
            executor: Executor::new(snapshots, renderer),
            _dir: dir,
        }
    }

    async fn call(
        f: &Fixture,
        method: HttpMethod,
        path: &str,
        query: &[(&str, &str)],
        body: &str,
    ) -> Result<EndpointResponse, ExecutionError> {
        let matched = f.table.match_route(method, path).unwrap();
        let mut request = EndpointRequest::new(method, path);
        request.query = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        request.body = body.as_bytes().to_vec();
        request.request_id = "req-test".to_string();
        f.executor.execute(&matched, &request).await
    }

    #[tokio::test]
    async fn test_static_response_is_verbatim() {
        let f = fixture(
            r#"
- method: GET
  path: /ping
  status: 202
  content_type: text/custom
  response: { type: static, body: "pong" }
"#,
        );
        let response = call(&f, HttpMethod::Get, "/ping", &[], "").await.unwrap();
        assert_eq!(response.status, 202);
        assert_eq!(response.content_type, "text/custom");
        assert_eq!(response.text(), Some("pong"));
    }

    #[tokio::test]
    async fn test_template_substitutes_params_query_and_body() {
        let f = fixture(
            r#"
- method: POST
  path: /greet/{name}
  response:
    type: template
    template: "{name} says {body.word} via {query.via} ({request.id})"
"#,
        );
        let response = call(
            &f,
            HttpMethod::Post,
            "/greet/ada",
            &[("via", "post")],
            r#"{"word": "hi"}"#,
        )
        .await
        .unwrap();
        assert_eq!(response.text(), Some("ada says hi via post (req-test)"));
    }

    #[tokio::test]
    async fn test_template_errors() {
        let f = fixture(
            r#"
- method: POST
  path: /t
  response: { type: template, template: "{query.q} {body.a}" }
"#,
        );
        let err = call(&f, HttpMethod::Post, "/t", &[], r#"{"a": 1}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Template(_)));

        let err = call(&f, HttpMethod::Post, "/t", &[("q", "x")], "{oops")
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_stateful_counter_returns_record() {
        let f = fixture(
            r#"
- method: POST
  path: /counter
  response: { type: stateful, snapshot: counter, mutation: { op: increment } }
- method: GET
  path: /counter
  response: { type: stateful, snapshot: counter }
"#,
        );
        let first = call(&f, HttpMethod::Post, "/counter", &[], "").await.unwrap();
        assert_eq!(first.content_type, "application/json");
        let record: Value = serde_json::from_slice(&first.body).unwrap();
        assert_eq!(record["data"]["value"], json!(1));
        assert_eq!(record["version"], json!(1));

        call(&f, HttpMethod::Post, "/counter", &[], "").await.unwrap();
        let read = call(&f, HttpMethod::Get, "/counter", &[], "").await.unwrap();
        let record: Value = serde_json::from_slice(&read.body).unwrap();
        assert_eq!(record["data"]["value"], json!(2));
        assert_eq!(record["version"], json!(2));
    }

    #[tokio::test]
    async fn test_stateful_template_sees_new_state() {
        let f = fixture(
            r#"
- method: POST
  path: /visit/{who}
  response:
    type: stateful
    snapshot: guestbook
    mutation: { op: append, field: guests, value: "{who}", max_len: 2 }
    template: "latest: {state.guests.1}"
"#,
        );
        call(&f, HttpMethod::Post, "/visit/ada", &[], "").await.unwrap();
        let response = call(&f, HttpMethod::Post, "/visit/grace", &[], "")
            .await
            .unwrap();
        assert_eq!(response.text(), Some("latest: grace"));
        assert_eq!(response.content_type, "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn test_stateful_type_mismatch_is_snapshot_error() {
        let f = fixture(
            r#"
- method: PUT
  path: /cfg
  response: { type: stateful, snapshot: cfg, mutation: { op: set } }
- method: POST
  path: /cfg/bump
  response: { type: stateful, snapshot: cfg, mutation: { op: increment, field: mode } }
"#,
        );
        call(&f, HttpMethod::Put, "/cfg", &[], r#"{"mode": "fast"}"#)
            .await
            .unwrap();
        let err = call(&f, HttpMethod::Post, "/cfg/bump", &[], "")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Snapshot(SnapshotError::TypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_image_with_missing_font_is_render_error() {
        let f = fixture(
            r#"
- method: GET
  path: /badge
  response:
    type: image
    template: "ok"
    font: NoSuchFont.ttf
    canvas: { width: 100, height: 30 }
"#,
        );
        let err = call(&f, HttpMethod::Get, "/badge", &[], "").await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Render(RenderError::FontUnavailable { .. })
        ));
    }
}
