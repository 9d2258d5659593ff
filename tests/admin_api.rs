//! Built-in `/_engine` routes.

use reqwest::StatusCode;
use serde_json::{json, Value};

mod common;

const ENDPOINTS: &str = r#"
- { method: GET, path: /ping, response: { type: static, body: pong } }
- method: POST
  path: /visits
  response: { type: stateful, snapshot: visits, mutation: { op: increment, field: total } }
"#;

fn bearer() -> String {
    format!("Bearer {}", common::ADMIN_KEY)
}

#[tokio::test]
async fn test_health_is_public() {
    let engine = common::start(ENDPOINTS).await;

    let res = engine
        .client
        .get(engine.url("/_engine/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let health: Value = res.json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["routes"], json!(2));
    assert_eq!(health["snapshots"], json!(0));
    assert_eq!(health["reloads"], json!(0));
    assert!(health["last_reload"].is_null());

    engine.stop().await;
}

#[tokio::test]
async fn test_admin_requires_key() {
    let engine = common::start(ENDPOINTS).await;

    let res = engine
        .client
        .get(engine.url("/_engine/routes"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "Unauthorized");

    let res = engine
        .client
        .get(engine.url("/_engine/routes"))
        .header("authorization", "Bearer wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let routes: Value = engine
        .client
        .get(engine.url("/_engine/routes"))
        .header("authorization", bearer())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(routes[0]["path"], "/ping");
    assert_eq!(routes[1]["method"], "POST");
    assert_eq!(routes[1]["snapshot"], "visits");

    engine.stop().await;
}

#[tokio::test]
async fn test_admin_disabled_without_key() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::start_in(dir, ENDPOINTS, |config| config.admin.api_key = None).await;

    let res = engine
        .client
        .get(engine.url("/_engine/routes"))
        .header("authorization", bearer())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    engine.stop().await;
}

#[tokio::test]
async fn test_snapshot_inspection() {
    let engine = common::start(ENDPOINTS).await;

    let res = engine
        .client
        .get(engine.url("/_engine/snapshots/visits"))
        .header("authorization", bearer())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    engine
        .client
        .post(engine.url("/visits"))
        .send()
        .await
        .unwrap();

    let list: Value = engine
        .client
        .get(engine.url("/_engine/snapshots"))
        .header("authorization", bearer())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list, json!({"count": 1, "keys": ["visits"]}));

    let record: Value = engine
        .client
        .get(engine.url("/_engine/snapshots/visits"))
        .header("authorization", bearer())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(record["data"]["total"], json!(1));

    engine.stop().await;
}

#[tokio::test]
async fn test_reload_swaps_routes_and_keeps_them_on_failure() {
    let engine = common::start(ENDPOINTS).await;

    std::fs::write(
        engine.endpoints_path(),
        "- { method: GET, path: /fresh, response: { type: static, body: new } }\n",
    )
    .unwrap();
    let res = engine
        .client
        .post(engine.url("/_engine/reload"))
        .header("authorization", bearer())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({"routes": 1}));

    let body = engine
        .client
        .get(engine.url("/fresh"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "new");

    std::fs::write(engine.endpoints_path(), "- { method: GET }\n").unwrap();
    let res = engine
        .client
        .post(engine.url("/_engine/reload"))
        .header("authorization", bearer())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.json::<Value>().await.unwrap()["error"]["kind"], "LoadError");

    let res = engine
        .client
        .get(engine.url("/fresh"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let health: Value = engine
        .client
        .get(engine.url("/_engine/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["reloads"], json!(1));

    engine.stop().await;
}
