//! Built-in routes under the reserved `/_engine` prefix.
//!
//! `/_engine/health` is always public. The rest is the admin API, mounted
//! only when an API key is configured and guarded by a bearer token.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::require_api_key;
use self::handlers::*;
use crate::http::server::AppState;

pub fn admin_router(state: &AppState) -> Router<AppState> {
    if state.config.admin.api_key.is_none() {
        return Router::new();
    }

    Router::new()
        .route("/_engine/routes", get(list_routes))
        .route("/_engine/snapshots", get(list_snapshots))
        .route("/_engine/snapshots/{key}", get(get_snapshot))
        .route("/_engine/reload", post(reload))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
}
