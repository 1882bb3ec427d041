//! Request routing for the session surface.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, Response, Uri},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::context::RequestContext;
use crate::error::{LobError, LobResult, SqlState};
use crate::handlers;
use crate::session::SessionRegistry;

/// Application state shared between handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
}

/// Creates the main router for the session surface.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/sessions", post(session_handler))
        .route("/sessions/:session", get(session_handler).put(session_handler).delete(session_handler))
        .route("/sessions/:session/lobs", post(lob_handler))
        .route("/sessions/:session/lobs/:lob", get(lob_handler).head(lob_handler).put(lob_handler).delete(lob_handler))
        .route("/sessions/:session/rows/:table/:row", get(row_handler).put(row_handler).delete(row_handler))
        .route("/sessions/:session/rows/:table/:row/:column", put(row_handler).post(row_handler))
        .with_state(state)
}

fn unsupported(ctx: &RequestContext) -> LobError {
    LobError::with_message(
        SqlState::InvalidApiParameter,
        format!("Unsupported operation {} {}", ctx.method, ctx.uri),
    )
}

/// Handler for session-level operations.
async fn session_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    params: Option<Path<HashMap<String, String>>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response<Body> {
    let params = params.map(|Path(p)| p).unwrap_or_default();
    let ctx = RequestContext::new(method, uri, headers, params, query);

    let result = route_session_request(&ctx, &state).await;
    match result {
        Ok(response) => response,
        Err(e) => e.with_request_id(&ctx.request_id).into_response(),
    }
}

/// Handler for LOB-level operations.
async fn lob_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response<Body> {
    let ctx = RequestContext::new(method, uri, headers, params, query);

    let result = route_lob_request(&ctx, &state, body).await;
    match result {
        Ok(response) => response,
        Err(e) => e.with_request_id(&ctx.request_id).into_response(),
    }
}

/// Handler for row-level operations.
async fn row_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response<Body> {
    let ctx = RequestContext::new(method, uri, headers, params, query);

    let result = route_row_request(&ctx, &state, body).await;
    match result {
        Ok(response) => response,
        Err(e) => e.with_request_id(&ctx.request_id).into_response(),
    }
}

/// Routes session-level requests.
async fn route_session_request(ctx: &RequestContext, state: &AppState) -> LobResult<Response<Body>> {
    let sessions = state.sessions.clone();

    match (ctx.method.as_str(), ctx.session.is_some(), ctx.comp()) {
        // Open session
        ("POST", false, None) => handlers::open_session(ctx, sessions).await,
        // Describe session
        ("GET", true, None) => handlers::get_session(ctx, sessions).await,
        // Close session
        ("DELETE", true, None) => handlers::close_session(ctx, sessions).await,
        // Commit, rollback, isolation
        ("PUT", true, Some("commit" | "rollback" | "isolation")) => {
            handlers::transaction_control(ctx, sessions).await
        }
        _ => Err(unsupported(ctx)),
    }
}

/// Routes LOB-level requests.
async fn route_lob_request(
    ctx: &RequestContext,
    state: &AppState,
    body: Bytes,
) -> LobResult<Response<Body>> {
    let sessions = state.sessions.clone();

    match (ctx.method.as_str(), ctx.lob.is_some(), ctx.comp()) {
        // Create LOB
        ("POST", false, None) => handlers::create_lob(ctx, sessions, body).await,
        // Stream LOB or range
        ("GET", true, None) => handlers::read_lob(ctx, sessions).await,
        // Describe LOB
        ("GET", true, Some("properties")) => handlers::describe_lob(ctx, sessions).await,
        // Pattern search
        ("GET", true, Some("position")) => handlers::lob_position(ctx, sessions).await,
        // Length and storage
        ("HEAD", true, None) => handlers::get_lob_properties(ctx, sessions).await,
        // set_bytes / set_string
        ("PUT", true, None) => handlers::write_lob(ctx, sessions, body).await,
        // Truncate
        ("PUT", true, Some("truncate")) => handlers::truncate_lob(ctx, sessions).await,
        // Free
        ("DELETE", true, None) => handlers::free_lob(ctx, sessions).await,
        _ => Err(unsupported(ctx)),
    }
}

/// Routes row-level requests.
async fn route_row_request(
    ctx: &RequestContext,
    state: &AppState,
    body: Bytes,
) -> LobResult<Response<Body>> {
    let sessions = state.sessions.clone();

    match (ctx.method.as_str(), ctx.column.is_some()) {
        // Insert row
        ("PUT", false) => handlers::insert_row(ctx, sessions, body).await,
        // Select row
        ("GET", false) => handlers::get_row(ctx, sessions).await,
        // Delete row
        ("DELETE", false) => handlers::delete_row(ctx, sessions).await,
        // Store a column value
        ("PUT", true) => handlers::put_column(ctx, sessions, body).await,
        // Fetch a column as a LOB
        ("POST", true) => handlers::fetch_lob(ctx, sessions).await,
        _ => Err(unsupported(ctx)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_router(dir: &tempfile::TempDir) -> Router {
        let config = Config {
            spill_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let db = Database::open(config.clone()).unwrap();
        create_router(AppState {
            config: Arc::new(config),
            sessions: Arc::new(SessionRegistry::new(db)),
        })
    }

    #[tokio::test]
    async fn test_unsupported_operation_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(&dir);

        let response = router
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/sessions/abc?comp=vacuum")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["x-lob-sqlstate"], "XJ081");
    }

    #[tokio::test]
    async fn test_open_session() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(&dir);

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sessions?isolation=rs")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "application/xml");
        assert!(response.headers().contains_key("x-lob-request-id"));
    }
}
