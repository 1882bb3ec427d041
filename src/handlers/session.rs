//! Session and transaction handlers.

use axum::{
    body::Body,
    http::{Response, StatusCode},
};
use std::sync::Arc;
use tracing::info;

use crate::context::RequestContext;
use crate::error::{LobError, LobResult, SqlState};
use crate::models::SessionModel;
use crate::session::{Session, SessionRegistry};
use crate::xml::serialize_session;

use super::{build_response, common_headers, run_blocking, xml_response};

fn describe(session: &Session) -> SessionModel {
    SessionModel::from_session(session)
}

/// POST /sessions - Open a session.
pub async fn open_session(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
) -> LobResult<Response<Body>> {
    let isolation = ctx.isolation()?.unwrap_or_default();
    let session = sessions.open(isolation);
    let model = describe(&session.lock());
    Ok(xml_response(ctx, StatusCode::CREATED, serialize_session(&model)))
}

/// GET /sessions/{session} - Describe a session.
pub async fn get_session(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
) -> LobResult<Response<Body>> {
    let session = sessions.get(ctx.session_id()?)?;
    let model = describe(&session.lock());
    Ok(xml_response(ctx, StatusCode::OK, serialize_session(&model)))
}

/// DELETE /sessions/{session} - Close a session, rolling back its transaction.
pub async fn close_session(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
) -> LobResult<Response<Body>> {
    let session = sessions.remove(ctx.session_id()?)?;
    let id = ctx.session_id()?.to_string();
    run_blocking(move || session.lock().rollback()).await?;
    info!("Closed session {}", id);
    Ok(build_response(StatusCode::NO_CONTENT, common_headers(ctx), Body::empty()))
}

/// PUT /sessions/{session}?comp=commit|rollback|isolation - Transaction control.
pub async fn transaction_control(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
) -> LobResult<Response<Body>> {
    let session = sessions.get(ctx.session_id()?)?;
    let comp = ctx.comp().unwrap_or_default().to_string();
    let isolation = ctx.isolation()?;

    let model = run_blocking(move || {
        let mut session = session.lock();
        match comp.as_str() {
            "commit" => session.commit()?,
            "rollback" => session.rollback()?,
            "isolation" => {
                let level = isolation.ok_or_else(|| {
                    LobError::with_message(
                        SqlState::InvalidApiParameter,
                        "An isolation level is required.",
                    )
                })?;
                session.set_isolation(level)?;
            }
            other => {
                return Err(LobError::with_message(
                    SqlState::InvalidApiParameter,
                    format!("Unknown transaction operation: {}", other),
                ))
            }
        }
        Ok(describe(&session))
    })
    .await?;

    Ok(xml_response(ctx, StatusCode::OK, serialize_session(&model)))
}
