//! Row handlers: the stored values LOBs are fetched from.

use axum::{
    body::Body,
    http::{Response, StatusCode},
};
use bytes::Bytes;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::{LobError, LobResult, SqlState};
use crate::lob::LobKind;
use crate::models::LobModel;
use crate::session::{LobHandle, SessionRegistry};
use crate::table::{RowKey, Value};
use crate::xml::{parse_row, serialize_lob, serialize_row};

use super::{build_response, common_headers, run_blocking, xml_response};

/// PUT /sessions/{session}/rows/{table}/{id} - Insert a row from a `<Row>` document.
pub async fn insert_row(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
    body: Bytes,
) -> LobResult<Response<Body>> {
    let session = sessions.get(ctx.session_id()?)?;
    let (table, id) = ctx.row_key()?;
    let table = table.to_string();
    let xml = std::str::from_utf8(&body).map_err(|_| {
        LobError::with_message(SqlState::InvalidApiParameter, "Row documents must be UTF-8.")
    })?;
    let row = parse_row(xml)?;

    run_blocking(move || session.lock().connection().insert(&table, id, row)).await?;
    Ok(build_response(StatusCode::CREATED, common_headers(ctx), Body::empty()))
}

/// GET /sessions/{session}/rows/{table}/{id} - Read a row.
pub async fn get_row(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
) -> LobResult<Response<Body>> {
    let session = sessions.get(ctx.session_id()?)?;
    let (table, id) = ctx.row_key()?;
    let key = RowKey::new(table, id);
    let table = table.to_string();

    let row = run_blocking(move || session.lock().connection().select(&table, id)).await?;
    Ok(xml_response(ctx, StatusCode::OK, serialize_row(&key, &row)))
}

/// DELETE /sessions/{session}/rows/{table}/{id} - Delete a row.
pub async fn delete_row(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
) -> LobResult<Response<Body>> {
    let session = sessions.get(ctx.session_id()?)?;
    let (table, id) = ctx.row_key()?;
    let table = table.to_string();

    run_blocking(move || session.lock().connection().delete(&table, id)).await?;
    Ok(build_response(StatusCode::NO_CONTENT, common_headers(ctx), Body::empty()))
}

/// PUT /sessions/{session}/rows/{table}/{id}/{column} - Store a LOB column,
/// inserting the row if needed.
///
/// The value is the request body (typed by `x-lob-type`), or the current
/// content of a session LOB named by the `lob` query parameter.
pub async fn put_column(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
    body: Bytes,
) -> LobResult<Response<Body>> {
    let session = sessions.get(ctx.session_id()?)?;
    let (table, id) = ctx.row_key()?;
    let table = table.to_string();
    let column = ctx.column_name()?.to_string();
    let kind = ctx.lob_kind()?.unwrap_or(LobKind::Blob);
    let source = match ctx.query_param("lob") {
        Some(raw) => {
            let mut source_ctx = ctx.clone();
            source_ctx.lob = Some(raw.to_string());
            Some(source_ctx.lob_id()?)
        }
        None => None,
    };

    run_blocking(move || {
        let mut session = session.lock();
        let value = match source {
            Some(lob_id) => match session.lob(lob_id)? {
                LobHandle::Blob(b) => Value::Blob(b.to_bytes()?),
                LobHandle::Clob(c) => Value::Clob(Arc::from(c.to_text()?)),
            },
            None => match kind {
                LobKind::Blob => Value::Blob(body),
                LobKind::Clob => {
                    let text = std::str::from_utf8(&body).map_err(|_| {
                        LobError::with_message(
                            SqlState::ColumnTypeMismatch,
                            "CLOB content must be UTF-8.",
                        )
                    })?;
                    Value::Clob(Arc::from(text))
                }
            },
        };
        session.connection().upsert(&table, id, &column, value)
    })
    .await?;

    Ok(build_response(StatusCode::NO_CONTENT, common_headers(ctx), Body::empty()))
}

/// POST /sessions/{session}/rows/{table}/{id}/{column}?kind= - Fetch a column
/// as a LOB. SQL NULL answers 204.
pub async fn fetch_lob(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
) -> LobResult<Response<Body>> {
    let session = sessions.get(ctx.session_id()?)?;
    let (table, id) = ctx.row_key()?;
    let table = table.to_string();
    let column = ctx.column_name()?.to_string();
    let kind = ctx.lob_kind()?.unwrap_or(LobKind::Blob);

    let model = run_blocking(move || {
        let mut session = session.lock();
        let lob = match kind {
            LobKind::Blob => session
                .connection()
                .fetch_blob(&table, id, &column)?
                .map(LobHandle::Blob),
            LobKind::Clob => session
                .connection()
                .fetch_clob(&table, id, &column)?
                .map(LobHandle::Clob),
        };
        Ok(lob.map(|lob| LobModel::describe(&session.register(lob))))
    })
    .await?;

    match model {
        Some(model) => Ok(xml_response(ctx, StatusCode::CREATED, serialize_lob(&model))),
        None => Ok(build_response(StatusCode::NO_CONTENT, common_headers(ctx), Body::empty())),
    }
}
