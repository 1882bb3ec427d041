//! LOB handlers.

use axum::{
    body::Body,
    http::{HeaderValue, Response, StatusCode},
};
use bytes::Bytes;
use std::io::{self, Read};
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::{LobError, LobResult, SqlState};
use crate::lob::{LobKind, STREAM_BUFFER};
use crate::models::{LobModel, PositionModel};
use crate::session::{LobHandle, SessionRegistry};
use crate::xml::{serialize_lob, serialize_position};

use super::{build_response, common_headers, run_blocking, xml_response};

fn utf8(body: &Bytes) -> LobResult<&str> {
    std::str::from_utf8(body).map_err(|_| {
        LobError::with_message(SqlState::ColumnTypeMismatch, "CLOB content must be UTF-8.")
    })
}

/// POST /sessions/{session}/lobs?kind=blob|clob - Create a LOB, optionally
/// filled with the request body.
pub async fn create_lob(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
    body: Bytes,
) -> LobResult<Response<Body>> {
    let session = sessions.get(ctx.session_id()?)?;
    let kind = ctx.lob_kind()?.unwrap_or(LobKind::Blob);

    let model = run_blocking(move || {
        let mut session = session.lock();
        let lob = match kind {
            LobKind::Blob => {
                let blob = session.connection().create_blob()?;
                if !body.is_empty() {
                    blob.set_bytes(1, &body)?;
                }
                LobHandle::Blob(blob)
            }
            LobKind::Clob => {
                let clob = session.connection().create_clob()?;
                if !body.is_empty() {
                    clob.set_string(1, utf8(&body)?)?;
                }
                LobHandle::Clob(clob)
            }
        };
        let lob = session.register(lob);
        Ok(LobModel::describe(&lob))
    })
    .await?;

    Ok(xml_response(ctx, StatusCode::CREATED, serialize_lob(&model)))
}

/// Body stream that pulls `STREAM_BUFFER`-sized chunks from a LOB reader on
/// the blocking pool, so a file-backed value is never held in memory whole.
fn reader_body(reader: Box<dyn Read + Send>) -> Body {
    let chunks = futures::stream::unfold(Some(reader), |reader| async move {
        let mut reader = reader?;
        let result = tokio::task::spawn_blocking(move || {
            let mut chunk = vec![0u8; STREAM_BUFFER];
            let read = reader.read(&mut chunk);
            (reader, chunk, read)
        })
        .await;
        match result {
            Ok((_, _, Ok(0))) => None,
            Ok((reader, mut chunk, Ok(n))) => {
                chunk.truncate(n);
                Some((Ok(Bytes::from(chunk)), Some(reader)))
            }
            Ok((_, _, Err(e))) => Some((Err(e), None)),
            Err(e) => Some((Err(io::Error::new(io::ErrorKind::Other, e)), None)),
        }
    });
    Body::from_stream(chunks)
}

/// GET /sessions/{session}/lobs/{lob}[?pos=&len=] - Stream a LOB or a sub-range.
pub async fn read_lob(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
) -> LobResult<Response<Body>> {
    let session = sessions.get(ctx.session_id()?)?;
    let lob_id = ctx.lob_id()?;
    let pos = ctx.int_param("pos")?;
    let len = ctx.int_param("len")?;
    let ranged = pos.is_some() || len.is_some();

    let (reader, length, kind) = run_blocking(move || {
        let lob = session.lock().lob(lob_id)?;
        let length = lob.length()?;
        let pos = pos.unwrap_or(1);
        let len = len.unwrap_or_else(|| (length as i64).saturating_sub(pos).saturating_add(1).max(0));
        let reader: Box<dyn Read + Send> = match &lob {
            LobHandle::Blob(b) if ranged => Box::new(b.binary_stream_range(pos, len)?),
            LobHandle::Blob(b) => Box::new(b.binary_stream()?),
            LobHandle::Clob(c) if ranged => Box::new(c.character_stream_range(pos, len)?),
            LobHandle::Clob(c) => Box::new(c.character_stream()?),
        };
        Ok((reader, length, lob.kind()))
    })
    .await?;

    let mut headers = common_headers(ctx);
    let content_type = match kind {
        LobKind::Blob => mime::APPLICATION_OCTET_STREAM,
        LobKind::Clob => mime::TEXT_PLAIN_UTF_8,
    };
    if let Ok(v) = HeaderValue::from_str(content_type.as_ref()) {
        headers.insert("Content-Type", v);
    }
    headers.insert("x-lob-kind", HeaderValue::from_static(kind.as_str()));
    headers.insert("x-lob-length", HeaderValue::from(length));
    let status = if ranged {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    Ok(build_response(status, headers, reader_body(reader)))
}

/// HEAD /sessions/{session}/lobs/{lob} - Length and storage kind.
pub async fn get_lob_properties(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
) -> LobResult<Response<Body>> {
    let session = sessions.get(ctx.session_id()?)?;
    let lob_id = ctx.lob_id()?;

    let (length, lob) = run_blocking(move || {
        let lob = session.lock().lob(lob_id)?;
        Ok((lob.length()?, lob))
    })
    .await?;

    let mut headers = common_headers(ctx);
    headers.insert("x-lob-kind", HeaderValue::from_static(lob.kind().as_str()));
    headers.insert("x-lob-length", HeaderValue::from(length));
    if let Some(storage) = lob.storage_kind() {
        headers.insert("x-lob-storage", HeaderValue::from_static(storage.as_str()));
    }
    Ok(build_response(StatusCode::OK, headers, Body::empty()))
}

/// GET /sessions/{session}/lobs/{lob}?comp=properties - Describe a LOB.
pub async fn describe_lob(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
) -> LobResult<Response<Body>> {
    let session = sessions.get(ctx.session_id()?)?;
    let lob = session.lock().lob(ctx.lob_id()?)?;
    let model = run_blocking(move || Ok(LobModel::describe(&lob))).await?;
    Ok(xml_response(ctx, StatusCode::OK, serialize_lob(&model)))
}

/// PUT /sessions/{session}/lobs/{lob}?pos=[&offset=&len=] - Write the request
/// body at a position.
pub async fn write_lob(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
    body: Bytes,
) -> LobResult<Response<Body>> {
    let session = sessions.get(ctx.session_id()?)?;
    let lob_id = ctx.lob_id()?;
    let pos = ctx.int_param("pos")?.unwrap_or(1);
    let offset = ctx.int_param("offset")?;
    let len = ctx.int_param("len")?;

    let (written, model) = run_blocking(move || {
        let lob = session.lock().lob(lob_id)?;
        let written = match (&lob, offset.is_some() || len.is_some()) {
            (LobHandle::Blob(b), false) => b.set_bytes(pos, &body)?,
            (LobHandle::Blob(b), true) => b.set_bytes_range(
                pos,
                &body,
                offset.unwrap_or(0),
                len.unwrap_or(body.len() as i64),
            )?,
            (LobHandle::Clob(c), false) => c.set_string(pos, utf8(&body)?)?,
            (LobHandle::Clob(c), true) => {
                let text = utf8(&body)?;
                c.set_string_range(
                    pos,
                    text,
                    offset.unwrap_or(0),
                    len.unwrap_or(text.chars().count() as i64),
                )?
            }
        };
        Ok((written, LobModel::describe(&lob)))
    })
    .await?;

    let mut response = xml_response(ctx, StatusCode::OK, serialize_lob(&model));
    response
        .headers_mut()
        .insert("x-lob-written", HeaderValue::from(written as u64));
    Ok(response)
}

/// PUT /sessions/{session}/lobs/{lob}?comp=truncate&len= - Truncate a LOB.
pub async fn truncate_lob(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
) -> LobResult<Response<Body>> {
    let session = sessions.get(ctx.session_id()?)?;
    let lob_id = ctx.lob_id()?;
    let len = ctx.int_param("len")?.ok_or_else(|| {
        LobError::with_message(SqlState::InvalidApiParameter, "A len parameter is required.")
    })?;

    let model = run_blocking(move || {
        let lob = session.lock().lob(lob_id)?;
        match &lob {
            LobHandle::Blob(b) => b.truncate(len)?,
            LobHandle::Clob(c) => c.truncate(len)?,
        }
        Ok(LobModel::describe(&lob))
    })
    .await?;

    Ok(xml_response(ctx, StatusCode::OK, serialize_lob(&model)))
}

/// GET /sessions/{session}/lobs/{lob}?comp=position&pattern=|patternlob=[&start=]
/// - Search for a pattern.
pub async fn lob_position(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
) -> LobResult<Response<Body>> {
    let session = sessions.get(ctx.session_id()?)?;
    let lob_id = ctx.lob_id()?;
    let start = ctx.int_param("start")?.unwrap_or(1);
    let pattern = ctx.query_param("pattern").map(String::from);
    let pattern_lob = match ctx.query_param("patternlob") {
        Some(raw) => {
            let mut pattern_ctx = ctx.clone();
            pattern_ctx.lob = Some(raw.to_string());
            Some(pattern_ctx.lob_id()?)
        }
        None => None,
    };

    let position = run_blocking(move || {
        let session = session.lock();
        let lob = session.lob(lob_id)?;
        match (pattern_lob, pattern) {
            (Some(other), _) => match (&lob, session.lob(other)?) {
                (LobHandle::Blob(b), LobHandle::Blob(p)) => b.position_of(&p, start),
                (LobHandle::Clob(c), LobHandle::Clob(p)) => c.position_of(&p, start),
                _ => Err(LobError::with_message(
                    SqlState::ColumnTypeMismatch,
                    "A BLOB can only be searched for a BLOB, a CLOB for a CLOB.",
                )),
            },
            (None, Some(pattern)) => match &lob {
                LobHandle::Blob(b) => b.position(pattern.as_bytes(), start),
                LobHandle::Clob(c) => c.position(&pattern, start),
            },
            (None, None) => Err(LobError::new(SqlState::NullPattern)),
        }
    })
    .await?;

    let model = PositionModel { start, position };
    Ok(xml_response(ctx, StatusCode::OK, serialize_position(&model)))
}

/// DELETE /sessions/{session}/lobs/{lob} - Free a LOB. Its id stops being
/// valid for the session.
pub async fn free_lob(
    ctx: &RequestContext,
    sessions: Arc<SessionRegistry>,
) -> LobResult<Response<Body>> {
    let session = sessions.get(ctx.session_id()?)?;
    let lob_id = ctx.lob_id()?;

    let model = run_blocking(move || {
        let lob = session.lock().free_lob(lob_id)?;
        Ok(LobModel::describe(&lob))
    })
    .await?;

    Ok(xml_response(ctx, StatusCode::OK, serialize_lob(&model)))
}
