//! Request context extraction and handling.

use axum::http::{header::HeaderMap, Method, Uri};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{LobError, LobResult, SqlState};
use crate::lob::{LobId, LobKind};
use crate::txn::IsolationLevel;

/// Extracted request context containing all relevant information.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request ID.
    pub request_id: String,
    /// HTTP method.
    pub method: Method,
    /// Request URI.
    pub uri: Uri,
    /// Session ID (if present).
    pub session: Option<String>,
    /// LOB ID (if present).
    pub lob: Option<String>,
    /// Table name (if present).
    pub table: Option<String>,
    /// Row ID (if present).
    pub row: Option<String>,
    /// Column name (if present).
    pub column: Option<String>,
    /// Query parameters.
    pub query_params: HashMap<String, String>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request timestamp.
    pub timestamp: DateTime<Utc>,
}

impl RequestContext {
    /// Creates a new request context from request parts.
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        path_params: HashMap<String, String>,
        query_params: HashMap<String, String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            method,
            uri,
            session: path_params.get("session").cloned(),
            lob: path_params.get("lob").cloned(),
            table: path_params.get("table").cloned(),
            row: path_params.get("row").cloned(),
            column: path_params.get("column").cloned(),
            query_params,
            headers,
            timestamp: Utc::now(),
        }
    }

    /// Returns the value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(|s| s.as_str())
    }

    /// Returns the value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the comp query parameter.
    pub fn comp(&self) -> Option<&str> {
        self.query_param("comp")
    }

    /// Parses an integer query parameter. Malformed values fail with `XJ081`.
    pub fn int_param(&self, name: &str) -> LobResult<Option<i64>> {
        self.query_param(name)
            .map(|v| {
                v.parse::<i64>().map_err(|_| {
                    LobError::with_message(
                        SqlState::InvalidApiParameter,
                        format!("Query parameter {}={} is not an integer.", name, v),
                    )
                })
            })
            .transpose()
    }

    /// Returns the isolation query parameter, if present.
    pub fn isolation(&self) -> LobResult<Option<IsolationLevel>> {
        self.query_param("isolation")
            .or_else(|| self.query_param("level"))
            .map(str::parse)
            .transpose()
    }

    /// Returns the LOB kind from the kind query parameter or the x-lob-type header.
    pub fn lob_kind(&self) -> LobResult<Option<LobKind>> {
        self.query_param("kind")
            .or_else(|| self.header("x-lob-type"))
            .map(parse_lob_kind)
            .transpose()
    }

    /// Returns the session ID path parameter.
    pub fn session_id(&self) -> LobResult<&str> {
        self.session
            .as_deref()
            .ok_or_else(|| LobError::new(SqlState::NoCurrentConnection))
    }

    /// Returns the LOB ID path parameter.
    pub fn lob_id(&self) -> LobResult<LobId> {
        let raw = self
            .lob
            .as_deref()
            .ok_or_else(|| LobError::new(SqlState::LobObjectInvalid))?;
        raw.strip_prefix("lob-")
            .unwrap_or(raw)
            .parse::<u64>()
            .map(LobId)
            .map_err(|_| {
                LobError::with_message(
                    SqlState::LobObjectInvalid,
                    format!("{} is not a LOB id.", raw),
                )
            })
    }

    /// Returns the table and row ID path parameters.
    pub fn row_key(&self) -> LobResult<(&str, i64)> {
        let table = self.table.as_deref().ok_or_else(|| {
            LobError::with_message(SqlState::InvalidApiParameter, "A table name is required.")
        })?;
        let raw = self.row.as_deref().unwrap_or_default();
        let id = raw.parse::<i64>().map_err(|_| {
            LobError::with_message(
                SqlState::InvalidApiParameter,
                format!("Row id {} is not an integer.", raw),
            )
        })?;
        Ok((table, id))
    }

    /// Returns the column path parameter.
    pub fn column_name(&self) -> LobResult<&str> {
        self.column.as_deref().ok_or_else(|| LobError::new(SqlState::ColumnNotFound))
    }
}

fn parse_lob_kind(value: &str) -> LobResult<LobKind> {
    match value.to_ascii_lowercase().as_str() {
        "blob" => Ok(LobKind::Blob),
        "clob" => Ok(LobKind::Clob),
        other => Err(LobError::with_message(
            SqlState::InvalidApiParameter,
            format!("Unknown LOB kind: {}", other),
        )),
    }
}

/// Formats a DateTime as RFC 1123 format for HTTP headers.
pub fn format_http_date(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Formats a DateTime as ISO 8601 format.
pub fn format_iso8601(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(path: &[(&str, &str)], query: &[(&str, &str)]) -> RequestContext {
        let map = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>()
        };
        RequestContext::new(
            Method::GET,
            Uri::from_static("/"),
            HeaderMap::new(),
            map(path),
            map(query),
        )
    }

    #[test]
    fn test_int_param_rejects_garbage() {
        let ctx = ctx(&[], &[("pos", "12"), ("len", "x")]);
        assert_eq!(ctx.int_param("pos").unwrap(), Some(12));
        assert_eq!(ctx.int_param("missing").unwrap(), None);
        assert_eq!(
            ctx.int_param("len").unwrap_err().state,
            SqlState::InvalidApiParameter
        );
    }

    #[test]
    fn test_lob_id_accepts_both_forms() {
        assert_eq!(ctx(&[("lob", "lob-7")], &[]).lob_id().unwrap(), LobId(7));
        assert_eq!(ctx(&[("lob", "7")], &[]).lob_id().unwrap(), LobId(7));
        assert_eq!(
            ctx(&[("lob", "seven")], &[]).lob_id().unwrap_err().state,
            SqlState::LobObjectInvalid
        );
    }

    #[test]
    fn test_timestamps_format() {
        use chrono::TimeZone;

        let dt = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
            + chrono::Duration::microseconds(250);
        assert_eq!(format_iso8601(&dt), "2024-03-09T07:05:01.000250Z");
        assert_eq!(format_http_date(&dt), "Sat, 09 Mar 2024 07:05:01 GMT");
        assert!(format_iso8601(&Utc::now()).ends_with('Z'));
    }
}
