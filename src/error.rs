//! SQLState error codes and error response formatting.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hyper::ext::ReasonPhrase;
use std::io;
use thiserror::Error;

/// SQLStates surfaced by the LOB engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlState {
    // Lifecycle
    LobObjectInvalid,

    // Bounds validation
    BadPosition,
    NegativeLength,
    NullPattern,
    PositionTooLarge,
    InvalidOffset,
    LengthTooLong,
    InvalidApiParameter,
    PosAndLengthGreaterThanLob,
    SubstringOutOfRange,

    // Locking
    LockTimeout,

    // Storage
    StreamingIo,
    InternalError,

    // Session and row store
    NoCurrentConnection,
    RowNotFound,
    DuplicateKey,
    ColumnNotFound,
    ColumnTypeMismatch,
}

impl SqlState {
    /// Returns the five character SQLState.
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlState::LobObjectInvalid => "XJ215",
            SqlState::BadPosition => "XJ070",
            SqlState::NegativeLength => "XJ071",
            SqlState::NullPattern => "XJ072",
            SqlState::PositionTooLarge => "XJ076",
            SqlState::InvalidOffset => "XJ078",
            SqlState::LengthTooLong => "XJ079",
            SqlState::InvalidApiParameter => "XJ081",
            SqlState::PosAndLengthGreaterThanLob => "XJ087",
            SqlState::SubstringOutOfRange => "22011",
            SqlState::LockTimeout => "40XL1",
            SqlState::StreamingIo => "XCL30",
            SqlState::InternalError => "XJ001",
            SqlState::NoCurrentConnection => "08003",
            SqlState::RowNotFound => "02000",
            SqlState::DuplicateKey => "23505",
            SqlState::ColumnNotFound => "42X04",
            SqlState::ColumnTypeMismatch => "22005",
        }
    }

    /// Returns the HTTP status code used when this state crosses the HTTP surface.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            SqlState::BadPosition
            | SqlState::NegativeLength
            | SqlState::NullPattern
            | SqlState::InvalidOffset
            | SqlState::LengthTooLong
            | SqlState::InvalidApiParameter
            | SqlState::SubstringOutOfRange
            | SqlState::ColumnTypeMismatch => StatusCode::BAD_REQUEST,

            // 404 Not Found
            SqlState::NoCurrentConnection | SqlState::RowNotFound | SqlState::ColumnNotFound => {
                StatusCode::NOT_FOUND
            }

            // 409 Conflict
            SqlState::DuplicateKey | SqlState::LockTimeout => StatusCode::CONFLICT,

            // 410 Gone
            SqlState::LobObjectInvalid => StatusCode::GONE,

            // 416 Range Not Satisfiable
            SqlState::PositionTooLarge | SqlState::PosAndLengthGreaterThanLob => {
                StatusCode::RANGE_NOT_SATISFIABLE
            }

            // 500 Internal Server Error
            SqlState::StreamingIo | SqlState::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the default message for this state.
    pub fn default_message(&self) -> &'static str {
        match self {
            SqlState::LobObjectInvalid => {
                "The locator or LOB object is no longer valid; it has been freed."
            }
            SqlState::BadPosition => "Invalid position; the first position is 1.",
            SqlState::NegativeLength => "Negative or zero length argument passed.",
            SqlState::NullPattern => "A pattern or search string is required.",
            SqlState::PositionTooLarge => "The position argument exceeds the size of the LOB.",
            SqlState::InvalidOffset => "Invalid offset into the supplied data.",
            SqlState::LengthTooLong => "The length argument exceeds the size of the data.",
            SqlState::InvalidApiParameter => "Invalid argument value.",
            SqlState::PosAndLengthGreaterThanLob => {
                "The sum of position and length is greater than the size of the LOB plus one."
            }
            SqlState::SubstringOutOfRange => {
                "The range specified for the substring is out of range."
            }
            SqlState::LockTimeout => "A lock could not be obtained within the time requested.",
            SqlState::StreamingIo => "An I/O error occurred while streaming a LOB value.",
            SqlState::InternalError => "An internal error occurred.",
            SqlState::NoCurrentConnection => "No current connection.",
            SqlState::RowNotFound => "No row was found.",
            SqlState::DuplicateKey => "The statement would have caused a duplicate key value.",
            SqlState::ColumnNotFound => "The column is not in the row.",
            SqlState::ColumnTypeMismatch => "The column does not hold a value of the requested type.",
        }
    }
}

impl std::fmt::Display for SqlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// LOB engine error with SQLState and message.
#[derive(Debug, Clone, Error)]
#[error("{state}: {message}")]
pub struct LobError {
    pub state: SqlState,
    pub message: String,
    pub request_id: Option<String>,
}

impl LobError {
    /// Creates a new error with the given state and its default message.
    pub fn new(state: SqlState) -> Self {
        Self {
            message: state.default_message().to_string(),
            state,
            request_id: None,
        }
    }

    /// Creates a new error with a custom message.
    pub fn with_message(state: SqlState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            request_id: None,
        }
    }

    /// Sets the request ID for this error.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Returns the SQLState string of this error.
    pub fn sql_state(&self) -> &'static str {
        self.state.as_str()
    }

    /// Wraps the error so it can travel through `std::io::Read`/`Write`.
    pub fn into_io(self) -> io::Error {
        io::Error::new(io::ErrorKind::Other, self)
    }
}

impl From<io::Error> for LobError {
    fn from(err: io::Error) -> Self {
        // Streams carry engine errors inside io::Error; unwrap them unchanged.
        if let Some(inner) = err.get_ref().and_then(|e| e.downcast_ref::<LobError>()) {
            return inner.clone();
        }
        LobError::with_message(SqlState::StreamingIo, format!("I/O error: {}", err))
    }
}

impl IntoResponse for LobError {
    fn into_response(self) -> Response {
        let status = self.state.status_code();
        let request_id = self
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");

        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Error>
  <SqlState>{}</SqlState>
  <Message>{}
RequestId:{}
Time:{}</Message>
</Error>"#,
            self.state.as_str(),
            xml_escape(&self.message),
            request_id,
            timestamp
        );

        let mut response = (
            status,
            [
                ("Content-Type", "application/xml".to_string()),
                ("x-lob-request-id", request_id),
                ("x-lob-sqlstate", self.state.as_str().to_string()),
            ],
            xml,
        )
            .into_response();

        // Put the message in the status line so plain HTTP clients can see it.
        if let Ok(reason) = ReasonPhrase::try_from(self.message.as_bytes()) {
            response.extensions_mut().insert(reason);
        }

        response
    }
}

/// Escapes special XML characters in a string.
pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Result type alias for LOB operations.
pub type LobResult<T> = Result<T, LobError>;
