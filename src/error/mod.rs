//! Error Handling Module
//!
//! The taxonomy mirrors the pipeline layers:
//! - [`HttpError`] — a raw non-2xx response, produced by the transport and
//!   never shown to end users directly.
//! - [`ApiError`] — the platform error envelope decoded out of an
//!   [`HttpError`], surfaced by single-item operations.
//! - [`MultiError`] — the aggregate outcome of a chunked bulk operation.
//! - [`LoginError`] — a rejection reason produced by external login flows;
//!   the pipeline only forwards it.
//!
//! [`Error`] is the crate-level enum wrapping all of the above plus
//! network and configuration failures.

use reqwest::header::HeaderMap;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::defaults::X_REQUEST_ID;

/// Raw non-2xx transport failure carrying the undecoded response.
#[derive(Debug, Clone)]
pub struct HttpError {
    pub status: u16,
    /// Parsed response body; a JSON value when the body was JSON, a string
    /// value otherwise.
    pub body: Value,
    pub headers: HeaderMap,
}

impl HttpError {
    pub fn request_id(&self) -> Option<&str> {
        self.headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request failed | code: {}", self.status)?;
        if let Some(id) = self.request_id() {
            write!(f, " | {X_REQUEST_ID}: {id}")?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpError {}

/// Structured platform error decoded from the `{"error": {...}}` envelope.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    /// Server-side correlation id from the `x-request-id` response header.
    pub request_id: Option<String>,
    /// Items the server reported as missing (lookup endpoints).
    pub missing: Option<Vec<Value>>,
    /// Items the server reported as duplicated (create endpoints).
    pub duplicated: Option<Vec<Value>>,
    /// Free-form extra data attached by the server.
    pub extra: Option<Value>,
}

impl ApiError {
    /// Decodes the platform error envelope out of a transport failure.
    ///
    /// Returns `None` when the body does not carry an `error.message`
    /// field, in which case the raw [`HttpError`] should surface instead.
    pub fn from_http(err: &HttpError) -> Option<Self> {
        let envelope = err.body.get("error")?;
        let message = envelope.get("message")?.as_str()?.to_string();
        let as_array = |key: &str| {
            envelope
                .get(key)
                .and_then(Value::as_array)
                .map(|a| a.to_vec())
        };
        Some(Self {
            status: err.status,
            message,
            request_id: err.request_id().map(str::to_string),
            missing: as_array("missing"),
            duplicated: as_array("duplicated"),
            extra: envelope.get("extra").cloned(),
        })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | code: {}", self.message, self.status)?;
        if let Some(id) = &self.request_id {
            write!(f, " | {X_REQUEST_ID}: {id}")?;
        }
        if self.missing.is_some() || self.duplicated.is_some() {
            let details = serde_json::json!({
                "missing": self.missing,
                "duplicated": self.duplicated,
            });
            write!(f, "\n{details}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

/// Aggregate outcome of a chunked bulk operation.
///
/// Input partitions and chunk response payloads are recorded as JSON
/// values so the aggregate stays uniform regardless of the item type.
/// `status` and `request_id` mirror the first underlying [`ApiError`]
/// for convenience.
#[derive(Debug, Clone, Default)]
pub struct MultiError {
    /// Input items whose chunk completed successfully.
    pub succeeded: Vec<Value>,
    /// Input items whose chunk failed, or was never attempted.
    pub failed: Vec<Value>,
    /// Response payloads of the chunks that completed.
    pub responses: Vec<Value>,
    /// One underlying error per failed chunk.
    pub errors: Vec<Error>,
    pub status: Option<u16>,
    pub request_id: Option<String>,
    pub statuses: Vec<u16>,
    pub request_ids: Vec<String>,
    pub missing: Vec<Value>,
    pub duplicated: Vec<Value>,
}

impl MultiError {
    pub fn new(
        succeeded: Vec<Value>,
        failed: Vec<Value>,
        responses: Vec<Value>,
        errors: Vec<Error>,
    ) -> Self {
        let mut aggregate = Self {
            succeeded,
            failed,
            responses,
            ..Self::default()
        };
        for err in &errors {
            if let Error::Api(api) = err {
                aggregate.statuses.push(api.status);
                if let Some(id) = &api.request_id {
                    aggregate.request_ids.push(id.clone());
                }
                if let Some(missing) = &api.missing {
                    aggregate.missing.extend(missing.iter().cloned());
                }
                if let Some(duplicated) = &api.duplicated {
                    aggregate.duplicated.extend(duplicated.iter().cloned());
                }
            }
        }
        aggregate.status = aggregate.statuses.first().copied();
        aggregate.request_id = aggregate.request_ids.first().cloned();
        aggregate.errors = errors;
        aggregate
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the API failed to process some items ({} succeeded, {} failed)",
            self.succeeded.len(),
            self.failed.len()
        )?;
        if let Some(status) = self.status {
            write!(f, " | code: {status}")?;
        }
        if let Some(id) = &self.request_id {
            write!(f, " | {X_REQUEST_ID}: {id}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

/// Rejection reason produced by external login/credential flows.
#[derive(Debug, Clone, Error)]
#[error("login failed: {reason}")]
pub struct LoginError {
    pub reason: String,
}

impl LoginError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Crate-level error type.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Raw non-2xx response whose body did not carry the error envelope.
    #[error(transparent)]
    Transport(HttpError),

    /// Decoded platform error.
    #[error(transparent)]
    Api(ApiError),

    /// Aggregate of a chunked bulk operation.
    #[error(transparent)]
    Bulk(Box<MultiError>),

    /// Credential acquisition failed.
    #[error(transparent)]
    Login(#[from] LoginError),

    /// The network call itself failed (connect, TLS, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Invalid client configuration or request construction.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Response body could not be decoded into the requested type.
    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    /// Converts a transport failure into the error surfaced to callers:
    /// the decoded [`ApiError`] when the envelope is present, the raw
    /// [`HttpError`] otherwise.
    pub fn from_http_response(err: HttpError) -> Self {
        match ApiError::from_http(&err) {
            Some(api) => Error::Api(api),
            None => Error::Transport(err),
        }
    }

    /// HTTP status associated with this error, when any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Transport(e) => Some(e.status),
            Error::Api(e) => Some(e.status),
            Error::Bulk(e) => e.status,
            _ => None,
        }
    }

    /// Request correlation id associated with this error, when any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Error::Transport(e) => e.request_id(),
            Error::Api(e) => e.request_id.as_deref(),
            Error::Bulk(e) => e.request_id.as_deref(),
            _ => None,
        }
    }

    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_bulk(&self) -> Option<&MultiError> {
        match self {
            Error::Bulk(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HttpError> for Error {
    fn from(err: HttpError) -> Self {
        Error::Transport(err)
    }
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        Error::Api(err)
    }
}

impl From<MultiError> for Error {
    fn from(err: MultiError) -> Self {
        Error::Bulk(Box::new(err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}
