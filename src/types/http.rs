//! HTTP request/response value types.
//!
//! [`HttpRequest`] is an immutable value passed through the pipeline
//! layers; each layer builds a derived request rather than mutating the
//! caller's. [`HttpResponse`] pairs the decoded body with the status and
//! headers of the response that produced it.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::execution::http::headers::header_pair;
use crate::retry::RetryValidator;

/// HTTP methods supported by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether re-issuing a request with this method is safe without
    /// knowledge of the endpoint.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self,
            Self::Get | Self::Head | Self::Options | Self::Delete | Self::Put
        )
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Head => reqwest::Method::HEAD,
            Self::Options => reqwest::Method::OPTIONS,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested shape of the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    #[default]
    Json,
    Text,
    Bytes,
}

/// Response body parsed according to the requested [`ResponseKind`].
///
/// A `Json` request whose body turns out not to be valid JSON falls back
/// to `Text`, so error pages from intermediaries stay inspectable.
#[derive(Debug, Clone)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Best-effort JSON view of the body, for error classification.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Json(v) => v.clone(),
            Self::Text(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
            Self::Bytes(b) => serde_json::from_slice(b).unwrap_or(Value::Null),
        }
    }
}

/// Query parameters serialized onto the request URL.
///
/// Scalars are rendered verbatim, arrays as `[a,b]`, objects as JSON.
pub type QueryParams = BTreeMap<String, Value>;

/// Per-request override of the client-level retry validator.
#[derive(Clone, Default)]
pub enum RetryOverride {
    /// Use the validator the client was constructed with.
    #[default]
    Client,
    /// Never retry this request.
    Disabled,
    /// Use a request-specific validator.
    Validator(Arc<dyn RetryValidator>),
}

impl fmt::Debug for RetryOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("Client"),
            Self::Disabled => f.write_str("Disabled"),
            Self::Validator(_) => f.write_str("Validator(..)"),
        }
    }
}

/// One outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Path relative to the client's base URL, or an absolute
    /// `http(s)://` URL which bypasses the base URL entirely.
    pub path: String,
    pub params: QueryParams,
    /// JSON body; serialized with `Content-Type: application/json`.
    pub body: Option<Value>,
    pub headers: HeaderMap,
    pub response_kind: ResponseKind,
    pub retry: RetryOverride,
    /// Send credential headers even when the target origin differs from
    /// the client's base origin.
    pub with_credentials: bool,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: QueryParams::new(),
            body: None,
            headers: HeaderMap::new(),
            response_kind: ResponseKind::Json,
            retry: RetryOverride::Client,
            with_credentials: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serializes `body` as the JSON request body.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        let (name, value) = header_pair(name, value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_response_kind(mut self, kind: ResponseKind) -> Self {
        self.response_kind = kind;
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    /// Disables retries for this request.
    pub fn without_retry(mut self) -> Self {
        self.retry = RetryOverride::Disabled;
        self
    }

    pub fn with_retry_validator(mut self, validator: Arc<dyn RetryValidator>) -> Self {
        self.retry = RetryOverride::Validator(validator);
        self
    }
}

/// One received response.
#[derive(Debug, Clone)]
pub struct HttpResponse<T> {
    pub data: T,
    pub status: u16,
    pub headers: HeaderMap,
}

impl<T> HttpResponse<T> {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> HttpResponse<U> {
        HttpResponse {
            data: f(self.data),
            status: self.status,
            headers: self.headers,
        }
    }
}

impl HttpResponse<ResponseBody> {
    /// Decodes the body into a typed value.
    pub fn decode<T: DeserializeOwned>(self) -> Result<HttpResponse<T>, Error> {
        let data = match &self.data {
            ResponseBody::Json(v) => serde_json::from_value(v.clone())?,
            ResponseBody::Text(s) => serde_json::from_str(s)?,
            ResponseBody::Bytes(b) => serde_json::from_slice(b)?,
        };
        Ok(HttpResponse {
            data,
            status: self.status,
            headers: self.headers,
        })
    }
}

/// Wire shape of item-carrying responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsWrapper<T> {
    pub items: Vec<T>,
}

/// Wire shape of one page of a cursor-paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}
