//! Transport layer: builds one request, performs one network call, and
//! classifies non-2xx results.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Url;
use serde_json::Value;
use std::sync::RwLock;

use crate::error::{Error, HttpError};
use crate::execution::http::headers::{header_pair, merge_headers, with_default_field};
use crate::types::{HttpRequest, HttpResponse, QueryParams, ResponseBody, ResponseKind};

/// A basic HTTP client with default headers and a base URL.
///
/// A request path starting with `http(s)://` bypasses the base URL.
/// Query parameters are serialized from JSON values; request bodies are
/// encoded as JSON. The client performs exactly one network call per
/// [`send`](Self::send); retrying and authentication live in the layers
/// above.
pub struct BasicHttpClient {
    http: reqwest::Client,
    base_url: Url,
    default_headers: RwLock<HeaderMap>,
}

impl BasicHttpClient {
    pub fn new(base_url: &str) -> Result<Self, Error> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| Error::Config(format!("invalid base url '{base_url}': {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            default_headers: RwLock::new(HeaderMap::new()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Sets a header applied to every outgoing request unless overridden
    /// per call.
    pub fn set_default_header(&self, name: &str, value: &str) -> Result<(), Error> {
        let (name, value) = header_pair(name, value)?;
        self.default_headers.write().unwrap().insert(name, value);
        Ok(())
    }

    pub fn remove_default_header(&self, name: &str) {
        self.default_headers.write().unwrap().remove(name);
    }

    pub fn default_headers(&self) -> HeaderMap {
        self.default_headers.read().unwrap().clone()
    }

    /// Default headers overlaid with per-call headers; per-call wins.
    pub(crate) fn populate_default_headers(&self, per_call: &HeaderMap) -> HeaderMap {
        merge_headers(self.default_headers.read().unwrap().clone(), per_call)
    }

    pub(crate) fn is_success(status: u16) -> bool {
        (200..300).contains(&status)
    }

    /// Raises the response as a [`HttpError`] when its status falls
    /// outside the success range.
    pub fn validate(
        response: HttpResponse<ResponseBody>,
    ) -> Result<HttpResponse<ResponseBody>, Error> {
        if Self::is_success(response.status) {
            Ok(response)
        } else {
            Err(HttpError {
                status: response.status,
                body: response.data.to_value(),
                headers: response.headers,
            }
            .into())
        }
    }

    pub(crate) fn resolve_url(&self, path: &str, params: &QueryParams) -> Result<Url, Error> {
        let mut url = if path.starts_with("http://") || path.starts_with("https://") {
            Url::parse(path).map_err(|e| Error::Config(format!("invalid url '{path}': {e}")))?
        } else {
            let path = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            };
            self.base_url
                .join(&path)
                .map_err(|e| Error::Config(format!("invalid path '{path}': {e}")))?
        };
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                if let Some(rendered) = render_query_value(value) {
                    pairs.append_pair(key, &rendered);
                }
            }
        }
        // All-null params leave an empty query behind.
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    /// Performs one network call without retrying or status validation.
    pub(crate) async fn send(
        &self,
        request: &HttpRequest,
    ) -> Result<HttpResponse<ResponseBody>, Error> {
        let url = self.resolve_url(&request.path, &request.params)?;
        let mut headers = request.headers.clone();
        with_default_field(
            &mut headers,
            ACCEPT,
            HeaderValue::from_static("application/json"),
        );

        let mut builder = self
            .http
            .request(request.method.to_reqwest(), url.clone())
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let response_headers = response.headers().clone();
        let data = match request.response_kind {
            ResponseKind::Json => {
                let bytes = response.bytes().await?;
                match serde_json::from_slice(&bytes) {
                    Ok(value) => ResponseBody::Json(value),
                    // Keep non-JSON bodies inspectable as text.
                    Err(_) => ResponseBody::Text(String::from_utf8_lossy(&bytes).into_owned()),
                }
            }
            ResponseKind::Text => ResponseBody::Text(response.text().await?),
            ResponseKind::Bytes => ResponseBody::Bytes(response.bytes().await?),
        };
        tracing::debug!(method = %request.method, %url, status, "request completed");
        Ok(HttpResponse {
            data,
            status,
            headers: response_headers,
        })
    }

    /// One call with default headers applied and the status validated.
    pub async fn request(
        &self,
        request: HttpRequest,
    ) -> Result<HttpResponse<ResponseBody>, Error> {
        let mut prepared = request;
        prepared.headers = self.populate_default_headers(&prepared.headers);
        let response = self.send(&prepared).await?;
        Self::validate(response)
    }
}

/// Renders one query parameter value: scalars verbatim, arrays as
/// `[a,b]`, objects as JSON. `null` values are skipped.
fn render_query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            Some(format!("[{}]", parts.join(",")))
        }
        Value::Object(_) => Some(value.to_string()),
    }
}
