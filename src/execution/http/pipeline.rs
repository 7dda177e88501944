//! The authenticated pipeline layer.
//!
//! Adds one-shot headers, cross-origin credential stripping, and 401
//! recovery on top of [`RetryableHttpClient`].

use std::sync::{Arc, Mutex, RwLock};

use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::auth::{RecoveryAction, RejectUnauthorized, UnauthorizedHandler};
use crate::defaults::{API_KEY_HEADER, AUTH_INTROSPECTION_PATHS, X_STRATA_APP, X_STRATA_SDK};
use crate::error::Error;
use crate::execution::http::headers::{apply_extra_headers, bearer_string, header_pair};
use crate::execution::http::retry::RetryableHttpClient;
use crate::execution::http::transport::BasicHttpClient;
use crate::types::{HttpRequest, HttpResponse, ResponseBody};

/// The full request pipeline: transport, retries, authentication.
///
/// Header precedence per attempt, weakest first: client defaults,
/// per-call headers, one-shot headers. One-shot headers are consumed by
/// the next call to [`request`](Self::request) and apply to every
/// attempt of that call, including backoff retries and post-recovery
/// resends.
pub struct ApiHttpClient {
    inner: RetryableHttpClient,
    one_time_headers: Mutex<HeaderMap>,
    handler: RwLock<Arc<dyn UnauthorizedHandler>>,
}

impl ApiHttpClient {
    pub fn new(inner: RetryableHttpClient) -> Self {
        Self {
            inner,
            one_time_headers: Mutex::new(HeaderMap::new()),
            handler: RwLock::new(Arc::new(RejectUnauthorized)),
        }
    }

    pub fn transport(&self) -> &Arc<BasicHttpClient> {
        self.inner.transport()
    }

    /// Registers a header applied to the next request only.
    pub fn add_one_time_header(&self, name: &str, value: &str) -> Result<(), Error> {
        let (name, value) = header_pair(name, value)?;
        self.one_time_headers.lock().unwrap().insert(name, value);
        Ok(())
    }

    /// Installs the 401 recovery handler, replacing the previous one.
    pub fn set_unauthorized_handler(&self, handler: Arc<dyn UnauthorizedHandler>) {
        *self.handler.write().unwrap() = handler;
    }

    pub fn set_bearer_token(&self, token: &str) -> Result<(), Error> {
        self.transport()
            .set_default_header(AUTHORIZATION.as_str(), &bearer_string(token))
    }

    pub fn set_api_key(&self, key: &str) -> Result<(), Error> {
        self.transport().set_default_header(API_KEY_HEADER, key)
    }

    fn is_auth_introspection(path: &str) -> bool {
        let path = path.to_lowercase();
        AUTH_INTROSPECTION_PATHS
            .iter()
            .any(|exempt| path.ends_with(exempt))
    }

    /// Removes credential-bearing headers when the request targets an
    /// origin other than the client's own, unless the caller opted in
    /// with `with_credentials`.
    fn prevent_token_leakage(&self, headers: &mut HeaderMap, request: &HttpRequest) {
        if request.with_credentials {
            return;
        }
        let base = self.transport().base_url();
        if same_origin(base, &request.path) {
            return;
        }
        headers.remove(AUTHORIZATION);
        headers.remove(API_KEY_HEADER);
        headers.remove(X_STRATA_APP);
        headers.remove(X_STRATA_SDK);
    }

    /// Sends the request through the full pipeline and returns the raw
    /// successful response.
    ///
    /// A 401 on a non-introspection path is handed to the recovery
    /// handler; on [`RecoveryAction::Retry`] the request is resent with
    /// freshly merged default headers. There is no pipeline-side cap on
    /// recoveries, the handler terminates the loop by rejecting.
    pub async fn request(&self, request: HttpRequest) -> Result<HttpResponse<ResponseBody>, Error> {
        let one_time = std::mem::take(&mut *self.one_time_headers.lock().unwrap());
        loop {
            let mut prepared = request.clone();
            apply_extra_headers(&mut prepared.headers, &one_time);
            prepared.headers = self.transport().populate_default_headers(&prepared.headers);
            self.prevent_token_leakage(&mut prepared.headers, &request);

            let response = self.inner.send(&prepared).await?;
            if BasicHttpClient::is_success(response.status) {
                return Ok(response);
            }
            if response.status == 401 && !Self::is_auth_introspection(&request.path) {
                let error = match BasicHttpClient::validate(response) {
                    Err(Error::Transport(e)) => e,
                    // 401 always classifies as a transport error.
                    other => return other,
                };
                let handler = Arc::clone(&*self.handler.read().unwrap());
                match handler.on_unauthorized(&error, &request).await {
                    RecoveryAction::Retry => {
                        tracing::debug!(path = %request.path, "credentials refreshed, resending");
                        continue;
                    }
                    RecoveryAction::Reject => return Err(Error::from_http_response(error)),
                }
            }
            return BasicHttpClient::validate(response).map_err(|e| match e {
                Error::Transport(http) => Error::from_http_response(http),
                other => other,
            });
        }
    }

    /// Sends the request and decodes the JSON response body.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
    ) -> Result<HttpResponse<T>, Error> {
        self.request(request).await?.decode()
    }
}

/// Whether `path` stays on the same scheme, host, and port as `base`.
/// Relative paths always do.
fn same_origin(base: &Url, path: &str) -> bool {
    if !path.starts_with("http://") && !path.starts_with("https://") {
        return true;
    }
    match Url::parse(path) {
        Ok(target) => {
            target.scheme() == base.scheme()
                && target.host() == base.host()
                && target.port_or_known_default() == base.port_or_known_default()
        }
        Err(_) => false,
    }
}
