//! The top-level platform client.
//!
//! [`StrataClient`] owns the layered HTTP pipeline, the credential
//! coordinator, and the response-metadata sidecar, and hands out
//! [`ResourceApi`] handles scoped to the configured project.

use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::auth::{RecoveryAction, SingleFlight, TokenProvider, UnauthorizedHandler};
use crate::defaults::{self, X_STRATA_APP, X_STRATA_SDK};
use crate::error::{Error, HttpError};
use crate::execution::http::{ApiHttpClient, BasicHttpClient, RetryableHttpClient};
use crate::metadata::{MetadataMap, ResponseMetadata, Tracked};
use crate::resource::ResourceApi;
use crate::retry::platform_retry_validator;
use crate::types::{HttpRequest, HttpResponse, ResponseBody};

const DEFAULT_BASE_URL: &str = "https://api.strata.dev";

/// Shares one token fetch between every caller that needs it.
///
/// Sign-in and 401 recovery both go through [`Self::fresh_token`], so
/// overlapping refreshes collapse into a single provider call. The last
/// applied token is remembered to detect refreshes that do not produce
/// new credentials.
struct TokenCoordinator {
    provider: Arc<dyn TokenProvider>,
    flight: Arc<SingleFlight<Result<String, Error>>>,
    previous: Mutex<Option<SecretString>>,
    transport: Arc<BasicHttpClient>,
}

impl TokenCoordinator {
    fn new(provider: Arc<dyn TokenProvider>, transport: Arc<BasicHttpClient>) -> Self {
        Self {
            provider,
            flight: Arc::new(SingleFlight::new()),
            previous: Mutex::new(None),
            transport,
        }
    }

    async fn fresh_token(&self) -> Result<String, Error> {
        let provider = Arc::clone(&self.provider);
        self.flight
            .run(move || async move { provider.fetch_token().await })
            .await
    }

    /// Installs `token` as the pipeline's bearer credential and records
    /// it for staleness comparison.
    fn apply(&self, token: &str) -> Result<(), Error> {
        self.transport.set_default_header(
            reqwest::header::AUTHORIZATION.as_str(),
            &format!("Bearer {token}"),
        )?;
        *self.previous.lock().unwrap() = Some(SecretString::from(token.to_string()));
        Ok(())
    }

    async fn sign_in(&self) -> Result<(), Error> {
        let token = self.fresh_token().await?;
        self.apply(&token)
    }
}

/// 401 recovery that refreshes the bearer token through the
/// coordinator.
///
/// Rejects when the provider hands back the token that was already in
/// use, which is what breaks the otherwise uncapped recovery loop.
struct RefreshingUnauthorizedHandler {
    coordinator: Arc<TokenCoordinator>,
}

#[async_trait]
impl UnauthorizedHandler for RefreshingUnauthorizedHandler {
    async fn on_unauthorized(&self, error: &HttpError, request: &HttpRequest) -> RecoveryAction {
        // Snapshot before refreshing: another task sharing the same
        // flight may install the new token first, and comparing against
        // that would mistake a successful refresh for a stale one.
        let rejected = self.coordinator.previous.lock().unwrap().clone();
        let token = match self.coordinator.fresh_token().await {
            Ok(token) => token,
            Err(refresh_error) => {
                tracing::warn!(
                    path = %request.path,
                    status = error.status,
                    error = %refresh_error,
                    "credential refresh failed"
                );
                return RecoveryAction::Reject;
            }
        };
        let stale = rejected
            .as_ref()
            .is_some_and(|p| p.expose_secret() == token);
        if stale {
            tracing::warn!(path = %request.path, "refreshed token unchanged, giving up");
            return RecoveryAction::Reject;
        }
        match self.coordinator.apply(&token) {
            Ok(()) => RecoveryAction::Retry,
            Err(_) => RecoveryAction::Reject,
        }
    }
}

/// Builder for [`StrataClient`].
pub struct ClientBuilder {
    app_id: Option<String>,
    project: Option<String>,
    base_url: String,
    api_key: Option<SecretString>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    max_retries: u32,
    metadata_capacity: usize,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            app_id: None,
            project: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            token_provider: None,
            max_retries: defaults::MAX_RETRY_ATTEMPTS,
            metadata_capacity: defaults::METADATA_CAPACITY,
        }
    }

    /// Application identifier reported in the `x-strata-app` header.
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Authenticates with a static API key instead of bearer tokens.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Authenticates with bearer tokens from `provider`, refreshed on
    /// 401 responses.
    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn metadata_capacity(mut self, capacity: usize) -> Self {
        self.metadata_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<StrataClient, Error> {
        let app_id = self
            .app_id
            .ok_or_else(|| Error::Config("app_id is required".into()))?;
        let project = self
            .project
            .ok_or_else(|| Error::Config("project is required".into()))?;
        if self.api_key.is_some() && self.token_provider.is_some() {
            return Err(Error::Config(
                "configure either api_key or token_provider, not both".into(),
            ));
        }

        let transport = Arc::new(BasicHttpClient::new(&self.base_url)?);
        transport.set_default_header(X_STRATA_APP, &app_id)?;
        transport.set_default_header(X_STRATA_SDK, &defaults::sdk_identifier())?;

        let http = Arc::new(ApiHttpClient::new(RetryableHttpClient::new(
            Arc::clone(&transport),
            platform_retry_validator(self.max_retries),
        )));

        let mut coordinator = None;
        if let Some(key) = &self.api_key {
            http.set_api_key(key.expose_secret())?;
        } else if let Some(provider) = self.token_provider {
            let shared = Arc::new(TokenCoordinator::new(provider, transport));
            http.set_unauthorized_handler(Arc::new(RefreshingUnauthorizedHandler {
                coordinator: Arc::clone(&shared),
            }));
            coordinator = Some(shared);
        }

        Ok(StrataClient {
            http,
            metadata: Arc::new(MetadataMap::with_capacity(self.metadata_capacity)),
            project,
            coordinator,
        })
    }
}

/// Client for the Strata data platform.
pub struct StrataClient {
    http: Arc<ApiHttpClient>,
    metadata: Arc<MetadataMap>,
    project: String,
    coordinator: Option<Arc<TokenCoordinator>>,
}

impl StrataClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Fetches a token from the provider and installs it, so the first
    /// API call does not pay the 401 round-trip.
    ///
    /// A no-op in api-key mode.
    pub async fn authenticate(&self) -> Result<(), Error> {
        match &self.coordinator {
            Some(coordinator) => coordinator.sign_in().await,
            None => Ok(()),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Root path of the configured project's API.
    pub fn project_url(&self) -> String {
        format!("/api/v1/projects/{}", self.project)
    }

    /// Typed access to one resource family, e.g. `"assets"`.
    pub fn resource(&self, name: &str) -> ResourceApi {
        ResourceApi::new(
            format!("{}/{}", self.project_url(), name.trim_matches('/')),
            Arc::clone(&self.http),
            Arc::clone(&self.metadata),
        )
    }

    /// Sends a prebuilt request through the full pipeline.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse<ResponseBody>, Error> {
        self.http.request(request).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<HttpResponse<T>, Error> {
        self.http.request_json(HttpRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<HttpResponse<T>, Error> {
        self.http
            .request_json(HttpRequest::post(path).with_body(body))
            .await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<HttpResponse<T>, Error> {
        self.http
            .request_json(HttpRequest::put(path).with_body(body))
            .await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<HttpResponse<T>, Error> {
        self.http
            .request_json(HttpRequest::patch(path).with_body(body))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<HttpResponse<T>, Error> {
        self.http.request_json(HttpRequest::delete(path)).await
    }

    /// Adds a header applied to the next request only.
    pub fn add_one_time_header(&self, name: &str, value: &str) -> Result<(), Error> {
        self.http.add_one_time_header(name, value)
    }

    pub fn get_default_headers(&self) -> HeaderMap {
        self.http.transport().default_headers()
    }

    pub fn get_base_url(&self) -> String {
        self.http.transport().base_url().to_string()
    }

    /// Status and headers of the response behind a tracked result.
    pub fn get_metadata<T>(&self, tracked: &Tracked<T>) -> Option<ResponseMetadata> {
        self.metadata.get(tracked.key())
    }

    /// The underlying pipeline, for requests that need full control.
    pub fn http(&self) -> &Arc<ApiHttpClient> {
        &self.http
    }
}
