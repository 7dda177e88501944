//! Default constants shared across the pipeline layers.

/// Application identifier header, set on every outgoing request.
pub const X_STRATA_APP: &str = "x-strata-app";
/// SDK identifier header, set on every outgoing request.
pub const X_STRATA_SDK: &str = "x-strata-sdk";
/// API-key header used instead of a bearer token in api-key mode.
pub const API_KEY_HEADER: &str = "api-key";
/// Response header carrying the server-side request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// SDK identifier value reported via [`X_STRATA_SDK`].
pub fn sdk_identifier() -> String {
    format!("StrataRustSDK:{}", env!("CARGO_PKG_VERSION"))
}

/// Default retry budget consulted by the built-in retry validators.
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Default number of items per chunk in bulk operations.
pub const CHUNK_SIZE: usize = 1000;

/// Default item limit for pagination materialization.
pub const LIST_LIMIT: usize = 25;

/// Default capacity of the response-metadata sidecar.
pub const METADATA_CAPACITY: usize = 1024;

/// POST endpoints that are safe to retry despite not being idempotent.
///
/// These are list/search/lookup endpoints that use POST only to carry a
/// request body; re-issuing them has no server-side effect.
pub const RETRYABLE_POST_ENDPOINTS: &[&str] = &[
    "/assets/list",
    "/assets/byids",
    "/assets/search",
    "/events/list",
    "/events/byids",
    "/events/search",
    "/files/list",
    "/files/byids",
    "/files/search",
    "/files/downloadlink",
    "/containers/list",
    "/containers/byids",
    "/sequences/list",
    "/sequences/byids",
    "/sequences/search",
    "/timeseries/byids",
    "/timeseries/search",
    "/timeseries/data",
    "/timeseries/data/list",
    "/timeseries/data/latest",
];

/// Paths exempt from 401 recovery, to avoid recursing while checking
/// authentication state itself.
pub const AUTH_INTROSPECTION_PATHS: &[&str] = &["/login/status", "/logout/url", "/token/inspect"];
