//! Built-in retry validators.
//!
//! A validator is a pure, stateless predicate over the outgoing request,
//! the received response, and the number of retries already attempted.
//! Invoking it repeatedly must not affect the outcome.

use std::sync::Arc;

use crate::defaults::{MAX_RETRY_ATTEMPTS, RETRYABLE_POST_ENDPOINTS};
use crate::types::{HttpMethod, HttpRequest, HttpResponse, ResponseBody};

/// Decides whether a received response should be retried.
///
/// `retry_count` is 0 when validating the response to the first attempt.
/// Validators alone terminate the retry loop; one that always returns
/// `true` makes the pipeline loop forever.
pub trait RetryValidator: Send + Sync {
    fn should_retry(
        &self,
        request: &HttpRequest,
        response: &HttpResponse<ResponseBody>,
        retry_count: u32,
    ) -> bool;
}

fn is_retryable_status(status: u16) -> bool {
    (100..200).contains(&status) || status == 429 || (500..600).contains(&status)
}

/// Retries idempotent methods on informational, throttling, and server
/// error statuses.
#[derive(Debug, Clone)]
pub struct UniversalRetryValidator {
    max_retries: u32,
}

impl UniversalRetryValidator {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

impl Default for UniversalRetryValidator {
    fn default() -> Self {
        Self::new(MAX_RETRY_ATTEMPTS)
    }
}

impl RetryValidator for UniversalRetryValidator {
    fn should_retry(
        &self,
        request: &HttpRequest,
        response: &HttpResponse<ResponseBody>,
        retry_count: u32,
    ) -> bool {
        retry_count < self.max_retries
            && request.method.is_idempotent()
            && is_retryable_status(response.status)
    }
}

/// Extends the universal rules with an allow-list of POST endpoints that
/// are known to be safe to retry (list/search/lookup endpoints that use
/// POST only to carry a body).
#[derive(Debug, Clone)]
pub struct EndpointRetryValidator {
    max_retries: u32,
    endpoints: Vec<String>,
}

impl EndpointRetryValidator {
    pub fn new(endpoints: impl IntoIterator<Item = impl Into<String>>, max_retries: u32) -> Self {
        Self {
            max_retries,
            endpoints: endpoints.into_iter().map(Into::into).collect(),
        }
    }

    /// Validator configured with the platform's bulk/list endpoints.
    pub fn platform_default(max_retries: u32) -> Self {
        Self::new(RETRYABLE_POST_ENDPOINTS.iter().copied(), max_retries)
    }

    fn matches_endpoint(&self, path: &str) -> bool {
        let path = path.to_lowercase();
        self.endpoints
            .iter()
            .any(|endpoint| path.contains(&endpoint.to_lowercase()))
    }
}

impl RetryValidator for EndpointRetryValidator {
    fn should_retry(
        &self,
        request: &HttpRequest,
        response: &HttpResponse<ResponseBody>,
        retry_count: u32,
    ) -> bool {
        if retry_count >= self.max_retries || !is_retryable_status(response.status) {
            return false;
        }
        request.method.is_idempotent()
            || (request.method == HttpMethod::Post && self.matches_endpoint(&request.path))
    }
}

/// The validator used by clients that do not supply their own.
pub fn platform_retry_validator(max_retries: u32) -> Arc<dyn RetryValidator> {
    Arc::new(EndpointRetryValidator::platform_default(max_retries))
}
