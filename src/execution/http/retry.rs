//! The retrying layer: wraps the transport in a validator-driven backoff
//! loop.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::execution::http::transport::BasicHttpClient;
use crate::retry::RetryValidator;
use crate::types::{HttpRequest, HttpResponse, ResponseBody, RetryOverride};

/// Exponential backoff delay before retry number `retry_count`.
///
/// 250ms for the first retry, then 750ms, 1750ms, 3750ms and so on.
/// Deterministic on purpose so tests and traces stay reproducible.
pub fn backoff_delay(retry_count: u32) -> Duration {
    let doublings = (1u64 << retry_count.min(32)) - 1;
    Duration::from_millis(250 + doublings * 500)
}

/// Transport plus a retry loop.
///
/// Each response is passed to the active [`RetryValidator`]; while it
/// approves, the client sleeps for [`backoff_delay`] and resends. The
/// validator alone decides when to stop. Requests can opt out or swap
/// the validator per call through [`RetryOverride`].
pub struct RetryableHttpClient {
    transport: Arc<BasicHttpClient>,
    validator: Arc<dyn RetryValidator>,
}

impl RetryableHttpClient {
    pub fn new(transport: Arc<BasicHttpClient>, validator: Arc<dyn RetryValidator>) -> Self {
        Self {
            transport,
            validator,
        }
    }

    pub fn transport(&self) -> &Arc<BasicHttpClient> {
        &self.transport
    }

    /// Sends the request, retrying per the validator, and returns the
    /// final raw response without status validation.
    ///
    /// Network-level failures are returned immediately; only received
    /// responses are candidates for retry.
    pub(crate) async fn send(
        &self,
        request: &HttpRequest,
    ) -> Result<HttpResponse<ResponseBody>, Error> {
        let validator: Option<&dyn RetryValidator> = match &request.retry {
            RetryOverride::Client => Some(self.validator.as_ref()),
            RetryOverride::Disabled => None,
            RetryOverride::Validator(v) => Some(v.as_ref()),
        };

        let mut retry_count = 0u32;
        loop {
            let response = self.transport.send(request).await?;
            let Some(validator) = validator else {
                return Ok(response);
            };
            if !validator.should_retry(request, &response, retry_count) {
                return Ok(response);
            }
            let delay = backoff_delay(retry_count);
            tracing::debug!(
                method = %request.method,
                path = %request.path,
                status = response.status,
                retry_count,
                delay_ms = delay.as_millis() as u64,
                "retrying request"
            );
            tokio::time::sleep(delay).await;
            retry_count += 1;
        }
    }

    /// Sends with retries and raises non-2xx responses as errors.
    pub async fn request(
        &self,
        request: HttpRequest,
    ) -> Result<HttpResponse<ResponseBody>, Error> {
        let mut prepared = request;
        prepared.headers = self.transport.populate_default_headers(&prepared.headers);
        let response = self.send(&prepared).await?;
        BasicHttpClient::validate(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        assert_eq!(backoff_delay(0), Duration::from_millis(250));
        assert_eq!(backoff_delay(1), Duration::from_millis(750));
        assert_eq!(backoff_delay(2), Duration::from_millis(1750));
        assert_eq!(backoff_delay(3), Duration::from_millis(3750));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        // Pathological counts must not panic on the shift.
        let _ = backoff_delay(u32::MAX);
    }
}
