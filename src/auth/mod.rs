//! Credential acquisition and 401 recovery.
//!
//! Token fetches go through [`SingleFlight`] so that overlapping
//! refresh attempts from concurrent requests collapse into one call to
//! the provider.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::{Error, HttpError};
use crate::types::HttpRequest;

/// Supplies bearer tokens on demand.
///
/// Called once at sign-in and again whenever the platform rejects the
/// current credentials. Implementations decide whether to mint a fresh
/// token or return a cached one.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<String, Error>;
}

/// Adapts an async closure into a [`TokenProvider`].
pub struct TokenFn<F>(pub F);

#[async_trait]
impl<F, Fut> TokenProvider for TokenFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, Error>> + Send,
{
    async fn fetch_token(&self) -> Result<String, Error> {
        (self.0)().await
    }
}

/// What the pipeline should do with a request that got a 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Credentials were refreshed; resend the request.
    Retry,
    /// Recovery failed; surface the 401 to the caller.
    Reject,
}

/// Invoked by the pipeline when a response comes back 401.
///
/// The handler typically refreshes credentials through a shared
/// [`SingleFlight`] and updates the transport's default headers before
/// returning [`RecoveryAction::Retry`]. The pipeline places no cap on
/// recovery attempts, so the handler must eventually reject to break
/// the loop when refreshing stops helping.
#[async_trait]
pub trait UnauthorizedHandler: Send + Sync {
    async fn on_unauthorized(&self, error: &HttpError, request: &HttpRequest) -> RecoveryAction;
}

/// Default handler: every 401 is final.
pub struct RejectUnauthorized;

#[async_trait]
impl UnauthorizedHandler for RejectUnauthorized {
    async fn on_unauthorized(&self, _error: &HttpError, _request: &HttpRequest) -> RecoveryAction {
        RecoveryAction::Reject
    }
}

type FlightCell<T> = Mutex<Option<(u64, Shared<BoxFuture<'static, T>>)>>;

/// Deduplicates concurrent executions of an async operation.
///
/// Callers that arrive while a flight is in progress share its outcome.
/// The cell is cleared before any awaiter observes the result, so a
/// caller arriving after settlement always starts a fresh flight.
pub struct SingleFlight<T> {
    cell: FlightCell<T>,
    generation: AtomicU64,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            cell: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    /// Joins the in-progress flight, or starts one from `operation`.
    pub fn run<F, Fut>(self: &Arc<Self>, operation: F) -> Shared<BoxFuture<'static, T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut cell = self.cell.lock().unwrap();
        if let Some((_, flight)) = cell.as_ref() {
            return flight.clone();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        let future = operation();
        let flight = async move {
            let outcome = future.await;
            // Clear before awaiters wake so a later caller re-runs.
            let mut cell = this.cell.lock().unwrap();
            if matches!(cell.as_ref(), Some((g, _)) if *g == generation) {
                *cell = None;
            }
            outcome
        }
        .boxed()
        .shared();
        *cell = Some((generation, flight.clone()));
        flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn overlapping_callers_share_one_execution() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let flights: Vec<_> = (0..3)
            .map(|_| {
                let calls = Arc::clone(&calls);
                flight.run(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    7
                })
            })
            .collect();

        for result in futures::future::join_all(flights).await {
            assert_eq!(result, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sequential_callers_run_fresh_flights() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        for expected in 1..=2 {
            let calls = Arc::clone(&calls);
            let result = flight
                .run(move || async move { calls.fetch_add(1, Ordering::SeqCst) as u32 + 1 })
                .await;
            assert_eq!(result, expected);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn default_constructed_flight_runs() {
        let flight = Arc::new(SingleFlight::<u8>::default());
        assert_eq!(flight.run(|| async { 5 }).await, 5);
    }

    #[tokio::test]
    async fn token_fn_adapts_closures() {
        let provider = TokenFn(|| async { Ok::<_, Error>("abc".to_string()) });
        assert_eq!(provider.fetch_token().await.unwrap(), "abc");
    }
}
