//! Chunked bulk execution.
//!
//! Large item collections are split into fixed-size chunks and executed
//! either in parallel or in sequence. Partial failures are reported as
//! one [`MultiError`] that partitions the original inputs into
//! succeeded and failed sets.

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;

use crate::error::{Error, MultiError};
use crate::types::{HttpResponse, ItemsWrapper};

/// How the chunks of one bulk operation are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// All chunks in flight at once; every chunk is attempted even when
    /// some fail.
    #[default]
    Parallel,
    /// One chunk at a time; the first failure stops dispatch and marks
    /// all remaining chunks as failed.
    Sequential,
}

/// Splits `items` into chunks of at most `size` items.
///
/// An empty input yields one empty chunk, so item-less operations still
/// perform exactly one request.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return vec![Vec::new()];
    }
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

/// Runs `executor` over each chunk and collects the responses in chunk
/// order.
///
/// On any chunk failure the whole operation fails with a [`MultiError`]
/// partitioning the input items by the outcome of their chunk. Items in
/// chunks that were never dispatched (sequential mode, after the first
/// failure) count as failed.
pub async fn execute_chunks<I, R, F, Fut>(
    chunks: Vec<Vec<I>>,
    mode: ExecutionMode,
    executor: F,
) -> Result<Vec<HttpResponse<ItemsWrapper<R>>>, MultiError>
where
    I: Serialize + Clone,
    R: Serialize,
    F: Fn(Vec<I>) -> Fut,
    Fut: Future<Output = Result<HttpResponse<ItemsWrapper<R>>, Error>>,
{
    let outcomes = match mode {
        ExecutionMode::Parallel => {
            join_all(chunks.iter().map(|chunk| executor(chunk.clone()))).await
        }
        ExecutionMode::Sequential => {
            let mut outcomes = Vec::with_capacity(chunks.len());
            for chunk in &chunks {
                let outcome = executor(chunk.clone()).await;
                let failed = outcome.is_err();
                outcomes.push(outcome);
                if failed {
                    break;
                }
            }
            outcomes
        }
    };

    let mut responses = Vec::with_capacity(outcomes.len());
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    let mut payloads = Vec::new();
    let mut errors = Vec::new();

    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(response) => {
                succeeded.extend(chunks[index].iter().map(to_json));
                payloads.push(
                    serde_json::to_value(&response.data).unwrap_or(Value::Null),
                );
                responses.push(response);
            }
            Err(err) => {
                failed.extend(chunks[index].iter().map(to_json));
                errors.push(err);
            }
        }
    }
    if errors.is_empty() {
        return Ok(responses);
    }
    // Chunks never dispatched count as failed.
    for chunk in chunks.iter().skip(responses.len() + errors.len()) {
        failed.extend(chunk.iter().map(to_json));
    }
    Err(MultiError::new(succeeded, failed, payloads, errors))
}

fn to_json<I: Serialize>(item: &I) -> Value {
    serde_json::to_value(item).unwrap_or(Value::Null)
}
