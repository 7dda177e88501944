//! Retry Policy Module
//!
//! Pure predicates deciding whether a received response should be
//! retried. The retry loop itself lives in
//! [`crate::execution::http::retry`].

mod policy;

pub use policy::{
    platform_retry_validator, EndpointRetryValidator, RetryValidator, UniversalRetryValidator,
};
