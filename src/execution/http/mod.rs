//! The layered HTTP pipeline.
//!
//! [`transport::BasicHttpClient`] performs one network call;
//! [`retry::RetryableHttpClient`] adds the backoff loop;
//! [`pipeline::ApiHttpClient`] adds authentication concerns on top.

pub mod headers;
pub mod pipeline;
pub mod retry;
pub mod transport;

pub use pipeline::ApiHttpClient;
pub use retry::RetryableHttpClient;
pub use transport::BasicHttpClient;
