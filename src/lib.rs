//! strata-sdk
//!
//! Client for the Strata data platform, built around a layered HTTP
//! pipeline: a plain transport, a validator-driven retry loop, and an
//! authenticated layer handling credential headers and 401 recovery.
//! On top sit chunked bulk execution, cursor pagination, and a
//! response-metadata sidecar.
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_sdk::{auth::TokenFn, StrataClient};
//!
//! # async fn demo() -> Result<(), strata_sdk::Error> {
//! let client = StrataClient::builder()
//!     .app_id("my-app")
//!     .project("my-project")
//!     .token_provider(Arc::new(TokenFn(|| async {
//!         Ok("token-from-idp".to_string())
//!     })))
//!     .build()?;
//! client.authenticate().await?;
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]

pub mod auth;
pub mod bulk;
pub mod client;
pub mod defaults;
pub mod error;
pub mod execution;
pub mod metadata;
pub mod pagination;
pub mod resource;
pub mod retry;
pub mod types;

pub use client::{ClientBuilder, StrataClient};
pub use error::{ApiError, Error, HttpError, LoginError, MultiError};
pub use execution::http::{ApiHttpClient, BasicHttpClient, RetryableHttpClient};
pub use metadata::{MetadataMap, ResponseMetadata, Tracked};
pub use pagination::{AutoPager, ListResponse, PageLimit};
pub use resource::ResourceApi;
pub use retry::{EndpointRetryValidator, RetryValidator, UniversalRetryValidator};
pub use types::{
    CursorPage, HttpMethod, HttpRequest, HttpResponse, ItemsWrapper, QueryParams, ResponseBody,
    ResponseKind, RetryOverride,
};
