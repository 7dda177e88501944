//! Core value types shared across the pipeline layers.

pub mod http;

pub use http::*;
