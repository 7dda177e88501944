//! Request execution layers.

pub mod http;
