//! HTTP header utilities shared by the pipeline layers.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::Error;

/// Parses a `(name, value)` string pair into typed header parts.
pub fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), Error> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::Config(format!("invalid header name '{name}': {e}")))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|e| Error::Config(format!("invalid header value for '{name}': {e}")))?;
    Ok((header_name, header_value))
}

/// Merges `extra` into `base`; `extra` wins on conflicts.
pub fn merge_headers(mut base: HeaderMap, extra: &HeaderMap) -> HeaderMap {
    for (name, value) in extra {
        base.insert(name.clone(), value.clone());
    }
    base
}

/// Applies `extra` onto `base` in place; `extra` wins on conflicts.
pub fn apply_extra_headers(base: &mut HeaderMap, extra: &HeaderMap) {
    for (name, value) in extra {
        base.insert(name.clone(), value.clone());
    }
}

/// Inserts `value` under `name` only when the header is absent.
pub fn with_default_field(headers: &mut HeaderMap, name: HeaderName, value: HeaderValue) {
    headers.entry(name).or_insert(value);
}

pub fn bearer_string(token: &str) -> String {
    format!("Bearer {token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::ACCEPT;

    #[test]
    fn merge_headers_overrides_existing_values() {
        let mut base = HeaderMap::new();
        base.insert(
            HeaderName::from_static("x-flavor"),
            HeaderValue::from_static("a,b"),
        );

        let mut extra = HeaderMap::new();
        extra.insert(
            HeaderName::from_static("x-flavor"),
            HeaderValue::from_static("c"),
        );

        let merged = merge_headers(base, &extra);
        assert_eq!(merged.get("x-flavor").unwrap(), "c");
    }

    #[test]
    fn default_field_does_not_override() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/plain"));
        with_default_field(
            &mut headers,
            ACCEPT,
            HeaderValue::from_static("application/json"),
        );
        assert_eq!(headers.get(ACCEPT).unwrap(), "text/plain");
    }

    #[test]
    fn header_pair_rejects_invalid_names() {
        assert!(header_pair("bad header", "x").is_err());
        assert!(header_pair("x-good", "ok").is_ok());
    }
}
