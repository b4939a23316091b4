//! Query-string encoding for resource URIs.
//!
//! Names and values are percent-encoded independently, keeping only RFC 3986
//! unreserved characters literal. Pair order is preserved exactly as given.

use crate::error::ApiError;

/// Encode `(name, value)` pairs as `name=value&name=value`.
pub fn encode_query<K, V>(params: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    params
        .iter()
        .map(|(name, value)| {
            format!(
                "{}={}",
                urlencoding::encode(name.as_ref()),
                urlencoding::encode(value.as_ref())
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Append encoded pairs to `uri`, using `&` when it already carries a query.
/// An empty parameter list returns `uri` unchanged.
pub fn append_query<K, V>(uri: &str, params: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    if params.is_empty() {
        return uri.to_string();
    }
    let query = encode_query(params);
    match uri.find('?') {
        None => format!("{uri}?{query}"),
        Some(pos) if pos + 1 == uri.len() || uri.ends_with('&') => format!("{uri}{query}"),
        Some(_) => format!("{uri}&{query}"),
    }
}

/// Decode a query string (without the leading `?`) back into pairs.
pub fn decode_query(query: &str) -> Result<Vec<(String, String)>, ApiError> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            Ok((decode_component(name)?, decode_component(value)?))
        })
        .collect()
}

fn decode_component(raw: &str) -> Result<String, ApiError> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| ApiError::DeserializationError(format!("invalid query component {raw:?}: {e}")))
}
