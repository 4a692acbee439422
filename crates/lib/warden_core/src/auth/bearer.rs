//! Bearer token extraction.

use http::HeaderMap;
use http::header::AUTHORIZATION;

/// Pull the token out of `Authorization: Bearer <token>`.
///
/// This is a probe: a missing header, another scheme, or an empty token all
/// yield `None`.
pub fn extract_token_from_request(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}
