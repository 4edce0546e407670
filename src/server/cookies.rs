//! Cookie headers used by the auth routes

use axum::http::{header, HeaderMap, HeaderValue};

pub const ACCESS_TOKEN: &str = "sb-access-token";
pub const REFRESH_TOKEN: &str = "sb-refresh-token";
pub const CODE_VERIFIER: &str = "sb-code-verifier";

/// `Set-Cookie` value for a root-path session cookie.
pub fn set(name: &str, value: &str) -> String {
    format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax")
}

/// `Set-Cookie` value that expires `name` immediately.
pub fn clear(name: &str) -> String {
    format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Reads cookie `name` from the request's `Cookie` headers.
pub fn get(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Appends a `Set-Cookie` header, skipping values that are not valid header
/// text.
pub fn append(headers: &mut HeaderMap, cookie: String) {
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "dropping invalid Set-Cookie value"),
    }
}
