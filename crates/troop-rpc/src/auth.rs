//! HTTP Basic authentication for admin endpoints.

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use subtle::ConstantTimeEq;

use troop_core::error::CoordinatorError;

/// Check the `Authorization: Basic` header against the admin password.
/// The password comparison is constant-time; the username is ignored.
pub fn require_admin(headers: &HeaderMap, expected_password: &str) -> Result<(), CoordinatorError> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| BASE64.decode(encoded).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|creds| creds.split_once(':').map(|(_, password)| password.to_string()))
        .ok_or(CoordinatorError::InvalidAdminCredentials)?;

    if constant_time_eq(&presented, expected_password) {
        Ok(())
    } else {
        Err(CoordinatorError::InvalidAdminCredentials)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_basic(user: &str, password: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let encoded = BASE64.encode(format!("{user}:{password}"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        headers
    }

    #[test]
    fn correct_password_passes_regardless_of_username() {
        assert!(require_admin(&headers_with_basic("admin", "s3cret"), "s3cret").is_ok());
        assert!(require_admin(&headers_with_basic("anyone", "s3cret"), "s3cret").is_ok());
    }

    #[test]
    fn wrong_or_missing_credentials_fail() {
        assert!(require_admin(&headers_with_basic("admin", "wrong"), "s3cret").is_err());
        assert!(require_admin(&HeaderMap::new(), "s3cret").is_err());

        let mut bearer = HeaderMap::new();
        bearer.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert!(require_admin(&bearer, "s3cret").is_err());

        let mut garbled = HeaderMap::new();
        garbled.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic ????"));
        assert!(require_admin(&garbled, "s3cret").is_err());
    }
}
