//! Per-request HMAC-SHA256 signing (component C1: Auth Signer).

use crate::endpoints::{authz_header, authz_sig_header, authz_ts_header};

use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid HMAC key length")]
    InvalidKeyLength,

    #[error("client id is not a valid header value: {0}")]
    InvalidClientId(#[from] reqwest::header::InvalidHeaderValue),
}

/// Computes the lowercase-hex HMAC-SHA256 signature for a single request.
///
/// `method || path-and-query || hex(sha256(body)) || client_id || timestamp_ms`
/// is signed with HMAC-SHA256 keyed by `user_secret`.
fn generate_hmac(
    method: &str,
    path: &str,
    body: &[u8],
    client_id: &str,
    timestamp: i64,
    user_secret: &str,
) -> Result<String, AuthError> {
    let body_hash = Sha256::digest(body);
    let body_hash_hex = hex::encode(body_hash);

    let message = format!(
        "{} {} {} {} {}",
        method, path, body_hash_hex, client_id, timestamp
    );

    let mut mac = HmacSha256::new_from_slice(user_secret.as_bytes())
        .map_err(|_| AuthError::InvalidKeyLength)?;
    mac.update(message.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Computes the three handshake headers for a request and returns them as a
/// standalone `HeaderMap`, ready to be merged into either a `reqwest`
/// request or a WebSocket upgrade request (both use the `http` crate's
/// `HeaderMap` underneath).
pub fn generate_auth_headers(
    method: &str,
    path: &str,
    body: &[u8],
    client_id: &str,
    user_secret: &str,
    timestamp_ms: i64,
) -> Result<HeaderMap, AuthError> {
    let signature = generate_hmac(method, path, body, client_id, timestamp_ms, user_secret)?;

    let mut headers = HeaderMap::new();
    headers.insert(authz_header(), HeaderValue::from_str(client_id)?);
    headers.insert(
        authz_ts_header(),
        HeaderValue::from_str(&timestamp_ms.to_string())
            .expect("decimal timestamp is always a valid header value"),
    );
    headers.insert(
        authz_sig_header(),
        HeaderValue::from_str(&signature).expect("hex signature is always a valid header value"),
    );

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::{API_V1_FEEDS, API_V1_REPORTS_BULK};

    #[test]
    fn generate_hmac_vector_get_empty_body() {
        let got = generate_hmac(
            "GET",
            API_V1_FEEDS,
            b"",
            "clientId",
            1718885772,
            "userSecret",
        )
        .unwrap();

        assert_eq!(
            got,
            "e9b2aa1deb13b2abd078353a5e335b2f50307159ad28b433157d2c74dbab2072"
        );
    }

    #[test]
    fn generate_hmac_vector_post_empty_body() {
        let got = generate_hmac("POST", API_V1_FEEDS, b"", "clientId1", 12000, "secret1").unwrap();

        assert_eq!(
            got,
            "31b48ebdb13802b58978cd89eca0c3c68ddccf85392e703b55942544e7203d3d"
        );
    }

    #[test]
    fn generate_hmac_vector_post_json_body() {
        let body = br#"{"attr1": "value1","attr2": [1,2,3]}"#;
        let got = generate_hmac(
            "POST",
            API_V1_REPORTS_BULK,
            body,
            "clientId2",
            1718885772,
            "secret2",
        )
        .unwrap();

        assert_eq!(
            got,
            "37190febe20b6f3662f6abbfa3a7085ad705ac64e88bde8c1a01a635859e6cf7"
        );
    }

    #[test]
    fn generate_hmac_is_deterministic() {
        let a = generate_hmac("GET", "/x", b"body", "id", 42, "secret").unwrap();
        let b = generate_hmac("GET", "/x", b"body", "id", 42, "secret").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn generate_hmac_changes_with_any_input() {
        let base = generate_hmac("GET", "/x", b"body", "id", 42, "secret").unwrap();

        assert_ne!(
            base,
            generate_hmac("POST", "/x", b"body", "id", 42, "secret").unwrap()
        );
        assert_ne!(
            base,
            generate_hmac("GET", "/y", b"body", "id", 42, "secret").unwrap()
        );
        assert_ne!(
            base,
            generate_hmac("GET", "/x", b"other", "id", 42, "secret").unwrap()
        );
        assert_ne!(
            base,
            generate_hmac("GET", "/x", b"body", "other-id", 42, "secret").unwrap()
        );
        assert_ne!(
            base,
            generate_hmac("GET", "/x", b"body", "id", 43, "secret").unwrap()
        );
        assert_ne!(
            base,
            generate_hmac("GET", "/x", b"body", "id", 42, "other-secret").unwrap()
        );
    }

    #[test]
    fn generate_auth_headers_sets_all_three_headers() {
        let headers =
            generate_auth_headers("GET", API_V1_FEEDS, b"", "authzHeader", "userSecret", 1718885772)
                .unwrap();

        assert_eq!(headers.get(authz_header()).unwrap(), "authzHeader");
        assert_eq!(headers.get(authz_ts_header()).unwrap(), "1718885772");
        assert_eq!(
            headers.get(authz_sig_header()).unwrap(),
            "53373f7564f6c53905a3943ef3f3491709fac1b864a2991b63d0d3048b47317c"
        );
    }
}
