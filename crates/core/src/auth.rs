//! Basic and Digest authentication (RFC 2617) for protected sources.
//!
//! Sources carry an optional credential and a scheme; handlers that
//! operate on a protected source call [`authorize`] with the request's
//! `Authorization:` header. A missing header yields a challenge (401
//! with `WWW-Authenticate:`), a bad credential yields Forbidden (403).
//!
//! Digest verification follows RFC 2617 with lowercase hex:
//! `HA1 = MD5(user:realm:password)`, `HA2 = MD5(method:uri)`,
//! `expected = MD5(HA1:nonce:nc:cnonce:qop:HA2)` where fields the client
//! did not send are substituted as empty strings.

use std::collections::HashMap;

use md5::{Digest, Md5};
use rand::RngCore;

use crate::protocol::request::Method;

/// Authentication scheme required by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    #[default]
    None,
    Basic,
    Digest,
}

/// A stored username/password pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

/// Outcome of an authorization check.
#[derive(Debug)]
pub enum AuthOutcome {
    /// Request may proceed.
    Allowed,
    /// No `Authorization:` header; value is the `WWW-Authenticate:` challenge.
    Challenge(String),
    /// Credentials were supplied but do not verify.
    Forbidden,
}

/// Check a request against a source's scheme and credential.
///
/// `realm` is the protection domain advertised in challenges; sources
/// without a domain fall back to `"//"`.
pub fn authorize(
    scheme: AuthScheme,
    credential: Option<&Credential>,
    realm: &str,
    method: &Method,
    authorization: Option<&str>,
) -> AuthOutcome {
    let credential = match (scheme, credential) {
        (AuthScheme::None, _) | (_, None) => return AuthOutcome::Allowed,
        (_, Some(c)) => c,
    };

    let Some(authorization) = authorization else {
        return AuthOutcome::Challenge(challenge_header(scheme, credential, realm));
    };

    let verified = match scheme {
        AuthScheme::None => true,
        AuthScheme::Basic => verify_basic(credential, authorization),
        AuthScheme::Digest => verify_digest(credential, method.as_str(), authorization),
    };

    if verified {
        AuthOutcome::Allowed
    } else {
        AuthOutcome::Forbidden
    }
}

/// Build the `WWW-Authenticate:` challenge value for a 401.
fn challenge_header(scheme: AuthScheme, credential: &Credential, realm: &str) -> String {
    let realm = if realm.is_empty() { "//" } else { realm };
    match scheme {
        AuthScheme::None => String::new(),
        AuthScheme::Basic => format!("Basic realm={}", realm),
        AuthScheme::Digest => format!(
            "Digest username={},realm={},nonce={},cnonce={}",
            credential.username,
            realm,
            random_hex(16),
            random_hex(4)
        ),
    }
}

fn verify_basic(credential: &Credential, authorization: &str) -> bool {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    let Some(encoded) = authorization.trim().strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = BASE64.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((username, password)) = decoded.split_once(':') else {
        return false;
    };

    username == credential.username
        && constant_time_eq(password.as_bytes(), credential.password.as_bytes())
}

fn verify_digest(credential: &Credential, method: &str, authorization: &str) -> bool {
    let Some(param_str) = authorization.trim().strip_prefix("Digest ") else {
        return false;
    };
    let params = parse_auth_params(param_str);

    let (Some(username), Some(realm), Some(uri), Some(response)) = (
        params.get("username"),
        params.get("realm"),
        params.get("uri"),
        params.get("response"),
    ) else {
        return false;
    };

    let absent = String::new();
    let nonce = params.get("nonce").unwrap_or(&absent);
    let nc = params.get("nc").unwrap_or(&absent);
    let cnonce = params.get("cnonce").unwrap_or(&absent);
    let qop = params.get("qop").unwrap_or(&absent);

    let ha1 = md5_hex(&format!("{}:{}:{}", username, realm, credential.password));
    let ha2 = md5_hex(&format!("{}:{}", method, uri));
    let expected = md5_hex(&format!(
        "{}:{}:{}:{}:{}:{}",
        ha1, nonce, nc, cnonce, qop, ha2
    ));

    constant_time_eq(expected.as_bytes(), response.as_bytes())
}

/// Parse comma-separated `key=value` pairs, honouring quoted values.
fn parse_auth_params(params_str: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in params_str.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                if let Some((key, value)) = parse_single_param(&current) {
                    params.insert(key, value);
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if let Some((key, value)) = parse_single_param(&current) {
        params.insert(key, value);
    }

    params
}

fn parse_single_param(param: &str) -> Option<(String, String)> {
    let param = param.trim();
    let eq_pos = param.find('=')?;

    let key = param[..eq_pos].trim().to_lowercase();
    let value = param[eq_pos + 1..].trim().trim_matches('"').to_string();

    Some((key, value))
}

/// Lowercase RFC 2617 hex of an MD5 digest.
fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

/// Length-and-content comparison without early exit.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `n` random bytes from the thread CSPRNG, hex-encoded to `2n` chars.
fn random_hex(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Compute the Digest `response` a client would send. Test helper shared
/// with the integration suite, hence public.
pub fn digest_response(
    credential: &Credential,
    realm: &str,
    method: &str,
    uri: &str,
    nonce: &str,
) -> String {
    let ha1 = md5_hex(&format!(
        "{}:{}:{}",
        credential.username, realm, credential.password
    ));
    let ha2 = md5_hex(&format!("{}:{}", method, uri));
    md5_hex(&format!("{}:{}::::{}", ha1, nonce, ha2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred() -> Credential {
        Credential::new("viewer", "secret")
    }

    #[test]
    fn no_scheme_allows_everything() {
        let outcome = authorize(AuthScheme::None, Some(&cred()), "cam", &Method::Describe, None);
        assert!(matches!(outcome, AuthOutcome::Allowed));
    }

    #[test]
    fn missing_header_challenges_basic() {
        let outcome = authorize(AuthScheme::Basic, Some(&cred()), "cam", &Method::Describe, None);
        match outcome {
            AuthOutcome::Challenge(challenge) => assert_eq!(challenge, "Basic realm=cam"),
            other => panic!("expected challenge, got {:?}", other),
        }
    }

    #[test]
    fn missing_header_challenges_digest_with_nonces() {
        let outcome = authorize(AuthScheme::Digest, Some(&cred()), "cam", &Method::Setup, None);
        match outcome {
            AuthOutcome::Challenge(challenge) => {
                assert!(challenge.starts_with("Digest username=viewer,realm=cam,nonce="));
                let nonce = challenge
                    .split("nonce=")
                    .nth(1)
                    .unwrap()
                    .split(',')
                    .next()
                    .unwrap();
                assert_eq!(nonce.len(), 32);
                assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
                let cnonce = challenge.split("cnonce=").nth(1).unwrap();
                assert_eq!(cnonce.len(), 8);
            }
            other => panic!("expected challenge, got {:?}", other),
        }
    }

    #[test]
    fn empty_realm_falls_back() {
        let outcome = authorize(AuthScheme::Basic, Some(&cred()), "", &Method::Play, None);
        match outcome {
            AuthOutcome::Challenge(challenge) => assert_eq!(challenge, "Basic realm=//"),
            other => panic!("expected challenge, got {:?}", other),
        }
    }

    #[test]
    fn basic_verifies_exact_credentials() {
        // "viewer:secret"
        let header = "Basic dmlld2VyOnNlY3JldA==";
        let outcome = authorize(
            AuthScheme::Basic,
            Some(&cred()),
            "cam",
            &Method::Describe,
            Some(header),
        );
        assert!(matches!(outcome, AuthOutcome::Allowed));
    }

    #[test]
    fn basic_rejects_wrong_password() {
        // "viewer:wrong"
        let header = "Basic dmlld2VyOndyb25n";
        let outcome = authorize(
            AuthScheme::Basic,
            Some(&cred()),
            "cam",
            &Method::Describe,
            Some(header),
        );
        assert!(matches!(outcome, AuthOutcome::Forbidden));
    }

    #[test]
    fn digest_accepts_correct_response() {
        let credential = cred();
        let nonce = "dcd98b7102dd2f0e8b11d0f600bfb0c0";
        let response = digest_response(&credential, "cam", "DESCRIBE", "/live/cam", nonce);
        let header = format!(
            r#"Digest username="viewer", realm="cam", nonce="{}", uri="/live/cam", response="{}""#,
            nonce, response
        );

        let outcome = authorize(
            AuthScheme::Digest,
            Some(&credential),
            "cam",
            &Method::Describe,
            Some(&header),
        );
        assert!(matches!(outcome, AuthOutcome::Allowed));
    }

    #[test]
    fn digest_rejects_wrong_response() {
        let header = r#"Digest username="viewer", realm="cam", nonce="abc", uri="/live/cam", response="00000000000000000000000000000000""#;
        let outcome = authorize(
            AuthScheme::Digest,
            Some(&cred()),
            "cam",
            &Method::Describe,
            Some(header),
        );
        assert!(matches!(outcome, AuthOutcome::Forbidden));
    }

    #[test]
    fn digest_requires_core_fields() {
        let header = r#"Digest username="viewer", realm="cam""#;
        let outcome = authorize(
            AuthScheme::Digest,
            Some(&cred()),
            "cam",
            &Method::Describe,
            Some(header),
        );
        assert!(matches!(outcome, AuthOutcome::Forbidden));
    }

    #[test]
    fn md5_hex_is_lowercase_rfc2617() {
        // RFC 2617 §3.5 example HA1.
        assert_eq!(
            md5_hex("Mufasa:testrealm@host.com:Circle Of Life"),
            "939e7578ed9e3c518a452acee763bce9"
        );
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
