//! OAuth 1.0a request signing (HMAC-SHA1) for the X API.
//!
//! [`sign_request`] is a pure function of the request and the injected
//! nonce/timestamp, which keeps it testable against the published reference
//! vector. Callers must generate a fresh nonce and timestamp per request and
//! re-sign every transition of the upload state machine.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha1::Sha1;
use std::fmt::Write as _;

type HmacSha1 = Hmac<Sha1>;

/// OAuth 1.0a credential set: consumer pair plus user access pair.
#[derive(Debug, Clone)]
pub struct OAuth1Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

/// RFC 3986 percent-encoding as OAuth 1.0a requires it.
fn enc(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// A fresh 32-hex-char nonce.
pub fn nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    bytes.iter().fold(String::with_capacity(32), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Build the `Authorization` header value for one signed request.
///
/// `params` are the request parameters included in the signature base (query
/// or form-encoded body parameters; an empty slice for JSON bodies). The
/// signature covers `method`, `url`, the sorted union of `params` and the
/// oauth parameters, and is keyed by both secrets.
pub fn sign_request(
    method: &str,
    url: &str,
    params: &[(&str, &str)],
    credentials: &OAuth1Credentials,
    nonce: &str,
    timestamp: u64,
) -> String {
    let timestamp = timestamp.to_string();
    let oauth_params: [(&str, &str); 6] = [
        ("oauth_consumer_key", &credentials.api_key),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", &timestamp),
        ("oauth_token", &credentials.access_token),
        ("oauth_version", "1.0"),
    ];

    let mut all: Vec<(String, String)> = params
        .iter()
        .chain(oauth_params.iter())
        .map(|(k, v)| (enc(k), enc(v)))
        .collect();
    all.sort();

    let param_string = all
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let base = format!(
        "{}&{}&{}",
        method.to_uppercase(),
        enc(url),
        enc(&param_string)
    );
    let signing_key = format!(
        "{}&{}",
        enc(&credentials.api_secret),
        enc(&credentials.access_token_secret)
    );

    let mut mac = HmacSha1::new_from_slice(signing_key.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(base.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    let mut header_params: Vec<(String, String)> = oauth_params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    header_params.push(("oauth_signature".to_string(), signature));
    header_params.sort();

    let header = header_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", enc(k), enc(v)))
        .collect::<Vec<_>>()
        .join(", ");

    format!("OAuth {header}")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The reference vector from the platform's own signing documentation.
    fn reference_credentials() -> OAuth1Credentials {
        OAuth1Credentials {
            api_key: "xvz1evFS4wEEPTGEFPHBog".to_string(),
            api_secret: "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw".to_string(),
            access_token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".to_string(),
            access_token_secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE".to_string(),
        }
    }

    #[test]
    fn test_known_signature_vector() {
        let header = sign_request(
            "post",
            "https://api.twitter.com/1.1/statuses/update.json",
            &[
                ("status", "Hello Ladies + Gentlemen, a signed OAuth request!"),
                ("include_entities", "true"),
            ],
            &reference_credentials(),
            "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg",
            1318622958,
        );

        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
        assert!(header.contains("oauth_signature_method=\"HMAC-SHA1\""));
        assert!(header.contains("oauth_timestamp=\"1318622958\""));
    }

    #[test]
    fn test_signature_changes_with_nonce() {
        let credentials = reference_credentials();
        let a = sign_request("POST", "https://example.com/u", &[], &credentials, "nonce-a", 1000);
        let b = sign_request("POST", "https://example.com/u", &[], &credentials, "nonce-b", 1000);
        assert_ne!(a, b);
    }

    #[test]
    fn test_nonce_format() {
        let n1 = nonce();
        let n2 = nonce();
        assert_eq!(n1.len(), 32);
        assert!(n1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(n1, n2);
    }

    #[test]
    fn test_header_params_sorted() {
        let header = sign_request(
            "POST",
            "https://example.com/u",
            &[],
            &reference_credentials(),
            "n",
            1,
        );
        let keys: Vec<&str> = header
            .trim_start_matches("OAuth ")
            .split(", ")
            .map(|p| p.split('=').next().unwrap())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
