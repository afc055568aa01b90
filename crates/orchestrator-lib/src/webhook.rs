//! Signed webhook verification
//!
//! Signatures are `sha256=<hex HMAC-SHA256 of the raw body>`. Verification
//! runs on the exact received bytes, before any JSON parsing, and compares
//! in constant time.

use crate::error::{OrchestratorError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Signature header value for `body`
pub fn sign(body: &[u8], secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!(
        "{SIGNATURE_PREFIX}{}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// True iff `provided` is the signature of `body` under `secret`
pub fn verify(body: &[u8], secret: &str, provided: &str) -> bool {
    match sign(body, secret) {
        Some(expected) => expected.as_bytes().ct_eq(provided.trim().as_bytes()).into(),
        None => false,
    }
}

/// Check a webhook delivery, mapping failures onto error kinds
///
/// An unset secret is a configuration error; a missing or wrong signature is
/// unauthorized.
pub fn authorize(body: &[u8], secret: &str, provided: Option<&str>) -> Result<()> {
    if secret.is_empty() {
        return Err(OrchestratorError::missing_setting("WEBHOOK_SECRET"));
    }
    let provided = provided
        .ok_or_else(|| OrchestratorError::Unauthorized("missing signature".to_string()))?;
    if !verify(body, secret, provided) {
        return Err(OrchestratorError::Unauthorized("invalid signature".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"action":"closed","pull_request":{"merged":true,"title":"OPS-1 fix"}}"#;

    #[test]
    fn test_known_vector() {
        // echo -n 'hello' | openssl dgst -sha256 -hmac 'secret'
        assert_eq!(
            sign(b"hello", "secret").unwrap(),
            "sha256=88aab3ede8d3adf94d26ab90d3bafd4a2083070c3bcce9c014ee04a443847c0b"
        );
    }

    #[test]
    fn test_sign_then_verify() {
        let signature = sign(BODY, "hook-secret").unwrap();
        assert!(signature.starts_with("sha256="));
        assert!(verify(BODY, "hook-secret", &signature));
    }

    #[test]
    fn test_any_byte_flip_fails() {
        let signature = sign(BODY, "hook-secret").unwrap();

        let mut tampered = BODY.to_vec();
        tampered[10] ^= 0x01;
        assert!(!verify(&tampered, "hook-secret", &signature));

        assert!(!verify(BODY, "other-secret", &signature));
        assert!(!verify(BODY, "hook-secret", &signature[..signature.len() - 1]));
        assert!(!verify(BODY, "hook-secret", &signature.replace("sha256=", "sha1=")));
    }

    #[test]
    fn test_authorize_error_kinds() {
        let signature = sign(BODY, "s3cret").unwrap();
        assert!(authorize(BODY, "s3cret", Some(&signature)).is_ok());
        assert!(matches!(
            authorize(BODY, "s3cret", None),
            Err(OrchestratorError::Unauthorized(_))
        ));
        assert!(matches!(
            authorize(BODY, "s3cret", Some("sha256=00")),
            Err(OrchestratorError::Unauthorized(_))
        ));
        assert!(matches!(
            authorize(BODY, "", Some(&signature)),
            Err(OrchestratorError::Config(_))
        ));
    }
}
