//! Payment webhook signatures.
//!
//! The provider signs the raw request body with HMAC-SHA256 using the
//! shared `PAYMENT_WEBHOOK_SECRET` and sends the standard-base64 digest in
//! the `X-Pulse-Signature` header.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ApiError;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "X-Pulse-Signature";

type HmacSha256 = Hmac<Sha256>;

/// Sign a webhook body.
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, ApiError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::internal(format!("Invalid HMAC key: {}", e)))?;
    mac.update(body);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Check a webhook signature in constant time.
///
/// A missing, malformed, or mismatched signature is `Unauthorized`.
pub fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> Result<(), ApiError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Missing webhook signature"))?;

    let expected = STANDARD
        .decode(signature)
        .map_err(|_| ApiError::unauthorized("Malformed webhook signature"))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::internal(format!("Invalid HMAC key: {}", e)))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| ApiError::unauthorized("Invalid webhook signature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"provider_ref":"pay_1","status":"succeeded","amount":100}"#;

    #[test]
    fn test_sign_and_verify() {
        let signature = sign_payload(SECRET, BODY).unwrap();
        assert!(verify_signature(SECRET, BODY, Some(&signature)).is_ok());
    }

    #[test]
    fn test_rejects_tampered_body() {
        let signature = sign_payload(SECRET, BODY).unwrap();
        let tampered = br#"{"provider_ref":"pay_1","status":"succeeded","amount":999}"#;
        assert!(matches!(
            verify_signature(SECRET, tampered, Some(&signature)),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_rejects_missing_or_garbage() {
        assert!(verify_signature(SECRET, BODY, None).is_err());
        assert!(verify_signature(SECRET, BODY, Some("   ")).is_err());
        assert!(verify_signature(SECRET, BODY, Some("not base64!!")).is_err());
        let wrong_key = sign_payload("other", BODY).unwrap();
        assert!(verify_signature(SECRET, BODY, Some(&wrong_key)).is_err());
    }
}
