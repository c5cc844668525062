//! Webhook authenticity.
//!
//! GitHub signs each delivery with HMAC-SHA256 over the raw body using the
//! shared webhook secret, and sends it in `X-Hub-Signature-256` as
//! `sha256=<hex>`. Deliveries are verified before anything parses them.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing X-Hub-Signature-256 header")]
    Missing,

    #[error("malformed signature header")]
    Malformed,

    #[error("signature does not match payload")]
    Mismatch,

    #[error("webhook secret is not a usable HMAC key")]
    InvalidKey,
}

fn mac_for(secret: &[u8]) -> Result<HmacSha256, SignatureError> {
    HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)
}

/// The `X-Hub-Signature-256` value GitHub would send for `payload`.
///
/// # Examples
///
/// ```
/// use presubmit_trigger::webhooks::{sign_payload, verify_payload};
///
/// let header = sign_payload(b"{}", b"secret").unwrap();
/// assert!(header.starts_with("sha256="));
/// assert!(verify_payload(b"{}", Some(&header), b"secret").is_ok());
/// assert!(verify_payload(b"{}", Some(&header), b"other").is_err());
/// ```
pub fn sign_payload(payload: &[u8], secret: &[u8]) -> Result<String, SignatureError> {
    let mut mac = mac_for(secret)?;
    mac.update(payload);
    Ok(format!("{PREFIX}{}", hex::encode(mac.finalize().into_bytes())))
}

/// Checks `header` against `payload`. The comparison is constant-time.
pub fn verify_payload(
    payload: &[u8],
    header: Option<&str>,
    secret: &[u8],
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;
    let expected = header
        .strip_prefix(PREFIX)
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or(SignatureError::Malformed)?;

    let mut mac = mac_for(secret)?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn github_documentation_example() {
        // https://docs.github.com/en/webhooks/using-webhooks/validating-webhook-deliveries
        let header = sign_payload(b"Hello, World!", b"It's a Secret to Everybody").unwrap();
        assert_eq!(
            header,
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn missing_and_malformed_headers_are_distinguished() {
        assert_eq!(verify_payload(b"x", None, b"s"), Err(SignatureError::Missing));
        assert_eq!(
            verify_payload(b"x", Some("sha1=abcd"), b"s"),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_payload(b"x", Some("sha256=zz"), b"s"),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_payload(b"x", Some("sha256=abcd"), b"s"),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let header = sign_payload(b"payload", b"secret").unwrap();
        let upper = format!("sha256={}", header[PREFIX.len()..].to_uppercase());
        assert!(verify_payload(b"payload", Some(&upper), b"secret").is_ok());
    }

    #[test]
    fn empty_secret_still_signs() {
        let header = sign_payload(b"payload", b"").unwrap();
        assert!(verify_payload(b"payload", Some(&header), b"").is_ok());
    }

    proptest! {
        #[test]
        fn signed_payload_verifies(payload: Vec<u8>, secret: Vec<u8>) {
            let header = sign_payload(&payload, &secret).unwrap();
            prop_assert!(verify_payload(&payload, Some(&header), &secret).is_ok());
        }

        #[test]
        fn tampered_payload_fails(payload: Vec<u8>, secret: Vec<u8>, extra: u8) {
            let header = sign_payload(&payload, &secret).unwrap();
            let mut tampered = payload.clone();
            tampered.push(extra);
            prop_assert_eq!(
                verify_payload(&tampered, Some(&header), &secret),
                Err(SignatureError::Mismatch)
            );
        }

        #[test]
        fn arbitrary_headers_never_panic(header: String, payload: Vec<u8>) {
            let _ = verify_payload(&payload, Some(&header), b"secret");
        }
    }
}
