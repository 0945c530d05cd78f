use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Check an HMAC-SHA256 signature of the raw body.
///
/// The header value may be hex (optionally `sha256=` prefixed) or base64.
/// Comparison happens inside `verify_slice`, which is constant time.
pub fn verify(secret: &str, body: &[u8], header_value: &str) -> Result<(), String> {
    let value = header_value.trim();
    let value = value.strip_prefix("sha256=").unwrap_or(value);
    if value.is_empty() {
        return Err("empty signature".to_string());
    }

    let expected = decode_signature(value).ok_or_else(|| "signature is neither hex nor base64".to_string())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| e.to_string())?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| "signature mismatch".to_string())
}

fn decode_signature(value: &str) -> Option<Vec<u8>> {
    // 32 bytes of SHA-256 are 64 hex chars; base64 of them is 44
    if value.len() == 64 {
        if let Ok(bytes) = hex::decode(value) {
            return Some(bytes);
        }
    }
    base64::engine::general_purpose::STANDARD.decode(value).ok()
}

#[cfg(test)]
pub fn sign_hex(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"event":"sale"}"#;

    #[test]
    fn test_hex_and_prefixed_hex() {
        let sig = sign_hex(SECRET, BODY);
        assert!(verify(SECRET, BODY, &sig).is_ok());
        assert!(verify(SECRET, BODY, &format!("sha256={}", sig)).is_ok());
        assert!(verify(SECRET, BODY, &sig.to_uppercase()).is_ok());
    }

    #[test]
    fn test_base64() {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(BODY);
        let sig = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        assert!(verify(SECRET, BODY, &sig).is_ok());
    }

    #[test]
    fn test_rejects_tampering() {
        let sig = sign_hex(SECRET, BODY);
        assert_eq!(
            verify(SECRET, br#"{"event":"refund"}"#, &sig),
            Err("signature mismatch".to_string())
        );
        assert!(verify("other", BODY, &sig).is_err());
        assert!(verify(SECRET, BODY, "").is_err());
        assert!(verify(SECRET, BODY, "!!not-a-signature!!").is_err());
    }
}
