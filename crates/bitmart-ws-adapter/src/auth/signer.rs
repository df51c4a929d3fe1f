/*
[INPUT]:  Canonical auth message and API secret
[OUTPUT]: Base64-encoded HMAC-SHA256 signature (or custom signer output)
[POS]:    Auth layer - replaceable signing capability
[UPDATE]: When changing signing algorithm or signer injection
*/

use std::fmt;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{BitmartError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Custom signing function: `(message, secret) -> signature`
pub type SignMessageFn = Arc<dyn Fn(&str, &str) -> Result<String> + Send + Sync>;

/// Signs the WebSocket auth message.
///
/// Defaults to the built-in HMAC. Embedders can inject their own function
/// (hardware-backed keys, a faster implementation) without touching the
/// connection logic.
#[derive(Clone, Default)]
pub enum MessageSigner {
    #[default]
    Hmac,
    Custom(SignMessageFn),
}

impl MessageSigner {
    pub fn custom<F>(sign: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String> + Send + Sync + 'static,
    {
        MessageSigner::Custom(Arc::new(sign))
    }

    pub fn sign(&self, message: &str, secret: &str) -> Result<String> {
        match self {
            MessageSigner::Hmac => hmac_sha256_base64(message, secret),
            MessageSigner::Custom(sign) => sign(message, secret),
        }
    }
}

impl fmt::Debug for MessageSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageSigner::Hmac => f.write_str("MessageSigner::Hmac"),
            MessageSigner::Custom(_) => f.write_str("MessageSigner::Custom(..)"),
        }
    }
}

pub fn hmac_sha256_base64(message: &str, secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BitmartError::Config(format!("invalid HMAC key: {e}")))?;
    mac.update(message.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_known_vector() {
        // RFC 4231 test case 2
        let signature = hmac_sha256_base64("what do ya want for nothing?", "Jefe").unwrap();
        assert_eq!(signature, "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=");
    }

    #[test]
    fn test_signature_decodes_to_32_bytes() {
        let signature = MessageSigner::Hmac.sign("1700000000GET/user/verify", "secret").unwrap();
        let decoded = BASE64.decode(&signature).unwrap();
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn test_custom_signer_is_used() {
        let signer = MessageSigner::custom(|message, secret| Ok(format!("{secret}:{message}")));
        assert_eq!(signer.sign("msg", "key").unwrap(), "key:msg");
        assert_eq!(format!("{signer:?}"), "MessageSigner::Custom(..)");
    }
}
