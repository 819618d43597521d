//! HMAC-SHA256 verification of webhook deliveries.
//!
//! GitHub signs the raw request body with the shared secret and sends
//! `sha256=<hex>` in `X-Hub-Signature-256`. The digest is compared in
//! constant time before the body is parsed.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";
/// `sha256=` plus 64 hex digits.
const MAX_SIGNATURE_LEN: usize = 71;

/// Verifies webhook signatures against the configured secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<SecretString>,
}

impl WebhookVerifier {
    pub fn new(secret: Option<SecretString>) -> Self {
        Self { secret }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Check `signature` (the raw header value) against `body`.
    pub fn verify(&self, signature: Option<&str>, body: &[u8]) -> Result<(), AuthError> {
        let secret = self.secret.as_ref().ok_or(AuthError::SecretNotConfigured)?;
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSignature)?;

        if signature.len() > MAX_SIGNATURE_LEN {
            return Err(AuthError::MalformedSignature);
        }
        let digest_hex = signature
            .strip_prefix(SIGNATURE_PREFIX)
            .ok_or(AuthError::MalformedSignature)?;
        let expected = hex::decode(digest_hex).map_err(|_| AuthError::MalformedSignature)?;

        let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|_| AuthError::SecretNotConfigured)?;
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| AuthError::SignatureMismatch)
    }

    /// Compute the header value for `body`. Used by operators and tests.
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        let secret = self.secret.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes()).ok()?;
        mac.update(body);
        Some(format!(
            "{}{}",
            SIGNATURE_PREFIX,
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    /// Short SHA-256 fingerprint of the secret, safe to display.
    pub fn fingerprint(&self) -> Option<String> {
        let secret = self.secret.as_ref()?;
        let digest = Sha256::digest(secret.expose_secret().as_bytes());
        Some(hex::encode(&digest[..8]))
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("configured", &self.is_configured())
            .finish()
    }
}
