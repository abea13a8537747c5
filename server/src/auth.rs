//! Token issuing and signature verification.
//!
//! The signature is a hex-encoded HMAC-SHA256 over the token's concatenated
//! identity claims, keyed with a secret only the server holds. Every handler
//! recomputes the signature before trusting any client-declared state.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use shared::Token;
use std::path::Path;
use thiserror::Error;

use crate::utils::timestamp_string;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: String,
        source: std::io::Error,
    },
    #[error("key file {0} is empty")]
    EmptyKey(String),
}

/// Holds the server secret and signs/verifies tokens with it.
pub struct Authenticator {
    key: Vec<u8>,
}

impl Authenticator {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// Loads the secret from the first line of a key file. Unreadable or
    /// empty key material is fatal at construction.
    pub fn from_key_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| AuthError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;
        let key = contents.lines().next().unwrap_or("").trim();
        if key.is_empty() {
            return Err(AuthError::EmptyKey(path.display().to_string()));
        }
        Ok(Self::new(key.as_bytes().to_vec()))
    }

    /// Hex HMAC-SHA256 of an arbitrary claims string.
    pub fn sign(&self, claims: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(claims.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Issues a fresh token for the given identity, timestamped now.
    pub fn issue(&self, username: &str, activity_id: &str, guest_username: &str) -> Token {
        let timestamp = timestamp_string();
        let signature = self.sign(&format!(
            "{username}{activity_id}{guest_username}{timestamp}"
        ));
        Token::new(username, activity_id, guest_username, timestamp, signature)
    }

    /// Recomputes the signature over the token's claims and compares it in
    /// constant time against the stored one.
    pub fn verify(&self, token: &Token) -> bool {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(token.claims().as_bytes());
        match hex::decode(&token.signature) {
            Ok(sig) => mac.verify_slice(&sig).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> Authenticator {
        Authenticator::new(b"test-secret-key".to_vec())
    }

    #[test]
    fn test_signature_is_deterministic() {
        let auth = auth();
        let sig1 = auth.sign("aliceG12320240101000000");
        let sig2 = auth.sign("aliceG12320240101000000");
        assert_eq!(sig1, sig2);
        assert_eq!(sig1.len(), 64); // hex sha256
    }

    #[test]
    fn test_signature_matches_independent_computation() {
        // Signature over ("alice", "G123", "", "20240101000000") must equal
        // the signature computed the same way on the other side.
        let auth = auth();
        let token = Token::new(
            "alice",
            "G123",
            "",
            "20240101000000",
            auth.sign("aliceG12320240101000000"),
        );
        assert!(auth.verify(&token));
    }

    #[test]
    fn test_flipping_any_field_changes_signature() {
        let auth = auth();
        let base = auth.sign("aliceG12320240101000000");
        assert_ne!(auth.sign("aliceG12420240101000000"), base);
        assert_ne!(auth.sign("aliceG123bob20240101000000"), base);
        assert_ne!(auth.sign("alicxG12320240101000000"), base);
        assert_ne!(auth.sign("aliceG12320240101000001"), base);
    }

    #[test]
    fn test_issued_token_verifies() {
        let auth = auth();
        let token = auth.issue("alice", "G123", "bob");
        assert!(auth.verify(&token));
        assert_eq!(token.username, "alice");
        assert_eq!(token.activity_id, "G123");
        assert_eq!(token.guest_username, "bob");
    }

    #[test]
    fn test_tampered_token_rejected() {
        let auth = auth();
        let mut token = auth.issue("alice", "G123", "");
        token.username = "mallory".to_string();
        assert!(!auth.verify(&token));

        let mut garbled = auth.issue("alice", "", "");
        garbled.signature = "not-hex".to_string();
        assert!(!auth.verify(&garbled));
    }

    #[test]
    fn test_different_keys_disagree() {
        let a = Authenticator::new(b"key-a".to_vec());
        let b = Authenticator::new(b"key-b".to_vec());
        let token = a.issue("alice", "", "");
        assert!(a.verify(&token));
        assert!(!b.verify(&token));
    }
}
