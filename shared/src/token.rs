//! Authentication token carried by every post-handshake request.

use serde::{Deserialize, Serialize};

use crate::wire::{check_field, Record, WireError};
use crate::{ACTIVITY_ID_LENGTH, SIGNATURE_LENGTH, TIMESTAMP_MAX, USERNAME_MAX};

/// Identity claims plus a keyed signature over them.
///
/// Tokens are immutable value objects: whenever session state changes (login,
/// game start or stop, second player joining or leaving) the server issues a
/// fresh token rather than mutating an existing one. The signature is a
/// hex-encoded HMAC-SHA256 over `username ‖ activity_id ‖ guest_username ‖
/// timestamp` with a server-held secret key; clients can neither forge nor
/// alter a token without detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub username: String,
    pub guest_username: String,
    pub activity_id: String,
    pub timestamp: String,
    pub signature: String,
}

impl Token {
    pub fn new(
        username: impl Into<String>,
        activity_id: impl Into<String>,
        guest_username: impl Into<String>,
        timestamp: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            guest_username: guest_username.into(),
            activity_id: activity_id.into(),
            timestamp: timestamp.into(),
            signature: signature.into(),
        }
    }

    /// The string the signature is computed over.
    pub fn claims(&self) -> String {
        format!(
            "{}{}{}{}",
            self.username, self.activity_id, self.guest_username, self.timestamp
        )
    }

    /// An empty token is the "not authenticated" placeholder sent back when a
    /// handshake is rejected.
    pub fn is_empty(&self) -> bool {
        self.signature.is_empty()
    }
}

impl Record for Token {
    const SIZE: usize = 256;

    fn validate(&self) -> Result<(), WireError> {
        check_field("username", &self.username, USERNAME_MAX)?;
        check_field("guest_username", &self.guest_username, USERNAME_MAX)?;
        check_field("activity_id", &self.activity_id, ACTIVITY_ID_LENGTH)?;
        check_field("timestamp", &self.timestamp, TIMESTAMP_MAX)?;
        check_field("signature", &self.signature, SIGNATURE_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token() {
        assert!(Token::default().is_empty());
        let token = Token::new("alice", "", "", "123", "deadbeef");
        assert!(!token.is_empty());
    }

    #[test]
    fn test_claims_concatenation_order() {
        let token = Token::new("alice", "G123", "bob", "20240101000000", "");
        assert_eq!(token.claims(), "aliceG123bob20240101000000");
    }

    #[test]
    fn test_token_record_roundtrip() {
        let token = Token::new("alice", "G123", "", "20240101000000", "ab12cd34");
        let bytes = token.encode().unwrap();
        assert_eq!(bytes.len(), Token::SIZE);
        assert_eq!(Token::decode(&bytes).unwrap(), token);
    }

    #[test]
    fn test_oversize_username_rejected() {
        let token = Token::new("u".repeat(USERNAME_MAX + 1), "", "", "", "");
        assert!(token.encode().is_err());
    }
}
