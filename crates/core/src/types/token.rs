//! Shopper-facing identifiers: order numbers and guest tokens.

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Public order number, e.g. `R482019374`.
///
/// Order numbers appear in URLs instead of database ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generate a random order number.
    #[must_use]
    pub fn generate() -> Self {
        let digits: u32 = rand::rng().random_range(0..1_000_000_000);
        Self(format!("R{digits:09}"))
    }

    /// Wrap an existing order number (from a URL or the database).
    #[must_use]
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Returns the number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque token that ties an anonymous session to its order.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuestToken(String);

impl GuestToken {
    /// Number of random bytes behind a token.
    const BYTES: usize = 16;

    /// Generate a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wrap a stored token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GuestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GuestToken([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_number_shape() {
        let number = OrderNumber::generate();
        assert_eq!(number.as_str().len(), 10);
        assert!(number.as_str().starts_with('R'));
        assert!(number.as_str()[1..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_guest_tokens_are_unique_and_url_safe() {
        let a = GuestToken::generate();
        let b = GuestToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 22);
        assert!(
            a.as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_guest_token_debug_is_redacted() {
        let token = GuestToken::new("secret-value");
        assert!(!format!("{token:?}").contains("secret-value"));
    }
}
