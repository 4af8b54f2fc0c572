//! Secret wrapper for sensitive values
//!
//! API key secrets live in the persisted credential file, so the wrapper is
//! serde-aware: Deserialize reads the raw value in, Serialize writes it back
//! out. Only the 0600 credential file serializes secrets; admin responses
//! build their own DTOs without the secret field.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// Sensitive value, redacted in Debug/Display/logs and zeroized on drop.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Wrap a sensitive value.
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly).
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<'de, T: Zeroize + Deserialize<'de>> Deserialize<'de> for Secret<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Secret)
    }
}

impl<T: Zeroize + Serialize> Serialize for Secret<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_redact() {
        let secret = Secret::new(String::from("AIza-test-key"));
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(format!("{secret}"), "[REDACTED]");
    }

    #[test]
    fn expose_returns_inner_value() {
        let secret = Secret::new(String::from("AIza-test-key"));
        assert_eq!(secret.expose(), "AIza-test-key");
    }

    #[test]
    fn roundtrips_through_json() {
        let secret = Secret::new(String::from("AIza-persisted"));
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, "\"AIza-persisted\"");

        let back: Secret<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.expose(), "AIza-persisted");
    }

    #[test]
    fn redaction_survives_nesting() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct Holder {
            key: Secret<String>,
        }
        let holder = Holder {
            key: Secret::new("AIza-nested".to_string()),
        };
        let debug = format!("{holder:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("AIza-nested"));
    }
}
