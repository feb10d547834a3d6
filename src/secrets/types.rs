//! Secure types for handling sensitive data.
//!
//! Secret values and access tokens travel through the crate as [`SecretBytes`],
//! which never prints its contents and zeroes its memory on drop.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A byte buffer that redacts its contents in Debug and Display output.
///
/// - Debug output shows `SecretBytes([REDACTED])`
/// - Display output shows `[REDACTED]`
/// - Memory is zeroed when dropped
/// - The raw value is only reachable through [`SecretBytes::expose_secret`]
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    /// Exposes the underlying bytes. Never log the result.
    pub fn expose_secret(&self) -> &[u8] {
        &self.0
    }

    /// Exposes the value as UTF-8 text, if it is text.
    pub fn expose_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes([REDACTED])")
    }
}

impl fmt::Display for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for SecretBytes {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl From<&str> for SecretBytes {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for SecretBytes {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

/// A retrieved secret value bound to the alias it is rendered under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub alias: String,
    pub value: SecretBytes,
}

impl Secret {
    pub fn new(alias: impl Into<String>, value: impl Into<SecretBytes>) -> Self {
        Self { alias: alias.into(), value: value.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_bytes_redacts_debug_and_display() {
        let secret = SecretBytes::from("hunter2");
        assert_eq!(format!("{:?}", secret), "SecretBytes([REDACTED])");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(secret.expose_secret(), b"hunter2");
    }

    #[test]
    fn test_secret_debug_never_contains_value() {
        let secret = Secret::new("password", "s3cr3t");
        let debug = format!("{:?}", secret);
        assert!(debug.contains("password"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_expose_str_rejects_binary() {
        assert_eq!(SecretBytes::from("text").expose_str(), Some("text"));
        assert_eq!(SecretBytes::new(vec![0xff, 0xfe]).expose_str(), None);
    }
}
