//! Credential wrapper with automatic memory zeroization.
//!
//! Secrets enter the process through the environment and leave only as
//! request headers. `SecureString` keeps them out of every other channel:
//! the bytes are zeroized on drop, `Debug` never prints them, there is no
//! `Display`, and the type deliberately has no serde support so a
//! credential can never ride along when a config struct is serialized.

use std::fmt;
use zeroize::Zeroizing;

/// An API token or key held as zeroized bytes.
///
/// The only way to read the value is [`expose_secret`](Self::expose_secret),
/// which makes every use-site greppable.
///
/// # Example
///
/// ```
/// use tl_connectors::SecureString;
///
/// let token = SecureString::new("zd-api-token".to_string());
/// assert_eq!(token.expose_secret(), "zd-api-token");
/// ```
#[derive(Clone)]
pub struct SecureString {
    // UTF-8 by construction: only ever built from a String.
    bytes: Zeroizing<Vec<u8>>,
}

impl SecureString {
    /// Takes ownership of the secret; the buffer is zeroized on drop.
    pub fn new(value: String) -> Self {
        Self {
            bytes: Zeroizing::new(value.into_bytes()),
        }
    }

    /// Exposes the secret for use in a request. Avoid copying the returned
    /// value; copies are not zeroized.
    pub fn expose_secret(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<String> for SecureString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecureString {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl Default for SecureString {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureString({} bytes hidden)", self.bytes.len())
    }
}

impl PartialEq for SecureString {
    fn eq(&self, other: &Self) -> bool {
        // Constant-time comparison to prevent timing attacks
        use subtle::ConstantTimeEq;
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for SecureString {}
