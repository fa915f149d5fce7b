//! Bearer credential access.

use std::{
    fmt,
    sync::{PoisonError, RwLock},
};

/// Stored values that mean "nobody is signed in".
const PLACEHOLDERS: &[&str] = &["undefined", "null"];

/// Opaque bearer token.
///
/// Construction goes through [`Credential::parse`], so a value of this type
/// is always usable: never blank and never a stored placeholder.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Parse a raw stored value, rejecting blanks and placeholders.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || PLACEHOLDERS.contains(&trimmed) {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// The token text, for placing on the wire.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Supplies and clears the bearer credential.
///
/// Read on every outbound call; cleared when the server rejects the
/// credential so the surrounding application can prompt for sign-in.
pub trait CredentialProvider: Send + Sync {
    /// Current usable credential, if any.
    fn get(&self) -> Option<Credential>;

    /// Force the credential back to absent.
    fn clear(&self);
}

/// In-process credential slot.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    token: RwLock<Option<String>>,
}

impl MemoryCredentials {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot holding `token`.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Replace the stored token.
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }
}

impl CredentialProvider for MemoryCredentials {
    fn get(&self) -> Option<Credential> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .and_then(Credential::parse)
    }

    fn clear(&self) {
        let previous = self.token.write().unwrap_or_else(PoisonError::into_inner).take();
        if previous.is_some() {
            tracing::debug!("Stored credential cleared");
        }
    }
}
