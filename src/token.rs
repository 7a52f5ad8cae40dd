//! Action token verification
//!
//! Callers prove they may perform an action (download a dataset, write usage)
//! by presenting a token bound to that action. How tokens are minted is up to
//! the embedder; [`DigestTokenVerifier`] is a shared-secret implementation.

use crate::Result;
use crate::error::AuthError;
use sha2::{Digest, Sha256};

/// Checks whether a token authorizes an action
pub trait TokenVerifier: Send + Sync {
    /// True if `token` is valid for `action`
    fn verify(&self, token: &str, action: &str) -> bool;
}

/// Tokens are `hex(sha256("<secret>:<action>"))`
///
/// Without a secret every token is rejected.
#[derive(Clone, Default)]
pub struct DigestTokenVerifier {
    secret: Option<String>,
}

impl DigestTokenVerifier {
    /// Create a verifier for `secret`
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    /// Mint a token for `action`, `None` if no secret is configured
    pub fn issue(&self, action: &str) -> Option<String> {
        self.secret
            .as_deref()
            .map(|secret| format!("{:x}", Sha256::digest(format!("{}:{}", secret, action))))
    }
}

impl std::fmt::Debug for DigestTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestTokenVerifier")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl TokenVerifier for DigestTokenVerifier {
    fn verify(&self, token: &str, action: &str) -> bool {
        match self.issue(action) {
            Some(expected) => constant_time_eq(token.as_bytes(), expected.as_bytes()),
            None => false,
        }
    }
}

/// Check that a token was supplied and is valid for `action`
///
/// An absent or empty token is [`AuthError::MissingToken`]; one that fails
/// verification is [`AuthError::InvalidToken`].
pub fn require_token(verifier: &dyn TokenVerifier, token: Option<&str>, action: &str) -> Result<()> {
    let token = token.filter(|t| !t.is_empty()).ok_or(AuthError::MissingToken)?;
    if !verifier.verify(token, action) {
        return Err(AuthError::InvalidToken.into());
    }
    Ok(())
}

/// Compare without short-circuiting on the first mismatching byte
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
