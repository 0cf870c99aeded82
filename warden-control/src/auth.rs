//! Authentication for the control socket
//!
//! Provides token-based authentication using SHA-256 hashed bearer tokens.
//! Tokens are hashed before storage in configuration to prevent token
//! leakage: a leaked config file reveals hashes, never credentials.

use hex::encode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Authentication configuration for the control socket
///
/// When enabled, every control request must carry a bearer token whose
/// SHA-256 hash matches one of the configured hashes.
///
/// # Security
///
/// - Tokens are stored as SHA-256 hashes, not plaintext
/// - Incoming tokens are hashed and compared against configured hashes
/// - Authentication failures are logged by the server for audit purposes
/// - When disabled, all requests are allowed and the socket relies on its
///   owner-only filesystem permissions
///
/// # Example Configuration
///
/// ```ron
/// auth: (
///     enabled: true,
///     token_hashes: [
///         // SHA-256 hash of "admin-token-12345"
///         "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8",
///     ],
/// )
/// ```
///
/// # Generating Token Hashes
///
/// ```bash
/// echo -n "your-secret-token" | sha256sum
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlAuthConfig {
    /// Enable or disable authentication
    ///
    /// When disabled, all requests are allowed (relies on filesystem
    /// permissions). When enabled, requests must include a valid bearer
    /// token.
    #[serde(default)]
    pub enabled: bool,

    /// Valid bearer tokens (SHA-256 hashes)
    ///
    /// Each hash is a 64-character hex string representing a SHA-256 hash.
    /// Incoming tokens are hashed and compared against this list.
    #[serde(default)]
    pub token_hashes: Vec<String>,
}

impl ControlAuthConfig {
    /// Check if authentication is required
    ///
    /// Returns `true` if authentication is enabled, `false` otherwise.
    #[must_use]
    pub const fn requires_auth(&self) -> bool {
        self.enabled
    }

    /// Validate a plaintext bearer token against the configured hashes
    ///
    /// The incoming token is hashed and the hex digests are compared, so
    /// plaintext tokens never touch the configuration. The hex comparison is
    /// case-insensitive to tolerate hand-edited configs.
    ///
    /// # Arguments
    ///
    /// * `token` - The plaintext token to validate
    ///
    /// # Returns
    ///
    /// `true` when auth is disabled, or when the token's hash matches one
    /// of the configured hashes.
    #[must_use]
    pub fn validate_token(&self, token: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let hashed = hash_token(token);
        self.token_hashes
            .iter()
            .any(|configured| configured.eq_ignore_ascii_case(&hashed))
    }

    /// Validate an optional token as carried by a request
    ///
    /// An absent token counts as invalid when auth is enabled; when auth is
    /// disabled, anything passes.
    ///
    /// ```
    /// use warden_control::auth::{ControlAuthConfig, hash_token};
    ///
    /// let config = ControlAuthConfig {
    ///     enabled: true,
    ///     token_hashes: vec![hash_token("letmein")],
    /// };
    /// assert!(config.validate(Some("letmein")));
    /// assert!(!config.validate(None));
    /// ```
    #[must_use]
    pub fn validate(&self, token: Option<&str>) -> bool {
        if !self.enabled {
            return true;
        }
        token.is_some_and(|token| self.validate_token(token))
    }
}

/// SHA-256 of a plaintext token, hex-encoded
///
/// This is the transformation applied to incoming tokens before comparison,
/// and the one operators use to produce `token_hashes` entries.
///
/// ```
/// use warden_control::auth::hash_token;
///
/// assert_eq!(hash_token("password").len(), 64);
/// ```
#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    encode(hasher.finalize())
}
