//! Bearer token authentication.
//!
//! Tokens are configured statically (`[[auth.users]]` in the server config)
//! and map one-to-one onto owner ids.

use std::collections::HashMap;

use taskday_proto::task::OwnerId;

/// Why a token was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No token was presented.
    #[error("missing token")]
    MissingToken,

    /// The token is not known to this server.
    #[error("unknown token")]
    UnknownToken,
}

/// A configured user: the token they present and the owner id it grants.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct UserEntry {
    pub token: String,
    pub owner: String,
}

/// Token to owner lookup.
#[derive(Debug, Clone, Default)]
pub struct TokenAuth {
    users: HashMap<String, OwnerId>,
}

impl TokenAuth {
    /// Builds the lookup from configured users. Entries with an empty token
    /// or owner are skipped; a repeated token keeps the last entry.
    #[must_use]
    pub fn from_users(users: &[UserEntry]) -> Self {
        let mut map = HashMap::with_capacity(users.len());
        for user in users {
            if user.token.is_empty() || user.owner.is_empty() {
                tracing::warn!(owner = %user.owner, "skipping user entry with empty token or owner");
                continue;
            }
            if map
                .insert(user.token.clone(), OwnerId::new(user.owner.clone()))
                .is_some()
            {
                tracing::warn!(owner = %user.owner, "duplicate token in user list, last entry wins");
            }
        }
        Self { users: map }
    }

    /// Resolves a presented token to its owner.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingToken`] for an empty token and
    /// [`AuthError::UnknownToken`] for one that is not configured.
    pub fn authenticate(&self, token: &str) -> Result<OwnerId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.users.get(token).cloned().ok_or(AuthError::UnknownToken)
    }

    /// Number of configured users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
