//! Session state handed to the ledger by the auth layer.

use taskday_proto::task::OwnerId;

/// Who the current user is, if anyone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    /// A signed-in user.
    Authenticated(OwnerId),
    /// No user; every ledger operation is refused.
    Unauthenticated,
}

impl Session {
    /// Builds a session from an optional owner id.
    #[must_use]
    pub fn from_owner(owner: Option<OwnerId>) -> Self {
        owner.map_or(Self::Unauthenticated, Self::Authenticated)
    }

    /// Returns the owner id, if authenticated.
    #[must_use]
    pub const fn owner(&self) -> Option<&OwnerId> {
        match self {
            Self::Authenticated(owner) => Some(owner),
            Self::Unauthenticated => None,
        }
    }

    /// Returns true if a user is signed in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}
