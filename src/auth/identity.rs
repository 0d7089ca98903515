use crate::db::UserId;

/// Display name used for callers without a resolved account
pub const ANONYMOUS_NAME: &str = "AnonymousUser";

/// The caller behind a connection, as resolved by the authentication layer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User { id: UserId, username: String },
}

impl Identity {
    pub fn user(id: UserId, username: impl Into<String>) -> Self {
        Identity::User { id, username: username.into() }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Identity::Anonymous => None,
            Identity::User { id, .. } => Some(*id),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Identity::Anonymous => ANONYMOUS_NAME,
            Identity::User { username, .. } => username.as_str(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::User { .. })
    }
}
