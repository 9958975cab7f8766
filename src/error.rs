//! Unified error handling for ircstate.
//!
//! One taxonomy per domain: ISUPPORT grammar failures, state construction,
//! store persistence, and the authentication path. Authentication is the
//! only path whose errors are intended for end users, so those messages are
//! fully formatted.

use thiserror::Error;

/// Errors from parsing the server's PREFIX / CHANMODES grammars.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeKindsError {
    #[error("invalid PREFIX: {0}")]
    InvalidPrefix(String),

    #[error("invalid CHANMODES: {0}")]
    InvalidChanmodes(String),

    #[error("too many user prefixes in PREFIX: {0}")]
    TooManyPrefixes(String),
}

/// Errors constructing or reconfiguring a [`State`](crate::state::State).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// Stable sentinel for a missing network configuration.
    #[error("cannot create state: network info required")]
    MissingNetworkInfo,

    #[error(transparent)]
    Modes(#[from] ModeKindsError),
}

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("kv error: {0}")]
    Db(#[from] redb::Error),

    #[error("kv table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("kv storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("kv transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("kv commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("kv open error: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("password hashing error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
}

/// Authentication failures, with user-presentable messages.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication failed: the user [{0}] does not exist")]
    UserNotFound(String),

    #[error("authentication failed: the host [{host}] does not match any mask for [{username}]")]
    HostNotFound {
        /// The connecting host that failed the mask check.
        host: String,
        /// The stored user it tried to authenticate as.
        username: String,
    },

    #[error("authentication failed: invalid password for [{0}]")]
    BadPassword(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_messages_are_user_presentable() {
        let e = AuthError::UserNotFound("alice".into());
        assert_eq!(
            e.to_string(),
            "authentication failed: the user [alice] does not exist"
        );

        let e = AuthError::HostNotFound {
            host: "x!y@other.org".into(),
            username: "alice".into(),
        };
        assert!(e.to_string().contains("x!y@other.org"));
        assert!(e.to_string().contains("alice"));

        let e = AuthError::BadPassword("alice".into());
        assert!(e.to_string().contains("invalid password"));
    }

    #[test]
    fn state_sentinel_is_stable() {
        assert_eq!(
            StateError::MissingNetworkInfo.to_string(),
            "cannot create state: network info required"
        );
    }
}
