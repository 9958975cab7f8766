//! Tracked network users.

use std::fmt;

use crate::host::Host;

/// One user as witnessed on the network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    /// Most complete identity seen so far; may be a bare nick until a
    /// full `nick!user@host` form arrives.
    pub host: Host,
    /// Realname (GECOS), filled by WHO replies.
    pub realname: String,
}

impl User {
    /// A user known only by their host.
    pub fn new(host: impl Into<Host>) -> Self {
        User {
            host: host.into(),
            realname: String::new(),
        }
    }

    /// The nick portion of the host.
    pub fn nick(&self) -> &str {
        self.host.nick()
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.realname.is_empty() {
            write!(f, "{}", self.host)
        } else {
            write!(f, "{} ({})", self.host, self.realname)
        }
    }
}
