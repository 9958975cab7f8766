//! Tracked channels and their ban lists.

use std::fmt;
use std::sync::Arc;

use crate::host::{Host, WildMask};
use crate::modes::{ChannelModes, ModeKinds};

/// One channel as witnessed on the network.
///
/// The name keeps its original case; lookups fold it. Bans live both here
/// (fed by RPL_BANLIST) and as the `b` address mode when MODE changes
/// arrive; this list is the queryable one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Original-case channel name.
    pub name: String,
    /// Current topic; empty when unset.
    pub topic: String,
    /// Ban masks from RPL_BANLIST.
    pub bans: Vec<String>,
    /// Modes currently asserted on the channel.
    pub modes: ChannelModes,
}

impl Channel {
    /// A new channel with no topic, bans, or modes.
    pub fn new(name: impl Into<String>, kinds: Arc<ModeKinds>) -> Self {
        Channel {
            name: name.into(),
            topic: String::new(),
            bans: Vec::new(),
            modes: ChannelModes::new(kinds),
        }
    }

    /// Record a ban mask. Exact-string duplicates are ignored.
    pub fn add_ban(&mut self, mask: impl Into<String>) {
        let mask = mask.into();
        if !self.bans.contains(&mask) {
            self.bans.push(mask);
        }
    }

    /// Drop an exact ban mask. Returns whether it was present.
    pub fn delete_ban(&mut self, mask: &str) -> bool {
        match self.bans.iter().position(|b| b == mask) {
            Some(i) => {
                self.bans.swap_remove(i);
                true
            }
            None => false,
        }
    }

    /// True when the exact mask is stored.
    pub fn has_ban(&self, mask: &str) -> bool {
        self.bans.iter().any(|b| b == mask)
    }

    /// Drop every stored ban which, treated as a wildcard mask, matches
    /// the given host.
    pub fn delete_bans(&mut self, host: &str) {
        self.bans.retain(|b| !WildMask::new(b.as_str()).matches_str(host));
    }

    /// True when any stored ban, treated as a wildcard mask, matches the
    /// target host.
    pub fn is_banned(&self, target: &Host) -> bool {
        self.bans
            .iter()
            .any(|b| WildMask::new(b.as_str()).matches(target))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chan() -> Channel {
        let kinds = Arc::new(ModeKinds::new("(ov)@+", "b,k,l,imnpst").unwrap());
        Channel::new("#Test", kinds)
    }

    #[test]
    fn exact_ban_bookkeeping() {
        let mut c = chan();
        c.add_ban("*!*@spam.example");
        c.add_ban("*!*@spam.example");
        assert_eq!(c.bans.len(), 1);
        assert!(c.has_ban("*!*@spam.example"));
        assert!(!c.has_ban("*!*@other"));
        assert!(c.delete_ban("*!*@spam.example"));
        assert!(!c.delete_ban("*!*@spam.example"));
        assert!(c.bans.is_empty());
    }

    #[test]
    fn wildcard_ban_queries() {
        let mut c = chan();
        c.add_ban("*!*@spam.example");
        c.add_ban("bad!*@*");

        assert!(c.is_banned(&Host::new("x!y@spam.example")));
        assert!(c.is_banned(&Host::new("bad!u@anywhere")));
        assert!(!c.is_banned(&Host::new("good!u@clean.example")));

        // Deletes every mask matching the host.
        c.delete_bans("bad!u@spam.example");
        assert!(c.bans.is_empty());
    }

    #[test]
    fn delete_bans_keeps_non_matching() {
        let mut c = chan();
        c.add_ban("*!*@spam.example");
        c.add_ban("other!*@*");
        c.delete_bans("x!y@spam.example");
        assert_eq!(c.bans, vec!["other!*@*".to_string()]);
    }
}
