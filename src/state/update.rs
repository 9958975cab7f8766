//! Structured diffs emitted by event dispatch.

/// What one event did to the state, in terms the identity store consumes.
///
/// Hosts are reported in their fullest known form (`nick!user@host` when
/// known, bare nick otherwise), matching the keys the store's auth table is
/// bound under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    /// `(old, new)` hosts when the event renamed a user.
    pub nick: Option<(String, String)>,
    /// Hosts witnessed present by this event.
    pub seen: Vec<String>,
    /// Hosts that became invisible to us (left our last shared channel).
    pub unseen: Vec<String>,
    /// Host that quit the network.
    pub quit: Option<String>,
}

impl StateUpdate {
    /// True when the event changed nothing the store cares about.
    pub fn is_empty(&self) -> bool {
        self.nick.is_none() && self.seen.is_empty() && self.unseen.is_empty() && self.quit.is_none()
    }
}
