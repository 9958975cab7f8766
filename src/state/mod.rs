//! The per-network state engine.
//!
//! A [`State`] is the in-memory projection of one IRC session: users,
//! channels, their bidirectional membership, channel modes, and the
//! tracked self. Inbound events mutate it through [`State::update`], which
//! holds the write lock for the whole dispatch and returns a
//! [`StateUpdate`] diff. Every read accessor returns a deep clone, so no
//! internal reference ever escapes a lock.

mod channel;
mod handlers;
mod update;
mod user;

pub use channel::Channel;
pub use update::StateUpdate;
pub use user::User;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::casemap::irc_to_lower;
use crate::error::{ModeKindsError, StateError};
use crate::event::{Event, NetworkInfo};
use crate::modes::{ChannelModes, MemberModes, ModeKinds};

/// The authoritative, concurrently-accessible model of one network.
#[derive(Debug)]
pub struct State {
    kinds: Arc<ModeKinds>,
    inner: RwLock<StateInner>,
}

/// Everything behind the state's write lock.
///
/// Membership is a canonical table keyed by `(channel, nick)` (both
/// case-folded) holding the [`MemberModes`], with `channel_users` and
/// `user_channels` as navigation indexes. The indexes are kept symmetric:
/// an entry exists in one iff it exists in the other and in the table.
#[derive(Debug)]
pub(crate) struct StateInner {
    pub(crate) kinds: Arc<ModeKinds>,
    pub(crate) self_user: User,
    pub(crate) self_modes: ChannelModes,
    pub(crate) users: HashMap<String, User>,
    pub(crate) channels: HashMap<String, Channel>,
    pub(crate) channel_users: HashMap<String, HashSet<String>>,
    pub(crate) user_channels: HashMap<String, HashSet<String>>,
    pub(crate) memberships: HashMap<(String, String), MemberModes>,
    pub(crate) greedy_prefix_strip: bool,
}

impl State {
    /// Create a state for a network.
    ///
    /// `None` yields the stable [`StateError::MissingNetworkInfo`]
    /// sentinel; a malformed PREFIX or CHANMODES propagates as a parse
    /// error.
    pub fn new(info: Option<&NetworkInfo>) -> Result<Self, StateError> {
        let info = info.ok_or(StateError::MissingNetworkInfo)?;
        let kinds = Arc::new(ModeKinds::new(&info.prefix, &info.chanmodes)?);
        Ok(State {
            inner: RwLock::new(StateInner {
                kinds: Arc::clone(&kinds),
                self_user: User::default(),
                self_modes: ChannelModes::new(Arc::clone(&kinds)),
                users: HashMap::new(),
                channels: HashMap::new(),
                channel_users: HashMap::new(),
                user_channels: HashMap::new(),
                memberships: HashMap::new(),
                greedy_prefix_strip: true,
            }),
            kinds,
        })
    }

    /// Re-parse PREFIX and CHANMODES, atomically replacing the mode
    /// grammar.
    ///
    /// Existing mode bits stay valid; future applications are interpreted
    /// under the new tables. Must not overlap event dispatch.
    pub fn set_network_info(&self, info: &NetworkInfo) -> Result<(), ModeKindsError> {
        self.kinds.update(&info.prefix, &info.chanmodes)
    }

    /// The shared mode grammar.
    pub fn mode_kinds(&self) -> &Arc<ModeKinds> {
        &self.kinds
    }

    /// How RPL_NAMREPLY entries with several leading prefix symbols are
    /// handled: greedily strip them all (default) or strip just one.
    pub fn set_greedy_prefix_strip(&self, greedy: bool) {
        self.inner.write().greedy_prefix_strip = greedy;
    }

    /// Dispatch one inbound event under the write lock.
    ///
    /// Never fails: malformed or unknown events leave the state untouched
    /// and return an empty diff. The returned [`StateUpdate`] reflects the
    /// state after the event is applied.
    pub fn update(&self, ev: &Event) -> StateUpdate {
        self.inner.write().dispatch(ev)
    }

    /// The tracked self, as installed by RPL_WELCOME.
    pub fn self_user(&self) -> User {
        self.inner.read().self_user.clone()
    }

    /// The self's user-level IRC modes.
    pub fn self_modes(&self) -> ChannelModes {
        self.inner.read().self_modes.clone()
    }

    /// Look up a user by nick (any case).
    pub fn user(&self, nick: &str) -> Option<User> {
        self.inner.read().users.get(&irc_to_lower(nick)).cloned()
    }

    /// Look up a channel by name (any case).
    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.inner.read().channels.get(&irc_to_lower(name)).cloned()
    }

    /// The prefix modes a user holds on a channel, when they are a member.
    pub fn member_modes(&self, channel: &str, nick: &str) -> Option<MemberModes> {
        self.inner
            .read()
            .memberships
            .get(&(irc_to_lower(channel), irc_to_lower(nick)))
            .copied()
    }

    /// True when the nick is a member of the channel.
    pub fn is_on(&self, nick: &str, channel: &str) -> bool {
        self.inner
            .read()
            .memberships
            .contains_key(&(irc_to_lower(channel), irc_to_lower(nick)))
    }

    /// Number of tracked users.
    pub fn user_count(&self) -> usize {
        self.inner.read().users.len()
    }

    /// Number of tracked channels.
    pub fn channel_count(&self) -> usize {
        self.inner.read().channels.len()
    }

    /// Snapshot of tracked nicks (case-folded).
    pub fn users(&self) -> Vec<String> {
        self.inner.read().users.keys().cloned().collect()
    }

    /// Snapshot of tracked channel names (case-folded).
    pub fn channels(&self) -> Vec<String> {
        self.inner.read().channels.keys().cloned().collect()
    }

    /// Case-folded names of the channels a nick is on.
    pub fn channels_for(&self, nick: &str) -> Vec<String> {
        self.inner
            .read()
            .user_channels
            .get(&irc_to_lower(nick))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Case-folded nicks of a channel's members.
    pub fn users_in(&self, channel: &str) -> Vec<String> {
        self.inner
            .read()
            .channel_users
            .get(&irc_to_lower(channel))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Visit a clone of every tracked user.
    ///
    /// Keys are snapshotted under the read lock, then each user is cloned
    /// under a short re-acquired lock, so a slow visitor never blocks
    /// dispatch.
    pub fn each_user(&self, mut f: impl FnMut(&User)) {
        let nicks = self.users();
        for nick in nicks {
            let user = self.inner.read().users.get(&nick).cloned();
            if let Some(user) = user {
                f(&user);
            }
        }
    }

    /// Visit a clone of every tracked channel; same snapshot discipline as
    /// [`State::each_user`].
    pub fn each_channel(&self, mut f: impl FnMut(&Channel)) {
        let names = self.channels();
        for name in names {
            let channel = self.inner.read().channels.get(&name).cloned();
            if let Some(channel) = channel {
                f(&channel);
            }
        }
    }
}
