//! The inbound event contract.
//!
//! Events arrive from an upstream line parser; this crate only consumes
//! them. An [`Event`] carries the protocol name, the sending host, the
//! positional arguments, and a handle to the originating network's
//! [`NetworkInfo`] so handlers can ask whether a target names a channel.

use std::sync::Arc;

use crate::host::Host;

/// Protocol names the state engine dispatches on.
///
/// Unknown names are ignored by [`State::update`](crate::state::State::update).
pub mod names {
    pub const NICK: &str = "NICK";
    pub const JOIN: &str = "JOIN";
    pub const PART: &str = "PART";
    pub const QUIT: &str = "QUIT";
    pub const KICK: &str = "KICK";
    pub const MODE: &str = "MODE";
    pub const TOPIC: &str = "TOPIC";
    pub const PRIVMSG: &str = "PRIVMSG";
    pub const NOTICE: &str = "NOTICE";
    pub const RPL_WELCOME: &str = "RPL_WELCOME";
    pub const RPL_TOPIC: &str = "RPL_TOPIC";
    pub const RPL_NAMREPLY: &str = "RPL_NAMREPLY";
    pub const RPL_WHOREPLY: &str = "RPL_WHOREPLY";
    pub const RPL_CHANNELMODEIS: &str = "RPL_CHANNELMODEIS";
    pub const RPL_BANLIST: &str = "RPL_BANLIST";
}

/// Static facts about a network, from the server's ISUPPORT advertisement.
///
/// Defaults are the RFC 1459 values most servers start from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    /// The PREFIX token, e.g. `(ov)@+`.
    pub prefix: String,
    /// The CHANMODES token, e.g. `b,k,l,imnpst`.
    pub chanmodes: String,
    /// The CHANTYPES token, e.g. `#&`.
    pub chantypes: String,
}

impl Default for NetworkInfo {
    fn default() -> Self {
        NetworkInfo {
            prefix: "(ov)@+".to_string(),
            chanmodes: "b,k,l,imnpst".to_string(),
            chantypes: "#&".to_string(),
        }
    }
}

impl NetworkInfo {
    /// Build from raw ISUPPORT token values.
    pub fn new(
        prefix: impl Into<String>,
        chanmodes: impl Into<String>,
        chantypes: impl Into<String>,
    ) -> Self {
        NetworkInfo {
            prefix: prefix.into(),
            chanmodes: chanmodes.into(),
            chantypes: chantypes.into(),
        }
    }

    /// True when the target's first character is one of CHANTYPES.
    pub fn is_channel(&self, target: &str) -> bool {
        target
            .chars()
            .next()
            .is_some_and(|c| self.chantypes.contains(c))
    }
}

/// One inbound protocol event.
#[derive(Debug, Clone)]
pub struct Event {
    /// Protocol name, one of [`names`] for handled events.
    pub name: String,
    /// Full host of the sender (`nick!user@host`, or a bare server name).
    pub sender: String,
    /// Positional arguments, already split by the parser.
    pub args: Vec<String>,
    /// The originating network's static facts.
    pub network_info: Arc<NetworkInfo>,
}

impl Event {
    /// Build an event.
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        sender: impl Into<String>,
        args: impl IntoIterator<Item = S>,
        network_info: Arc<NetworkInfo>,
    ) -> Self {
        Event {
            name: name.into(),
            sender: sender.into(),
            args: args.into_iter().map(Into::into).collect(),
            network_info,
        }
    }

    /// The sender as a [`Host`].
    pub fn split_host(&self) -> Host {
        Host::new(self.sender.clone())
    }

    /// Argument at `i`, or `""` when absent.
    pub fn arg(&self, i: usize) -> &str {
        self.args.get(i).map(String::as_str).unwrap_or("")
    }

    /// True when the first argument names a channel on this network.
    pub fn is_target_chan(&self) -> bool {
        self.args
            .first()
            .is_some_and(|t| self.network_info.is_channel(t))
    }
}
