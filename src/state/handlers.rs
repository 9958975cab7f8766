//! Event dispatch: one handler per protocol name.
//!
//! Handlers run under the state's write lock and never fail; an event with
//! missing arguments or an unknown target leaves the state untouched.
//! Sender comparisons against the tracked self use full-host equality; the
//! KICK target and MODE target compare by nick.

use std::collections::hash_map::Entry;

use crate::casemap::{irc_eq, irc_to_lower};
use crate::event::{Event, names};
use crate::host::Host;

use super::channel::Channel;
use super::update::StateUpdate;
use super::user::User;
use super::StateInner;

impl StateInner {
    /// Select and run the handler for one event.
    pub(crate) fn dispatch(&mut self, ev: &Event) -> StateUpdate {
        let mut up = StateUpdate::default();
        match ev.name.as_str() {
            names::NICK => self.handle_nick(ev, &mut up),
            names::JOIN => self.handle_join(ev, &mut up),
            names::PART => self.handle_part(ev, &mut up),
            names::QUIT => self.handle_quit(ev, &mut up),
            names::KICK => self.handle_kick(ev, &mut up),
            names::MODE => self.handle_mode(ev, &mut up),
            names::TOPIC => self.handle_topic(ev, &mut up),
            names::PRIVMSG | names::NOTICE => self.handle_privmsg(ev, &mut up),
            names::RPL_WELCOME => self.handle_welcome(ev),
            names::RPL_TOPIC => self.handle_rpl_topic(ev),
            names::RPL_NAMREPLY => self.handle_namreply(ev),
            names::RPL_WHOREPLY => self.handle_whoreply(ev),
            names::RPL_CHANNELMODEIS => self.handle_channelmodeis(ev),
            names::RPL_BANLIST => self.handle_banlist(ev),
            other => tracing::trace!(name = other, "ignoring unhandled event"),
        }
        up
    }

    fn handle_nick(&mut self, ev: &Event, up: &mut StateUpdate) {
        let Some(new_nick) = ev.args.first().filter(|n| !n.is_empty()) else {
            return;
        };

        let sender = ev.sender.as_str();
        let old_host = Host::new(sender);
        let old_lc = irc_to_lower(old_host.nick());
        if old_lc.is_empty() {
            return;
        }

        self.add_user(sender);

        // Carry the user@host suffix over to the new nick when present.
        let new_host = match sender.find('!') {
            Some(i) => format!("{}{}", new_nick, &sender[i..]),
            None => new_nick.clone(),
        };
        let new_lc = irc_to_lower(new_nick);

        if let Some(mut user) = self.users.remove(&old_lc) {
            user.host = Host::new(new_host.clone());
            self.users.insert(new_lc.clone(), user);
        }

        if old_lc != new_lc
            && let Some(chans) = self.user_channels.remove(&old_lc)
        {
            for chan in &chans {
                if let Some(members) = self.channel_users.get_mut(chan) {
                    members.remove(&old_lc);
                    members.insert(new_lc.clone());
                }
                if let Some(modes) = self.memberships.remove(&(chan.clone(), old_lc.clone())) {
                    self.memberships.insert((chan.clone(), new_lc.clone()), modes);
                }
            }
            self.user_channels.insert(new_lc.clone(), chans);
        }

        if self.is_self(sender) {
            self.self_user.host = Host::new(new_host.clone());
        }

        up.nick = Some((sender.to_string(), new_host));
    }

    fn handle_join(&mut self, ev: &Event, up: &mut StateUpdate) {
        let Some(chan) = ev.args.first().filter(|c| !c.is_empty()) else {
            return;
        };
        let chan_lc = irc_to_lower(chan);
        let from_self = self.is_self(&ev.sender);

        if from_self {
            self.ensure_channel(chan);
        }
        if !self.channels.contains_key(&chan_lc) {
            return;
        }

        self.add_user(&ev.sender);
        let nick_lc = irc_to_lower(Host::new(ev.sender.as_str()).nick());
        self.add_member(&chan_lc, &nick_lc);

        if !from_self {
            up.seen.push(self.host_of(&nick_lc));
        }
    }

    fn handle_part(&mut self, ev: &Event, up: &mut StateUpdate) {
        let Some(chan) = ev.args.first() else {
            return;
        };
        let chan_lc = irc_to_lower(chan);
        if !self.channels.contains_key(&chan_lc) {
            return;
        }

        if self.is_self(&ev.sender) {
            self.remove_channel_cascade(&chan_lc, &mut up.unseen);
        } else {
            let nick_lc = irc_to_lower(Host::new(ev.sender.as_str()).nick());
            if self.memberships.contains_key(&(chan_lc.clone(), nick_lc.clone())) {
                self.part_member(&chan_lc, &nick_lc, &mut up.unseen);
            }
        }
    }

    fn handle_quit(&mut self, ev: &Event, up: &mut StateUpdate) {
        if self.is_self(&ev.sender) {
            return;
        }
        let nick_lc = irc_to_lower(Host::new(ev.sender.as_str()).nick());
        let host = self.host_of(&nick_lc);
        self.remove_user_entirely(&nick_lc);
        up.quit = Some(host);
    }

    fn handle_kick(&mut self, ev: &Event, up: &mut StateUpdate) {
        if ev.args.len() < 2 {
            return;
        }
        let chan_lc = irc_to_lower(&ev.args[0]);
        let target = ev.args[1].as_str();

        self.add_user(&ev.sender);
        let sender_lc = irc_to_lower(Host::new(ev.sender.as_str()).nick());
        if self.channels.contains_key(&chan_lc) {
            self.add_member(&chan_lc, &sender_lc);
        }
        up.seen.push(self.host_of(&sender_lc));

        if self.is_self_nick(target) {
            self.remove_channel_cascade(&chan_lc, &mut up.unseen);
        } else {
            let target_lc = irc_to_lower(target);
            if self.memberships.contains_key(&(chan_lc.clone(), target_lc.clone())) {
                self.part_member(&chan_lc, &target_lc, &mut up.unseen);
            }
        }
    }

    fn handle_mode(&mut self, ev: &Event, up: &mut StateUpdate) {
        if ev.args.len() < 2 {
            return;
        }

        if ev.is_target_chan() {
            self.add_user(&ev.sender);
            let sender_lc = irc_to_lower(Host::new(ev.sender.as_str()).nick());
            up.seen.push(self.host_of(&sender_lc));

            let chan_lc = irc_to_lower(&ev.args[0]);
            let modestring = ev.args[1..].join(" ");
            self.apply_channel_modes(&chan_lc, &modestring);
        } else if self.is_self_nick(&ev.args[0]) {
            let modestring = ev.args[1..].join(" ");
            self.self_modes.apply(&modestring);
        }
    }

    fn handle_topic(&mut self, ev: &Event, up: &mut StateUpdate) {
        let Some(chan) = ev.args.first() else {
            return;
        };
        let chan_lc = irc_to_lower(chan);
        if !self.channels.contains_key(&chan_lc) {
            return;
        }

        self.add_user(&ev.sender);
        let sender_lc = irc_to_lower(Host::new(ev.sender.as_str()).nick());
        up.seen.push(self.host_of(&sender_lc));

        let topic = ev.args.get(1).cloned().unwrap_or_default();
        if let Some(channel) = self.channels.get_mut(&chan_lc) {
            channel.topic = topic;
        }
    }

    fn handle_rpl_topic(&mut self, ev: &Event) {
        if ev.args.len() < 3 {
            return;
        }
        let chan_lc = irc_to_lower(&ev.args[1]);
        if let Some(channel) = self.channels.get_mut(&chan_lc) {
            channel.topic = ev.args[2].clone();
        }
    }

    fn handle_privmsg(&mut self, ev: &Event, up: &mut StateUpdate) {
        if !ev.is_target_chan() {
            return;
        }
        let chan_lc = irc_to_lower(&ev.args[0]);
        if !self.channels.contains_key(&chan_lc) {
            return;
        }

        self.add_user(&ev.sender);
        let nick_lc = irc_to_lower(Host::new(ev.sender.as_str()).nick());
        self.add_member(&chan_lc, &nick_lc);
        up.seen.push(self.host_of(&nick_lc));
    }

    fn handle_welcome(&mut self, ev: &Event) {
        let Some(nick) = ev.args.first().filter(|n| !n.is_empty()) else {
            return;
        };

        // The welcome text conventionally ends with our full host; fall
        // back to the bare nick when it does not.
        let host = ev
            .args
            .get(1)
            .and_then(|text| text.split_whitespace().last())
            .filter(|word| word.contains('!') || word.contains('@'))
            .map(str::to_string)
            .unwrap_or_else(|| nick.clone());

        self.self_user = User::new(host.as_str());
        let nick_lc = irc_to_lower(Host::new(host.as_str()).nick());
        self.users.insert(nick_lc, self.self_user.clone());
    }

    fn handle_namreply(&mut self, ev: &Event) {
        if ev.args.len() < 4 {
            return;
        }
        let chan_lc = irc_to_lower(&ev.args[2]);
        if !self.channels.contains_key(&chan_lc) {
            return;
        }

        let names_list = ev.args[3].clone();
        for entry in names_list.split_whitespace() {
            let mut rest = entry;
            let mut modes = Vec::new();
            while let Some(c) = rest.chars().next() {
                match self.kinds.mode_for_symbol(c) {
                    Some(mode) => {
                        modes.push(mode);
                        rest = &rest[c.len_utf8()..];
                        if !self.greedy_prefix_strip {
                            break;
                        }
                    }
                    None => break,
                }
            }
            if rest.is_empty() {
                continue;
            }

            self.add_user(rest);
            let nick_lc = irc_to_lower(Host::new(rest).nick());
            self.add_member(&chan_lc, &nick_lc);
            for mode in modes {
                if let Some(m) = self.memberships.get_mut(&(chan_lc.clone(), nick_lc.clone())) {
                    m.set_mode(&self.kinds, mode);
                }
            }
        }
    }

    fn handle_whoreply(&mut self, ev: &Event) {
        if ev.args.len() < 8 {
            return;
        }
        let chan_lc = irc_to_lower(&ev.args[1]);
        let full = format!("{}!{}@{}", ev.args[5], ev.args[2], ev.args[3]);

        self.add_user(&full);
        let nick_lc = irc_to_lower(ev.args[5].as_str());

        let realname = ev.args[7]
            .split_once(' ')
            .map(|(_, r)| r.to_string())
            .unwrap_or_default();
        if let Some(user) = self.users.get_mut(&nick_lc) {
            user.realname = realname;
        }

        if self.channels.contains_key(&chan_lc) {
            self.add_member(&chan_lc, &nick_lc);
            let flags = ev.args[6].clone();
            for c in flags.chars() {
                if let Some(mode) = self.kinds.mode_for_symbol(c)
                    && let Some(m) = self.memberships.get_mut(&(chan_lc.clone(), nick_lc.clone()))
                {
                    m.set_mode(&self.kinds, mode);
                }
            }
        }
    }

    fn handle_channelmodeis(&mut self, ev: &Event) {
        if ev.args.len() < 3 {
            return;
        }
        let chan_lc = irc_to_lower(&ev.args[1]);
        let modestring = ev.args[2..].join(" ");
        self.apply_channel_modes(&chan_lc, &modestring);
    }

    fn handle_banlist(&mut self, ev: &Event) {
        if ev.args.len() < 3 {
            return;
        }
        let chan_lc = irc_to_lower(&ev.args[1]);
        if let Some(channel) = self.channels.get_mut(&chan_lc) {
            channel.add_ban(ev.args[2].clone());
        }
    }

    // --- Shared mutations ---

    /// Apply a modestring to a channel, then fold the returned prefix-mode
    /// changes into the membership table. Changes for nicks that are not
    /// members are ignored.
    fn apply_channel_modes(&mut self, chan_lc: &str, modestring: &str) {
        let Some(channel) = self.channels.get_mut(chan_lc) else {
            return;
        };
        let (pos, neg) = channel.modes.apply(modestring);

        for change in pos {
            let nick_lc = irc_to_lower(&change.nick);
            if let Some(m) = self.memberships.get_mut(&(chan_lc.to_string(), nick_lc)) {
                m.set_mode(&self.kinds, change.mode);
            }
        }
        for change in neg {
            let nick_lc = irc_to_lower(&change.nick);
            if let Some(m) = self.memberships.get_mut(&(chan_lc.to_string(), nick_lc)) {
                m.unset_mode(&self.kinds, change.mode);
            }
        }
    }

    /// Full-host equality against the tracked self.
    fn is_self(&self, sender: &str) -> bool {
        !self.self_user.host.is_empty() && self.self_user.host.as_str() == sender
    }

    /// Nick equality against the tracked self.
    fn is_self_nick(&self, nick: &str) -> bool {
        !self.self_user.host.is_empty() && irc_eq(nick, self.self_user.host.nick())
    }

    /// Fullest known host for a folded nick.
    fn host_of(&self, nick_lc: &str) -> String {
        self.users
            .get(nick_lc)
            .map(|u| u.host.as_str().to_string())
            .unwrap_or_else(|| nick_lc.to_string())
    }

    /// Record a user, upgrading a bare-nick entry when a fuller
    /// `nick!user@host` form arrives.
    fn add_user(&mut self, host: &str) {
        let h = Host::new(host);
        let nick_lc = irc_to_lower(h.nick());
        if nick_lc.is_empty() {
            return;
        }
        match self.users.entry(nick_lc) {
            Entry::Occupied(mut e) => {
                let known = &e.get().host;
                if known.username().is_empty()
                    && known.hostname().is_empty()
                    && (!h.username().is_empty() || !h.hostname().is_empty())
                {
                    e.get_mut().host = h;
                }
            }
            Entry::Vacant(e) => {
                e.insert(User::new(host));
            }
        }
    }

    /// Create a channel if unknown, preserving the original-case name.
    fn ensure_channel(&mut self, name: &str) {
        let chan_lc = irc_to_lower(name);
        if !self.channels.contains_key(&chan_lc) {
            self.channels
                .insert(chan_lc, Channel::new(name, std::sync::Arc::clone(&self.kinds)));
        }
    }

    /// Insert a membership symmetrically into both indexes and the
    /// canonical table.
    fn add_member(&mut self, chan_lc: &str, nick_lc: &str) {
        self.channel_users
            .entry(chan_lc.to_string())
            .or_default()
            .insert(nick_lc.to_string());
        self.user_channels
            .entry(nick_lc.to_string())
            .or_default()
            .insert(chan_lc.to_string());
        self.memberships
            .entry((chan_lc.to_string(), nick_lc.to_string()))
            .or_default();
    }

    /// Remove one member from one channel. When that was their last
    /// membership and they are not the self, the user is dropped and their
    /// host reported unseen.
    fn part_member(&mut self, chan_lc: &str, nick_lc: &str, unseen: &mut Vec<String>) {
        self.memberships
            .remove(&(chan_lc.to_string(), nick_lc.to_string()));
        if let Some(members) = self.channel_users.get_mut(chan_lc) {
            members.remove(nick_lc);
        }

        let now_empty = match self.user_channels.get_mut(nick_lc) {
            Some(chans) => {
                chans.remove(chan_lc);
                chans.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.user_channels.remove(nick_lc);
            if !self.is_self_nick(nick_lc)
                && let Some(user) = self.users.remove(nick_lc)
            {
                unseen.push(user.host.as_str().to_string());
            }
        }
    }

    /// Remove a channel and every membership in it. Members for whom this
    /// was the last shared channel (excluding the self) are dropped and
    /// reported unseen.
    fn remove_channel_cascade(&mut self, chan_lc: &str, unseen: &mut Vec<String>) {
        if self.channels.remove(chan_lc).is_none() {
            return;
        }
        let members = self.channel_users.remove(chan_lc).unwrap_or_default();
        for nick_lc in members {
            self.memberships
                .remove(&(chan_lc.to_string(), nick_lc.clone()));
            let now_empty = match self.user_channels.get_mut(&nick_lc) {
                Some(chans) => {
                    chans.remove(chan_lc);
                    chans.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.user_channels.remove(&nick_lc);
                if !self.is_self_nick(&nick_lc)
                    && let Some(user) = self.users.remove(&nick_lc)
                {
                    unseen.push(user.host.as_str().to_string());
                }
            }
        }
    }

    /// Remove a user from every channel and the user table.
    fn remove_user_entirely(&mut self, nick_lc: &str) {
        if let Some(chans) = self.user_channels.remove(nick_lc) {
            for chan in chans {
                if let Some(members) = self.channel_users.get_mut(&chan) {
                    members.remove(nick_lc);
                }
                self.memberships.remove(&(chan, nick_lc.to_string()));
            }
        }
        self.users.remove(nick_lc);
    }
}
