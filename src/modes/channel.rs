//! The set of modes asserted on a channel.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use super::diff::ModeDiff;
use super::kinds::{ModeKind, ModeKinds};

/// A user-prefix mode change that fell out of a modestring.
///
/// Prefix modes target members rather than the channel itself, so
/// [`ChannelModes::apply`] reports them instead of storing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberModeChange {
    /// The prefix mode letter (`o`, `v`, ...).
    pub mode: char,
    /// The nick the change targets.
    pub nick: String,
}

/// The modes currently asserted on one channel.
///
/// Three disjoint stores keyed by mode letter: argless flags, single-arg
/// modes, and insertion-ordered address lists. The grammar that classifies
/// each letter is the shared [`ModeKinds`] table.
#[derive(Debug, Clone)]
pub struct ChannelModes {
    kinds: Arc<ModeKinds>,
    flags: BTreeSet<char>,
    args: BTreeMap<char, String>,
    addresses: BTreeMap<char, Vec<String>>,
    address_count: usize,
}

impl PartialEq for ChannelModes {
    fn eq(&self, other: &Self) -> bool {
        self.flags == other.flags
            && self.args == other.args
            && self.addresses == other.addresses
            && self.address_count == other.address_count
    }
}

impl Eq for ChannelModes {}

impl ChannelModes {
    /// An empty mode set over the given grammar.
    pub fn new(kinds: Arc<ModeKinds>) -> Self {
        ChannelModes {
            kinds,
            flags: BTreeSet::new(),
            args: BTreeMap::new(),
            addresses: BTreeMap::new(),
            address_count: 0,
        }
    }

    /// The shared grammar table.
    pub fn kinds(&self) -> &Arc<ModeKinds> {
        &self.kinds
    }

    /// Apply a complex modestring (`+ov-k nick1 nick2 key`).
    ///
    /// Channel-level modes mutate this set; user-prefix modes are returned
    /// as (positive, negative) member changes. A letter whose argument ran
    /// out is skipped silently.
    pub fn apply(&mut self, modestring: &str) -> (Vec<MemberModeChange>, Vec<MemberModeChange>) {
        let mut pos = Vec::new();
        let mut neg = Vec::new();

        let mut tokens = modestring.split_whitespace();
        let Some(letters) = tokens.next() else {
            return (pos, neg);
        };

        let kinds = Arc::clone(&self.kinds);
        let table = kinds.read();
        let mut adding = true;

        for c in letters.chars() {
            match c {
                '+' => adding = true,
                '-' => adding = false,
                _ => match table.kind(c) {
                    ModeKind::Always => {
                        let Some(arg) = tokens.next() else { continue };
                        if adding {
                            self.set_arg(c, arg);
                        } else {
                            self.unset_arg_matching(c, arg);
                        }
                    }
                    ModeKind::OnSet => {
                        if adding {
                            let Some(arg) = tokens.next() else { continue };
                            self.set_arg(c, arg);
                        } else {
                            // Unset needs no argument and consumes none.
                            self.unset_arg(c);
                        }
                    }
                    ModeKind::Address => {
                        let Some(arg) = tokens.next() else { continue };
                        if adding {
                            self.add_address(c, arg);
                        } else {
                            self.remove_address(c, arg);
                        }
                    }
                    ModeKind::None if table.is_prefix_mode(c) => {
                        let Some(arg) = tokens.next() else { continue };
                        let change = MemberModeChange {
                            mode: c,
                            nick: arg.to_string(),
                        };
                        if adding {
                            pos.push(change);
                        } else {
                            neg.push(change);
                        }
                    }
                    ModeKind::None => {
                        if adding {
                            self.set_flag(c);
                        } else {
                            self.unset_flag(c);
                        }
                    }
                },
            }
        }

        (pos, neg)
    }

    /// Apply a diff: the positive set first, then the negative set.
    pub fn apply_diff(&mut self, diff: &ModeDiff) {
        let kinds = Arc::clone(&self.kinds);
        let table = kinds.read();

        let pos = diff.pos();
        for &flag in &pos.flags {
            self.set_flag(flag);
        }
        for (&mode, arg) in &pos.args {
            self.set_arg(mode, arg);
        }
        for (&mode, addrs) in &pos.addresses {
            for addr in addrs {
                self.add_address(mode, addr);
            }
        }

        let neg = diff.neg();
        for &flag in &neg.flags {
            // ONSET unsets are recorded argless on the negative side.
            match table.kind(flag) {
                ModeKind::OnSet | ModeKind::Always => self.unset_arg(flag),
                _ => self.unset_flag(flag),
            }
        }
        for (&mode, arg) in &neg.args {
            self.unset_arg_matching(mode, arg);
        }
        for (&mode, addrs) in &neg.addresses {
            for addr in addrs {
                self.remove_address(mode, addr);
            }
        }
    }

    /// Set an argless flag. Idempotent.
    pub fn set_flag(&mut self, mode: char) {
        self.flags.insert(mode);
    }

    /// Clear an argless flag.
    pub fn unset_flag(&mut self, mode: char) {
        self.flags.remove(&mode);
    }

    /// True when the flag is set.
    pub fn has_flag(&self, mode: char) -> bool {
        self.flags.contains(&mode)
    }

    /// Set a single-arg mode, replacing any previous argument.
    pub fn set_arg(&mut self, mode: char, arg: &str) {
        self.args.insert(mode, arg.to_string());
    }

    /// Clear a single-arg mode regardless of its stored argument.
    pub fn unset_arg(&mut self, mode: char) {
        self.args.remove(&mode);
    }

    /// Clear a single-arg mode only when the stored argument matches.
    pub fn unset_arg_matching(&mut self, mode: char, arg: &str) {
        if self.args.get(&mode).is_some_and(|stored| stored == arg) {
            self.args.remove(&mode);
        }
    }

    /// Stored argument for a single-arg mode.
    pub fn arg(&self, mode: char) -> Option<&str> {
        self.args.get(&mode).map(String::as_str)
    }

    /// Append to an address list if not already present.
    pub fn add_address(&mut self, mode: char, address: &str) {
        let list = self.addresses.entry(mode).or_default();
        if !list.iter().any(|a| a == address) {
            list.push(address.to_string());
            self.address_count += 1;
        }
    }

    /// Remove an exact address. Removing a non-present address is a no-op;
    /// an emptied list is dropped.
    pub fn remove_address(&mut self, mode: char, address: &str) {
        if let Some(list) = self.addresses.get_mut(&mode)
            && let Some(i) = list.iter().position(|a| a == address)
        {
            list.swap_remove(i);
            self.address_count -= 1;
            if list.is_empty() {
                self.addresses.remove(&mode);
            }
        }
    }

    /// The address list for a mode, in insertion order.
    pub fn addresses(&self, mode: char) -> Option<&[String]> {
        self.addresses.get(&mode).map(Vec::as_slice)
    }

    /// Total stored addresses across every address mode.
    pub fn address_count(&self) -> usize {
        self.address_count
    }

    /// True when every mode set is empty.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.args.is_empty() && self.addresses.is_empty()
    }

    /// Probe whether modes are set, optionally with specific arguments.
    ///
    /// Each probe string is `LETTERS [ARGS...]`; the last N arguments pair
    /// with the last N letters, earlier letters are argless. An argless
    /// probe of an arg or address mode checks mere presence; a probe with
    /// an argument requires the stored argument (or an address entry) to
    /// equal it. All probes must hold.
    pub fn is_set(&self, modestrs: &[&str]) -> bool {
        let kinds = Arc::clone(&self.kinds);
        let table = kinds.read();

        for probe in modestrs {
            let mut tokens = probe.split_whitespace();
            let Some(letters) = tokens.next() else {
                continue;
            };
            let letters: Vec<char> = letters.chars().filter(|c| *c != '+' && *c != '-').collect();
            let args: Vec<&str> = tokens.collect();
            let argless = letters.len().saturating_sub(args.len());

            for (i, &mode) in letters.iter().enumerate() {
                let arg = if i >= argless {
                    Some(args[i - argless])
                } else {
                    None
                };
                let hit = match table.kind(mode) {
                    ModeKind::Always | ModeKind::OnSet => match arg {
                        Some(a) if !a.is_empty() => {
                            self.args.get(&mode).is_some_and(|stored| stored == a)
                        }
                        _ => self.args.contains_key(&mode),
                    },
                    ModeKind::Address => match arg {
                        Some(a) if !a.is_empty() => self
                            .addresses
                            .get(&mode)
                            .is_some_and(|list| list.iter().any(|x| x == a)),
                        _ => self.addresses.contains_key(&mode),
                    },
                    ModeKind::None => self.flags.contains(&mode),
                };
                if !hit {
                    return false;
                }
            }
        }
        true
    }

    pub(crate) fn flags_iter(&self) -> impl Iterator<Item = char> + '_ {
        self.flags.iter().copied()
    }

    pub(crate) fn args_iter(&self) -> impl Iterator<Item = (char, &str)> + '_ {
        self.args.iter().map(|(&m, a)| (m, a.as_str()))
    }

    pub(crate) fn addresses_iter(&self) -> impl Iterator<Item = (char, &[String])> + '_ {
        self.addresses.iter().map(|(&m, l)| (m, l.as_slice()))
    }
}

impl fmt::Display for ChannelModes {
    /// Letters first, then arguments in matching order; round-trippable
    /// through [`ChannelModes::apply`].
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut letters = String::new();
        let mut args: Vec<&str> = Vec::new();

        for flag in &self.flags {
            letters.push(*flag);
        }
        for (mode, arg) in &self.args {
            letters.push(*mode);
            args.push(arg);
        }
        for (mode, list) in &self.addresses {
            for addr in list {
                letters.push(*mode);
                args.push(addr);
            }
        }

        f.write_str(&letters)?;
        for arg in args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
