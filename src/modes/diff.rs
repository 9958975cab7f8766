//! Minimized mode-change presentations.

use std::fmt;
use std::sync::Arc;

use super::channel::{ChannelModes, MemberModeChange};
use super::kinds::{ModeKind, ModeKinds};

/// A minimized presentation of an intended mode change.
///
/// Two [`ChannelModes`] over the same grammar: what the change asserts
/// (`pos`) and what it retracts (`neg`). Applying a modestring routes each
/// mutation into one side and erases it from the other, so re-asserting and
/// retracting the same mode never both survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeDiff {
    pos: ChannelModes,
    neg: ChannelModes,
}

impl ModeDiff {
    /// An empty diff over the given grammar.
    pub fn new(kinds: Arc<ModeKinds>) -> Self {
        ModeDiff {
            pos: ChannelModes::new(Arc::clone(&kinds)),
            neg: ChannelModes::new(kinds),
        }
    }

    /// The asserted side.
    pub fn pos(&self) -> &ChannelModes {
        &self.pos
    }

    /// The retracted side.
    pub fn neg(&self) -> &ChannelModes {
        &self.neg
    }

    /// Fold a modestring into the diff.
    ///
    /// User-prefix modes are reported as (positive, negative) member
    /// changes exactly like [`ChannelModes::apply`]; everything else lands
    /// in `pos` or `neg` with the opposite side cleared.
    pub fn apply(&mut self, modestring: &str) -> (Vec<MemberModeChange>, Vec<MemberModeChange>) {
        let mut pos_members = Vec::new();
        let mut neg_members = Vec::new();

        let mut tokens = modestring.split_whitespace();
        let Some(letters) = tokens.next() else {
            return (pos_members, neg_members);
        };

        let kinds = Arc::clone(self.pos.kinds());
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
                            self.pos.set_arg(c, arg);
                            self.neg.unset_arg(c);
                        } else {
                            self.neg.set_arg(c, arg);
                            self.pos.unset_arg(c);
                        }
                    }
                    ModeKind::OnSet => {
                        if adding {
                            let Some(arg) = tokens.next() else { continue };
                            self.pos.set_arg(c, arg);
                            // Erase a pending argless retraction.
                            self.neg.unset_flag(c);
                        } else {
                            // Retraction carries no argument; record it
                            // argless on the negative side.
                            self.neg.set_flag(c);
                            self.pos.unset_arg(c);
                        }
                    }
                    ModeKind::Address => {
                        let Some(arg) = tokens.next() else { continue };
                        if adding {
                            self.pos.add_address(c, arg);
                            self.neg.remove_address(c, arg);
                        } else {
                            self.neg.add_address(c, arg);
                            self.pos.remove_address(c, arg);
                        }
                    }
                    ModeKind::None if table.is_prefix_mode(c) => {
                        let Some(arg) = tokens.next() else { continue };
                        let change = MemberModeChange {
                            mode: c,
                            nick: arg.to_string(),
                        };
                        if adding {
                            pos_members.push(change);
                        } else {
                            neg_members.push(change);
                        }
                    }
                    ModeKind::None => {
                        if adding {
                            self.pos.set_flag(c);
                            self.neg.unset_flag(c);
                        } else {
                            self.neg.set_flag(c);
                            self.pos.unset_flag(c);
                        }
                    }
                },
            }
        }

        (pos_members, neg_members)
    }
}

impl fmt::Display for ModeDiff {
    /// `+<pos letters>-<neg letters> <args>`, arguments in letter order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pos_letters = String::new();
        let mut neg_letters = String::new();
        let mut args: Vec<&str> = Vec::new();

        for flag in self.pos.flags_iter() {
            pos_letters.push(flag);
        }
        for (mode, arg) in self.pos.args_iter() {
            pos_letters.push(mode);
            args.push(arg);
        }
        for (mode, list) in self.pos.addresses_iter() {
            for addr in list {
                pos_letters.push(mode);
                args.push(addr);
            }
        }

        for flag in self.neg.flags_iter() {
            neg_letters.push(flag);
        }
        for (mode, arg) in self.neg.args_iter() {
            neg_letters.push(mode);
            args.push(arg);
        }
        for (mode, list) in self.neg.addresses_iter() {
            for addr in list {
                neg_letters.push(mode);
                args.push(addr);
            }
        }

        write!(f, "+{}-{}", pos_letters, neg_letters)?;
        for arg in args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff() -> ModeDiff {
        let kinds = Arc::new(ModeKinds::new("(ov)@+", "b,k,l,imnpst").unwrap());
        ModeDiff::new(kinds)
    }

    #[test]
    fn routes_set_and_unset() {
        let mut d = diff();
        d.apply("+im-t");
        assert!(d.pos().has_flag('i'));
        assert!(d.pos().has_flag('m'));
        assert!(d.neg().has_flag('t'));
    }

    #[test]
    fn later_application_erases_the_opposite_side() {
        let mut d = diff();
        d.apply("+i");
        d.apply("-i");
        assert!(!d.pos().has_flag('i'));
        assert!(d.neg().has_flag('i'));

        d.apply("+i");
        assert!(d.pos().has_flag('i'));
        assert!(!d.neg().has_flag('i'));
    }

    #[test]
    fn onset_retraction_is_argless() {
        let mut d = diff();
        d.apply("+l 50");
        assert_eq!(d.pos().arg('l'), Some("50"));
        d.apply("-l");
        assert_eq!(d.pos().arg('l'), None);
        assert!(d.neg().has_flag('l'));
    }

    #[test]
    fn addresses_cross_sides() {
        let mut d = diff();
        d.apply("+b *!*@x");
        d.apply("-b *!*@x");
        assert!(d.pos().addresses('b').is_none());
        assert_eq!(d.neg().addresses('b').unwrap(), ["*!*@x"]);
    }

    #[test]
    fn member_changes_are_reported() {
        let mut d = diff();
        let (pos, neg) = d.apply("+o-v a b");
        assert_eq!(pos.len(), 1);
        assert_eq!(neg.len(), 1);
        assert_eq!(pos[0].mode, 'o');
        assert_eq!(neg[0].nick, "b");
        assert!(d.pos().is_empty());
        assert!(d.neg().is_empty());
    }

    #[test]
    fn display_renders_both_signs() {
        let mut d = diff();
        d.apply("+ik-t secret");
        let s = d.to_string();
        assert_eq!(s, "+ik-t secret");
    }

    #[test]
    fn diff_applies_to_channel_modes() {
        let kinds = Arc::new(ModeKinds::new("(ov)@+", "b,k,l,imnpst").unwrap());
        let mut target = ChannelModes::new(Arc::clone(&kinds));
        target.apply("+tl 25");

        let mut d = ModeDiff::new(kinds);
        d.apply("+ik-t-l secret");

        target.apply_diff(&d);
        assert!(target.has_flag('i'));
        assert_eq!(target.arg('k'), Some("secret"));
        assert!(!target.has_flag('t'));
        assert_eq!(target.arg('l'), None);
    }
}
