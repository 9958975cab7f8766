//! The runtime mode grammar: parsed PREFIX and CHANMODES tables.

use std::collections::HashMap;

use parking_lot::{RwLock, RwLockReadGuard};

use crate::error::ModeKindsError;

/// Upper bound on user-prefix modes; bit positions must fit a
/// [`MemberModes`](super::MemberModes) byte.
pub const MAX_USER_PREFIXES: usize = 8;

/// Argument class of a channel mode letter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModeKind {
    /// No argument; a plain flag. Letters absent from CHANMODES behave as
    /// this kind.
    #[default]
    None,
    /// One argument on both set and unset.
    Always,
    /// One argument on set only; unset takes none.
    OnSet,
    /// List-valued (ban-like); one argument per entry.
    Address,
}

/// Parsed PREFIX + CHANMODES tables.
#[derive(Debug, Clone, Default)]
pub(crate) struct KindsTable {
    /// Ordered (mode, symbol) pairs; position is the member-mode bit.
    user_prefixes: Vec<(char, char)>,
    channel_modes: HashMap<char, ModeKind>,
}

impl KindsTable {
    /// Argument class for a mode letter. Absent letters are `None`-kind.
    pub(crate) fn kind(&self, mode: char) -> ModeKind {
        self.channel_modes.get(&mode).copied().unwrap_or_default()
    }

    /// Bit position of a user-prefix mode.
    pub(crate) fn prefix_bit(&self, mode: char) -> Option<u8> {
        self.user_prefixes
            .iter()
            .position(|&(m, _)| m == mode)
            .map(|i| i as u8)
    }

    /// Mode letter for a display symbol (`@` → `o`).
    pub(crate) fn mode_for_symbol(&self, symbol: char) -> Option<char> {
        self.user_prefixes
            .iter()
            .find(|&&(_, s)| s == symbol)
            .map(|&(m, _)| m)
    }

    /// Display symbol for a mode letter (`o` → `@`).
    pub(crate) fn symbol_for_mode(&self, mode: char) -> Option<char> {
        self.user_prefixes
            .iter()
            .find(|&&(m, _)| m == mode)
            .map(|&(_, s)| s)
    }

    /// Mode letter at a bit position.
    pub(crate) fn mode_for_bit(&self, bit: u8) -> Option<char> {
        self.user_prefixes.get(bit as usize).map(|&(m, _)| m)
    }

    pub(crate) fn is_prefix_mode(&self, mode: char) -> bool {
        self.prefix_bit(mode).is_some()
    }
}

/// The server-defined mode grammar, shared by every channel of a network.
///
/// The table is replaced atomically by [`update`](ModeKinds::update) under
/// an internal lock; mode application takes the read half. Callers must not
/// overlap `update` with event dispatch.
#[derive(Debug)]
pub struct ModeKinds {
    table: RwLock<KindsTable>,
}

impl ModeKinds {
    /// Parse PREFIX (`(ov)@+`) and CHANMODES (`b,k,l,imnpst`).
    pub fn new(prefix: &str, chanmodes: &str) -> Result<Self, ModeKindsError> {
        let table = parse_tables(prefix, chanmodes)?;
        Ok(ModeKinds {
            table: RwLock::new(table),
        })
    }

    /// Re-parse and atomically replace both tables.
    ///
    /// Previously stored mode bits on existing channels stay valid as bits;
    /// future applications are interpreted under the new table.
    pub fn update(&self, prefix: &str, chanmodes: &str) -> Result<(), ModeKindsError> {
        let table = parse_tables(prefix, chanmodes)?;
        *self.table.write() = table;
        Ok(())
    }

    /// Read access for a consistent multi-lookup walk.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, KindsTable> {
        self.table.read()
    }

    /// Argument class for a mode letter.
    pub fn kind(&self, mode: char) -> ModeKind {
        self.read().kind(mode)
    }

    /// Bit position of a user-prefix mode, if it is one.
    pub fn prefix_bit(&self, mode: char) -> Option<u8> {
        self.read().prefix_bit(mode)
    }

    /// Mode letter for a display symbol.
    pub fn mode_for_symbol(&self, symbol: char) -> Option<char> {
        self.read().mode_for_symbol(symbol)
    }

    /// Display symbol for a mode letter.
    pub fn symbol_for_mode(&self, mode: char) -> Option<char> {
        self.read().symbol_for_mode(mode)
    }

    /// True when the letter is one of the PREFIX modes.
    pub fn is_prefix_mode(&self, mode: char) -> bool {
        self.read().is_prefix_mode(mode)
    }
}

fn parse_tables(prefix: &str, chanmodes: &str) -> Result<KindsTable, ModeKindsError> {
    let user_prefixes = parse_prefix(prefix)?;
    let channel_modes = parse_chanmodes(chanmodes)?;
    Ok(KindsTable {
        user_prefixes,
        channel_modes,
    })
}

/// Strict PREFIX grammar: `(modes)symbols`, equal lengths, at most
/// [`MAX_USER_PREFIXES`] entries.
fn parse_prefix(prefix: &str) -> Result<Vec<(char, char)>, ModeKindsError> {
    let rest = prefix
        .strip_prefix('(')
        .ok_or_else(|| ModeKindsError::InvalidPrefix(prefix.to_string()))?;
    let close = rest
        .find(')')
        .ok_or_else(|| ModeKindsError::InvalidPrefix(prefix.to_string()))?;
    let modes: Vec<char> = rest[..close].chars().collect();
    let symbols: Vec<char> = rest[close + 1..].chars().collect();

    if modes.len() != symbols.len() {
        return Err(ModeKindsError::InvalidPrefix(prefix.to_string()));
    }
    if modes.len() > MAX_USER_PREFIXES {
        return Err(ModeKindsError::TooManyPrefixes(prefix.to_string()));
    }

    Ok(modes.into_iter().zip(symbols).collect())
}

/// Strict CHANMODES grammar: exactly four comma-separated lists
/// (address, always, onset, none); whitespace inside lists is tolerated;
/// letters are the only valid entries, each in at most one list.
fn parse_chanmodes(chanmodes: &str) -> Result<HashMap<char, ModeKind>, ModeKindsError> {
    let lists: Vec<&str> = chanmodes.split(',').collect();
    if lists.len() != 4 {
        return Err(ModeKindsError::InvalidChanmodes(chanmodes.to_string()));
    }

    let kinds = [
        ModeKind::Address,
        ModeKind::Always,
        ModeKind::OnSet,
        ModeKind::None,
    ];

    let mut map = HashMap::new();
    for (list, &kind) in lists.iter().zip(kinds.iter()) {
        for c in list.chars() {
            if c.is_whitespace() {
                continue;
            }
            if !c.is_ascii_alphabetic() {
                return Err(ModeKindsError::InvalidChanmodes(chanmodes.to_string()));
            }
            if map.insert(c, kind).is_some() {
                return Err(ModeKindsError::InvalidChanmodes(chanmodes.to_string()));
            }
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds() -> ModeKinds {
        ModeKinds::new("(ov)@+", "b,k,l,imnpst").unwrap()
    }

    #[test]
    fn parses_standard_grammar() {
        let k = kinds();
        assert_eq!(k.kind('b'), ModeKind::Address);
        assert_eq!(k.kind('k'), ModeKind::Always);
        assert_eq!(k.kind('l'), ModeKind::OnSet);
        assert_eq!(k.kind('i'), ModeKind::None);
        // Unknown letters behave as argless flags.
        assert_eq!(k.kind('Z'), ModeKind::None);
    }

    #[test]
    fn prefix_positions_are_bits() {
        let k = kinds();
        assert_eq!(k.prefix_bit('o'), Some(0));
        assert_eq!(k.prefix_bit('v'), Some(1));
        assert_eq!(k.prefix_bit('h'), None);
        assert_eq!(k.mode_for_symbol('@'), Some('o'));
        assert_eq!(k.mode_for_symbol('+'), Some('v'));
        assert_eq!(k.symbol_for_mode('o'), Some('@'));
        assert!(k.is_prefix_mode('v'));
        assert!(!k.is_prefix_mode('b'));
    }

    #[test]
    fn rejects_malformed_prefix() {
        assert!(matches!(
            ModeKinds::new("ov)@+", "b,k,l,i"),
            Err(ModeKindsError::InvalidPrefix(_))
        ));
        assert!(matches!(
            ModeKinds::new("(ov@+", "b,k,l,i"),
            Err(ModeKindsError::InvalidPrefix(_))
        ));
        assert!(matches!(
            ModeKinds::new("(ov)@", "b,k,l,i"),
            Err(ModeKindsError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn eight_prefixes_is_the_limit() {
        let k = ModeKinds::new("(qaohvxyz)~&@%+!$*", "b,k,l,i").unwrap();
        assert_eq!(k.prefix_bit('z'), Some(7));
    }

    #[test]
    fn rejects_too_many_prefixes() {
        assert!(matches!(
            ModeKinds::new("(qaohvxyzw)~&@%+!$*-", "b,k,l,i"),
            Err(ModeKindsError::TooManyPrefixes(_))
        ));
    }

    #[test]
    fn rejects_malformed_chanmodes() {
        // Wrong list count.
        assert!(matches!(
            ModeKinds::new("(ov)@+", "b,k,l"),
            Err(ModeKindsError::InvalidChanmodes(_))
        ));
        assert!(matches!(
            ModeKinds::new("(ov)@+", "b,k,l,i,x"),
            Err(ModeKindsError::InvalidChanmodes(_))
        ));
        // Non-letter entry.
        assert!(matches!(
            ModeKinds::new("(ov)@+", "b!,k,l,i"),
            Err(ModeKindsError::InvalidChanmodes(_))
        ));
        // A letter in two lists.
        assert!(matches!(
            ModeKinds::new("(ov)@+", "b,b,l,i"),
            Err(ModeKindsError::InvalidChanmodes(_))
        ));
    }

    #[test]
    fn tolerates_whitespace_and_empty_lists() {
        let k = ModeKinds::new("(ov)@+", "beI, k ,l,").unwrap();
        assert_eq!(k.kind('e'), ModeKind::Address);
        assert_eq!(k.kind('k'), ModeKind::Always);
        assert_eq!(k.kind('m'), ModeKind::None);
    }

    #[test]
    fn update_replaces_tables() {
        let k = kinds();
        k.update("(qov)~@+", "beI,k,lj,imnpst").unwrap();
        assert_eq!(k.prefix_bit('q'), Some(0));
        assert_eq!(k.prefix_bit('o'), Some(1));
        assert_eq!(k.kind('e'), ModeKind::Address);
        assert_eq!(k.kind('j'), ModeKind::OnSet);

        // A failed update leaves the old tables in place.
        assert!(k.update("broken", "b,k,l,i").is_err());
        assert_eq!(k.prefix_bit('q'), Some(0));
    }
}
