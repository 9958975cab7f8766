//! Per-membership prefix-mode bits.

use super::ModeKinds;

/// The prefix modes one user holds on one channel.
///
/// A single byte of position-indexed bits; positions come from the
/// network's PREFIX ordering via [`ModeKinds::prefix_bit`]. The same value
/// is observed through both membership indexes of a state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberModes(u8);

impl MemberModes {
    /// No prefix modes held.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Set a prefix mode by letter. Unknown letters are ignored.
    pub fn set_mode(&mut self, kinds: &ModeKinds, mode: char) {
        if let Some(bit) = kinds.prefix_bit(mode) {
            self.0 |= 1 << bit;
        }
    }

    /// Clear a prefix mode by letter. Unknown letters are ignored.
    pub fn unset_mode(&mut self, kinds: &ModeKinds, mode: char) {
        if let Some(bit) = kinds.prefix_bit(mode) {
            self.0 &= !(1 << bit);
        }
    }

    /// True when the prefix mode is held.
    pub fn has_mode(&self, kinds: &ModeKinds, mode: char) -> bool {
        kinds
            .prefix_bit(mode)
            .is_some_and(|bit| self.0 & (1 << bit) != 0)
    }

    /// Held mode letters, in PREFIX order.
    pub fn modes(&self, kinds: &ModeKinds) -> String {
        let table = kinds.read();
        (0u8..8)
            .filter(|bit| self.0 & (1 << bit) != 0)
            .filter_map(|bit| table.mode_for_bit(bit))
            .collect()
    }

    /// Held display symbols, in PREFIX order (`o` held → `@`).
    pub fn symbols(&self, kinds: &ModeKinds) -> String {
        let table = kinds.read();
        (0u8..8)
            .filter(|bit| self.0 & (1 << bit) != 0)
            .filter_map(|bit| table.mode_for_bit(bit))
            .filter_map(|m| table.symbol_for_mode(m))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds() -> ModeKinds {
        ModeKinds::new("(ov)@+", "b,k,l,imnpst").unwrap()
    }

    #[test]
    fn set_unset_has() {
        let k = kinds();
        let mut m = MemberModes::default();
        assert!(m.is_empty());

        m.set_mode(&k, 'o');
        assert!(m.has_mode(&k, 'o'));
        assert!(!m.has_mode(&k, 'v'));

        m.set_mode(&k, 'v');
        assert_eq!(m.modes(&k), "ov");
        assert_eq!(m.symbols(&k), "@+");

        m.unset_mode(&k, 'o');
        assert!(!m.has_mode(&k, 'o'));
        assert!(m.has_mode(&k, 'v'));
    }

    #[test]
    fn unknown_letters_are_ignored() {
        let k = kinds();
        let mut m = MemberModes::default();
        m.set_mode(&k, 'x');
        assert!(m.is_empty());
        assert!(!m.has_mode(&k, 'x'));
    }
}
