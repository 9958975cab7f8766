//! Stored users: hashed credentials, mask allowlists, tiered access.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::access::Access;
use crate::casemap::irc_to_lower;
use crate::error::StoreError;
use crate::host::{Host, WildMask};

/// Generated password length for [`StoredUser::reset_password`].
const RESET_PASSWORD_LEN: usize = 10;

/// Alphanumeric charset for generated passwords: printable ASCII minus the
/// punctuation runs between digits and letters.
const RESET_CHARSET: &[u8] = b"0123456789\
    ABCDEFGHIJKLMNOPQRSTUVWXYZ\
    abcdefghijklmnopqrstuvwxyz";

/// A persisted user identity.
///
/// Hierarchical access walks global → network → channel; the tiers
/// accumulate (highest level, union of flags). The mask list is an
/// allowlist of host patterns; an empty list allows any host. The `data`
/// bag carries opaque values for external consumers and survives field
/// additions through the self-describing encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredUser {
    username: String,
    password_hash: String,
    #[serde(default)]
    masks: Vec<WildMask>,
    #[serde(default)]
    global: Option<Access>,
    #[serde(default)]
    networks: HashMap<String, Access>,
    #[serde(default)]
    channels: HashMap<String, HashMap<String, Access>>,
    /// Opaque per-user values owned by external consumers.
    #[serde(default)]
    pub data: HashMap<String, Vec<u8>>,
}

impl StoredUser {
    /// Create a user with a bcrypt-hashed password at the default cost.
    pub fn new(username: &str, password: &str, masks: &[&str]) -> Result<Self, StoreError> {
        Self::new_with_cost(username, password, masks, bcrypt::DEFAULT_COST)
    }

    /// Create a user hashing at an explicit bcrypt cost; tests pass the
    /// minimum to stay fast.
    pub fn new_with_cost(
        username: &str,
        password: &str,
        masks: &[&str],
        cost: u32,
    ) -> Result<Self, StoreError> {
        let mut user = StoredUser {
            username: irc_to_lower(username),
            password_hash: bcrypt::hash(password, cost)?,
            ..Default::default()
        };
        for mask in masks {
            user.add_mask(mask);
        }
        Ok(user)
    }

    /// The case-folded username; also the persistence key.
    pub fn username(&self) -> &str {
        &self.username
    }

    // --- Password ---

    /// Replace the password, hashing at the default cost.
    pub fn set_password(&mut self, password: &str) -> Result<(), StoreError> {
        self.set_password_with_cost(password, bcrypt::DEFAULT_COST)
    }

    /// Replace the password at an explicit cost.
    pub fn set_password_with_cost(&mut self, password: &str, cost: u32) -> Result<(), StoreError> {
        self.password_hash = bcrypt::hash(password, cost)?;
        Ok(())
    }

    /// True when bcrypt verifies the password against the stored hash.
    pub fn verify_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }

    /// Generate a fresh alphanumeric password, store its hash at the
    /// default cost, and return the plaintext once.
    pub fn reset_password(&mut self) -> Result<String, StoreError> {
        self.reset_password_with_cost(bcrypt::DEFAULT_COST)
    }

    /// [`reset_password`](Self::reset_password) at an explicit cost.
    pub fn reset_password_with_cost(&mut self, cost: u32) -> Result<String, StoreError> {
        let mut rng = rand::thread_rng();
        let password: String = (0..RESET_PASSWORD_LEN)
            .map(|_| RESET_CHARSET[rng.gen_range(0..RESET_CHARSET.len())] as char)
            .collect();
        self.set_password_with_cost(&password, cost)?;
        Ok(password)
    }

    // --- Masks ---

    /// Add a host mask (case-folded). Returns false for duplicates.
    pub fn add_mask(&mut self, mask: &str) -> bool {
        let mask = WildMask::new(irc_to_lower(mask));
        if self.masks.contains(&mask) {
            return false;
        }
        self.masks.push(mask);
        true
    }

    /// Remove a host mask. Returns whether it was present.
    pub fn delete_mask(&mut self, mask: &str) -> bool {
        let mask = irc_to_lower(mask);
        match self.masks.iter().position(|m| m.as_str() == mask) {
            Some(i) => {
                self.masks.remove(i);
                true
            }
            None => false,
        }
    }

    /// The stored masks.
    pub fn masks(&self) -> &[WildMask] {
        &self.masks
    }

    /// True when the mask list is empty (any host allowed) or any stored
    /// mask matches the host.
    pub fn has_mask(&self, host: &str) -> bool {
        if self.masks.is_empty() {
            return true;
        }
        let host = Host::new(host);
        self.masks.iter().any(|m| m.matches(&host))
    }

    // --- Global access ---

    /// Grant global level and flags in one call.
    pub fn grant_global(&mut self, level: u8, flags: &str) {
        let access = self.global.get_or_insert_with(Access::default);
        access.set_level(level);
        access.set_flags(flags);
    }

    /// Grant only a global level.
    pub fn grant_global_level(&mut self, level: u8) {
        self.global.get_or_insert_with(Access::default).set_level(level);
    }

    /// Grant only global flags.
    pub fn grant_global_flags(&mut self, flags: &str) {
        self.global.get_or_insert_with(Access::default).set_flags(flags);
    }

    /// Revoke the whole global tier.
    pub fn revoke_global(&mut self) {
        self.global = None;
    }

    /// Revoke the global level, keeping flags.
    pub fn revoke_global_level(&mut self) {
        if let Some(access) = self.global.as_mut() {
            access.clear_level();
        }
        self.drop_zero_global();
    }

    /// Revoke specific global flags.
    pub fn revoke_global_flags(&mut self, flags: &str) {
        if let Some(access) = self.global.as_mut() {
            access.clear_flags(flags);
        }
        self.drop_zero_global();
    }

    /// The global tier, when set.
    pub fn global(&self) -> Option<&Access> {
        self.global.as_ref()
    }

    fn drop_zero_global(&mut self) {
        if self.global.as_ref().is_some_and(Access::is_zero) {
            self.global = None;
        }
    }

    // --- Network access ---

    /// Grant network-tier level and flags.
    pub fn grant_network(&mut self, net: &str, level: u8, flags: &str) {
        let access = self.networks.entry(net.to_string()).or_default();
        access.set_level(level);
        access.set_flags(flags);
    }

    /// Grant only a network-tier level.
    pub fn grant_network_level(&mut self, net: &str, level: u8) {
        self.networks.entry(net.to_string()).or_default().set_level(level);
    }

    /// Grant only network-tier flags.
    pub fn grant_network_flags(&mut self, net: &str, flags: &str) {
        self.networks.entry(net.to_string()).or_default().set_flags(flags);
    }

    /// Revoke the whole network tier.
    pub fn revoke_network(&mut self, net: &str) {
        self.networks.remove(net);
    }

    /// Revoke the network-tier level, keeping flags.
    pub fn revoke_network_level(&mut self, net: &str) {
        if let Some(access) = self.networks.get_mut(net) {
            access.clear_level();
            if access.is_zero() {
                self.networks.remove(net);
            }
        }
    }

    /// Revoke specific network-tier flags.
    pub fn revoke_network_flags(&mut self, net: &str, flags: &str) {
        if let Some(access) = self.networks.get_mut(net) {
            access.clear_flags(flags);
            if access.is_zero() {
                self.networks.remove(net);
            }
        }
    }

    /// The network tier, when set.
    pub fn network(&self, net: &str) -> Option<&Access> {
        self.networks.get(net)
    }

    // --- Channel access ---

    /// Grant channel-tier level and flags.
    pub fn grant_channel(&mut self, net: &str, channel: &str, level: u8, flags: &str) {
        let access = self
            .channels
            .entry(net.to_string())
            .or_default()
            .entry(irc_to_lower(channel))
            .or_default();
        access.set_level(level);
        access.set_flags(flags);
    }

    /// Grant only a channel-tier level.
    pub fn grant_channel_level(&mut self, net: &str, channel: &str, level: u8) {
        self.channels
            .entry(net.to_string())
            .or_default()
            .entry(irc_to_lower(channel))
            .or_default()
            .set_level(level);
    }

    /// Grant only channel-tier flags.
    pub fn grant_channel_flags(&mut self, net: &str, channel: &str, flags: &str) {
        self.channels
            .entry(net.to_string())
            .or_default()
            .entry(irc_to_lower(channel))
            .or_default()
            .set_flags(flags);
    }

    /// Revoke the whole channel tier.
    pub fn revoke_channel(&mut self, net: &str, channel: &str) {
        if let Some(chans) = self.channels.get_mut(net) {
            chans.remove(&irc_to_lower(channel));
            if chans.is_empty() {
                self.channels.remove(net);
            }
        }
    }

    /// Revoke the channel-tier level, keeping flags.
    pub fn revoke_channel_level(&mut self, net: &str, channel: &str) {
        self.with_channel_access(net, channel, Access::clear_level);
    }

    /// Revoke specific channel-tier flags.
    pub fn revoke_channel_flags(&mut self, net: &str, channel: &str, flags: &str) {
        self.with_channel_access(net, channel, |a| a.clear_flags(flags));
    }

    /// The channel tier, when set.
    pub fn channel(&self, net: &str, channel: &str) -> Option<&Access> {
        self.channels.get(net)?.get(&irc_to_lower(channel))
    }

    fn with_channel_access(&mut self, net: &str, channel: &str, f: impl FnOnce(&mut Access)) {
        let chan_lc = irc_to_lower(channel);
        if let Some(chans) = self.channels.get_mut(net) {
            if let Some(access) = chans.get_mut(&chan_lc) {
                f(access);
                if access.is_zero() {
                    chans.remove(&chan_lc);
                }
            }
            if chans.is_empty() {
                self.channels.remove(net);
            }
        }
    }

    // --- Cascading queries ---

    /// Accumulate the tiers that apply at (net, channel).
    fn accumulated(&self, net: &str, channel: &str) -> Access {
        let mut acc = Access::default();
        if let Some(global) = &self.global {
            acc.merge(global);
        }
        if !net.is_empty()
            && let Some(network) = self.networks.get(net)
        {
            acc.merge(network);
        }
        if !net.is_empty()
            && !channel.is_empty()
            && let Some(chan) = self.channels.get(net).and_then(|c| c.get(&irc_to_lower(channel)))
        {
            acc.merge(chan);
        }
        acc
    }

    /// True when the accumulated global → network → channel access meets
    /// both the level threshold and any of the given flags.
    pub fn has(&self, net: &str, channel: &str, level: u8, flags: &str) -> bool {
        let acc = self.accumulated(net, channel);
        acc.has_level(level) && acc.has_any_flags(flags)
    }

    /// Level-only cascade test.
    pub fn has_level(&self, net: &str, channel: &str, level: u8) -> bool {
        self.accumulated(net, channel).has_level(level)
    }

    /// Flags-only cascade test.
    pub fn has_flags(&self, net: &str, channel: &str, flags: &str) -> bool {
        self.accumulated(net, channel).has_any_flags(flags)
    }

    // --- Serialization ---

    /// Encode for the KV store.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode a KV record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    fn user() -> StoredUser {
        StoredUser::new_with_cost("Alice", "secret", &["*!*@example.com"], TEST_COST).unwrap()
    }

    #[test]
    fn username_is_folded() {
        assert_eq!(user().username(), "alice");
    }

    #[test]
    fn password_verifies() {
        let u = user();
        assert!(u.verify_password("secret"));
        assert!(!u.verify_password("wrong"));
        assert!(!u.verify_password(""));
    }

    #[test]
    fn set_password_replaces() {
        let mut u = user();
        u.set_password_with_cost("newpass", TEST_COST).unwrap();
        assert!(u.verify_password("newpass"));
        assert!(!u.verify_password("secret"));
    }

    #[test]
    fn reset_password_returns_usable_plaintext() {
        let mut u = user();
        let plain = u.reset_password_with_cost(TEST_COST).unwrap();
        assert_eq!(plain.len(), 10);
        assert!(plain.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(u.verify_password(&plain));
        assert!(!u.verify_password("secret"));
    }

    #[test]
    fn mask_allowlist() {
        let mut u = user();
        assert!(u.has_mask("a!b@example.com"));
        assert!(!u.has_mask("x!y@other.org"));

        assert!(u.add_mask("Bob!*@*"));
        assert!(!u.add_mask("bob!*@*"));
        assert!(u.has_mask("bob!anything@anywhere"));

        assert!(u.delete_mask("BOB!*@*"));
        assert!(!u.delete_mask("bob!*@*"));
        assert!(!u.has_mask("bob!anything@anywhere"));
    }

    #[test]
    fn empty_mask_list_allows_everyone() {
        let u = StoredUser::new_with_cost("b", "p", &[], TEST_COST).unwrap();
        assert!(u.has_mask("anyone!at@all"));
    }

    #[test]
    fn tier_grant_and_revoke() {
        let mut u = user();
        u.grant_global(10, "a");
        u.grant_network("net", 20, "b");
        u.grant_channel("net", "#Chan", 30, "c");

        assert_eq!(u.global().unwrap().level, 10);
        assert_eq!(u.network("net").unwrap().level, 20);
        assert_eq!(u.channel("net", "#chan").unwrap().level, 30);

        u.revoke_channel("net", "#CHAN");
        assert!(u.channel("net", "#chan").is_none());
        u.revoke_network("net");
        assert!(u.network("net").is_none());
        u.revoke_global();
        assert!(u.global().is_none());
    }

    #[test]
    fn partial_revokes_drop_empty_tiers() {
        let mut u = user();
        u.grant_global_level(10);
        u.revoke_global_level();
        assert!(u.global().is_none());

        u.grant_network_flags("net", "ab");
        u.revoke_network_flags("net", "ab");
        assert!(u.network("net").is_none());

        u.grant_channel_flags("net", "#c", "x");
        u.revoke_channel_flags("net", "#c", "x");
        assert!(u.channel("net", "#c").is_none());
    }

    #[test]
    fn cascade_accumulates_tiers() {
        let mut u = user();
        u.grant_global(10, "a");
        u.grant_network("net", 20, "b");
        u.grant_channel("net", "#chan", 5, "c");

        // Level comes from the strongest tier.
        assert!(u.has_level("net", "#chan", 20));
        assert!(!u.has_level("net", "#chan", 21));
        // A flag from any tier satisfies.
        assert!(u.has_flags("net", "#chan", "a"));
        assert!(u.has_flags("net", "#chan", "c"));
        assert!(!u.has_flags("net", "#chan", "z"));
        // Both criteria at once.
        assert!(u.has("net", "#chan", 15, "c"));
        assert!(!u.has("net", "#chan", 25, "c"));
        assert!(!u.has("net", "#chan", 15, "z"));

        // Unrelated net and channel see only the global tier.
        assert!(u.has_level("other", "", 10));
        assert!(!u.has_level("other", "", 11));
        assert!(!u.has_flags("other", "#chan", "b"));
    }

    #[test]
    fn serialization_round_trips() {
        let mut u = user();
        u.grant_global(100, "abc");
        u.grant_channel("net", "#chan", 5, "x");
        u.data.insert("note".to_string(), b"payload".to_vec());

        let bytes = u.to_bytes().unwrap();
        let back = StoredUser::from_bytes(&bytes).unwrap();
        assert_eq!(u, back);
        assert!(back.verify_password("secret"));
    }

    #[test]
    fn corrupt_record_is_a_serialization_error() {
        let err = StoredUser::from_bytes(b"not json").unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
