//! The persisted identity store.
//!
//! A [`Store`] owns the embedded KV database, a bounded read cache, and
//! the authentication table binding `(network, host)` pairs to stored
//! users, either permanently or under a sliding timeout. It consumes the
//! state engine's [`StateUpdate`](crate::state::StateUpdate) diffs to
//! expire temporary auths when users become unseen, renamed, or quit.

mod channel;
mod db;
mod user;

pub use channel::StoredChannel;
pub use user::StoredUser;

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::casemap::irc_to_lower;
use crate::error::{AuthError, StoreError};
use crate::state::StateUpdate;

use db::Kv;

/// Default read-cache bound.
const DEFAULT_MAX_CACHE: usize = 1000;

/// Default sliding-timeout for temporary auths, in minutes.
const DEFAULT_AUTH_TIMEOUT_MINS: i64 = 5;

/// Everything behind the store's mutex.
struct StoreInner {
    cache: HashMap<String, StoredUser>,
    authed: HashMap<String, String>,
    timeouts: HashMap<String, DateTime<Utc>>,
    max_cache: usize,
    auth_timeout: Duration,
}

/// The identity store: KV persistence, cache, and auth table.
///
/// One mutex serializes every operation; the KV engine may block on disk
/// I/O under it, so latency-sensitive callers should prefer
/// [`Store::in_memory`].
pub struct Store {
    db: Kv,
    inner: Mutex<StoreInner>,
}

/// Auth-table key for a (network, host) pair, NUL-joined so the parts
/// cannot collide.
fn auth_key(net_id: &str, host: &str) -> String {
    format!("{}\0{}", net_id, host)
}

impl Store {
    /// Open (or create) an on-disk store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::with_kv(Kv::open(path)?))
    }

    /// Create a store backed by memory only.
    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::with_kv(Kv::in_memory()?))
    }

    fn with_kv(db: Kv) -> Self {
        Store {
            db,
            inner: Mutex::new(StoreInner {
                cache: HashMap::new(),
                authed: HashMap::new(),
                timeouts: HashMap::new(),
                max_cache: DEFAULT_MAX_CACHE,
                auth_timeout: Duration::minutes(DEFAULT_AUTH_TIMEOUT_MINS),
            }),
        }
    }

    /// Bound the read cache. The cache is dumped wholesale when an insert
    /// would exceed the bound.
    pub fn set_max_cache(&self, max: usize) {
        self.inner.lock().max_cache = max;
    }

    /// Change the sliding timeout applied to temporary auths.
    pub fn set_auth_timeout(&self, timeout: Duration) {
        self.inner.lock().auth_timeout = timeout;
    }

    /// True when any user has ever been saved.
    pub fn is_initialized(&self) -> Result<bool, StoreError> {
        self.db.is_initialized()
    }

    // --- Users ---

    /// Persist a user and refresh its cache entry.
    pub fn save_user(&self, user: &StoredUser) -> Result<(), StoreError> {
        let bytes = user.to_bytes()?;
        let mut inner = self.inner.lock();
        self.db.put_user(user.username(), &bytes)?;
        if !self.db.is_initialized()? {
            self.db.set_initialized()?;
        }
        Self::cache_insert(&mut inner, user.clone());
        Ok(())
    }

    /// Fetch a user by name: cache first, then the KV. Missing users are
    /// `Ok(None)`; a corrupt record is an error.
    pub fn find_user(&self, username: &str) -> Result<Option<StoredUser>, StoreError> {
        let name_lc = irc_to_lower(username);
        let mut inner = self.inner.lock();
        self.find_user_locked(&mut inner, &name_lc)
    }

    /// Delete a user, dropping their cache entry and any auth bindings.
    /// Returns whether the record existed.
    pub fn remove_user(&self, username: &str) -> Result<bool, StoreError> {
        let name_lc = irc_to_lower(username);
        let mut inner = self.inner.lock();
        inner.cache.remove(&name_lc);
        Self::drop_auths_for(&mut inner, &name_lc);
        self.db.delete_user(&name_lc)
    }

    fn find_user_locked(
        &self,
        inner: &mut StoreInner,
        name_lc: &str,
    ) -> Result<Option<StoredUser>, StoreError> {
        if let Some(user) = inner.cache.get(name_lc) {
            return Ok(Some(user.clone()));
        }
        match self.db.get_user(name_lc)? {
            Some(bytes) => {
                let user = StoredUser::from_bytes(&bytes)?;
                Self::cache_insert(inner, user.clone());
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    fn cache_insert(inner: &mut StoreInner, user: StoredUser) {
        if !inner.cache.contains_key(user.username()) && inner.cache.len() + 1 > inner.max_cache {
            debug!(entries = inner.cache.len(), "dumping full user cache");
            inner.cache.clear();
        }
        inner.cache.insert(user.username().to_string(), user);
    }

    fn drop_auths_for(inner: &mut StoreInner, name_lc: &str) {
        let keys: Vec<String> = inner
            .authed
            .iter()
            .filter(|&(_, bound)| bound == name_lc)
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            inner.authed.remove(&key);
            inner.timeouts.remove(&key);
        }
    }

    // --- Authentication ---

    /// Authenticate a host as a stored user, binding permanently.
    pub fn auth_user_perma(
        &self,
        net_id: &str,
        host: &str,
        username: &str,
        password: &str,
    ) -> Result<StoredUser, AuthError> {
        self.auth_user(net_id, host, username, password, false)
    }

    /// Authenticate a host as a stored user under the sliding timeout.
    pub fn auth_user_tmp(
        &self,
        net_id: &str,
        host: &str,
        username: &str,
        password: &str,
    ) -> Result<StoredUser, AuthError> {
        self.auth_user(net_id, host, username, password, true)
    }

    /// The authentication protocol: an already-bound host short-circuits;
    /// otherwise the user must exist, the host must pass the mask
    /// allowlist, and the password must verify.
    pub fn auth_user(
        &self,
        net_id: &str,
        host: &str,
        username: &str,
        password: &str,
        temp: bool,
    ) -> Result<StoredUser, AuthError> {
        let key = auth_key(net_id, host);
        let name_lc = irc_to_lower(username);
        let mut inner = self.inner.lock();

        // Re-authentication is idempotent.
        if let Some(bound) = inner.authed.get(&key).cloned() {
            return self
                .find_user_locked(&mut inner, &bound)
                .map_err(AuthError::Store)?
                .ok_or(AuthError::UserNotFound(bound));
        }

        let user = self
            .find_user_locked(&mut inner, &name_lc)
            .map_err(AuthError::Store)?
            .ok_or_else(|| AuthError::UserNotFound(name_lc.clone()))?;

        if !user.has_mask(host) {
            return Err(AuthError::HostNotFound {
                host: host.to_string(),
                username: name_lc,
            });
        }
        if !user.verify_password(password) {
            return Err(AuthError::BadPassword(name_lc));
        }

        inner.authed.insert(key.clone(), name_lc.clone());
        if temp {
            let deadline = Utc::now() + inner.auth_timeout;
            inner.timeouts.insert(key, deadline);
        }
        debug!(net = net_id, host, user = %name_lc, temp, "authenticated");
        Ok(user)
    }

    /// The user a host is currently authenticated as, if any.
    pub fn authed_user(&self, net_id: &str, host: &str) -> Result<Option<StoredUser>, StoreError> {
        let key = auth_key(net_id, host);
        let mut inner = self.inner.lock();
        let Some(bound) = inner.authed.get(&key).cloned() else {
            return Ok(None);
        };
        self.find_user_locked(&mut inner, &bound)
    }

    /// Drop the auth binding for one host.
    pub fn logout(&self, net_id: &str, host: &str) {
        let key = auth_key(net_id, host);
        let mut inner = self.inner.lock();
        inner.authed.remove(&key);
        inner.timeouts.remove(&key);
    }

    /// Drop every auth binding for a username, across networks.
    pub fn logout_by_username(&self, username: &str) {
        let name_lc = irc_to_lower(username);
        let mut inner = self.inner.lock();
        Self::drop_auths_for(&mut inner, &name_lc);
    }

    /// Integrate a state diff: presence clears timeouts, absence starts
    /// them, renames rekey bindings, quits drop them; then expired
    /// timeouts are reaped.
    pub fn update(&self, net_id: &str, update: &StateUpdate) {
        let mut inner = self.inner.lock();

        for host in &update.seen {
            inner.timeouts.remove(&auth_key(net_id, host));
        }

        for host in &update.unseen {
            let key = auth_key(net_id, host);
            if inner.authed.contains_key(&key) && !inner.timeouts.contains_key(&key) {
                let deadline = Utc::now() + inner.auth_timeout;
                inner.timeouts.insert(key, deadline);
            }
        }

        if let Some((old, new)) = &update.nick {
            let old_key = auth_key(net_id, old);
            inner.timeouts.remove(&old_key);
            if let Some(bound) = inner.authed.remove(&old_key) {
                inner.authed.insert(auth_key(net_id, new), bound);
            }
        }

        if let Some(quit) = &update.quit {
            let key = auth_key(net_id, quit);
            inner.authed.remove(&key);
            inner.timeouts.remove(&key);
        }

        Self::reap(&mut inner);
    }

    fn reap(inner: &mut StoreInner) {
        let now = Utc::now();
        let expired: Vec<String> = inner
            .timeouts
            .iter()
            .filter(|&(_, deadline)| *deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        if !expired.is_empty() {
            debug!(count = expired.len(), "reaping expired auths");
        }
        for key in expired {
            inner.timeouts.remove(&key);
            inner.authed.remove(&key);
        }
    }

    // --- Bulk iteration ---

    /// Users holding non-zero global access.
    pub fn global_users(&self) -> Result<Vec<StoredUser>, StoreError> {
        self.filter_users(|u| u.global().is_some_and(|a| !a.is_zero()))
    }

    /// Users holding non-zero access on a network.
    pub fn network_users(&self, net_id: &str) -> Result<Vec<StoredUser>, StoreError> {
        self.filter_users(|u| u.network(net_id).is_some_and(|a| !a.is_zero()))
    }

    /// Users holding non-zero access on a channel.
    pub fn chan_users(&self, net_id: &str, channel: &str) -> Result<Vec<StoredUser>, StoreError> {
        self.filter_users(|u| u.channel(net_id, channel).is_some_and(|a| !a.is_zero()))
    }

    /// Walk every stored user; unreadable records are logged and skipped.
    fn filter_users(&self, pred: impl Fn(&StoredUser) -> bool) -> Result<Vec<StoredUser>, StoreError> {
        let _guard = self.inner.lock();
        let mut out = Vec::new();
        for (key, bytes) in self.db.scan_users()? {
            match StoredUser::from_bytes(&bytes) {
                Ok(user) => {
                    if pred(&user) {
                        out.push(user);
                    }
                }
                Err(e) => warn!(user = %key, error = %e, "skipping unreadable stored user"),
            }
        }
        Ok(out)
    }

    // --- Channels ---

    /// Persist a channel record, overwriting any previous one.
    pub fn save_channel(&self, channel: &StoredChannel) -> Result<(), StoreError> {
        let bytes = channel.to_bytes()?;
        let _guard = self.inner.lock();
        self.db.put_channel(&channel.key(), &bytes)
    }

    /// Fetch a channel record.
    pub fn find_channel(
        &self,
        net_id: &str,
        name: &str,
    ) -> Result<Option<StoredChannel>, StoreError> {
        let _guard = self.inner.lock();
        match self.db.get_channel(&channel::make_key(net_id, name))? {
            Some(bytes) => Ok(Some(StoredChannel::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete a channel record. Returns whether it existed.
    pub fn remove_channel(&self, net_id: &str, name: &str) -> Result<bool, StoreError> {
        let _guard = self.inner.lock();
        self.db.delete_channel(&channel::make_key(net_id, name))
    }

    /// Every stored channel on one network; unreadable records are logged
    /// and skipped.
    pub fn channels(&self, net_id: &str) -> Result<Vec<StoredChannel>, StoreError> {
        Ok(self
            .all_channels()?
            .into_iter()
            .filter(|c| c.net_id() == net_id)
            .collect())
    }

    /// Every stored channel across networks.
    pub fn all_channels(&self) -> Result<Vec<StoredChannel>, StoreError> {
        let _guard = self.inner.lock();
        let mut out = Vec::new();
        for (key, bytes) in self.db.scan_channels()? {
            match StoredChannel::from_bytes(&bytes) {
                Ok(channel) => out.push(channel),
                Err(e) => warn!(channel = %key, error = %e, "skipping unreadable stored channel"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    fn store() -> Store {
        Store::in_memory().unwrap()
    }

    fn alice() -> StoredUser {
        StoredUser::new_with_cost("alice", "secret", &["*!*@example.com"], TEST_COST).unwrap()
    }

    #[test]
    fn save_find_remove_user() {
        let st = store();
        assert!(!st.is_initialized().unwrap());
        assert!(st.find_user("alice").unwrap().is_none());

        st.save_user(&alice()).unwrap();
        assert!(st.is_initialized().unwrap());
        let found = st.find_user("ALICE").unwrap().unwrap();
        assert_eq!(found.username(), "alice");

        assert!(st.remove_user("alice").unwrap());
        assert!(!st.remove_user("alice").unwrap());
        assert!(st.find_user("alice").unwrap().is_none());
    }

    #[test]
    fn cache_returns_clones() {
        let st = store();
        st.save_user(&alice()).unwrap();

        let mut first = st.find_user("alice").unwrap().unwrap();
        first.data.insert("k".to_string(), b"mutated".to_vec());

        // The cached copy is unaffected by caller mutation.
        let second = st.find_user("alice").unwrap().unwrap();
        assert!(second.data.is_empty());
    }

    #[test]
    fn cache_dumps_on_overflow() {
        let st = store();
        st.set_max_cache(2);
        for name in ["a", "b", "c", "d"] {
            let u = StoredUser::new_with_cost(name, "p", &[], TEST_COST).unwrap();
            st.save_user(&u).unwrap();
        }
        // Everything is still reachable through the KV.
        for name in ["a", "b", "c", "d"] {
            assert!(st.find_user(name).unwrap().is_some(), "{} lost", name);
        }
    }

    #[test]
    fn auth_success_and_idempotence() {
        let st = store();
        st.save_user(&alice()).unwrap();

        let user = st
            .auth_user_perma("net", "a!b@example.com", "alice", "secret")
            .unwrap();
        assert_eq!(user.username(), "alice");

        let authed = st.authed_user("net", "a!b@example.com").unwrap().unwrap();
        assert_eq!(authed.username(), "alice");

        // Re-authentication returns the bound user even with a bad password.
        let again = st
            .auth_user_perma("net", "a!b@example.com", "alice", "wrong")
            .unwrap();
        assert_eq!(again.username(), "alice");
    }

    #[test]
    fn auth_failures() {
        let st = store();
        st.save_user(&alice()).unwrap();

        assert!(matches!(
            st.auth_user_perma("net", "a!b@example.com", "nobody", "secret"),
            Err(AuthError::UserNotFound(_))
        ));
        assert!(matches!(
            st.auth_user_perma("net", "x!y@other.org", "alice", "secret"),
            Err(AuthError::HostNotFound { .. })
        ));
        assert!(matches!(
            st.auth_user_perma("net", "a!b@example.com", "alice", "wrong"),
            Err(AuthError::BadPassword(_))
        ));
        assert!(st.authed_user("net", "a!b@example.com").unwrap().is_none());
    }

    #[test]
    fn logout_paths() {
        let st = store();
        st.save_user(&alice()).unwrap();

        st.auth_user_perma("net", "a!b@example.com", "alice", "secret")
            .unwrap();
        st.logout("net", "a!b@example.com");
        assert!(st.authed_user("net", "a!b@example.com").unwrap().is_none());

        st.auth_user_perma("net1", "a!b@example.com", "alice", "secret")
            .unwrap();
        st.auth_user_perma("net2", "a!b@example.com", "alice", "secret")
            .unwrap();
        st.logout_by_username("ALICE");
        assert!(st.authed_user("net1", "a!b@example.com").unwrap().is_none());
        assert!(st.authed_user("net2", "a!b@example.com").unwrap().is_none());
    }

    #[test]
    fn remove_user_logs_out() {
        let st = store();
        st.save_user(&alice()).unwrap();
        st.auth_user_perma("net", "a!b@example.com", "alice", "secret")
            .unwrap();
        st.remove_user("alice").unwrap();
        assert!(st.authed_user("net", "a!b@example.com").unwrap().is_none());
    }

    #[test]
    fn tmp_auth_expires_on_reap() {
        let st = store();
        st.save_user(&alice()).unwrap();
        st.set_auth_timeout(Duration::seconds(-1));

        st.auth_user_tmp("net", "a!b@example.com", "alice", "secret")
            .unwrap();
        // Any later state diff triggers the reap.
        st.update("net", &StateUpdate::default());
        assert!(st.authed_user("net", "a!b@example.com").unwrap().is_none());
    }

    #[test]
    fn perma_auth_survives_reap() {
        let st = store();
        st.save_user(&alice()).unwrap();
        st.set_auth_timeout(Duration::seconds(-1));

        st.auth_user_perma("net", "a!b@example.com", "alice", "secret")
            .unwrap();
        st.update("net", &StateUpdate::default());
        assert!(st.authed_user("net", "a!b@example.com").unwrap().is_some());
    }

    #[test]
    fn seen_clears_timeout() {
        let st = store();
        st.save_user(&alice()).unwrap();
        st.set_auth_timeout(Duration::seconds(-1));
        st.auth_user_tmp("net", "a!b@example.com", "alice", "secret")
            .unwrap();

        // Seen first: the timeout is deleted before the reap runs.
        let up = StateUpdate {
            seen: vec!["a!b@example.com".to_string()],
            ..Default::default()
        };
        st.update("net", &up);
        assert!(st.authed_user("net", "a!b@example.com").unwrap().is_some());
    }

    #[test]
    fn unseen_starts_timeout_for_bound_hosts() {
        let st = store();
        st.save_user(&alice()).unwrap();
        st.set_auth_timeout(Duration::seconds(-1));
        st.auth_user_perma("net", "a!b@example.com", "alice", "secret")
            .unwrap();

        let up = StateUpdate {
            unseen: vec!["a!b@example.com".to_string()],
            ..Default::default()
        };
        st.update("net", &up);
        // The timeout started already-expired, so the same call reaped it.
        assert!(st.authed_user("net", "a!b@example.com").unwrap().is_none());
    }

    #[test]
    fn nick_rekeys_binding() {
        let st = store();
        st.save_user(&alice()).unwrap();
        st.auth_user_perma("net", "old!b@example.com", "alice", "secret")
            .unwrap();

        let up = StateUpdate {
            nick: Some((
                "old!b@example.com".to_string(),
                "new!b@example.com".to_string(),
            )),
            ..Default::default()
        };
        st.update("net", &up);
        assert!(st.authed_user("net", "old!b@example.com").unwrap().is_none());
        assert!(st.authed_user("net", "new!b@example.com").unwrap().is_some());
    }

    #[test]
    fn quit_drops_binding() {
        let st = store();
        st.save_user(&alice()).unwrap();
        st.auth_user_perma("net", "a!b@example.com", "alice", "secret")
            .unwrap();

        let up = StateUpdate {
            quit: Some("a!b@example.com".to_string()),
            ..Default::default()
        };
        st.update("net", &up);
        assert!(st.authed_user("net", "a!b@example.com").unwrap().is_none());
    }

    #[test]
    fn tier_filtered_iteration() {
        let st = store();
        let mut g = StoredUser::new_with_cost("globaluser", "p", &[], TEST_COST).unwrap();
        g.grant_global(100, "");
        let mut n = StoredUser::new_with_cost("netuser", "p", &[], TEST_COST).unwrap();
        n.grant_network("net", 50, "");
        let mut c = StoredUser::new_with_cost("chanuser", "p", &[], TEST_COST).unwrap();
        c.grant_channel("net", "#chan", 10, "");
        let plain = StoredUser::new_with_cost("plain", "p", &[], TEST_COST).unwrap();
        for u in [&g, &n, &c, &plain] {
            st.save_user(u).unwrap();
        }

        let globals = st.global_users().unwrap();
        assert_eq!(globals.len(), 1);
        assert_eq!(globals[0].username(), "globaluser");

        let nets = st.network_users("net").unwrap();
        assert_eq!(nets.len(), 1);
        assert_eq!(nets[0].username(), "netuser");

        let chans = st.chan_users("net", "#CHAN").unwrap();
        assert_eq!(chans.len(), 1);
        assert_eq!(chans[0].username(), "chanuser");

        assert!(st.network_users("elsewhere").unwrap().is_empty());
    }

    #[test]
    fn channel_crud() {
        let st = store();
        assert!(st.find_channel("net", "#chan").unwrap().is_none());

        let mut ch = StoredChannel::new("net", "#Chan");
        ch.data.insert("motd".to_string(), b"hi".to_vec());
        st.save_channel(&ch).unwrap();

        let found = st.find_channel("net", "#CHAN").unwrap().unwrap();
        assert_eq!(found.name(), "#Chan");
        assert_eq!(found.data.get("motd").map(Vec::as_slice), Some(&b"hi"[..]));

        st.save_channel(&StoredChannel::new("net", "#other")).unwrap();
        st.save_channel(&StoredChannel::new("net2", "#chan")).unwrap();
        assert_eq!(st.channels("net").unwrap().len(), 2);
        assert_eq!(st.all_channels().unwrap().len(), 3);

        assert!(st.remove_channel("net", "#chan").unwrap());
        assert!(!st.remove_channel("net", "#chan").unwrap());
        assert_eq!(st.channels("net").unwrap().len(), 1);
    }
}
