//! # ircstate
//!
//! An IRC-network data layer: a concurrently-accessible, mutation-by-message
//! model of a live IRC network, plus a persisted, authenticated identity
//! store binding IRC hosts to stored users.
//!
//! Two coupled subsystems:
//!
//! - [`state::State`] — a per-network projection of the session: users,
//!   channels, bidirectional membership, channel modes under the
//!   server-defined PREFIX/CHANMODES grammar, and the tracked self. Each
//!   inbound [`event::Event`] produces a deterministic update and a
//!   [`state::StateUpdate`] diff of who was seen, unseen, renamed, or quit.
//! - [`store::Store`] — stored users with hierarchical access
//!   (global → network → channel), host-mask allowlists, bcrypt-hashed
//!   passwords, a bounded lookup cache, and an auth table binding
//!   `(network, host)` pairs to users permanently or under a sliding
//!   timeout. It consumes the state engine's diffs to expire stale auths.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use ircstate::event::{Event, NetworkInfo, names};
//! use ircstate::state::State;
//! use ircstate::store::{Store, StoredUser};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let info = Arc::new(NetworkInfo::default());
//! let state = State::new(Some(&info))?;
//! let store = Store::in_memory()?;
//!
//! // Events flow: parser -> state -> store.
//! let welcome = Event::new(
//!     names::RPL_WELCOME,
//!     "irc.example.org",
//!     ["bot", "Welcome bot!bot@example.com"],
//!     Arc::clone(&info),
//! );
//! store.update("example", &state.update(&welcome));
//!
//! // Identities persist across sessions.
//! let user = StoredUser::new_with_cost("alice", "secret", &["*!*@example.com"], 4)?;
//! store.save_user(&user)?;
//! let authed = store.auth_user_perma("example", "a!b@example.com", "alice", "secret")?;
//! assert_eq!(authed.username(), "alice");
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod casemap;
pub mod error;
pub mod event;
pub mod host;
pub mod modes;
pub mod state;
pub mod store;

pub use access::Access;
pub use error::{AuthError, ModeKindsError, StateError, StoreError};
pub use event::{Event, NetworkInfo};
pub use host::{Host, WildMask};
pub use modes::{ChannelModes, MemberModes, ModeDiff, ModeKinds};
pub use state::{State, StateUpdate};
pub use store::{Store, StoredChannel, StoredUser};
