//! Channel and user mode machinery.
//!
//! IRC servers define their mode grammar at runtime through the ISUPPORT
//! PREFIX and CHANMODES tokens. [`ModeKinds`] holds that parsed grammar;
//! [`ChannelModes`] is the set of modes asserted on one channel and knows
//! how to apply complex modestrings against the grammar; [`ModeDiff`] is a
//! minimized presentation of an intended change; [`MemberModes`] is the
//! per-membership prefix-mode bitmask.

mod channel;
mod diff;
mod kinds;
mod member;

pub use channel::{ChannelModes, MemberModeChange};
pub use diff::ModeDiff;
pub use kinds::{MAX_USER_PREFIXES, ModeKind, ModeKinds};
pub use member::MemberModes;
