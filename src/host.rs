//! Host identity strings and wildcard masks.
//!
//! A [`Host`] is an IRC identity of the form `nick!user@hostname`. Servers
//! are free to send partial forms, so the projections are lenient: anything
//! that does not split cleanly yields only a nick. A [`WildMask`] is a host
//! pattern whose components may contain `*` and `?`; matching is
//! case-insensitive under the RFC 1459 mapping.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::casemap::{irc_eq, irc_lower_char};

/// An IRC identity string `nick!user@hostname`.
///
/// The raw string is kept verbatim; the three projections are computed on
/// demand. Unparseable forms (missing or misplaced delimiters) project to a
/// nick only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Host(String);

impl Host {
    /// Wrap a raw host string.
    pub fn new(raw: impl Into<String>) -> Self {
        Host(raw.into())
    }

    /// The raw host string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the raw string is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The nick portion: everything up to the first `!` or `@`, or the
    /// whole string when neither occurs.
    pub fn nick(&self) -> &str {
        split_host(&self.0).0
    }

    /// The user portion between `!` and `@`, or `""` when the form does not
    /// split cleanly.
    pub fn username(&self) -> &str {
        split_host(&self.0).1
    }

    /// The hostname portion after `@`, or `""` when the form does not split
    /// cleanly.
    pub fn hostname(&self) -> &str {
        split_host(&self.0).2
    }

    /// Case-insensitive nick comparison under RFC 1459 casemapping.
    pub fn nick_eq(&self, other: &Host) -> bool {
        irc_eq(self.nick(), other.nick())
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Host {
    fn from(s: &str) -> Self {
        Host(s.to_string())
    }
}

impl From<String> for Host {
    fn from(s: String) -> Self {
        Host(s)
    }
}

impl AsRef<str> for Host {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Split `nick!user@host` into its three parts.
///
/// Scans for `!` then `@`. When `@` precedes `!`, or either delimiter is
/// missing, the result is `(prefix, "", "")` where the prefix is the
/// shortest segment up to the first delimiter.
fn split_host(raw: &str) -> (&str, &str, &str) {
    let bang = raw.find('!');
    let at = raw.find('@');
    match (bang, at) {
        (Some(b), Some(a)) if b < a => (&raw[..b], &raw[b + 1..a], &raw[a + 1..]),
        // Misplaced or missing delimiters: nick is the shortest prefix.
        (Some(b), Some(a)) => (&raw[..b.min(a)], "", ""),
        (Some(b), None) => (&raw[..b], "", ""),
        (None, Some(a)) => (&raw[..a], "", ""),
        (None, None) => (raw, "", ""),
    }
}

/// A host pattern whose components may contain `*` (any run, possibly
/// empty) and `?` (exactly one character).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WildMask(String);

impl WildMask {
    /// Wrap a raw mask string.
    pub fn new(raw: impl Into<String>) -> Self {
        WildMask(raw.into())
    }

    /// The raw mask string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Nick portion of the pattern.
    pub fn nick(&self) -> &str {
        split_host(&self.0).0
    }

    /// User portion of the pattern.
    pub fn username(&self) -> &str {
        split_host(&self.0).1
    }

    /// Hostname portion of the pattern.
    pub fn hostname(&self) -> &str {
        split_host(&self.0).2
    }

    /// Match a host against this pattern, case-insensitively.
    pub fn matches(&self, host: &Host) -> bool {
        wildcard_match(&self.0, host.as_str())
    }

    /// Match a raw string against this pattern.
    pub fn matches_str(&self, host: &str) -> bool {
        wildcard_match(&self.0, host)
    }
}

impl fmt::Display for WildMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WildMask {
    fn from(s: &str) -> Self {
        WildMask(s.to_string())
    }
}

impl From<String> for WildMask {
    fn from(s: String) -> Self {
        WildMask(s)
    }
}

/// Glob match with IRC case-insensitivity.
///
/// `*` matches zero or more characters, `?` exactly one. Worst case is
/// O(|pattern| * |text|) with standard backtracking tie-breaks.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(irc_lower_char).collect();
    let text: Vec<char> = text.chars().map(irc_lower_char).collect();

    let mut p = 0;
    let mut t = 0;
    let mut star_p = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            // Remember the star so a later mismatch can widen its run.
            star_p = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(sp) = star_p {
            p = sp + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_full_host() {
        let h = Host::new("nick!user@irc.example.org");
        assert_eq!(h.nick(), "nick");
        assert_eq!(h.username(), "user");
        assert_eq!(h.hostname(), "irc.example.org");
    }

    #[test]
    fn unparseable_forms_yield_nick_only() {
        let h = Host::new("server.example.org");
        assert_eq!(h.nick(), "server.example.org");
        assert_eq!(h.username(), "");
        assert_eq!(h.hostname(), "");

        // Missing one delimiter.
        let h = Host::new("nick!user");
        assert_eq!(h.nick(), "nick");
        assert_eq!(h.username(), "");
        let h = Host::new("nick@host");
        assert_eq!(h.nick(), "nick");
        assert_eq!(h.hostname(), "");

        // @ before ! takes the shortest prefix.
        let h = Host::new("ni@ck!user");
        assert_eq!(h.nick(), "ni");
        assert_eq!(h.username(), "");
        assert_eq!(h.hostname(), "");
    }

    #[test]
    fn nick_equality_is_case_folded() {
        let a = Host::new("Nick[1]!u@h");
        let b = Host::new("nick{1}!other@elsewhere");
        assert!(a.nick_eq(&b));
        assert!(!a.nick_eq(&Host::new("nick2!u@h")));
    }

    #[test]
    fn wildcard_basics() {
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("*", "nick!user@host"));
        assert!(wildcard_match("ni?k!*@*", "nick!user@host"));
        assert!(!wildcard_match("ni?k!*@*", "nik!user@host"));
        assert!(wildcard_match("*!*@*.example.com", "a!b@gw.example.com"));
        assert!(!wildcard_match("*!*@*.example.com", "a!b@example.org"));
        assert!(wildcard_match("*a*b*", "xxaxxbxx"));
        assert!(!wildcard_match("", "x"));
        assert!(wildcard_match("", ""));
    }

    #[test]
    fn wildcard_is_case_insensitive() {
        assert!(wildcard_match("NICK!*@*", "nick!u@h"));
        assert!(wildcard_match("*[away]*", "Nick{AWAY}!u@h"));
    }

    #[test]
    fn mask_matches_host() {
        let mask = WildMask::new("*!*@example.com");
        assert!(mask.matches(&Host::new("a!b@example.com")));
        assert!(!mask.matches(&Host::new("a!b@other.org")));
        assert_eq!(mask.nick(), "*");
        assert_eq!(mask.username(), "*");
        assert_eq!(mask.hostname(), "example.com");
    }
}
