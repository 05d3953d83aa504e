//! Per-browser stateless key/value store, round-tripped via a signed cookie.

use std::collections::HashMap;

use chrono::{NaiveDateTime, Timelike, Utc};
use rand::distributions::{Alphanumeric, DistString};

/// Length of the per-session authenticity token.
pub const AUTHENTICITY_TOKEN_LENGTH: usize = 16;

/// A request-scoped session. Reconstructed from the session cookie on every
/// request, or created fresh when the cookie is missing or untrusted.
///
/// Mutations flip the `changed` flag; the dispatcher only re-serializes the
/// session cookie when the flag is set.
#[derive(Debug, Clone)]
pub struct Session {
    values: HashMap<String, String>,
    authenticity_token: String,
    expires: NaiveDateTime,
    changed: bool,
}

impl Session {
    /// Creates a fresh, empty session expiring `lifetime_secs` from now,
    /// with a newly generated authenticity token.
    pub(crate) fn create(lifetime_secs: i64) -> Self {
        let token = Alphanumeric.sample_string(&mut rand::thread_rng(), AUTHENTICITY_TOKEN_LENGTH);
        Self {
            values: HashMap::new(),
            authenticity_token: token,
            expires: expiry_in(lifetime_secs),
            changed: false,
        }
    }

    /// Rebuilds a session from a verified cookie.
    pub(crate) fn restore(
        values: HashMap<String, String>,
        authenticity_token: String,
        expires: NaiveDateTime,
    ) -> Self {
        Self { values, authenticity_token, expires, changed: false }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.changed = true;
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.changed = true;
        self.values.remove(key);
    }

    pub fn clear(&mut self) {
        self.changed = true;
        self.values.clear();
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    pub fn authenticity_token(&self) -> &str {
        &self.authenticity_token
    }

    pub fn expires(&self) -> NaiveDateTime {
        self.expires
    }

    pub fn set_expires(&mut self, expires: NaiveDateTime) {
        self.changed = true;
        self.expires = expires;
    }

    pub fn has_changes(&self) -> bool {
        self.changed
    }
}

/// Expiry timestamps are canonical local-date-time text in cookies; the
/// sub-second part is truncated at creation so that formatting and parsing
/// round-trip exactly.
pub(crate) fn expiry_in(lifetime_secs: i64) -> NaiveDateTime {
    let expires = Utc::now().naive_utc() + chrono::Duration::seconds(lifetime_secs);
    expires.with_nanosecond(0).unwrap_or(expires)
}
