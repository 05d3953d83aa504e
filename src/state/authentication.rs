//! Stateless identity claim, round-tripped via a signed cookie.

use chrono::NaiveDateTime;
use libreauth::pass::HashBuilder;
use tracing::warn;

use super::session::expiry_in;

/// The authentication state of one request.
///
/// Reconstructed from the authentication cookie, mutated through explicit
/// [`login`](Authentication::login)/[`logout`](Authentication::logout) calls
/// during handler execution, and persisted again only while it holds an
/// authenticated user. A logout persists a cookie-deletion instruction
/// instead.
#[derive(Debug, Clone)]
pub struct Authentication {
    authenticated_user: Option<String>,
    expires: NaiveDateTime,
    remember: bool,
    logged_out: bool,
}

impl Authentication {
    /// Creates an anonymous authentication expiring `lifetime_secs` from now.
    pub(crate) fn create(lifetime_secs: i64) -> Self {
        Self {
            authenticated_user: None,
            expires: expiry_in(lifetime_secs),
            remember: false,
            logged_out: false,
        }
    }

    /// Rebuilds an authentication from a verified cookie.
    pub(crate) fn restore(authenticated_user: String, expires: NaiveDateTime) -> Self {
        Self {
            authenticated_user: Some(authenticated_user),
            expires,
            remember: false,
            logged_out: false,
        }
    }

    /// Logs in the given user. Blank user names are ignored.
    pub fn login(&mut self, username: &str, remember: bool) {
        if username.trim().is_empty() {
            return;
        }
        self.authenticated_user = Some(username.to_string());
        self.remember = remember;
    }

    /// Marks the currently authenticated user as logged out. The cookie is
    /// discarded when the response is written.
    pub fn logout(&mut self) {
        self.logged_out = true;
    }

    pub fn has_authenticated_user(&self) -> bool {
        self.authenticated_user.as_deref().is_some_and(|user| !user.trim().is_empty())
    }

    pub fn authenticated_user(&self) -> Option<&str> {
        self.authenticated_user.as_deref()
    }

    pub fn is_authenticated(&self, username: &str) -> bool {
        self.authenticated_user.as_deref() == Some(username)
    }

    pub fn is_logout(&self) -> bool {
        self.logged_out
    }

    pub fn is_remember(&self) -> bool {
        self.remember
    }

    pub fn expires(&self) -> NaiveDateTime {
        self.expires
    }

    pub fn set_expires(&mut self, expires: NaiveDateTime) {
        self.expires = expires;
    }
}

/// Hashes a clear text password into a PHC string suitable for storage.
pub fn hash_password(password: &str) -> Option<String> {
    let hasher = match HashBuilder::new().finalize() {
        Ok(hasher) => hasher,
        Err(code) => {
            warn!(?code, "failed to build password hasher");
            return None;
        }
    };
    match hasher.hash(password) {
        Ok(hash) => Some(hash),
        Err(code) => {
            warn!(?code, "failed to hash password");
            None
        }
    }
}

/// Checks a clear text password against a stored PHC hash.
///
/// A malformed stored hash is reported as "not authenticated" rather than
/// propagated.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match HashBuilder::from_phc(hash) {
        Ok(checker) => checker.is_valid(password),
        Err(code) => {
            warn!(?code, "failed to check password against stored hash");
            false
        }
    }
}
