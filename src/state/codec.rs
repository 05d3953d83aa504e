//! Cookie codec for the three pieces of stateless state.
//!
//! Session and authentication cookies carry a signed prefix followed by the
//! data segment: `sign|token|expires#k:v&k:v` for sessions and
//! `sign|expires#user` for authentications. Flash cookies are plain
//! `k:v&k:v` pairs, advisory state without integrity protection.
//!
//! The signature is a keyed blake3 MAC over the data segment and the prefix
//! fields, keyed from the application secret. Decoding never fails: a
//! missing cookie, a broken prefix, a bad signature, a past or unparsable
//! expiry and a failed decryption all fall back to a fresh default entity,
//! so corrupted client state silently re-authenticates as anonymous instead
//! of crashing the request.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{NaiveDateTime, Utc};
use cookie::time::{Duration, OffsetDateTime};
use cookie::Cookie;
use openssl::symm::Cipher;
use rand::RngCore;
use tracing::{debug, warn};

use crate::config::Config;
use crate::state::{Authentication, Flash, Session};

const DELIMITER: char = '|';
const DATA_DELIMITER: char = '#';
const PAIR_SPLITTER: char = '&';
const PAIR_SEPARATOR: char = ':';

const SESSION_PREFIX_LENGTH: usize = 3;
const AUTH_PREFIX_LENGTH: usize = 2;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const SIGNING_CONTEXT: &str = "satchel v1 cookie signing";
const SEALING_CONTEXT: &str = "satchel v1 cookie sealing";

const IV_LENGTH: usize = 16;

/// Encodes and decodes [`Session`], [`Authentication`] and [`Flash`] cookie
/// values. One codec is built per application and shared by every route.
pub struct StateCodec {
    config: Arc<Config>,
    sign_key: [u8; 32],
    seal_key: [u8; 32],
}

impl std::fmt::Debug for StateCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCodec").finish_non_exhaustive()
    }
}

impl StateCodec {
    pub fn new(config: Arc<Config>) -> Self {
        let sign_key = blake3::derive_key(SIGNING_CONTEXT, config.secret().as_bytes());
        let seal_key = blake3::derive_key(SEALING_CONTEXT, config.secret().as_bytes());
        Self { config, sign_key, seal_key }
    }

    /// Restores a session from its cookie value, or creates a fresh one on
    /// any anomaly.
    pub fn decode_session(&self, cookie_value: Option<&str>) -> Session {
        match cookie_value {
            Some(raw) if !raw.trim().is_empty() => self
                .verify_session(raw)
                .unwrap_or_else(|| {
                    debug!("session cookie rejected, issuing a fresh session");
                    Session::create(self.config.session_expires_secs())
                }),
            _ => Session::create(self.config.session_expires_secs()),
        }
    }

    /// Serializes a session back into its cookie. Returns `None` when the
    /// session was never mutated during the request.
    pub fn encode_session(&self, session: &Session) -> Option<Cookie<'static>> {
        if !session.has_changes() {
            return None;
        }

        let data = join_pairs(session.values());
        let expires = session.expires().format(TIMESTAMP_FORMAT).to_string();
        let sign = self.sign(&[&data, session.authenticity_token(), &expires]);
        let value = format!(
            "{sign}{DELIMITER}{token}{DELIMITER}{expires}{DATA_DELIMITER}{data}",
            token = session.authenticity_token(),
        );
        let value = self.maybe_seal(value, self.config.cookie_encryption())?;

        let mut cookie = Cookie::build((self.config.session_cookie_name().to_string(), value))
            .http_only(true)
            .path("/")
            .build();
        if let Some(expires) = cookie_expiration(session.expires()) {
            cookie.set_expires(expires);
        }
        Some(cookie)
    }

    fn verify_session(&self, raw: &str) -> Option<Session> {
        let raw = self.maybe_unseal(raw, self.config.cookie_encryption())?;
        let (prefix, data) = raw.split_once(DATA_DELIMITER)?;

        let segments: Vec<&str> = prefix.split(DELIMITER).collect();
        if segments.len() != SESSION_PREFIX_LENGTH {
            return None;
        }
        let (sign, token, expires) = (segments[0], segments[1], segments[2]);
        if sign.is_empty() || token.is_empty() || expires.is_empty() {
            return None;
        }

        let expires_at = NaiveDateTime::parse_from_str(expires, TIMESTAMP_FORMAT).ok()?;
        if expires_at <= Utc::now().naive_utc() {
            return None;
        }
        if !self.verify_sign(&[data, token, expires], sign) {
            return None;
        }

        let values = split_pairs(data)?;
        Some(Session::restore(values, token.to_string(), expires_at))
    }

    /// Restores an authentication from its cookie value, or creates an
    /// anonymous one on any anomaly.
    pub fn decode_authentication(&self, cookie_value: Option<&str>) -> Authentication {
        match cookie_value {
            Some(raw) if !raw.trim().is_empty() => self
                .verify_authentication(raw)
                .unwrap_or_else(|| {
                    debug!("authentication cookie rejected, continuing as anonymous");
                    Authentication::create(self.config.auth_expires_secs())
                }),
            _ => Authentication::create(self.config.auth_expires_secs()),
        }
    }

    /// Serializes an authentication back into its cookie. Emitted only while
    /// it holds an authenticated user; a logout yields a removal cookie.
    pub fn encode_authentication(&self, authentication: &Authentication) -> Option<Cookie<'static>> {
        if !authentication.has_authenticated_user() {
            return None;
        }

        let name = self.config.auth_cookie_name().to_string();
        if authentication.is_logout() {
            let mut cookie = Cookie::build((name, "")).http_only(true).path("/").build();
            cookie.set_max_age(Duration::ZERO);
            return Some(cookie);
        }

        let user = authentication.authenticated_user().unwrap_or_default();
        let expires = authentication.expires().format(TIMESTAMP_FORMAT).to_string();
        let sign = self.sign(&[user, &expires]);
        let value = format!("{sign}{DELIMITER}{expires}{DATA_DELIMITER}{user}");
        let value = self.maybe_seal(value, self.config.auth_cookie_encryption())?;

        let mut cookie = Cookie::build((name, value)).http_only(true).path("/").build();
        if let Some(expires) = cookie_expiration(authentication.expires()) {
            cookie.set_expires(expires);
        }
        Some(cookie)
    }

    fn verify_authentication(&self, raw: &str) -> Option<Authentication> {
        let raw = self.maybe_unseal(raw, self.config.auth_cookie_encryption())?;
        let (prefix, data) = raw.split_once(DATA_DELIMITER)?;

        let segments: Vec<&str> = prefix.split(DELIMITER).collect();
        if segments.len() != AUTH_PREFIX_LENGTH {
            return None;
        }
        let (sign, expires) = (segments[0], segments[1]);
        if sign.is_empty() || expires.is_empty() {
            return None;
        }

        let expires_at = NaiveDateTime::parse_from_str(expires, TIMESTAMP_FORMAT).ok()?;
        if expires_at <= Utc::now().naive_utc() {
            return None;
        }
        if !self.verify_sign(&[data, expires], sign) {
            return None;
        }

        Some(Authentication::restore(data.to_string(), expires_at))
    }

    /// Restores a flash from its cookie value, marked for discard, or
    /// creates an empty one.
    pub fn decode_flash(&self, cookie_value: Option<&str>) -> Flash {
        match cookie_value {
            Some(raw) if !raw.trim().is_empty() => match split_pairs(raw) {
                Some(values) => Flash::restore(values),
                None => {
                    debug!("flash cookie rejected, continuing with an empty flash");
                    Flash::new()
                }
            },
            _ => Flash::new(),
        }
    }

    /// Serializes a flash back into its cookie, or expires the incoming one
    /// when the flash is empty or marked for discard.
    pub fn encode_flash(&self, flash: &Flash, had_cookie: bool) -> Option<Cookie<'static>> {
        let name = self.config.flash_cookie_name().to_string();
        if !flash.is_discard() && flash.has_content() {
            let value = join_pairs(flash.values());
            return Some(Cookie::build((name, value)).http_only(true).path("/").build());
        }
        if had_cookie {
            let mut cookie = Cookie::build((name, "")).http_only(true).path("/").build();
            cookie.set_max_age(Duration::ZERO);
            return Some(cookie);
        }
        None
    }

    /// Keyed MAC over the given parts, in order. The original scheme hashed
    /// secret-concatenated plaintext with an unkeyed digest; this uses a
    /// keyed construction over the same field sequence instead.
    fn sign(&self, parts: &[&str]) -> String {
        self.mac(parts).to_hex().to_string()
    }

    /// Compares in constant time; `blake3::Hash` equality never
    /// short-circuits on a byte mismatch.
    fn verify_sign(&self, parts: &[&str], received: &str) -> bool {
        let Ok(received) = blake3::Hash::from_hex(received) else {
            return false;
        };
        self.mac(parts) == received
    }

    fn mac(&self, parts: &[&str]) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.sign_key);
        for part in parts {
            hasher.update(part.as_bytes());
        }
        hasher.finalize()
    }

    fn maybe_seal(&self, value: String, enabled: bool) -> Option<String> {
        if !enabled {
            return Some(value);
        }
        let mut iv = [0u8; IV_LENGTH];
        rand::thread_rng().fill_bytes(&mut iv);
        match openssl::symm::encrypt(Cipher::aes_256_cbc(), &self.seal_key, Some(&iv), value.as_bytes()) {
            Ok(ciphertext) => {
                let mut sealed = iv.to_vec();
                sealed.extend_from_slice(&ciphertext);
                Some(URL_SAFE_NO_PAD.encode(sealed))
            }
            Err(e) => {
                warn!("cookie encryption failed, dropping cookie: {e}");
                None
            }
        }
    }

    fn maybe_unseal(&self, value: &str, enabled: bool) -> Option<String> {
        if !enabled {
            return Some(value.to_string());
        }
        let sealed = URL_SAFE_NO_PAD.decode(value).ok()?;
        if sealed.len() <= IV_LENGTH {
            return None;
        }
        let (iv, ciphertext) = sealed.split_at(IV_LENGTH);
        let plaintext =
            openssl::symm::decrypt(Cipher::aes_256_cbc(), &self.seal_key, Some(iv), ciphertext).ok()?;
        String::from_utf8(plaintext).ok()
    }
}

fn join_pairs(values: &HashMap<String, String>) -> String {
    let mut pairs: Vec<String> =
        values.iter().map(|(k, v)| format!("{k}{PAIR_SEPARATOR}{v}")).collect();
    // stable data segment so equal maps always sign identically
    pairs.sort();
    pairs.join(&PAIR_SPLITTER.to_string())
}

fn split_pairs(data: &str) -> Option<HashMap<String, String>> {
    let mut values = HashMap::new();
    if data.is_empty() {
        return Some(values);
    }
    for pair in data.split(PAIR_SPLITTER) {
        let (key, value) = pair.split_once(PAIR_SEPARATOR)?;
        values.insert(key.to_string(), value.to_string());
    }
    Some(values)
}

fn cookie_expiration(expires: NaiveDateTime) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(expires.and_utc().timestamp()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(encrypted: bool) -> StateCodec {
        let config = Config::new("a-test-secret-of-decent-length")
            .with_cookie_encryption(encrypted)
            .with_auth_cookie_encryption(encrypted);
        StateCodec::new(Arc::new(config))
    }

    fn changed_session(codec: &StateCodec) -> Session {
        let mut session = codec.decode_session(None);
        session.put("theme", "dark");
        session.put("cart", "3");
        session
    }

    #[test]
    fn session_round_trip_plain() {
        let codec = codec(false);
        let session = changed_session(&codec);
        let cookie = codec.encode_session(&session).unwrap();

        let decoded = codec.decode_session(Some(cookie.value()));
        assert_eq!(decoded.values(), session.values());
        assert_eq!(decoded.authenticity_token(), session.authenticity_token());
        assert_eq!(decoded.expires(), session.expires());
        assert!(!decoded.has_changes());
    }

    #[test]
    fn session_round_trip_encrypted() {
        let codec = codec(true);
        let session = changed_session(&codec);
        let cookie = codec.encode_session(&session).unwrap();

        assert!(!cookie.value().contains(DATA_DELIMITER));
        let decoded = codec.decode_session(Some(cookie.value()));
        assert_eq!(decoded.values(), session.values());
        assert_eq!(decoded.authenticity_token(), session.authenticity_token());
    }

    #[test]
    fn unchanged_session_is_not_encoded() {
        let codec = codec(false);
        let session = codec.decode_session(None);
        assert!(codec.encode_session(&session).is_none());
    }

    #[test]
    fn tampered_signature_falls_back_to_fresh() {
        let codec = codec(false);
        let session = changed_session(&codec);
        let cookie = codec.encode_session(&session).unwrap();

        let mut value = cookie.value().to_string();
        let first = value.remove(0);
        let flipped = if first == 'a' { 'b' } else { 'a' };
        value.insert(0, flipped);

        let decoded = codec.decode_session(Some(&value));
        assert!(decoded.values().is_empty());
        assert_ne!(decoded.authenticity_token(), session.authenticity_token());
    }

    #[test]
    fn non_hex_signature_falls_back_to_fresh() {
        let codec = codec(false);
        let session = changed_session(&codec);
        let cookie = codec.encode_session(&session).unwrap();

        let (_, rest) = cookie.value().split_once(DELIMITER).unwrap();
        let forged = format!("{}{DELIMITER}{rest}", "z".repeat(64));

        let decoded = codec.decode_session(Some(&forged));
        assert!(decoded.values().is_empty());
        assert_ne!(decoded.authenticity_token(), session.authenticity_token());
    }

    #[test]
    fn tampered_data_falls_back_to_fresh() {
        let codec = codec(false);
        let session = changed_session(&codec);
        let cookie = codec.encode_session(&session).unwrap();

        let value = cookie.value().replace("dark", "lite");
        assert_ne!(value, cookie.value());

        let decoded = codec.decode_session(Some(&value));
        assert!(decoded.values().is_empty());
    }

    #[test]
    fn expired_session_falls_back_to_fresh() {
        let codec = codec(false);
        let expires = (Utc::now().naive_utc() - chrono::Duration::seconds(60))
            .format(TIMESTAMP_FORMAT)
            .to_string();
        let sign = codec.sign(&["theme:dark", "tokentokentokens", &expires]);
        let value = format!("{sign}|tokentokentokens|{expires}#theme:dark");

        let decoded = codec.decode_session(Some(&value));
        assert!(decoded.values().is_empty());
    }

    #[test]
    fn malformed_prefix_falls_back_to_fresh() {
        let codec = codec(false);
        for value in ["", "   ", "nonsense", "a|b#data", "a|b|c|d#data", "#only-data"] {
            let decoded = codec.decode_session(Some(value));
            assert!(decoded.values().is_empty(), "value {value:?} must not decode");
        }
    }

    #[test]
    fn authentication_round_trip() {
        let codec = codec(false);
        let mut auth = codec.decode_authentication(None);
        auth.login("alex", false);
        let cookie = codec.encode_authentication(&auth).unwrap();

        let decoded = codec.decode_authentication(Some(cookie.value()));
        assert!(decoded.is_authenticated("alex"));
        assert_eq!(decoded.expires(), auth.expires());
    }

    #[test]
    fn anonymous_authentication_is_not_encoded() {
        let codec = codec(false);
        let auth = codec.decode_authentication(None);
        assert!(codec.encode_authentication(&auth).is_none());
    }

    #[test]
    fn logout_encodes_a_removal_cookie() {
        let codec = codec(false);
        let mut auth = codec.decode_authentication(None);
        auth.login("alex", false);
        auth.logout();

        let cookie = codec.encode_authentication(&auth).unwrap();
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert_eq!(cookie.value(), "");
    }

    #[test]
    fn tampered_authentication_is_anonymous() {
        let codec = codec(false);
        let mut auth = codec.decode_authentication(None);
        auth.login("alex", false);
        let cookie = codec.encode_authentication(&auth).unwrap();

        let value = cookie.value().replace("alex", "root");
        let decoded = codec.decode_authentication(Some(&value));
        assert!(!decoded.has_authenticated_user());
    }

    #[test]
    fn flash_round_trip_and_discard() {
        let codec = codec(false);
        let mut flash = codec.decode_flash(None);
        flash.success("saved");
        let cookie = codec.encode_flash(&flash, false).unwrap();

        let decoded = codec.decode_flash(Some(cookie.value()));
        assert_eq!(decoded.get("success"), Some("saved"));
        assert!(decoded.is_discard());

        // next cycle: untouched flash expires the cookie it came from
        assert_eq!(codec.encode_flash(&decoded, true).unwrap().max_age(), Some(Duration::ZERO));
        // and without an incoming cookie nothing is written at all
        assert!(codec.encode_flash(&decoded, false).is_none());
    }

    #[test]
    fn malformed_flash_is_empty() {
        let codec = codec(false);
        let decoded = codec.decode_flash(Some("no-separator-here"));
        assert!(!decoded.has_content());
    }
}
