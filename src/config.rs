//! Dispatcher configuration.
//!
//! Loading configuration from files or the environment is the host
//! application's job; this crate only consumes the resolved values.

/// Configuration consumed by the dispatch pipeline and the cookie codec.
///
/// Values are resolved once at startup and shared between routes via `Arc`.
#[derive(Debug, Clone)]
pub struct Config {
    secret: String,
    session_cookie_name: String,
    auth_cookie_name: String,
    flash_cookie_name: String,
    session_expires_secs: i64,
    auth_expires_secs: i64,
    cookie_encryption: bool,
    auth_cookie_encryption: bool,
    default_language: String,
    server_token: String,
    content_type: String,
    charset: String,
}

/// Minimum length for the application secret. Shorter secrets are accepted
/// but logged, matching the fallback-over-failure policy of the codec.
pub const MIN_SECRET_LENGTH: usize = 16;

impl Config {
    /// Creates a configuration with default cookie names and lifetimes.
    ///
    /// The secret keys the cookie signatures; changing it invalidates every
    /// previously issued session and authentication cookie.
    pub fn new(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LENGTH {
            tracing::warn!(
                len = secret.len(),
                "application secret is shorter than {MIN_SECRET_LENGTH} characters"
            );
        }
        Self {
            secret,
            session_cookie_name: "SATCHEL-SESSION".to_string(),
            auth_cookie_name: "SATCHEL-AUTH".to_string(),
            flash_cookie_name: "SATCHEL-FLASH".to_string(),
            session_expires_secs: 86_400,
            auth_expires_secs: 3_600,
            cookie_encryption: false,
            auth_cookie_encryption: false,
            default_language: "en".to_string(),
            server_token: "satchel".to_string(),
            content_type: "text/html".to_string(),
            charset: "UTF-8".to_string(),
        }
    }

    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.session_cookie_name = name.into();
        self
    }

    pub fn with_auth_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.auth_cookie_name = name.into();
        self
    }

    pub fn with_flash_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.flash_cookie_name = name.into();
        self
    }

    /// Session lifetime in seconds, used for freshly created sessions.
    pub fn with_session_expires(mut self, seconds: i64) -> Self {
        self.session_expires_secs = seconds;
        self
    }

    /// Authentication lifetime in seconds, used for freshly created entities.
    pub fn with_auth_expires(mut self, seconds: i64) -> Self {
        self.auth_expires_secs = seconds;
        self
    }

    /// Enables symmetric encryption of the session cookie value.
    pub fn with_cookie_encryption(mut self, enabled: bool) -> Self {
        self.cookie_encryption = enabled;
        self
    }

    /// Enables symmetric encryption of the authentication cookie value.
    pub fn with_auth_cookie_encryption(mut self, enabled: bool) -> Self {
        self.auth_cookie_encryption = enabled;
        self
    }

    /// Language used when the request carries no usable `Accept-Language`.
    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    /// Product token emitted in the `Server` response header.
    pub fn with_server_token(mut self, token: impl Into<String>) -> Self {
        self.server_token = token.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn session_cookie_name(&self) -> &str {
        &self.session_cookie_name
    }

    pub fn auth_cookie_name(&self) -> &str {
        &self.auth_cookie_name
    }

    pub fn flash_cookie_name(&self) -> &str {
        &self.flash_cookie_name
    }

    pub fn session_expires_secs(&self) -> i64 {
        self.session_expires_secs
    }

    pub fn auth_expires_secs(&self) -> i64 {
        self.auth_expires_secs
    }

    pub fn cookie_encryption(&self) -> bool {
        self.cookie_encryption
    }

    pub fn auth_cookie_encryption(&self) -> bool {
        self.auth_cookie_encryption
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    pub fn server_token(&self) -> &str {
        &self.server_token
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }
}
