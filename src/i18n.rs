//! Message bundles and per-request locale resolution.
//!
//! Bundle file formats are out of scope; the host application registers its
//! bundles as plain maps. The locale is resolved once per request and lives
//! in the request context, never in process-wide state.

use std::collections::HashMap;

use http::HeaderMap;
use once_cell::sync::Lazy;

static EMPTY_BUNDLE: Lazy<HashMap<String, String>> = Lazy::new(HashMap::new);

/// Immutable, language-keyed message bundles shared by every route.
#[derive(Debug, Clone, Default)]
pub struct Messages {
    bundles: HashMap<String, HashMap<String, String>>,
    default_language: String,
}

impl Messages {
    pub fn new(default_language: impl Into<String>) -> Self {
        Self { bundles: HashMap::new(), default_language: default_language.into() }
    }

    pub fn with_bundle(
        mut self,
        language: impl Into<String>,
        bundle: HashMap<String, String>,
    ) -> Self {
        self.bundles.insert(language.into(), bundle);
        self
    }

    /// The bundle for a locale, falling back to the default language, then
    /// to an empty bundle.
    pub fn bundle(&self, locale: &str) -> &HashMap<String, String> {
        self.bundles
            .get(locale)
            .or_else(|| self.bundles.get(&self.default_language))
            .unwrap_or(&EMPTY_BUNDLE)
    }

    pub fn get(&self, locale: &str, key: &str) -> Option<&str> {
        self.bundle(locale).get(key).map(String::as_str)
    }
}

/// Resolves the request locale from `Accept-Language`: first token, primary
/// subtag only; blank or missing falls back to the configured default.
pub(crate) fn resolve_locale(headers: &HeaderMap, default_language: &str) -> String {
    headers
        .get(http::header::ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|token| token.split(';').next().unwrap_or(token))
        .map(|token| token.split('-').next().unwrap_or(token).trim())
        .filter(|token| !token.is_empty())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| default_language.to_string())
}
