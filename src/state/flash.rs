//! One-shot message store that survives exactly one request cycle.

use std::collections::HashMap;

const SUCCESS: &str = "success";
const WARNING: &str = "warning";
const ERROR: &str = "error";

/// Flash values travel in an unsigned cookie and clear themselves on the
/// next cycle: decoding marks the flash for discard, and any write re-arms
/// it for one more round trip.
#[derive(Debug, Clone, Default)]
pub struct Flash {
    values: HashMap<String, String>,
    discard: bool,
}

impl Flash {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a flash from the incoming cookie, marked for discard.
    pub(crate) fn restore(values: HashMap<String, String>) -> Self {
        Self { values, discard: true }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.discard = false;
        self.values.insert(key.into(), value.into());
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.put(SUCCESS, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.put(WARNING, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.put(ERROR, message);
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    pub fn has_content(&self) -> bool {
        !self.values.is_empty()
    }

    pub fn is_discard(&self) -> bool {
        self.discard
    }
}
