//! Per-form state carried between requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

const CODE_KEY: &str = "code";
const FRESH_KEY: &str = "fresh";
const TIMEZONE_KEY: &str = "tz";

/// Flat string map re-embedded by the transport between requests.
///
/// The service never stores it; the HTTP adapter keeps it in the signed
/// session cookie, namespaced per form.
///
/// # Examples
/// ```
/// use web_form::domain::access::SessionState;
///
/// let mut state = SessionState::default();
/// state.accept_code("A1");
/// assert_eq!(state.access_code(), Some("A1"));
/// assert!(state.take_fresh());
/// assert!(!state.take_fresh());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionState(BTreeMap<String, String>);

impl SessionState {
    /// Access code accepted earlier in this session.
    pub fn access_code(&self) -> Option<&str> {
        self.get(CODE_KEY)
    }

    /// Remember an accepted access code and request a fresh render.
    pub fn accept_code(&mut self, code: impl Into<String>) {
        self.0.insert(CODE_KEY.to_owned(), code.into());
        self.mark_fresh();
    }

    /// Request that the next view starts from an empty form.
    pub fn mark_fresh(&mut self) {
        self.0.insert(FRESH_KEY.to_owned(), "1".to_owned());
    }

    /// Whether a fresh render is pending.
    pub fn is_fresh(&self) -> bool {
        self.get(FRESH_KEY).is_some()
    }

    /// Consume the fresh flag, returning whether it was set.
    pub fn take_fresh(&mut self) -> bool {
        self.0.remove(FRESH_KEY).is_some()
    }

    /// Client time zone remembered from an earlier submission.
    pub fn timezone(&self) -> Option<&str> {
        self.get(TIMEZONE_KEY)
    }

    /// Remember the client time zone.
    pub fn set_timezone(&mut self, name: impl Into<String>) {
        self.0.insert(TIMEZONE_KEY.to_owned(), name.into());
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}
