//! Authentication cookie store
//!
//! The login flow hands over a single string of the form
//! `USER=alice; AUTH=0123abcd; TUNNEL=/ssl-tunnel-connect.sslvpn`. It is split into an
//! insertion-ordered list of fields. A key that is already present is never
//! overwritten, so values obtained earlier in the session win over a later parse.

use crate::error::CookieError;
use std::fmt;

/// Insertion-ordered, case-sensitive cookie fields
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CookieStore {
    fields: Vec<(String, String)>,
}

impl CookieStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw cookie string into a new store
    pub fn parse(raw: &str) -> Result<Self, CookieError> {
        let mut store = Self::new();
        store.parse_into(raw)?;
        Ok(store)
    }

    /// Parse `raw` and add every field whose key is not present yet
    ///
    /// Fields are separated by `;`; whitespace following a separator is skipped. Each
    /// field is split on its first `=`. A field without `=` fails the whole parse, but
    /// fields before it have already been stored.
    pub fn parse_into(&mut self, raw: &str) -> Result<(), CookieError> {
        let mut rest = raw;

        while !rest.is_empty() {
            let (field, next) = match rest.split_once(';') {
                Some((field, next)) => (field, Some(next)),
                None => (rest, None),
            };

            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| CookieError::Malformed(field.to_string()))?;
            self.insert(key, value);

            rest = next.map_or("", |next| {
                next.trim_start_matches(|c: char| c.is_ascii_whitespace())
            });
        }

        Ok(())
    }

    /// Add a field unless the key is already present. Returns whether it was added.
    pub fn insert(&mut self, key: &str, value: &str) -> bool {
        if self.lookup(key).is_some() {
            log::debug!("Keeping existing cookie {key}");
            return false;
        }
        self.fields.push((key.to_string(), value.to_string()));
        true
    }

    /// Value for `key`, if present
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// Values carry credentials; only keys are shown.
impl fmt::Debug for CookieStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieStore")
            .field("keys", &self.fields.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}
