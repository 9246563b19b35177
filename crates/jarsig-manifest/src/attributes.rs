//! Manifest attribute names and attribute maps.

use std::fmt;
use std::hash::{Hash, Hasher};

use log::debug;

use crate::error::{ManifestError, ManifestResult};

/// Maximum length of an attribute name in bytes.
pub const MAX_NAME_LEN: usize = 70;

/// Reject values that would break out of their header line.
pub fn validate_value(value: &str) -> ManifestResult<()> {
    if value.bytes().any(|b| matches!(b, b'\r' | b'\n' | 0)) {
        return Err(ManifestError::InvalidValue(value.to_string()));
    }
    Ok(())
}

/// A validated manifest header name.
///
/// Comparison and hashing ignore ASCII case; the original spelling is kept
/// for serialization.
#[derive(Debug, Clone)]
pub struct AttributeName(String);

impl AttributeName {
    pub const MANIFEST_VERSION: &'static str = "Manifest-Version";
    pub const SIGNATURE_VERSION: &'static str = "Signature-Version";
    pub const CREATED_BY: &'static str = "Created-By";
    pub const NAME: &'static str = "Name";
    pub const CLASS_PATH: &'static str = "Class-Path";
    pub const MAIN_CLASS: &'static str = "Main-Class";
    pub const CONTENT_TYPE: &'static str = "Content-Type";
    pub const SEALED: &'static str = "Sealed";
    pub const MULTI_RELEASE: &'static str = "Multi-Release";

    /// Validate and wrap a header name.
    pub fn new(name: impl Into<String>) -> ManifestResult<Self> {
        let name = name.into();
        if Self::is_valid(&name) {
            Ok(Self(name))
        } else {
            Err(ManifestError::InvalidAttributeName(name))
        }
    }

    /// Wrap one of the well-known names above without re-validating it.
    pub fn known(name: &'static str) -> Self {
        Self(name.to_string())
    }

    /// Header names are 1..=70 bytes of ASCII alphanumerics, `-` and `_`.
    pub fn is_valid(name: &str) -> bool {
        !name.is_empty()
            && name.len() <= MAX_NAME_LEN
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a plain string.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq for AttributeName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for AttributeName {}

impl Hash for AttributeName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An insertion-ordered attribute map with case-insensitive keys.
///
/// Equality ignores ordering: two maps are equal when they hold the same
/// set of names with the same values.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    items: Vec<(AttributeName, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up a value by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(k, _)| k.matches(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert a value, replacing any existing value for the same name in place.
    ///
    /// Returns the previous value.
    pub fn insert(&mut self, name: AttributeName, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        if let Some(slot) = self.items.iter_mut().find(|(k, _)| *k == name) {
            debug!("attribute {} redefined", name);
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.items.push((name, value));
        None
    }

    /// Validate `name` and `value`, then insert.
    pub fn put(&mut self, name: &str, value: impl Into<String>) -> ManifestResult<Option<String>> {
        let value = value.into();
        validate_value(&value)?;
        Ok(self.insert(AttributeName::new(name)?, value))
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.items.iter().position(|(k, _)| k.matches(name))?;
        Some(self.items.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttributeName, &str)> {
        self.items.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Merge `other` into `self`; values from `other` win.
    pub fn extend_from(&mut self, other: Attributes) {
        for (k, v) in other.items {
            self.insert(k, v);
        }
    }
}

impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .items
                .iter()
                .all(|(k, v)| other.get(k.as_str()) == Some(v.as_str()))
    }
}

impl Eq for Attributes {}
