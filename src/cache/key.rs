//! Cache Key Module
//!
//! Composite key built from account, sub-account and attribute codes.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Separator placed between escaped key components.
pub const KEY_SEPARATOR: char = ':';

const ESCAPE: char = '\\';

// == Cache Key ==
/// Identifies one attribute of one (sub-)account.
///
/// The three components are joined into a single composite string. Any
/// separator or escape character inside a component is escaped first, so two
/// different component tuples can never produce the same composite string.
/// Equality and hashing use the composite string only.
#[derive(Debug, Clone)]
pub struct CacheKey {
    account_code: String,
    sub_account_code: String,
    attribute_code: String,
    composite: String,
}

impl CacheKey {
    // == Constructor ==
    /// Builds a key from its components.
    ///
    /// No validation happens here; empty components are the caller's concern.
    pub fn new(
        account_code: impl Into<String>,
        sub_account_code: impl Into<String>,
        attribute_code: impl Into<String>,
    ) -> Self {
        let account_code = account_code.into();
        let sub_account_code = sub_account_code.into();
        let attribute_code = attribute_code.into();

        let mut composite = String::with_capacity(
            account_code.len() + sub_account_code.len() + attribute_code.len() + 2,
        );
        push_escaped(&mut composite, &account_code);
        composite.push(KEY_SEPARATOR);
        push_escaped(&mut composite, &sub_account_code);
        composite.push(KEY_SEPARATOR);
        push_escaped(&mut composite, &attribute_code);

        Self {
            account_code,
            sub_account_code,
            attribute_code,
            composite,
        }
    }

    pub fn account_code(&self) -> &str {
        &self.account_code
    }

    pub fn sub_account_code(&self) -> &str {
        &self.sub_account_code
    }

    pub fn attribute_code(&self) -> &str {
        &self.attribute_code
    }

    /// Returns the escaped composite string.
    pub fn as_str(&self) -> &str {
        &self.composite
    }

    /// Returns true if any component is empty.
    pub fn has_empty_component(&self) -> bool {
        self.account_code.is_empty()
            || self.sub_account_code.is_empty()
            || self.attribute_code.is_empty()
    }
}

fn push_escaped(out: &mut String, component: &str) {
    for c in component.chars() {
        if c == KEY_SEPARATOR || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.composite == other.composite
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.composite.hash(state);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.composite)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_components_join_with_separator() {
        let key = CacheKey::new("123", "001", "color");
        assert_eq!(key.as_str(), "123:001:color");
        assert_eq!(key.to_string(), "123:001:color");
    }

    #[test]
    fn test_separator_inside_component_is_escaped() {
        let key = CacheKey::new("a:b", "c", "d");
        assert_eq!(key.as_str(), r"a\:b:c:d");
    }

    #[test]
    fn test_ambiguous_tuples_do_not_collide() {
        let left = CacheKey::new("a:b", "c", "d");
        let right = CacheKey::new("a", "b:c", "d");
        assert_ne!(left, right);

        let left = CacheKey::new(r"a\", "b", "c");
        let right = CacheKey::new("a", r"\b", "c");
        assert_ne!(left, right);
    }

    #[test]
    fn test_equality_uses_composite() {
        assert_eq!(CacheKey::new("1", "2", "3"), CacheKey::new("1", "2", "3"));
    }

    #[test]
    fn test_has_empty_component() {
        assert!(CacheKey::new("", "s", "a").has_empty_component());
        assert!(CacheKey::new("a", "", "a").has_empty_component());
        assert!(CacheKey::new("a", "s", "").has_empty_component());
        assert!(!CacheKey::new("a", "s", "a").has_empty_component());
    }
}
