//! Scope sets
//!
//! OAuth scope is a set of opaque, case-sensitive string tokens with a
//! whitespace-delimited wire format (RFC 6749 Section 3.3). Comparison is
//! by subset inclusion, never by string equality.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A set of scope tokens, e.g. `{customer, store, profile}`.
///
/// `BTreeSet` keeps the wire form deterministic, which keeps token
/// responses and test assertions stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// Empty scope set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Parse the whitespace-delimited wire form. Duplicate tokens collapse.
    pub fn parse(s: &str) -> Self {
        Self(s.split_whitespace().map(str::to_owned).collect())
    }

    /// Number of scope tokens.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set holds no tokens.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `scope` is one of the granted tokens (case-sensitive).
    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    /// Subset inclusion: every token of `self` appears in `other`.
    pub fn is_subset_of(&self, other: &ScopeSet) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Iterate over scope tokens in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromStr for ScopeSet {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for scope in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(scope)?;
            first = false;
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl Serialize for ScopeSet {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ScopeSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}
