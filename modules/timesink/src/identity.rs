//! Object identity and identity matching
//!
//! Objects have no stable key in the log: an object is whatever the
//! (apiVersion, kind, name) triple in an event payload says it is. Every lookup
//! by identity goes through an [`IdentityFilter`], and the filter for an owner
//! lookup is always built with the single configured [`MatchPolicy`].
//!
//! Matching is case-insensitive in every mode. Patterns are always evaluated
//! with the `regex` crate, whatever the backend: the Postgres log pushes exact
//! comparisons down to SQL (`lower(..) = lower(..)`) but never hands a pattern
//! to the database's own regex dialect.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The identity triple of an object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectIdentity {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

impl ObjectIdentity {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.api_version, self.kind, self.name)
    }
}

#[derive(Debug, Error)]
#[error("invalid {field} pattern '{pattern}': {source}")]
pub struct PatternError {
    pub field: &'static str,
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// How owner references are matched against stored events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// Whole-string, case-insensitive equality
    #[default]
    Exact,
    /// Reference fields are treated as case-insensitive regular expressions
    Pattern,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "pattern" | "regex" => Ok(Self::Pattern),
            other => Err(format!("unknown match policy '{}'", other)),
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Pattern => write!(f, "pattern"),
        }
    }
}

/// Predicate on a single payload string field
#[derive(Debug, Clone)]
pub enum FieldMatcher {
    /// No constraint; also matches events that lack the field
    Any,
    Exact(String),
    Pattern(Regex),
}

impl FieldMatcher {
    /// Compile a user-supplied pattern. Absent or empty means match-all.
    pub fn pattern(field: &'static str, pattern: Option<&str>) -> Result<Self, PatternError> {
        match pattern {
            None => Ok(Self::Any),
            Some(p) if p.is_empty() => Ok(Self::Any),
            Some(p) => RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map(Self::Pattern)
                .map_err(|source| PatternError {
                    field,
                    pattern: p.to_string(),
                    source,
                }),
        }
    }

    pub fn exact(value: impl Into<String>) -> Self {
        Self::Exact(value.into())
    }

    pub fn matches(&self, candidate: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => {
                candidate.is_some_and(|c| c.to_lowercase() == expected.to_lowercase())
            }
            Self::Pattern(re) => candidate.is_some_and(|c| re.is_match(c)),
        }
    }
}

/// Predicate on the identity triple of an event payload
#[derive(Debug, Clone)]
pub struct IdentityFilter {
    pub api_version: FieldMatcher,
    pub kind: FieldMatcher,
    pub name: FieldMatcher,
}

impl IdentityFilter {
    pub fn any() -> Self {
        Self {
            api_version: FieldMatcher::Any,
            kind: FieldMatcher::Any,
            name: FieldMatcher::Any,
        }
    }

    /// Filter from user-supplied patterns (the `events` listing arguments)
    pub fn from_patterns(
        api_version: Option<&str>,
        kind: Option<&str>,
        name: Option<&str>,
    ) -> Result<Self, PatternError> {
        Ok(Self {
            api_version: FieldMatcher::pattern("apiVersion", api_version)?,
            kind: FieldMatcher::pattern("kind", kind)?,
            name: FieldMatcher::pattern("name", name)?,
        })
    }

    /// Filter selecting one object by identity under the given policy
    pub fn for_identity(
        identity: &ObjectIdentity,
        policy: MatchPolicy,
    ) -> Result<Self, PatternError> {
        match policy {
            MatchPolicy::Exact => Ok(Self {
                api_version: FieldMatcher::exact(&identity.api_version),
                kind: FieldMatcher::exact(&identity.kind),
                name: FieldMatcher::exact(&identity.name),
            }),
            MatchPolicy::Pattern => Self::from_patterns(
                Some(&identity.api_version),
                Some(&identity.kind),
                Some(&identity.name),
            ),
        }
    }

    /// True when some field is constrained by a regular expression
    pub fn has_patterns(&self) -> bool {
        [&self.api_version, &self.kind, &self.name]
            .iter()
            .any(|m| matches!(m, FieldMatcher::Pattern(_)))
    }

    pub fn matches(
        &self,
        api_version: Option<&str>,
        kind: Option<&str>,
        name: Option<&str>,
    ) -> bool {
        self.api_version.matches(api_version) && self.kind.matches(kind) && self.name.matches(name)
    }
}
