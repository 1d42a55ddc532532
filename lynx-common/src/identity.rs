//! Caller and document identifiers supplied by the identity and document layers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Authenticated user id as handed over by the session layer.
///
/// The execution core trusts this value and never re-verifies it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(String);

impl CallerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CallerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Opaque saved-document id. Existence is never checked by the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Who an execution runs on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum Caller {
    Anonymous,
    User(CallerId),
}

impl Caller {
    pub fn user(id: impl Into<CallerId>) -> Self {
        Caller::User(id.into())
    }

    /// The authenticated id, if any. Anonymous runs leave no history.
    pub fn id(&self) -> Option<&CallerId> {
        match self {
            Caller::Anonymous => None,
            Caller::User(id) => Some(id),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Caller::Anonymous)
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caller::Anonymous => f.write_str("anonymous"),
            Caller::User(id) => write!(f, "user:{}", id),
        }
    }
}

impl From<Option<CallerId>> for Caller {
    fn from(value: Option<CallerId>) -> Self {
        value.map(Caller::User).unwrap_or(Caller::Anonymous)
    }
}
