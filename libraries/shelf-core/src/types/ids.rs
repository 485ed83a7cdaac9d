/// ID types for Shelf entities
use serde::{Deserialize, Serialize};
use std::fmt;

/// Album identifier: the album directory's name relative to the albums root
///
/// Construction does not validate the name. The scanner validates ids before
/// they touch the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlbumId(String);

impl AlbumId {
    /// Create a new album ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive check that every term occurs somewhere in the id
    pub fn matches_all(&self, terms: &[String]) -> bool {
        let haystack = self.0.to_lowercase();
        terms
            .iter()
            .all(|term| haystack.contains(&term.to_lowercase()))
    }
}

impl fmt::Display for AlbumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AlbumId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AlbumId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for AlbumId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
