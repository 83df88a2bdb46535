// src/store/registry.rs
// =============================================================================
// Author names that really mean "nobody".
//
// The paste site fills the author field with placeholders like "anonymous"
// or "none". All of them are stored as the single value "Unknown" so queries
// over the database do not need to know every spelling.
//
// Matching is case-insensitive: names are lowercased on the way in and on
// lookup.
// =============================================================================

use std::collections::HashSet;

/// What every placeholder author becomes in the store
pub const UNKNOWN_AUTHOR: &str = "Unknown";

const DEFAULT_UNKNOWN_AUTHORS: [&str; 3] = ["anonymous", "unknown", "none"];

#[derive(Debug, Clone)]
pub struct UnknownAuthors {
    names: HashSet<String>,
}

impl Default for UnknownAuthors {
    fn default() -> Self {
        Self {
            names: DEFAULT_UNKNOWN_AUTHORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl UnknownAuthors {
    pub fn add(&mut self, author: &str) {
        self.names.insert(author.trim().to_lowercase());
    }

    pub fn contains(&self, author: &str) -> bool {
        self.names.contains(&author.trim().to_lowercase())
    }

    /// The stored form of `author`
    pub fn canonicalize<'a>(&self, author: &'a str) -> &'a str {
        if self.contains(author) {
            UNKNOWN_AUTHOR
        } else {
            author
        }
    }
}
