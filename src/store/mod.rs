// src/store/mod.rs
// =============================================================================
// This module persists pastes.
//
// Submodules:
// - registry: placeholder author names that become "Unknown"
// - normalize: field-by-field rewrite into the stored form
// - document: the insert-only JSON file the records end up in
//
// NormalizingStore ties them together: normalize every paste, then insert
// the whole batch with a single write.
// =============================================================================

mod document;
mod normalize;
mod registry;

pub use document::JsonDocumentStore;
pub use normalize::Normalizer;
pub use registry::UnknownAuthors;

use crate::config::StoreConfig;
use crate::crawl::ProjectedPaste;
use crate::error::StoreError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct NormalizingStore {
    normalizer: Normalizer,
    location: PathBuf,
    // None only after a failed relocation
    db: Option<JsonDocumentStore>,
}

impl NormalizingStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut unknown_authors = UnknownAuthors::default();
        for author in &config.unknown_authors {
            unknown_authors.add(author);
        }
        let normalizer = Normalizer::new(&config.timezone, config.strip, unknown_authors)?;
        Ok(Self {
            normalizer,
            location: config.db_path.clone(),
            db: Some(JsonDocumentStore::open(&config.db_path)?),
        })
    }

    /// Treat another author name as "no author" from now on
    pub fn add_unknown_author(&mut self, author: &str) {
        self.normalizer.unknown_authors_mut().add(author);
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Switches to another database file. The current one is flushed and
    /// closed before the new one is opened.
    pub fn relocate(&mut self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(db) = self.db.take() {
            db.close()?;
        }
        self.location = path.clone();
        self.db = Some(JsonDocumentStore::open(&path)?);
        debug!(path = %path.display(), "store relocated");
        Ok(())
    }

    /// Normalizes every paste and appends them as one batch
    pub fn append_all(&mut self, mut pastes: Vec<ProjectedPaste>) -> Result<usize, StoreError> {
        info!(count = pastes.len(), "writing new pastes");
        for paste in pastes.iter_mut() {
            self.normalizer.normalize(paste)?;
        }

        let db = self.db.as_mut().ok_or_else(|| {
            StoreError::io(
                &self.location,
                std::io::Error::new(std::io::ErrorKind::NotConnected, "no open document store"),
            )
        })?;
        Ok(db.insert_multiple(pastes)?.len())
    }

    /// Read access to the backing store
    pub fn documents(&self) -> Option<&JsonDocumentStore> {
        self.db.as_ref()
    }

    pub fn close(mut self) -> Result<(), StoreError> {
        match self.db.take() {
            Some(db) => db.close(),
            None => Ok(()),
        }
    }
}
