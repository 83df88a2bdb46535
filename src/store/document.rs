// src/store/document.rs
// =============================================================================
// An insert-only JSON document store.
//
// The file layout is the one TinyDB uses, so databases written by earlier
// crawlers can be opened as-is:
//
//   {"_default": {"1": {...}, "2": {...}}}
//
// Document ids are strings holding increasing integers. The file handle stays
// open for the lifetime of the store. Each insert stages the whole database in
// a sibling file and renames it into place, so the stored records are never
// truncated by a failed write.
// =============================================================================

use crate::error::StoreError;
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_TABLE: &str = "_default";

pub struct JsonDocumentStore {
    path: PathBuf,
    file: File,
    tables: Map<String, Value>,
    next_id: u64,
}

impl JsonDocumentStore {
    /// Opens `path`, creating an empty database if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;

        let mut raw = String::new();
        file.read_to_string(&mut raw).map_err(|e| StoreError::io(&path, e))?;

        let tables = if raw.trim().is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(tables)) => tables,
                Ok(_) => {
                    return Err(StoreError::Corrupt {
                        path,
                        source: serde::de::Error::custom("top level is not an object"),
                    })
                }
                Err(source) => return Err(StoreError::Corrupt { path, source }),
            }
        };

        let next_id = tables
            .get(DEFAULT_TABLE)
            .and_then(Value::as_object)
            .map(|docs| docs.keys().filter_map(|k| k.parse::<u64>().ok()).max().unwrap_or(0))
            .unwrap_or(0)
            + 1;

        debug!(path = %path.display(), documents = next_id - 1, "opened document store");
        Ok(Self {
            path,
            file,
            tables,
            next_id,
        })
    }

    /// Number of documents in the default table
    pub fn len(&self) -> usize {
        self.default_table().map_or(0, Map::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All documents in insertion order
    pub fn all(&self) -> Vec<Map<String, Value>> {
        let mut docs: Vec<(u64, Map<String, Value>)> = self
            .default_table()
            .map(|table| {
                table
                    .iter()
                    .filter_map(|(id, doc)| Some((id.parse().ok()?, doc.as_object()?.clone())))
                    .collect()
            })
            .unwrap_or_default();
        docs.sort_by_key(|(id, _)| *id);
        docs.into_iter().map(|(_, doc)| doc).collect()
    }

    /// Inserts every document as one write. Returns the assigned ids.
    pub fn insert_multiple(&mut self, documents: Vec<Map<String, Value>>) -> Result<Vec<u64>, StoreError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(documents.len());
        let mut next_id = self.next_id;
        let mut table = self.default_table().cloned().unwrap_or_default();
        for document in documents {
            table.insert(next_id.to_string(), Value::Object(document));
            ids.push(next_id);
            next_id += 1;
        }

        let mut tables = self.tables.clone();
        tables.insert(DEFAULT_TABLE.to_string(), Value::Object(table));
        self.write(&tables)?;

        // Only commit in memory once the file holds the batch
        self.tables = tables;
        self.next_id = next_id;
        Ok(ids)
    }

    /// Flushes and syncs the handle, then releases it
    pub fn close(mut self) -> Result<(), StoreError> {
        self.file.flush().map_err(|e| StoreError::io(&self.path, e))?;
        self.file.sync_all().map_err(|e| StoreError::io(&self.path, e))?;
        debug!(path = %self.path.display(), "closed document store");
        Ok(())
    }

    fn default_table(&self) -> Option<&Map<String, Value>> {
        self.tables.get(DEFAULT_TABLE).and_then(Value::as_object)
    }

    // Writes the new contents to "<path>.tmp", syncs it, then renames it over
    // the database. A failure at any step leaves the previous file intact.
    fn write(&mut self, tables: &Map<String, Value>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(tables).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.tmp_path();
        let mut staged = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        staged.write_all(&bytes).map_err(|e| StoreError::io(&tmp, e))?;
        staged.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
        drop(staged);

        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::io(&self.path, e))?;

        // The old handle still points at the replaced file
        self.file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| StoreError::io(&self.path, e))?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
