//! The peer's map of locally known files, shared between serve handlers
//! (reading piece bytes off disk) and the download driver (writing them).
//! Per the concurrency model this map is a single shared resource guarded
//! by one mutex; the open file descriptors it points at are not shared —
//! each read or write opens, seeks, and closes its own handle.

use crate::hash::PIECE_SIZE;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// A file the peer can serve and/or is downloading, keyed by
/// `"<group-id>::<filename>"`.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: PathBuf,
    pub size: u64,
    pub piece_hashes: Vec<String>,
    pub whole_hash: String,
    /// Pieces not yet successfully written; zero once the file is complete.
    pub remaining: usize,
}

impl LocalFile {
    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    pub fn piece_offset(piece_index: usize) -> u64 {
        piece_index as u64 * PIECE_SIZE
    }
}

/// `"<group-id>::<filename>"`, the key used both on the wire
/// (`request_file_piece`) and in this map.
pub fn file_id(group_id: &str, filename: &str) -> String {
    format!("{}::{}", group_id, filename)
}

#[derive(Default)]
pub struct LocalFiles {
    files: Mutex<HashMap<String, LocalFile>>,
}

impl LocalFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: String, file: LocalFile) {
        self.files.lock().unwrap().insert(id, file);
    }

    pub fn remove(&self, id: &str) {
        self.files.lock().unwrap().remove(id);
    }

    pub fn get(&self, id: &str) -> Option<LocalFile> {
        self.files.lock().unwrap().get(id).cloned()
    }

    /// Applies `f` to the entry for `id` and writes back the result,
    /// returning `false` if no such entry exists.
    pub fn update(&self, id: &str, f: impl FnOnce(&mut LocalFile)) -> bool {
        let mut files = self.files.lock().unwrap();
        match files.get_mut(id) {
            Some(file) => {
                f(file);
                true
            }
            None => false,
        }
    }
}
