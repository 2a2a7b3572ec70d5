//! In-memory storage backend for tests and offline runs.

use super::{image_mime, FileList, FileRef, StorageClient, StorageError, FOLDER_MIME, PAGE_SIZE};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

struct Entry {
    file: FileRef,
    parent: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    entries: BTreeMap<String, Entry>,
}

/// Storage that keeps everything in a map.
///
/// Listing order is creation order. Pages are [`PAGE_SIZE`] entries long
/// and page tokens are plain offsets.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
    offline: AtomicBool,
    rejected: Mutex<HashSet<String>>,
}

impl MemoryStorage {
    /// An empty, online store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with `StorageUnavailable` while `offline`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes uploads of `name` fail.
    pub fn reject_uploads_of(&self, name: &str) {
        if let Ok(mut rejected) = self.rejected.lock() {
            rejected.insert(name.to_string());
        }
    }

    /// Contents of an uploaded file.
    pub fn bytes(&self, id: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().ok()?;
        state.entries.get(id).map(|e| e.bytes.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::StorageUnavailable("storage is offline".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| StorageError::StorageUnavailable("storage state poisoned".to_string()))
    }

    fn insert(
        &self,
        name: &str,
        mime: &str,
        parent: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<FileRef, StorageError> {
        let mut state = self.lock()?;
        if let Some(parent) = parent {
            if !state.entries.contains_key(parent) {
                return Err(StorageError::NotFound(parent.to_string()));
            }
        }
        state.next_id += 1;
        // Zero-padded so map order is creation order
        let id = format!("{:08}", state.next_id);
        let file = FileRef {
            id: id.clone(),
            name: name.to_string(),
            mime_type: mime.to_string(),
        };
        state.entries.insert(
            id,
            Entry {
                file: file.clone(),
                parent: parent.map(str::to_string),
                bytes,
            },
        );
        Ok(file)
    }
}

impl StorageClient for MemoryStorage {
    fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<FileRef, StorageError> {
        self.insert(name, FOLDER_MIME, parent_id, Vec::new())
    }

    fn find_folder(&self, name: &str) -> Result<Option<FileRef>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .entries
            .values()
            .find(|e| e.file.is_folder() && e.file.name == name)
            .map(|e| e.file.clone()))
    }

    fn get_file(&self, id: &str) -> Result<FileRef, StorageError> {
        let state = self.lock()?;
        state
            .entries
            .get(id)
            .map(|e| e.file.clone())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn list_files(
        &self,
        parent_id: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<FileList, StorageError> {
        let state = self.lock()?;
        let start = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| StorageError::NotFound(format!("page token {}", token)))?,
            None => 0,
        };

        let matching: Vec<&FileRef> = state
            .entries
            .values()
            .filter(|e| e.parent.as_deref() == parent_id)
            .map(|e| &e.file)
            .collect();
        let files: Vec<FileRef> = matching
            .iter()
            .skip(start)
            .take(PAGE_SIZE)
            .map(|f| (*f).clone())
            .collect();
        let next = start + files.len();
        let next_page_token = (next < matching.len()).then(|| next.to_string());

        Ok(FileList {
            files,
            next_page_token,
        })
    }

    fn save_image(
        &self,
        bytes: &[u8],
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<FileRef, StorageError> {
        let rejected = self
            .rejected
            .lock()
            .map(|r| r.contains(name))
            .unwrap_or(false);
        if rejected {
            return Err(StorageError::StorageUnavailable(format!("upload of {} rejected", name)));
        }
        self.insert(name, image_mime(name), parent_id, bytes.to_vec())
    }

    fn delete_file(&self, id: &str) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state
            .entries
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }
}
