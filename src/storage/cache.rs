//! Filesystem image cache, one directory per project.

use super::StorageError;
use std::path::{Path, PathBuf};

/// On-disk cache of captured images.
///
/// Layout: `<root>/<project_id>/<name>`.
#[derive(Debug, Clone)]
pub struct LocalCache {
    root: PathBuf,
}

impl LocalCache {
    /// Opens the cache, creating the root directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        if !root.is_dir() {
            std::fs::create_dir_all(&root)?;
            tracing::info!(dir = %root.display(), "Created cache dir");
        }
        Ok(Self { root })
    }

    /// Directory holding the project directories.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes an image, replacing any image of the same name.
    pub fn cache_image(
        &self,
        bytes: &[u8],
        name: &str,
        project_id: &str,
    ) -> Result<(), StorageError> {
        let dir = self.project_dir(project_id)?;
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(checked(name)?);
        std::fs::write(&path, bytes)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Cached image");
        Ok(())
    }

    /// Reads a cached image.
    pub fn read_image(&self, project_id: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.project_dir(project_id)?.join(checked(name)?);
        std::fs::read(&path).map_err(|e| not_found_or_io(e, &path))
    }

    /// Names of the cached images of a project, sorted.
    ///
    /// A project with nothing cached lists as empty.
    pub fn list_project(&self, project_id: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.project_dir(project_id)?;
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Removes one cached image.
    pub fn delete_image(&self, project_id: &str, name: &str) -> Result<(), StorageError> {
        let path = self.project_dir(project_id)?.join(checked(name)?);
        std::fs::remove_file(&path).map_err(|e| not_found_or_io(e, &path))
    }

    /// Removes a project's directory and everything in it.
    pub fn clear_project(&self, project_id: &str) -> Result<(), StorageError> {
        let dir = self.project_dir(project_id)?;
        std::fs::remove_dir_all(&dir).map_err(|e| not_found_or_io(e, &dir))?;
        tracing::info!(project = project_id, "Cleared project cache");
        Ok(())
    }

    fn project_dir(&self, project_id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(checked(project_id)?))
    }
}

/// Rejects names that are empty or could leave their directory.
fn checked(name: &str) -> Result<&str, StorageError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(name)
}

fn not_found_or_io(e: std::io::Error, path: &Path) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(path.display().to_string())
    } else {
        StorageError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (tempfile::TempDir, LocalCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::open(dir.path().join("cache")).unwrap();
        (dir, cache)
    }

    #[test]
    fn test_cache_round_trip() {
        let (_dir, cache) = cache();
        cache.cache_image(b"one", "b.jpg", "roll-1").unwrap();
        cache.cache_image(b"two", "a.jpg", "roll-1").unwrap();

        assert_eq!(cache.read_image("roll-1", "b.jpg").unwrap(), b"one");
        assert_eq!(cache.list_project("roll-1").unwrap(), vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_unknown_project_lists_empty() {
        let (_dir, cache) = cache();
        assert!(cache.list_project("nothing").unwrap().is_empty());
    }

    #[test]
    fn test_delete_and_clear() {
        let (_dir, cache) = cache();
        cache.cache_image(b"x", "a.jpg", "p").unwrap();
        cache.cache_image(b"y", "b.jpg", "p").unwrap();

        cache.delete_image("p", "a.jpg").unwrap();
        assert_eq!(cache.list_project("p").unwrap(), vec!["b.jpg"]);
        assert!(matches!(
            cache.delete_image("p", "a.jpg"),
            Err(StorageError::NotFound(_))
        ));

        cache.clear_project("p").unwrap();
        assert!(cache.list_project("p").unwrap().is_empty());
        assert!(matches!(cache.clear_project("p"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_missing_image() {
        let (_dir, cache) = cache();
        assert!(matches!(
            cache.read_image("p", "none.jpg"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_path_escape_rejected() {
        let (_dir, cache) = cache();
        assert!(matches!(
            cache.cache_image(b"x", "../evil.jpg", "p"),
            Err(StorageError::InvalidName(_))
        ));
        assert!(matches!(
            cache.list_project(".."),
            Err(StorageError::InvalidName(_))
        ));
    }
}
