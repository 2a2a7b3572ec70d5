//! Image storage: remote drive folders and the local offline cache.
//!
//! [`StorageClient`] is the narrow interface the rest of the crate uses for
//! remote storage. [`LocalCache`] keeps captures on disk, one directory per
//! project, until they are uploaded with [`upload_project`].

mod cache;
#[cfg(feature = "server")]
mod drive;
mod memory;
mod upload;

pub use cache::LocalCache;
#[cfg(feature = "server")]
pub use drive::DriveClient;
pub use memory::MemoryStorage;
pub use upload::{upload_project, UploadReport};

use serde::{Deserialize, Serialize};

/// MIME type of drive folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Number of entries per page of [`StorageClient::list_files`].
pub const PAGE_SIZE: usize = 10;

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend could not be reached or rejected the request.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    /// The named resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A file or project name that would escape its directory.
    #[error("invalid name: {0:?}")]
    InvalidName(String),
    /// Local filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A remote file or folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    /// Backend file id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Empty when the backend did not report one.
    #[serde(default)]
    pub mime_type: String,
}

impl FileRef {
    /// Whether this is a folder.
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    /// Files on this page.
    #[serde(default)]
    pub files: Vec<FileRef>,
    /// Token for the next page, `None` on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Remote storage operations.
///
/// Calls block; async callers run them on a blocking thread.
pub trait StorageClient: Send + Sync {
    /// Creates a folder, at the top level when `parent_id` is `None`.
    fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<FileRef, StorageError>;

    /// Finds a folder by exact name.
    fn find_folder(&self, name: &str) -> Result<Option<FileRef>, StorageError>;

    /// Looks up a file or folder by id.
    fn get_file(&self, id: &str) -> Result<FileRef, StorageError>;

    /// Lists images and folders inside `parent_id`, [`PAGE_SIZE`] at a time.
    fn list_files(
        &self,
        parent_id: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<FileList, StorageError>;

    /// Uploads an image. The MIME type follows from the file name.
    fn save_image(
        &self,
        bytes: &[u8],
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<FileRef, StorageError>;

    /// Deletes a file or folder by id.
    fn delete_file(&self, id: &str) -> Result<(), StorageError>;
}

/// Returns the folder called `name`, creating it when missing.
pub fn ensure_folder(
    client: &dyn StorageClient,
    name: &str,
    parent_id: Option<&str>,
) -> Result<FileRef, StorageError> {
    match client.find_folder(name)? {
        Some(folder) => Ok(folder),
        None => {
            tracing::info!(name, "Creating folder");
            client.create_folder(name, parent_id)
        }
    }
}

/// MIME type of an image file name.
pub fn image_mime(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".tif") || lower.ends_with(".tiff") {
        "image/tiff"
    } else if lower.ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}
