//! Batch upload of a cached project.

use super::{LocalCache, StorageClient, StorageError};
use serde::Serialize;

/// Outcome of [`upload_project`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    /// Images uploaded and removed from the cache.
    pub uploaded: Vec<String>,
    /// Images that stayed cached, with the reason.
    pub failed: Vec<(String, String)>,
}

impl UploadReport {
    /// Whether every cached image was uploaded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Uploads every cached image of `project_id` into the folder `folder_id`.
///
/// Each image is removed from the cache once its upload succeeds. A failed
/// upload is recorded and the image stays cached for a later attempt; the
/// remaining images are still tried.
pub fn upload_project(
    cache: &LocalCache,
    client: &dyn StorageClient,
    project_id: &str,
    folder_id: &str,
) -> Result<UploadReport, StorageError> {
    let names = cache.list_project(project_id)?;
    tracing::info!(
        project = project_id,
        images = names.len(),
        "Uploading cached project"
    );

    let mut report = UploadReport::default();
    for name in names {
        let result = cache
            .read_image(project_id, &name)
            .and_then(|bytes| client.save_image(&bytes, &name, Some(folder_id)));

        match result {
            Ok(file) => {
                tracing::debug!(name = %name, id = %file.id, "Uploaded cached image");
                if let Err(e) = cache.delete_image(project_id, &name) {
                    tracing::warn!(
                        name = %name,
                        "Uploaded image could not be removed from cache: {}",
                        e
                    );
                }
                report.uploaded.push(name);
            }
            Err(e) => {
                tracing::warn!(name = %name, "Upload failed: {}", e);
                report.failed.push((name, e.to_string()));
            }
        }
    }

    tracing::info!(
        uploaded = report.uploaded.len(),
        failed = report.failed.len(),
        "Upload finished"
    );
    Ok(report)
}
