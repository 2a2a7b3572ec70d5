//! Google Drive v3 REST client.
//!
//! Uses the blocking `reqwest` client. It must be created, used and
//! dropped on a blocking thread, never directly on the async runtime.

use super::{image_mime, FileList, FileRef, StorageClient, StorageError, FOLDER_MIME, PAGE_SIZE};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const FILE_FIELDS: &str = "id,name,mimeType";
const UPLOAD_BOUNDARY: &str = "film-scanner-upload";

/// Drive client authorized by one OAuth access token.
pub struct DriveClient {
    http: Client,
    token: String,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    /// A client acting with the user's `access_token`.
    pub fn new(access_token: impl Into<String>) -> Result<Self, StorageError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(unavailable)?;
        Ok(Self {
            http,
            token: access_token.into(),
            api_base: API_BASE.to_string(),
            upload_base: UPLOAD_BASE.to_string(),
        })
    }

    /// Points the client at another server, e.g. a local test double.
    pub fn with_base_urls(mut self, api_base: &str, upload_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.upload_base = upload_base.trim_end_matches('/').to_string();
        self
    }

    fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, StorageError> {
        let sent = request
            .bearer_auth(&self.token)
            .send()
            .map_err(unavailable)?;
        let response = checked(sent, what)?;
        response.json::<T>().map_err(unavailable)
    }
}

impl StorageClient for DriveClient {
    fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<FileRef, StorageError> {
        let mut metadata = json!({ "name": name, "mimeType": FOLDER_MIME });
        if let Some(parent) = parent_id {
            metadata["parents"] = json!([parent]);
        }
        let request = self
            .http
            .post(format!("{}/files", self.api_base))
            .query(&[("fields", FILE_FIELDS)])
            .json(&metadata);
        let folder: FileRef = self.send(request, name)?;
        tracing::info!(name, id = %folder.id, "Created drive folder");
        Ok(folder)
    }

    fn find_folder(&self, name: &str) -> Result<Option<FileRef>, StorageError> {
        let request = self.http.get(format!("{}/files", self.api_base)).query(&[
            ("q", folder_query(name).as_str()),
            ("pageSize", "1"),
            ("spaces", "drive"),
            ("fields", "files(id,name,mimeType)"),
        ]);
        let list: FileList = self.send(request, name)?;
        Ok(list.files.into_iter().next())
    }

    fn get_file(&self, id: &str) -> Result<FileRef, StorageError> {
        let request = self
            .http
            .get(format!("{}/files/{}", self.api_base, id))
            .query(&[("fields", FILE_FIELDS)]);
        self.send(request, id)
    }

    fn list_files(
        &self,
        parent_id: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<FileList, StorageError> {
        let page_size = PAGE_SIZE.to_string();
        let query = listing_query(parent_id);
        let mut params = vec![
            ("q", query.as_str()),
            ("pageSize", page_size.as_str()),
            ("spaces", "drive"),
            ("fields", "nextPageToken,files(id,name,mimeType)"),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        let request = self
            .http
            .get(format!("{}/files", self.api_base))
            .query(&params);
        self.send(request, parent_id.unwrap_or("root"))
    }

    fn save_image(
        &self,
        bytes: &[u8],
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<FileRef, StorageError> {
        let body = multipart_body(bytes, name, parent_id);
        let request = self
            .http
            .post(format!("{}/files", self.upload_base))
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", UPLOAD_BOUNDARY),
            )
            .body(body);
        let file: FileRef = self.send(request, name)?;
        tracing::info!(name, id = %file.id, bytes = bytes.len(), "Uploaded image");
        Ok(file)
    }

    fn delete_file(&self, id: &str) -> Result<(), StorageError> {
        let response = self
            .http
            .delete(format!("{}/files/{}", self.api_base, id))
            .bearer_auth(&self.token)
            .send()
            .map_err(unavailable)?;
        checked(response, id)?;
        tracing::info!(id, "Deleted drive file");
        Ok(())
    }
}

fn checked(response: Response, what: &str) -> Result<Response, StorageError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(StorageError::NotFound(what.to_string())),
        status => {
            let body = response.text().unwrap_or_default();
            Err(StorageError::StorageUnavailable(format!("{}: {}", status, body)))
        }
    }
}

fn unavailable(e: reqwest::Error) -> StorageError {
    StorageError::StorageUnavailable(e.to_string())
}

/// Escapes a value for a single-quoted Drive query string.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn folder_query(name: &str) -> String {
    format!(
        "mimeType='{}' and name='{}' and trashed=false",
        FOLDER_MIME,
        escape_query(name)
    )
}

fn listing_query(parent_id: Option<&str>) -> String {
    let mut query = format!(
        "(mimeType='image/jpeg' or mimeType='image/tiff' or mimeType='{}') and trashed=false",
        FOLDER_MIME
    );
    if let Some(parent) = parent_id {
        query.push_str(&format!(" and '{}' in parents", escape_query(parent)));
    }
    query
}

/// `multipart/related` upload body: JSON metadata, then the media.
fn multipart_body(bytes: &[u8], name: &str, parent_id: Option<&str>) -> Vec<u8> {
    let mime = image_mime(name);
    let mut metadata = json!({ "name": name, "mimeType": mime });
    if let Some(parent) = parent_id {
        metadata["parents"] = json!([parent]);
    }

    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: {mime}\r\n\r\n",
            b = UPLOAD_BOUNDARY,
            meta = metadata,
            mime = mime
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", UPLOAD_BOUNDARY).as_bytes());
    body
}
