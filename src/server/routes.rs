//! Route table and handlers.

use super::pipeline::{self, EncodedImage, NormalizedRegion, OutputFormat};
use super::{wait_for_shutdown, ApiError, AppState};
use crate::autocrop::CropRegion;
use crate::capture::FrameStream;
use crate::preview;
use crate::session::{SessionError, SessionToken};
use crate::storage::{
    ensure_folder, image_mime, upload_project, FileList, FileRef, StorageClient, UploadReport,
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

type SharedState = Arc<AppState>;

/// Where a capture is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// The project folder on the remote drive.
    #[default]
    Drive,
    /// The local cache, for a later batch upload.
    Cache,
}

/// Builds the application router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/login", get(login))
        .route("/oauth2callback", get(oauth_callback))
        .route("/stream", get(preview_stream))
        .route("/projects", get(list_projects).post(create_project))
        .route("/files/:id", delete(delete_file))
        .route("/projects/:id/capture", post(capture))
        .route("/projects/:id/still", post(still))
        .route("/projects/:id/cache", get(list_cache).delete(clear_cache))
        .route(
            "/projects/:id/cache/:name",
            get(read_cached).delete(delete_cached),
        )
        .route("/projects/:id/upload", post(upload))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handler for the /health endpoint.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Handler for the /metrics endpoint.
async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

async fn login(State(state): State<SharedState>) -> Result<Redirect, ApiError> {
    if !state.oauth.is_configured() {
        return Err(ApiError::BadRequest("OAuth client is not configured".to_string()));
    }
    let url = state.oauth.authorization_url()?;
    Ok(Redirect::to(url.as_str()))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

async fn oauth_callback(
    State(state): State<SharedState>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    if let Some(error) = params.error {
        return Err(SessionError::Exchange(error).into());
    }
    let code = params
        .code
        .ok_or_else(|| ApiError::BadRequest("missing authorization code".to_string()))?;

    let token = state.oauth.exchange_code(&code).await?;
    let cookie = token.set_cookie()?;
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/projects")).into_response())
}

/// Live MJPEG preview of the frame stream.
///
/// Each client gets its own receiver and only ever sees the newest frame.
/// The response ends when the stream stops or the server shuts down.
async fn preview_stream(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let frames = state
        .stream
        .as_ref()
        .ok_or(ApiError::StreamUnavailable)?
        .subscribe();
    let shutdown = state.shutdown.clone();
    let scale = state.config.server.preview_scale;
    let quality = state.config.server.jpeg_quality;
    tracing::info!("Preview client connected");

    let parts = futures_util::stream::unfold(
        (frames, shutdown),
        move |(mut frames, mut shutdown)| async move {
            loop {
                let frame = tokio::select! {
                    next = FrameStream::next_frame(&mut frames) => next.ok()?,
                    _ = wait_for_shutdown(&mut shutdown) => return None,
                };
                let encoded = tokio::task::spawn_blocking(move || {
                    preview::preview_jpeg(&frame, scale, quality)
                })
                .await;
                match encoded {
                    Ok(Ok(jpeg)) => {
                        let part = preview::part(&jpeg);
                        return Some((Ok::<_, Infallible>(part), (frames, shutdown)));
                    }
                    Ok(Err(e)) => tracing::warn!("Dropping preview frame: {}", e),
                    Err(e) => {
                        tracing::warn!("Preview encoder failed: {}", e);
                        return None;
                    }
                }
            }
        },
    );

    Ok((
        [(header::CONTENT_TYPE, preview::content_type())],
        Body::from_stream(parts),
    )
        .into_response())
}

#[derive(Debug, Default, Deserialize)]
struct PageParams {
    page_token: Option<String>,
}

/// Project folders inside the configured root folder.
async fn list_projects(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> Result<Json<FileList>, ApiError> {
    let token = session(&headers)?;
    let root_name = state.config.drive.root_folder.clone();
    let list = with_storage(&state, token, move |client| {
        let root = ensure_folder(client, &root_name, None)?;
        let mut list = client.list_files(Some(&root.id), params.page_token.as_deref())?;
        list.files.retain(FileRef::is_folder);
        Ok(list)
    })
    .await?;
    Ok(Json(list))
}

#[derive(Debug, Deserialize)]
struct CreateParams {
    name: String,
}

async fn create_project(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<CreateParams>,
) -> Result<(StatusCode, Json<FileRef>), ApiError> {
    let token = session(&headers)?;
    let name = params.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("project name is empty".to_string()));
    }

    let root_name = state.config.drive.root_folder.clone();
    let folder = with_storage(&state, token, move |client| {
        let root = ensure_folder(client, &root_name, None)?;
        Ok(client.create_folder(&name, Some(&root.id))?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

async fn delete_file(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let token = session(&headers)?;
    with_storage(&state, token, move |client| Ok(client.delete_file(&id)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct CaptureParams {
    #[serde(default)]
    target: Target,
    #[serde(default)]
    format: OutputFormat,
    #[serde(default = "default_true")]
    autocrop: bool,
}

/// A stored capture.
#[derive(Debug, Serialize)]
struct Stored {
    name: String,
    /// Remote file id, `None` for cached images.
    id: Option<String>,
    target: Target,
    region: Option<CropRegion>,
}

/// Captures the newest streamed frame into a project.
async fn capture(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Query(params): Query<CaptureParams>,
) -> Result<Json<Stored>, ApiError> {
    // Nothing is captured for a request that could not be stored
    let token = match params.target {
        Target::Drive => Some(session(&headers)?),
        Target::Cache => None,
    };
    let frame = state
        .stream
        .as_ref()
        .ok_or(ApiError::StreamUnavailable)?
        .latest()
        .ok_or(ApiError::StreamUnavailable)?;

    let crop = params.autocrop.then(|| state.config.crop.clone());
    let quality = state.config.server.jpeg_quality;
    let metrics = Arc::clone(&state.metrics);
    let format = params.format;
    let processed = blocking(move || {
        pipeline::process_capture((*frame).clone(), crop.as_ref(), format, quality, &metrics)
    })
    .await;

    let image = match processed {
        Ok(image) => image,
        Err(e) => {
            state.metrics.record_capture_failure();
            return Err(e);
        }
    };
    state.metrics.record_capture();
    tracing::info!(
        project = %project_id,
        name = %image.name,
        bytes = image.bytes.len(),
        "Captured frame"
    );

    let stored = match token {
        Some(token) => upload_image(&state, token, &project_id, image).await?,
        None => cache_image(&state, &project_id, image).await?,
    };
    Ok(Json(stored))
}

/// Takes a still with the stream suspended, develops it and caches it.
async fn still(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    Query(region): Query<NormalizedRegion>,
) -> Result<Json<Stored>, ApiError> {
    let stream = Arc::clone(state.stream.as_ref().ok_or(ApiError::StreamUnavailable)?);
    let source = (state.stills)();
    let invert = state.config.still.invert;
    let quality = state.config.server.jpeg_quality;

    let developed = blocking(move || {
        let frame = stream.capture_still(source)?;
        pipeline::develop_still(frame, &region, invert, quality)
    })
    .await;

    let image = match developed {
        Ok(image) => image,
        Err(e) => {
            state.metrics.record_capture_failure();
            return Err(e);
        }
    };
    state.metrics.record_still();
    Ok(Json(cache_image(&state, &project_id, image).await?))
}

async fn list_cache(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let cache = state.cache.clone();
    let names = blocking(move || Ok(cache.list_project(&project_id)?)).await?;
    Ok(Json(names))
}

/// Drops a project's cache. Clearing an empty cache succeeds.
async fn clear_cache(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let cache = state.cache.clone();
    match blocking(move || Ok(cache.clear_project(&project_id)?)).await {
        Ok(()) | Err(ApiError::NotFound(_)) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(e),
    }
}

async fn read_cached(
    State(state): State<SharedState>,
    Path((project_id, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let cache = state.cache.clone();
    let mime = image_mime(&name);
    let bytes = blocking(move || Ok(cache.read_image(&project_id, &name)?)).await?;
    Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
}

async fn delete_cached(
    State(state): State<SharedState>,
    Path((project_id, name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let cache = state.cache.clone();
    blocking(move || Ok(cache.delete_image(&project_id, &name)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Uploads a project's cached images into its drive folder.
async fn upload(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> Result<Json<UploadReport>, ApiError> {
    let token = session(&headers)?;
    let cache = state.cache.clone();
    let report = with_storage(&state, token, move |client| {
        let folder = client.get_file(&project_id)?;
        if !folder.is_folder() {
            return Err(ApiError::BadRequest(format!("{} is not a folder", project_id)));
        }
        Ok(upload_project(&cache, client, &project_id, &folder.id)?)
    })
    .await?;

    for _ in &report.uploaded {
        state.metrics.record_upload(true);
    }
    for _ in &report.failed {
        state.metrics.record_upload(false);
    }
    Ok(Json(report))
}

async fn upload_image(
    state: &AppState,
    token: SessionToken,
    project_id: &str,
    image: EncodedImage,
) -> Result<Stored, ApiError> {
    let EncodedImage {
        name,
        bytes,
        region,
    } = image;
    let folder = project_id.to_string();
    let file_name = name.clone();
    let uploaded = with_storage(state, token, move |client| {
        Ok(client.save_image(&bytes, &file_name, Some(&folder))?)
    })
    .await;
    state.metrics.record_upload(uploaded.is_ok());

    Ok(Stored {
        name,
        id: Some(uploaded?.id),
        target: Target::Drive,
        region,
    })
}

async fn cache_image(
    state: &AppState,
    project_id: &str,
    image: EncodedImage,
) -> Result<Stored, ApiError> {
    let EncodedImage {
        name,
        bytes,
        region,
    } = image;
    let cache = state.cache.clone();
    let project = project_id.to_string();
    let file_name = name.clone();
    blocking(move || Ok(cache.cache_image(&bytes, &file_name, &project)?)).await?;
    state.metrics.record_cached();

    Ok(Stored {
        name,
        id: None,
        target: Target::Cache,
        region,
    })
}

/// The request's session token; expired tokens are rejected.
fn session(headers: &HeaderMap) -> Result<SessionToken, ApiError> {
    let cookies: Vec<&str> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    if cookies.is_empty() {
        return Err(SessionError::Missing.into());
    }
    let token = SessionToken::from_cookie_header(&cookies.join("; "))?;
    token.ensure_valid()?;
    Ok(token)
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Runs `f` against the user's storage on a blocking thread.
async fn with_storage<T, F>(state: &AppState, token: SessionToken, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn StorageClient) -> Result<T, ApiError> + Send + 'static,
{
    let factory = Arc::clone(&state.storage);
    blocking(move || {
        let client = factory(&token)?;
        f(client.as_ref())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::super::{AppState, Server, StillFactory};
    use super::*;
    use crate::capture::{
        CameraError, CaptureConfig, FileConfig, Frame, MockCamera, OAuthConfig, StillSource,
    };
    use crate::metrics::ScannerMetrics;
    use crate::session::{OAuthClient, COOKIE_NAME};
    use crate::storage::{LocalCache, MemoryStorage, StorageError};
    use chrono::{Duration, Utc};
    use tokio::net::TcpListener;
    use tokio::sync::watch;

    struct GrayStill;

    impl StillSource for GrayStill {
        fn capture(&self) -> Result<Frame, CameraError> {
            Ok(Frame::filled(40, 60, [30, 30, 30]))
        }
    }

    struct Harness {
        base: String,
        client: reqwest::Client,
        storage: Arc<MemoryStorage>,
        stop: watch::Sender<bool>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }
    }

    async fn harness(with_stream: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(MemoryStorage::new());
        let shared = Arc::clone(&storage);
        let (stop, shutdown) = watch::channel(false);

        let stream = if with_stream {
            let config = CaptureConfig {
                frame_interval_ms: 5,
                ..CaptureConfig::with_dimensions(64, 48)
            };
            let stream = FrameStream::spawn(|| Box::new(MockCamera::new()), config).unwrap();
            FrameStream::next_frame(&mut stream.subscribe()).await.unwrap();
            Some(Arc::new(stream))
        } else {
            None
        };

        let stills: StillFactory = Arc::new(|| Box::new(GrayStill) as Box<dyn StillSource + Send>);
        let state = AppState {
            config: FileConfig::default(),
            stream,
            cache: LocalCache::open(dir.path().join("cache")).unwrap(),
            metrics: Arc::new(ScannerMetrics::new().unwrap()),
            oauth: OAuthClient::new(OAuthConfig::default()),
            storage: Arc::new(
                move |_token: &SessionToken| -> Result<Arc<dyn StorageClient>, StorageError> {
                    Ok(Arc::clone(&shared) as Arc<dyn StorageClient>)
                },
            ),
            stills,
            shutdown,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(Server::new(state).serve(listener));

        Harness {
            base,
            client: reqwest::Client::new(),
            storage,
            stop,
            _dir: dir,
        }
    }

    fn cookie() -> String {
        let token = SessionToken::new("token", Utc::now() + Duration::hours(1));
        format!("{}={}", COOKIE_NAME, token.encode().unwrap())
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let h = harness(false).await;

        let health = h.client.get(h.url("/health")).send().await.unwrap();
        assert_eq!(health.status(), 200);
        assert_eq!(health.text().await.unwrap(), "OK");

        let metrics = h.client.get(h.url("/metrics")).send().await.unwrap();
        assert_eq!(metrics.status(), 200);
        assert!(metrics
            .text()
            .await
            .unwrap()
            .contains("film_scanner_captures_total"));
    }

    #[tokio::test]
    async fn test_capture_to_cache() {
        let h = harness(true).await;

        let response = h
            .client
            .post(h.url("/projects/roll-1/capture?target=cache&format=jpeg&autocrop=false"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let stored: serde_json::Value = response.json().await.unwrap();
        assert_eq!(stored["target"], "cache");
        let name = stored["name"].as_str().unwrap().to_string();
        assert!(name.ends_with(".jpg"));

        let names: Vec<String> = h
            .client
            .get(h.url("/projects/roll-1/cache"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(names, vec![name.clone()]);

        let image = h
            .client
            .get(h.url(&format!("/projects/roll-1/cache/{}", name)))
            .send()
            .await
            .unwrap();
        assert_eq!(image.headers()["content-type"], "image/jpeg");
        let decoded = image::load_from_memory(&image.bytes().await.unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));

        let deleted = h
            .client
            .delete(h.url(&format!("/projects/roll-1/cache/{}", name)))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), 204);

        let cleared = h
            .client
            .delete(h.url("/projects/roll-1/cache"))
            .send()
            .await
            .unwrap();
        assert_eq!(cleared.status(), 204);
    }

    #[tokio::test]
    async fn test_drive_requires_session() {
        let h = harness(true).await;

        let capture = h
            .client
            .post(h.url("/projects/roll-1/capture"))
            .send()
            .await
            .unwrap();
        assert_eq!(capture.status(), 401);

        let expired = SessionToken::new("token", Utc::now() - Duration::minutes(1));
        let projects = h
            .client
            .get(h.url("/projects"))
            .header(
                "cookie",
                format!("{}={}", COOKIE_NAME, expired.encode().unwrap()),
            )
            .send()
            .await
            .unwrap();
        assert_eq!(projects.status(), 401);
    }

    #[tokio::test]
    async fn test_project_capture_and_upload() {
        let h = harness(true).await;

        let created = h
            .client
            .post(h.url("/projects?name=Roll%2042"))
            .header("cookie", cookie())
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), 201);
        let folder: FileRef = created.json().await.unwrap();
        assert_eq!(folder.name, "Roll 42");

        let projects: FileList = h
            .client
            .get(h.url("/projects"))
            .header("cookie", cookie())
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(projects.files, vec![folder.clone()]);

        let uploaded: serde_json::Value = h
            .client
            .post(h.url(&format!(
                "/projects/{}/capture?format=tiff&autocrop=false",
                folder.id
            )))
            .header("cookie", cookie())
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(uploaded["target"], "drive");
        let id = uploaded["id"].as_str().unwrap();
        assert_eq!(&h.storage.bytes(id).unwrap()[..2], b"II");

        // Cache one capture, then batch-upload it
        let cached = h
            .client
            .post(h.url(&format!(
                "/projects/{}/capture?target=cache&format=jpeg&autocrop=false",
                folder.id
            )))
            .send()
            .await
            .unwrap();
        assert_eq!(cached.status(), 200);

        let report: serde_json::Value = h
            .client
            .post(h.url(&format!("/projects/{}/upload", folder.id)))
            .header("cookie", cookie())
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report["uploaded"].as_array().unwrap().len(), 1);
        assert!(report["failed"].as_array().unwrap().is_empty());

        let listing = h.storage.list_files(Some(&folder.id), None).unwrap();
        assert_eq!(listing.files.len(), 2);

        let removed = h
            .client
            .delete(h.url(&format!("/files/{}", id)))
            .header("cookie", cookie())
            .send()
            .await
            .unwrap();
        assert_eq!(removed.status(), 204);
        let missing = h
            .client
            .delete(h.url(&format!("/files/{}", id)))
            .header("cookie", cookie())
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
    }

    #[tokio::test]
    async fn test_still_is_cached() {
        let h = harness(true).await;

        let response = h
            .client
            .post(h.url("/projects/roll-1/still?x=0&y=0&w=0.5&h=0.5"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let stored: serde_json::Value = response.json().await.unwrap();
        assert_eq!(stored["target"], "cache");
        assert_eq!(stored["region"]["width"], 30);
        assert_eq!(stored["region"]["height"], 20);

        let bad = h
            .client
            .post(h.url("/projects/roll-1/still?x=2"))
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), 400);
    }

    #[tokio::test]
    async fn test_preview_stream() {
        let h = harness(true).await;

        let mut response = h.client.get(h.url("/stream")).send().await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()["content-type"],
            "multipart/x-mixed-replace;boundary=MJPEGBOUNDARY"
        );
        let chunk = response.chunk().await.unwrap().unwrap();
        assert!(chunk.starts_with(b"\r\n--MJPEGBOUNDARY\r\nContent-Type: image/jpeg"));

        h.stop.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_no_stream_is_unavailable() {
        let h = harness(false).await;

        let stream = h.client.get(h.url("/stream")).send().await.unwrap();
        assert_eq!(stream.status(), 503);

        let capture = h
            .client
            .post(h.url("/projects/roll-1/capture?target=cache"))
            .send()
            .await
            .unwrap();
        assert_eq!(capture.status(), 503);
    }
}
