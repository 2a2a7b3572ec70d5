//! Prometheus metrics for the scanner.
//!
//! # Metrics Exposed
//!
//! - `film_scanner_captures_total` - Frames captured for storage
//! - `film_scanner_stills_total` - Still images captured
//! - `film_scanner_capture_failures_total` - Failed captures and stills
//! - `film_scanner_crops_found_total` - Auto-crops that selected a region
//! - `film_scanner_crops_missed_total` - Auto-crops that fell back to the full frame
//! - `film_scanner_crop_candidates` - Candidates admitted by the last auto-crop
//! - `film_scanner_uploads_total` - Images uploaded to remote storage
//! - `film_scanner_upload_failures_total` - Failed uploads
//! - `film_scanner_cached_images_total` - Images written to the local cache
//!
//! The HTTP server exposes them at `/metrics`.

mod collector;

pub use collector::{MetricsError, ScannerMetrics};
