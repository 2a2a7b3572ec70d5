//! Metrics collection and registry.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus registry holding the scanner's counters.
///
/// All metrics are atomics; share the registry behind an `Arc`.
pub struct ScannerMetrics {
    registry: Registry,

    captures: IntCounter,
    stills: IntCounter,
    capture_failures: IntCounter,

    crops_found: IntCounter,
    crops_missed: IntCounter,
    crop_candidates: IntGauge,

    uploads: IntCounter,
    upload_failures: IntCounter,
    cached_images: IntCounter,
}

impl ScannerMetrics {
    /// Creates a registry with every scanner metric registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let captures = IntCounter::new(
            "film_scanner_captures_total",
            "Frames captured for storage",
        )?;
        let stills = IntCounter::new("film_scanner_stills_total", "Still images captured")?;
        let capture_failures = IntCounter::new(
            "film_scanner_capture_failures_total",
            "Failed captures and stills",
        )?;

        let crops_found = IntCounter::new(
            "film_scanner_crops_found_total",
            "Auto-crops that selected a region",
        )?;
        let crops_missed = IntCounter::new(
            "film_scanner_crops_missed_total",
            "Auto-crops that fell back to the full frame",
        )?;
        let crop_candidates = IntGauge::new(
            "film_scanner_crop_candidates",
            "Candidates admitted by the size envelope in the last auto-crop",
        )?;

        let uploads = IntCounter::new(
            "film_scanner_uploads_total",
            "Images uploaded to remote storage",
        )?;
        let upload_failures = IntCounter::new(
            "film_scanner_upload_failures_total",
            "Failed uploads to remote storage",
        )?;
        let cached_images = IntCounter::new(
            "film_scanner_cached_images_total",
            "Images written to the local cache",
        )?;

        for metric in [
            &captures,
            &stills,
            &capture_failures,
            &crops_found,
            &crops_missed,
            &uploads,
            &upload_failures,
            &cached_images,
        ] {
            registry.register(Box::new(metric.clone()))?;
        }
        registry.register(Box::new(crop_candidates.clone()))?;

        Ok(Self {
            registry,
            captures,
            stills,
            capture_failures,
            crops_found,
            crops_missed,
            crop_candidates,
            uploads,
            upload_failures,
            cached_images,
        })
    }

    /// Counts a stored capture.
    pub fn record_capture(&self) {
        self.captures.inc();
    }

    /// Counts a developed still.
    pub fn record_still(&self) {
        self.stills.inc();
    }

    /// Counts a capture or still that produced nothing.
    pub fn record_capture_failure(&self) {
        self.capture_failures.inc();
    }

    /// Records an auto-crop. `admitted` is `None` when nothing was found.
    pub fn record_crop(&self, admitted: Option<usize>) {
        match admitted {
            Some(n) => {
                self.crops_found.inc();
                self.crop_candidates.set(n as i64);
            }
            None => {
                self.crops_missed.inc();
                self.crop_candidates.set(0);
            }
        }
    }

    /// Counts one uploaded file, or one failed upload.
    pub fn record_upload(&self, ok: bool) {
        if ok {
            self.uploads.inc();
        } else {
            self.upload_failures.inc();
        }
    }

    /// Counts an image written to the local cache.
    pub fn record_cached(&self) {
        self.cached_images.inc();
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        assert!(ScannerMetrics::new().is_ok());
    }

    #[test]
    fn test_counters_recorded() {
        let metrics = ScannerMetrics::new().unwrap();
        metrics.record_capture();
        metrics.record_capture();
        metrics.record_crop(Some(4));
        metrics.record_upload(true);
        metrics.record_upload(false);

        let output = metrics.encode().unwrap();
        assert!(output.contains("film_scanner_captures_total 2"));
        assert!(output.contains("film_scanner_crops_found_total 1"));
        assert!(output.contains("film_scanner_crop_candidates 4"));
        assert!(output.contains("film_scanner_uploads_total 1"));
        assert!(output.contains("film_scanner_upload_failures_total 1"));
    }

    #[test]
    fn test_missed_crop_resets_candidates() {
        let metrics = ScannerMetrics::new().unwrap();
        metrics.record_crop(Some(3));
        metrics.record_crop(None);

        let output = metrics.encode().unwrap();
        assert!(output.contains("film_scanner_crops_missed_total 1"));
        assert!(output.contains("film_scanner_crop_candidates 0"));
    }

    #[test]
    fn test_metrics_encode() {
        let metrics = ScannerMetrics::new().unwrap();
        let output = metrics.encode().unwrap();

        assert!(output.contains("film_scanner_stills_total"));
        assert!(output.contains("film_scanner_cached_images_total"));
    }
}
