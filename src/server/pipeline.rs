//! Frame-to-file pipelines behind the capture and still endpoints.
//!
//! Both are synchronous and CPU bound; handlers run them on a blocking
//! thread.

use super::ApiError;
use crate::autocrop::{self, CropConfig, CropError, CropRegion};
use crate::capture::Frame;
use crate::develop;
use crate::metrics::ScannerMetrics;
use crate::preview;
use crate::tiff::{self, TiffOptions};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// File format of a captured image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Uncompressed archival TIFF.
    #[default]
    Tiff,
    /// Compressed JPEG.
    Jpeg,
}

impl OutputFormat {
    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Tiff => "tiff",
            OutputFormat::Jpeg => "jpg",
        }
    }
}

/// Manual crop in fractional coordinates. Zero width or height means
/// "to the far edge", so the default is the whole frame.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct NormalizedRegion {
    /// Left edge, as a fraction of the width.
    #[serde(default)]
    pub x: f64,
    /// Top edge, as a fraction of the height.
    #[serde(default)]
    pub y: f64,
    /// Width fraction; 0 reaches the right edge.
    #[serde(default)]
    pub w: f64,
    /// Height fraction; 0 reaches the bottom edge.
    #[serde(default)]
    pub h: f64,
}

/// An image ready to be stored.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// File name, including the extension.
    pub name: String,
    /// Encoded file contents.
    pub bytes: Vec<u8>,
    /// Crop applied to the source frame, `None` when uncropped.
    pub region: Option<CropRegion>,
}

/// Timestamped file name, unique to the millisecond.
pub fn file_name(prefix: &str, format: OutputFormat) -> String {
    format!(
        "{}-{}.{}",
        prefix,
        Utc::now().format("%Y%m%d-%H%M%S-%3f"),
        format.extension()
    )
}

/// Auto-crops a streamed frame (when `crop` is set) and encodes it.
///
/// Finding no crop is not an error: the whole frame is kept.
pub fn process_capture(
    frame: Frame,
    crop: Option<&CropConfig>,
    format: OutputFormat,
    jpeg_quality: u8,
    metrics: &ScannerMetrics,
) -> Result<EncodedImage, ApiError> {
    let (frame, region) = match crop {
        None => (frame, None),
        Some(config) => {
            let cropped = autocrop::auto_crop_or_full(frame, config)?;
            metrics.record_crop(cropped.admitted());
            cropped.into_parts()
        }
    };

    let bytes = encode(&frame, format, jpeg_quality)?;
    Ok(EncodedImage {
        name: file_name("scan", format),
        bytes,
        region,
    })
}

/// Crops, white-balances and optionally inverts a still, then encodes it
/// as JPEG.
pub fn develop_still(
    frame: Frame,
    region: &NormalizedRegion,
    invert: bool,
    jpeg_quality: u8,
) -> Result<EncodedImage, ApiError> {
    let crop = CropRegion::from_normalized(
        region.x,
        region.y,
        region.w,
        region.h,
        frame.rows(),
        frame.cols(),
    )
    .map_err(|e| match e {
        CropError::InvalidRegion(msg) => ApiError::BadRequest(msg),
        other => ApiError::Crop(other),
    })?;

    let mut developed = frame.region(&crop)?;
    develop::white_balance(&mut developed);
    if invert {
        develop::invert(&mut developed);
    }

    let bytes = encode(&developed, OutputFormat::Jpeg, jpeg_quality)?;
    Ok(EncodedImage {
        name: file_name("still", OutputFormat::Jpeg),
        bytes,
        region: Some(crop),
    })
}

fn encode(frame: &Frame, format: OutputFormat, jpeg_quality: u8) -> Result<Vec<u8>, ApiError> {
    match format {
        OutputFormat::Tiff => Ok(tiff::encode_tiff(frame, &TiffOptions::default())?),
        OutputFormat::Jpeg => Ok(preview::encode_jpeg(frame, jpeg_quality)?),
    }
}
