//! Film Scanner Library
//!
//! Turns a webcam into a film-scanning workstation: a live preview, still
//! capture, automatic cropping of the film frame out of the light-table
//! background, archival TIFF output and upload to a cloud drive with a
//! local cache for offline work.
//!
//! # Architecture
//!
//! ```text
//! capture → autocrop → tiff / preview → storage
//!    ↓                                    ↑
//!  stream (MJPEG)          server (HTTP, session)
//! ```
//!
//! The crop pipeline builds an ignore mask of glare and unsaturated
//! background, sweeps a range of binarization thresholds looking for the
//! film's outline as a rotated rectangle, and keeps the smallest candidate
//! whose size is plausible for a film frame.
//!
//! # Example
//!
//! ```no_run
//! use film_scanner::{
//!     autocrop::{auto_crop_or_full, CropConfig},
//!     capture::{Camera, CaptureConfig, MockCamera},
//!     tiff::{encode_tiff, TiffOptions},
//! };
//!
//! let mut camera = MockCamera::new();
//! camera.open(&CaptureConfig::default()).unwrap();
//! let frame = camera.read_frame().unwrap();
//!
//! // Falls back to the whole frame when no film is found
//! let (cropped, region) = auto_crop_or_full(frame, &CropConfig::default())
//!     .unwrap()
//!     .into_parts();
//! if let Some(region) = region {
//!     println!("film at {:?}", region);
//! }
//!
//! let tiff = encode_tiff(&cropped, &TiffOptions::default()).unwrap();
//! std::fs::write("scan.tiff", tiff).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod autocrop;
pub mod capture;
pub mod develop;
pub mod metrics;
pub mod preview;
#[cfg(feature = "server")]
pub mod server;
pub mod session;
pub mod storage;
pub mod tiff;

// Re-export commonly used types at crate root
pub use autocrop::{
    auto_crop, auto_crop_or_full, CropConfig, CropError, CropRegion, Cropped,
};
pub use capture::{Camera, CaptureConfig, FileConfig, Frame, FrameStream, MockCamera};
pub use tiff::{encode_tiff, TiffError, TiffOptions};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
