//! Camera input and frame handling.
//!
//! This module provides the frame source: a camera with an explicit
//! open/close lifecycle, a background worker that streams frames to any
//! number of consumers, and an external-command still capture that is
//! mutually exclusive with streaming.

mod camera;
mod config;
mod frame;
mod still;
mod stream;
#[cfg(feature = "camera")]
mod webcam;

pub use camera::{Camera, CameraError, MockCamera};
pub use config::{
    CacheConfig, CaptureConfig, ConfigError, DriveConfig, FileConfig, OAuthConfig, ServerConfig,
    StillConfig,
};
pub use frame::{ChannelOrder, Frame, CHANNELS};
pub use still::{capture_still, capture_still_suspended, CommandStill, StillSource};
pub use stream::{FrameStream, LatestFrame};
#[cfg(feature = "camera")]
pub use webcam::Webcam;
