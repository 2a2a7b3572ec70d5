//! The device behind the live preview.
//!
//! A camera has an explicit open/close lifecycle and a single owner, the
//! stream worker. Tests and camera-less builds use [`MockCamera`].

use super::{CaptureConfig, Frame};
use thiserror::Error;

/// Device and still-capture failures.
#[derive(Debug, Error)]
pub enum CameraError {
    /// No device, or it is already open.
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),
    /// A still was requested while the camera is streaming.
    #[error("camera device is busy streaming")]
    DeviceBusy,
    /// The camera is not open.
    #[error("camera device is closed")]
    DeviceClosed,
    /// The device or still command failed to deliver a frame.
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    /// A frame decoded to zero pixels.
    #[error("captured frame is empty")]
    EmptyFrame,
    /// The device rejected the requested format.
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    /// Streaming could not be restored after a still.
    #[error("streaming could not be resumed after still capture: {0}")]
    ReopenFailed(Box<CameraError>),
}

/// A video device that can be opened, read and released.
pub trait Camera {
    /// Acquires the device exclusively.
    ///
    /// Fails with [`CameraError::DeviceUnavailable`] if there is no device
    /// or the camera is already open.
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError>;

    /// Blocks until the next frame is available.
    ///
    /// Fails with [`CameraError::DeviceClosed`] when the camera is not open.
    fn read_frame(&mut self) -> Result<Frame, CameraError>;

    /// Checks if the camera is currently open.
    fn is_open(&self) -> bool;

    /// Closes the camera and releases the device.
    fn close(&mut self);
}

/// Synthetic camera.
///
/// Without a template frame it produces a deterministic gradient of the
/// configured size. An open budget simulates a device that disappears
/// after a number of successful opens.
#[derive(Debug, Default)]
pub struct MockCamera {
    config: Option<CaptureConfig>,
    template: Option<Frame>,
    opens_remaining: Option<u32>,
    sequence: u64,
}

impl MockCamera {
    /// A closed mock camera producing gradient frames.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every captured frame is a copy of `frame`.
    pub fn with_frame(frame: Frame) -> Self {
        Self {
            template: Some(frame),
            ..Self::default()
        }
    }

    /// Only `opens` calls to [`Camera::open`] succeed; later ones fail
    /// with [`CameraError::DeviceUnavailable`].
    pub fn with_open_budget(mut self, opens: u32) -> Self {
        self.opens_remaining = Some(opens);
        self
    }
}

impl Camera for MockCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        if self.config.is_some() {
            return Err(CameraError::DeviceUnavailable(
                "mock camera already open".to_string(),
            ));
        }
        if let Some(remaining) = self.opens_remaining.as_mut() {
            if *remaining == 0 {
                return Err(CameraError::DeviceUnavailable(
                    "mock camera disconnected".to_string(),
                ));
            }
            *remaining -= 1;
        }
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.config = Some(config.clone());
        tracing::info!("MockCamera opened with config: {:?}", config);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let config = self.config.as_ref().ok_or(CameraError::DeviceClosed)?;
        self.sequence += 1;

        if let Some(template) = &self.template {
            if template.pixel_count() == 0 {
                return Err(CameraError::EmptyFrame);
            }
            return Ok(Frame::with_order(
                template.pixels().to_vec(),
                template.rows(),
                template.cols(),
                template.order(),
                self.sequence,
            ));
        }

        // Deterministic gradient shifted by the sequence number
        let (rows, cols) = (config.height, config.width);
        let sequence = self.sequence;
        let mut pixels = Vec::with_capacity(rows as usize * cols as usize * 3);
        for y in 0..rows {
            for x in 0..cols {
                pixels.push(((x as u64 + sequence) % 256) as u8);
                pixels.push(((y as u64 + sequence) % 256) as u8);
                pixels.push(((x as u64 + y as u64) % 256) as u8);
            }
        }
        Ok(Frame::new(pixels, rows, cols, sequence))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        if self.config.take().is_some() {
            tracing::info!("MockCamera closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CaptureConfig {
        CaptureConfig::with_dimensions(16, 8)
    }

    #[test]
    fn test_mock_camera_lifecycle() {
        let mut camera = MockCamera::new();
        let config = small_config();

        assert!(!camera.is_open());

        camera.open(&config).unwrap();
        assert!(camera.is_open());

        let frame = camera.read_frame().unwrap();
        assert!(frame.is_valid());
        assert_eq!(frame.sequence(), 1);
        assert_eq!(frame.cols(), 16);
        assert_eq!(frame.rows(), 8);

        let frame2 = camera.read_frame().unwrap();
        assert_eq!(frame2.sequence(), 2);

        camera.close();
        assert!(!camera.is_open());
    }

    #[test]
    fn test_read_without_open() {
        let mut camera = MockCamera::new();
        assert!(matches!(camera.read_frame(), Err(CameraError::DeviceClosed)));
    }

    #[test]
    fn test_read_after_close() {
        let mut camera = MockCamera::new();
        camera.open(&small_config()).unwrap();
        camera.close();
        assert!(matches!(camera.read_frame(), Err(CameraError::DeviceClosed)));
    }

    #[test]
    fn test_double_open_unavailable() {
        let mut camera = MockCamera::new();
        camera.open(&small_config()).unwrap();
        assert!(matches!(
            camera.open(&small_config()),
            Err(CameraError::DeviceUnavailable(_))
        ));
        // The first handle stays usable
        assert!(camera.is_open());
    }

    #[test]
    fn test_open_budget_exhausted() {
        let mut camera = MockCamera::new().with_open_budget(1);
        camera.open(&small_config()).unwrap();
        camera.close();
        assert!(matches!(
            camera.open(&small_config()),
            Err(CameraError::DeviceUnavailable(_))
        ));
        assert!(!camera.is_open());
    }

    #[test]
    fn test_template_frame() {
        let template = Frame::filled(4, 6, [1, 2, 3]);
        let mut camera = MockCamera::with_frame(template);
        camera.open(&small_config()).unwrap();

        let frame = camera.read_frame().unwrap();
        assert_eq!(frame.rows(), 4);
        assert_eq!(frame.cols(), 6);
        assert_eq!(&frame.pixels()[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_empty_template_frame() {
        let mut camera = MockCamera::with_frame(Frame::new(Vec::new(), 0, 0, 0));
        camera.open(&small_config()).unwrap();
        assert!(matches!(camera.read_frame(), Err(CameraError::EmptyFrame)));
    }
}
