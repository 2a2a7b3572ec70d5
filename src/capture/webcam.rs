//! Webcam backend built on nokhwa.

use super::{Camera, CameraError, CaptureConfig, Frame};
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    },
};

/// A physical webcam.
///
/// The device is only acquired between [`Camera::open`] and
/// [`Camera::close`]; dropping the handle releases it as well.
#[derive(Default)]
pub struct Webcam {
    device: Option<nokhwa::Camera>,
    sequence: u64,
}

impl Webcam {
    /// A closed webcam; the device is picked when it is opened.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Camera for Webcam {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        if self.device.is_some() {
            return Err(CameraError::DeviceUnavailable(
                "webcam already open".to_string(),
            ));
        }
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;

        let format = CameraFormat::new(
            Resolution::new(config.width, config.height),
            FrameFormat::MJPEG,
            config.fps,
        );
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let mut device = nokhwa::Camera::new(CameraIndex::Index(config.device_id), requested)
            .map_err(|e| CameraError::DeviceUnavailable(e.to_string()))?;
        device
            .open_stream()
            .map_err(|e| CameraError::DeviceUnavailable(e.to_string()))?;

        let actual = device.resolution();
        tracing::info!(
            device = config.device_id,
            width = actual.width(),
            height = actual.height(),
            "Webcam opened"
        );

        self.device = Some(device);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let device = self.device.as_mut().ok_or(CameraError::DeviceClosed)?;

        let buffer = device
            .frame()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        let (cols, rows) = (image.width(), image.height());
        if cols == 0 || rows == 0 {
            return Err(CameraError::EmptyFrame);
        }

        // nokhwa pins its own `image` version, so go through the raw buffer
        self.sequence += 1;
        Ok(Frame::new(image.into_raw(), rows, cols, self.sequence))
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }

    fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.stop_stream() {
                tracing::warn!("Failed to stop webcam stream cleanly: {}", e);
            }
            tracing::info!("Webcam closed");
        }
    }
}
