//! Background frame producer.
//!
//! One worker thread owns the camera for its whole lifetime. It reads a
//! frame every `frame_interval` and publishes it into a latest-frame cell
//! (`tokio::sync::watch`). Every subscriber sees the newest frame; a slow
//! subscriber skips frames instead of blocking the producer. The worker
//! does not track subscribers and keeps running when they disconnect.
//!
//! Still captures are sent to the worker as commands so the device is
//! never touched from two threads.

use super::{capture_still_suspended, Camera, CameraError, CaptureConfig, Frame, StillSource};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::watch;

/// Latest published frame, `None` until the first frame arrives.
pub type LatestFrame = Option<Arc<Frame>>;

type StillReply = mpsc::Sender<Result<Frame, CameraError>>;

enum Command {
    Still {
        source: Box<dyn StillSource + Send>,
        reply: StillReply,
    },
    Reopen(mpsc::Sender<Result<(), CameraError>>),
    IsOpen(mpsc::Sender<bool>),
    Shutdown,
}

/// Handle to the background capture worker.
pub struct FrameStream {
    commands: mpsc::Sender<Command>,
    frames: watch::Receiver<LatestFrame>,
    worker: Option<JoinHandle<()>>,
}

impl FrameStream {
    /// Spawns the worker, builds the camera on it and opens the device.
    ///
    /// The camera is constructed on the worker thread so it never has to
    /// cross threads. Returns the open error if the device is unavailable.
    pub fn spawn<F>(factory: F, config: CaptureConfig) -> Result<Self, CameraError>
    where
        F: FnOnce() -> Box<dyn Camera> + Send + 'static,
    {
        let (frame_tx, frame_rx) = watch::channel(None);
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let worker_config = config.clone();

        let worker = std::thread::Builder::new()
            .name("frame-stream".to_string())
            .spawn(move || {
                let mut camera = factory();
                let opened = camera.open(&worker_config);
                let ok = opened.is_ok();
                let _ = ready_tx.send(opened);
                if ok {
                    run_worker(camera.as_mut(), &worker_config, &frame_tx, &command_rx);
                }
            })
            .map_err(|e| CameraError::DeviceUnavailable(format!("cannot spawn worker: {}", e)))?;

        let opened = ready_rx.recv().unwrap_or_else(|_| {
            Err(CameraError::DeviceUnavailable(
                "capture worker exited during startup".to_string(),
            ))
        });
        if let Err(e) = opened {
            let _ = worker.join();
            return Err(e);
        }

        tracing::info!(
            interval_ms = config.frame_interval_ms,
            "Frame stream started"
        );

        Ok(Self {
            commands: command_tx,
            frames: frame_rx,
            worker: Some(worker),
        })
    }

    /// Returns a new receiver of the latest-frame cell.
    pub fn subscribe(&self) -> watch::Receiver<LatestFrame> {
        self.frames.clone()
    }

    /// Returns the most recently published frame without waiting.
    pub fn latest(&self) -> LatestFrame {
        self.frames.borrow().clone()
    }

    /// Waits until a frame newer than any seen by `receiver` is published.
    pub async fn next_frame(
        receiver: &mut watch::Receiver<LatestFrame>,
    ) -> Result<Arc<Frame>, CameraError> {
        loop {
            receiver
                .changed()
                .await
                .map_err(|_| CameraError::DeviceClosed)?;
            if let Some(frame) = receiver.borrow_and_update().clone() {
                return Ok(frame);
            }
        }
    }

    /// Suspends streaming, captures a still, and resumes streaming.
    ///
    /// Blocks until the worker has finished the whole sequence. A failed
    /// resume is returned as [`CameraError::ReopenFailed`].
    pub fn capture_still(
        &self,
        source: Box<dyn StillSource + Send>,
    ) -> Result<Frame, CameraError> {
        let (reply, response) = mpsc::channel();
        self.commands
            .send(Command::Still { source, reply })
            .map_err(|_| CameraError::DeviceClosed)?;
        response.recv().map_err(|_| CameraError::DeviceClosed)?
    }

    /// Reopens the device after a failed resume. A no-op when already open.
    pub fn reopen(&self) -> Result<(), CameraError> {
        let (reply, response) = mpsc::channel();
        self.commands
            .send(Command::Reopen(reply))
            .map_err(|_| CameraError::DeviceClosed)?;
        response.recv().map_err(|_| CameraError::DeviceClosed)?
    }

    /// Returns whether the worker currently holds an open device.
    pub fn is_open(&self) -> bool {
        let (reply, response) = mpsc::channel();
        if self.commands.send(Command::IsOpen(reply)).is_err() {
            return false;
        }
        response.recv().unwrap_or(false)
    }

    /// Stops the worker and closes the device.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Frame stream worker panicked");
            }
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    camera: &mut dyn Camera,
    config: &CaptureConfig,
    frames: &watch::Sender<LatestFrame>,
    commands: &mpsc::Receiver<Command>,
) {
    let interval = config.frame_interval();

    loop {
        match commands.recv_timeout(interval) {
            Ok(Command::Still { source, reply }) => {
                tracing::info!("Suspending stream for still capture");
                let result = capture_still_suspended(camera, config, source.as_ref());
                let _ = reply.send(result);
            }
            Ok(Command::Reopen(reply)) => {
                let result = if camera.is_open() {
                    Ok(())
                } else {
                    camera.open(config)
                };
                let _ = reply.send(result);
            }
            Ok(Command::IsOpen(reply)) => {
                let _ = reply.send(camera.is_open());
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                if !camera.is_open() {
                    continue;
                }
                match camera.read_frame() {
                    Ok(frame) => {
                        tracing::trace!(sequence = frame.sequence(), "Publishing frame");
                        frames.send_replace(Some(Arc::new(frame)));
                    }
                    Err(e) => tracing::warn!("Frame read failed: {}", e),
                }
            }
        }
    }

    camera.close();
    tracing::info!("Frame stream stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockCamera;

    struct SolidStill;

    impl StillSource for SolidStill {
        fn capture(&self) -> Result<Frame, CameraError> {
            Ok(Frame::filled(2, 3, [7, 7, 7]))
        }
    }

    fn config() -> CaptureConfig {
        CaptureConfig {
            frame_interval_ms: 5,
            ..CaptureConfig::with_dimensions(8, 4)
        }
    }

    #[tokio::test]
    async fn test_frames_are_published() {
        let stream = FrameStream::spawn(|| Box::new(MockCamera::new()), config()).unwrap();
        let mut rx = stream.subscribe();

        let first = FrameStream::next_frame(&mut rx).await.unwrap();
        let second = FrameStream::next_frame(&mut rx).await.unwrap();
        assert!(second.sequence() > first.sequence());
        assert_eq!(first.cols(), 8);
        assert!(stream.latest().is_some());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_see_frames() {
        let stream = FrameStream::spawn(|| Box::new(MockCamera::new()), config()).unwrap();
        let mut a = stream.subscribe();
        let mut b = stream.subscribe();

        let fa = FrameStream::next_frame(&mut a).await.unwrap();
        let fb = FrameStream::next_frame(&mut b).await.unwrap();
        assert!(fa.is_valid());
        assert!(fb.is_valid());
    }

    #[test]
    fn test_spawn_fails_without_device() {
        let result = FrameStream::spawn(
            || Box::new(MockCamera::new().with_open_budget(0)),
            config(),
        );
        assert!(matches!(result, Err(CameraError::DeviceUnavailable(_))));
    }

    #[test]
    fn test_still_resumes_stream() {
        let stream = FrameStream::spawn(|| Box::new(MockCamera::new()), config()).unwrap();
        let still = stream.capture_still(Box::new(SolidStill)).unwrap();
        assert_eq!(still.rows(), 2);
        assert!(stream.is_open());
        stream.shutdown();
    }

    #[test]
    fn test_still_reopen_failure_surfaces() {
        let stream = FrameStream::spawn(
            || Box::new(MockCamera::new().with_open_budget(1)),
            config(),
        )
        .unwrap();

        let result = stream.capture_still(Box::new(SolidStill));
        assert!(matches!(result, Err(CameraError::ReopenFailed(_))));
        assert!(!stream.is_open());

        // The device stays gone; the retry reports it instead of hiding it
        assert!(matches!(
            stream.reopen(),
            Err(CameraError::DeviceUnavailable(_))
        ));
    }
}
