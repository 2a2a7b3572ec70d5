//! Single-still capture through an external command.
//!
//! Still capture needs exclusive use of the device, so it is mutually
//! exclusive with streaming. [`capture_still`] refuses to run while the
//! camera is open; [`capture_still_suspended`] closes the camera, captures,
//! and always attempts to reopen it.

use super::{Camera, CameraError, CaptureConfig, Frame, StillConfig};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// How often a running still command is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A source of single high-resolution stills.
pub trait StillSource {
    /// Captures one still image.
    fn capture(&self) -> Result<Frame, CameraError>;
}

/// Still source that shells out to an external capture program.
#[derive(Debug, Clone)]
pub struct CommandStill {
    config: StillConfig,
    dir: PathBuf,
}

impl CommandStill {
    /// Creates the still source and its output directory.
    pub fn new(config: StillConfig) -> Result<Self, CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;

        let dir = match &config.dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir().join(format!("film-scanner-{}", std::process::id())),
        };
        std::fs::create_dir_all(&dir).map_err(|e| {
            CameraError::ConfigFailed(format!("cannot create still dir {}: {}", dir.display(), e))
        })?;
        tracing::info!(dir = %dir.display(), "Still capture directory ready");

        Ok(Self { config, dir })
    }

    /// Directory still images are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Builds the output path and the argument vector for one capture.
    fn command_line(&self, timestamp: i64) -> (PathBuf, Vec<String>) {
        let name = self
            .config
            .file_name
            .replace("{timestamp}", &timestamp.to_string());
        let path = self.dir.join(name);
        let path_str = path.to_string_lossy();
        let args = self
            .config
            .command
            .split_whitespace()
            .map(|part| part.replace("{path}", &path_str))
            .collect();
        (path, args)
    }

    /// Runs the command, killing it when the timeout expires.
    fn run(&self, args: &[String]) -> Result<(), CameraError> {
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| CameraError::CaptureFailed("empty still command".to_string()))?;

        let mut child = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                CameraError::CaptureFailed(format!("failed to spawn {}: {}", program, e))
            })?;

        let deadline = Instant::now() + self.config.timeout();
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    return Err(CameraError::CaptureFailed(format!(
                        "{} exited with {}",
                        program, status
                    )))
                }
                Ok(None) if Instant::now() >= deadline => {
                    if let Err(e) = child.kill() {
                        tracing::warn!("Failed to kill still command: {}", e);
                    }
                    let _ = child.wait();
                    return Err(CameraError::CaptureFailed(format!(
                        "{} timed out after {:?}",
                        program,
                        self.config.timeout()
                    )));
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(CameraError::CaptureFailed(e.to_string())),
            }
        }
    }
}

impl StillSource for CommandStill {
    fn capture(&self) -> Result<Frame, CameraError> {
        let (path, args) = self.command_line(chrono::Utc::now().timestamp());
        tracing::info!("Capturing still image with command: {}", args.join(" "));

        self.run(&args)?;

        let image = image::open(&path)
            .map_err(|e| CameraError::CaptureFailed(format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), "Failed to remove still image: {}", e);
        }

        if image.width() == 0 || image.height() == 0 {
            return Err(CameraError::EmptyFrame);
        }

        tracing::info!(
            cols = image.width(),
            rows = image.height(),
            "Captured still image"
        );
        Ok(Frame::from_rgb_image(image, 0))
    }
}

/// Captures a still while the streaming camera is closed.
///
/// Fails with [`CameraError::DeviceBusy`] and leaves the camera untouched
/// when it is still open for streaming.
pub fn capture_still(camera: &dyn Camera, source: &dyn StillSource) -> Result<Frame, CameraError> {
    if camera.is_open() {
        return Err(CameraError::DeviceBusy);
    }
    source.capture()
}

/// Closes the streaming camera, captures a still, and reopens the camera.
///
/// The reopen is attempted whether or not the capture succeeded. A failed
/// reopen is reported as [`CameraError::ReopenFailed`] even when the still
/// itself was captured, since streaming is left degraded.
pub fn capture_still_suspended(
    camera: &mut dyn Camera,
    config: &CaptureConfig,
    source: &dyn StillSource,
) -> Result<Frame, CameraError> {
    let was_open = camera.is_open();
    if was_open {
        camera.close();
    }

    let captured = capture_still(camera, source);

    if !was_open {
        return captured;
    }

    match camera.open(config) {
        Ok(()) => captured,
        Err(reopen) => {
            tracing::error!(
                capture = %capture_outcome(&captured),
                "Failed to reopen camera after still capture: {}",
                reopen
            );
            Err(CameraError::ReopenFailed(Box::new(reopen)))
        }
    }
}

/// How the still went, for the log line of a failed reopen.
fn capture_outcome(captured: &Result<Frame, CameraError>) -> String {
    match captured {
        Ok(frame) => format!("ok ({}x{})", frame.cols(), frame.rows()),
        Err(e) => format!("failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockCamera;

    struct FixedStill(Result<(), ()>);

    impl StillSource for FixedStill {
        fn capture(&self) -> Result<Frame, CameraError> {
            match self.0 {
                Ok(()) => Ok(Frame::filled(4, 6, [9, 9, 9])),
                Err(()) => Err(CameraError::CaptureFailed("lens cap on".to_string())),
            }
        }
    }

    fn config() -> CaptureConfig {
        CaptureConfig::with_dimensions(8, 8)
    }

    #[test]
    fn test_still_while_streaming_is_busy() {
        let mut camera = MockCamera::new();
        camera.open(&config()).unwrap();

        let result = capture_still(&camera, &FixedStill(Ok(())));
        assert!(matches!(result, Err(CameraError::DeviceBusy)));
        assert!(camera.is_open());
    }

    #[test]
    fn test_still_after_close() {
        let camera = MockCamera::new();
        let frame = capture_still(&camera, &FixedStill(Ok(()))).unwrap();
        assert_eq!(frame.rows(), 4);
    }

    #[test]
    fn test_suspended_capture_reopens() {
        let mut camera = MockCamera::new();
        camera.open(&config()).unwrap();

        let frame = capture_still_suspended(&mut camera, &config(), &FixedStill(Ok(()))).unwrap();
        assert_eq!(frame.cols(), 6);
        assert!(camera.is_open());
    }

    #[test]
    fn test_suspended_capture_failure_still_reopens() {
        let mut camera = MockCamera::new();
        camera.open(&config()).unwrap();

        let result = capture_still_suspended(&mut camera, &config(), &FixedStill(Err(())));
        assert!(matches!(result, Err(CameraError::CaptureFailed(_))));
        assert!(camera.is_open());
    }

    #[test]
    fn test_reopen_failure_is_surfaced() {
        let mut camera = MockCamera::new().with_open_budget(1);
        camera.open(&config()).unwrap();

        let result = capture_still_suspended(&mut camera, &config(), &FixedStill(Ok(())));
        assert!(matches!(result, Err(CameraError::ReopenFailed(_))));
        assert!(!camera.is_open());
    }

    #[test]
    fn test_reopen_failure_after_failed_still() {
        let mut camera = MockCamera::new().with_open_budget(1);
        camera.open(&config()).unwrap();

        let result = capture_still_suspended(&mut camera, &config(), &FixedStill(Err(())));
        assert!(matches!(result, Err(CameraError::ReopenFailed(_))));
        assert!(!camera.is_open());

        // The still's own failure still reaches the log
        let failed = FixedStill(Err(())).capture();
        assert_eq!(
            capture_outcome(&failed),
            "failed: failed to capture frame: lens cap on"
        );
        let ok = FixedStill(Ok(())).capture();
        assert_eq!(capture_outcome(&ok), "ok (6x4)");
    }

    fn still_config(dir: &Path, command: String, timeout_secs: u64) -> StillConfig {
        StillConfig {
            command,
            file_name: "still-{timestamp}.png".to_string(),
            dir: Some(dir.to_path_buf()),
            timeout_secs,
            invert: false,
        }
    }

    #[test]
    fn test_command_still_decodes_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.png");
        image::RgbImage::from_pixel(5, 3, image::Rgb([200, 100, 50]))
            .save(&source)
            .unwrap();

        let out_dir = dir.path().join("out");
        let still = CommandStill::new(still_config(
            &out_dir,
            format!("cp {} {{path}}", source.display()),
            10,
        ))
        .unwrap();

        let frame = still.capture().unwrap();
        assert_eq!(frame.cols(), 5);
        assert_eq!(frame.rows(), 3);
        assert_eq!(&frame.pixels()[..3], &[200, 100, 50]);
        // Output file is cleaned up
        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_command_still_failure() {
        let dir = tempfile::tempdir().unwrap();
        let still =
            CommandStill::new(still_config(dir.path(), "false {path}".to_string(), 10)).unwrap();
        assert!(matches!(still.capture(), Err(CameraError::CaptureFailed(_))));
    }

    #[test]
    fn test_command_still_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow.sh");
        std::fs::write(&script, "exec sleep 5\n").unwrap();
        let command = format!("sh {} {{path}}", script.display());
        let still = CommandStill::new(still_config(dir.path(), command, 1)).unwrap();

        let started = Instant::now();
        let result = still.capture();
        assert!(matches!(result, Err(CameraError::CaptureFailed(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_command_line_substitution() {
        let dir = tempfile::tempdir().unwrap();
        let still = CommandStill::new(still_config(
            dir.path(),
            "capture -o {path} --quality 95".to_string(),
            10,
        ))
        .unwrap();

        let (path, args) = still.command_line(1700000000);
        assert!(path.ends_with("still-1700000000.png"));
        assert_eq!(args[0], "capture");
        assert_eq!(args[2], path.to_string_lossy());
        assert_eq!(args[4], "95");
    }
}
