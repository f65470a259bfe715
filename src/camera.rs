//! Frame sources for scene capture
//!
//! The controller pulls one still JPEG per scan from a [`FrameSource`].
//! Two sources ship with the binary: a capture command that shells out to an
//! external grabber (e.g. `fswebcam`), and a still-image file source for
//! setups where another process keeps a snapshot file fresh.

use std::path::PathBuf;
use std::process::Command;

use base64::Engine;

use crate::{Error, Result};

/// One captured still frame (JPEG, quality ~80)
#[derive(Debug, Clone)]
pub struct Frame {
    jpeg: Vec<u8>,
}

impl Frame {
    /// Wrap raw JPEG bytes
    ///
    /// # Errors
    ///
    /// Returns error if the buffer is empty
    pub fn from_jpeg(jpeg: Vec<u8>) -> Result<Self> {
        if jpeg.is_empty() {
            return Err(Error::Capture("empty frame".to_string()));
        }
        Ok(Self { jpeg })
    }

    /// Base64 encoding for transmission to the vision service
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
    }

    /// Size of the encoded frame in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    /// Whether the frame is empty (never true for constructed frames)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }
}

/// Produces still frames on demand
///
/// Capture is synchronous and must fail fast when no frame is available.
/// The controller owns the source and releases it exactly once at teardown.
pub trait FrameSource: Send + 'static {
    /// Capture one frame
    ///
    /// # Errors
    ///
    /// Returns error if the device or file is unavailable
    fn capture(&mut self) -> Result<Frame>;

    /// Release the underlying resource
    ///
    /// Called exactly once by the controller at teardown.
    fn release(&mut self) {}
}

/// Frame source backed by an external capture command
///
/// The command is run through `sh -c` and must write one JPEG to stdout.
pub struct CaptureCommandSource {
    command: String,
}

impl CaptureCommandSource {
    /// Create a source running `command` for each capture
    #[must_use]
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

impl FrameSource for CaptureCommandSource {
    fn capture(&mut self) -> Result<Frame> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .map_err(|e| Error::Camera(format!("capture command failed to start: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Camera(format!(
                "capture command exited with {}: {stderr}",
                output.status
            )));
        }

        tracing::debug!(bytes = output.stdout.len(), "frame captured");
        Frame::from_jpeg(output.stdout)
    }
}

/// Frame source reading a JPEG file on every capture
///
/// Useful when a separate process keeps the snapshot current.
pub struct StillImageSource {
    path: PathBuf,
}

impl StillImageSource {
    /// Create a source reading `path` for each capture
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl FrameSource for StillImageSource {
    fn capture(&mut self) -> Result<Frame> {
        let jpeg = std::fs::read(&self.path)
            .map_err(|e| Error::Camera(format!("cannot read {}: {e}", self.path.display())))?;
        Frame::from_jpeg(jpeg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_empty_buffer() {
        assert!(Frame::from_jpeg(Vec::new()).is_err());
    }

    #[test]
    fn frame_encodes_base64() {
        let frame = Frame::from_jpeg(vec![0xFF, 0xD8, 0xFF]).unwrap();
        assert_eq!(frame.to_base64(), "/9j/");
        assert_eq!(frame.len(), 3);
        assert!(!frame.is_empty());
    }

    #[test]
    fn still_source_fails_fast_on_missing_file() {
        let mut source = StillImageSource::new(PathBuf::from("/nonexistent/frame.jpg"));
        assert!(matches!(source.capture(), Err(Error::Camera(_))));
    }

    #[test]
    fn command_source_captures_stdout() {
        let mut source = CaptureCommandSource::new("printf 'jpegdata'".to_string());
        let frame = source.capture().unwrap();
        assert_eq!(frame.len(), 8);
    }

    #[test]
    fn command_source_reports_failure() {
        let mut source = CaptureCommandSource::new("exit 3".to_string());
        assert!(matches!(source.capture(), Err(Error::Camera(_))));
    }
}
