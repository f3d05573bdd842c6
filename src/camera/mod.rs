//! Camera device collaborators
//!
//! ## Responsibilities
//!
//! - Define the device seam the capture runner drives (open / read / close)
//! - V4L2 capture using ffmpeg, one process per frame
//! - Scripted in-memory camera for tests

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::process::Command;

/// One captured image, already encoded as JPEG
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Zero-based sequence index within the session
    pub index: u32,
    /// Encoded JPEG bytes
    pub data: Vec<u8>,
}

/// An open device handle, exclusively owned by one capture session.
///
/// The handle assigns frame indices itself so they always reflect the order
/// frames came off the device.
#[async_trait]
pub trait Camera: Send {
    /// Read and encode the next frame.
    ///
    /// No read timeout is applied: an unresponsive device blocks its session
    /// (accepted limitation of the single-session design).
    async fn read_frame(&mut self) -> Result<Frame>;

    /// Release the device. Best-effort: implementations log failures and
    /// never propagate them, so the session teardown cannot fail here.
    async fn close(&mut self);
}

/// Opens camera handles. One open per session.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    type Handle: Camera;

    /// Acquire the device. Fails with `Error::DeviceUnavailable` when the
    /// camera cannot be opened, which fails the whole session.
    async fn open(&self, camera_id: u32) -> Result<Self::Handle>;
}

// ============================================================
// ffmpeg-backed V4L2 camera
// ============================================================

/// Backend for local V4L2 devices (`/dev/video{N}`) read through ffmpeg
pub struct FfmpegBackend;

#[async_trait]
impl CameraBackend for FfmpegBackend {
    type Handle = FfmpegCamera;

    async fn open(&self, camera_id: u32) -> Result<FfmpegCamera> {
        let version = check_ffmpeg()
            .await
            .map_err(|e| Error::DeviceUnavailable(format!("ffmpeg not usable: {e}")))?;

        let device_node = PathBuf::from(format!("/dev/video{camera_id}"));
        if !device_node.exists() {
            return Err(Error::DeviceUnavailable(format!(
                "device node {} does not exist",
                device_node.display()
            )));
        }

        tracing::debug!(
            device = %device_node.display(),
            ffmpeg = %version,
            "Camera opened"
        );

        Ok(FfmpegCamera {
            device_node,
            frames_read: 0,
        })
    }
}

/// V4L2 camera read through an ffmpeg subprocess.
///
/// Each frame is one short-lived ffmpeg run, so nothing stays attached to the
/// device between reads and a crashed read never wedges the device.
pub struct FfmpegCamera {
    device_node: PathBuf,
    frames_read: u32,
}

#[async_trait]
impl Camera for FfmpegCamera {
    async fn read_frame(&mut self) -> Result<Frame> {
        use std::process::Stdio;

        // Spawn ffmpeg with kill_on_drop enabled so an aborted session
        // (future dropped mid-read) SIGKILLs the process instead of leaking it.
        // -f v4l2: read the local video device
        // -frames:v 1: capture only 1 frame
        // -f image2pipe -vcodec mjpeg: output as MJPEG to stdout
        let device = self.device_node.to_string_lossy().to_string();
        let child = Command::new("ffmpeg")
            .args([
                "-f", "v4l2",
                "-i", &device,
                "-frames:v", "1",
                "-f", "image2pipe",
                "-vcodec", "mjpeg",
                "-loglevel", "error",
                "-y",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::FrameRead(format!("ffmpeg spawn failed: {e}")))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::FrameRead(format!("ffmpeg execution failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::FrameRead(format!("ffmpeg failed: {}", stderr.trim())));
        }

        if output.stdout.is_empty() {
            return Err(Error::FrameRead("ffmpeg returned empty output".to_string()));
        }

        let frame = Frame {
            index: self.frames_read,
            data: output.stdout,
        };
        self.frames_read += 1;
        Ok(frame)
    }

    async fn close(&mut self) {
        // Nothing stays attached between per-frame ffmpeg runs
        tracing::debug!(
            device = %self.device_node.display(),
            frames_read = self.frames_read,
            "Camera released"
        );
    }
}

/// Check if ffmpeg is available, returning its version line
pub async fn check_ffmpeg() -> Result<String> {
    let output = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
        .map_err(|e| Error::DeviceUnavailable(format!("ffmpeg not found: {e}")))?;

    if !output.status.success() {
        return Err(Error::DeviceUnavailable(
            "ffmpeg version check failed".to_string(),
        ));
    }

    let version = String::from_utf8_lossy(&output.stdout);
    let first_line = version.lines().next().unwrap_or("unknown");
    Ok(first_line.to_string())
}

// ============================================================
// Scripted camera for tests
// ============================================================

/// Deterministic camera backend driven by a pre-seeded script of reads.
///
/// Stands in for real hardware in unit and integration tests; also counts
/// opens and closes so tests can assert the device lifecycle.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    inner: Arc<Mutex<ScriptState>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    open_error: Option<String>,
    reads: VecDeque<std::result::Result<Vec<u8>, String>>,
    opens: usize,
    closes: usize,
}

impl ScriptedBackend {
    /// Backend whose camera yields `count` small distinct JPEG-like frames
    pub fn with_frames(count: usize) -> Self {
        let backend = Self::default();
        for i in 0..count {
            backend.push_frame(vec![0xFF, 0xD8, i as u8, 0xFF, 0xD9]);
        }
        backend
    }

    /// Queue one successful read yielding `data`
    pub fn push_frame(&self, data: Vec<u8>) {
        self.lock().reads.push_back(Ok(data));
    }

    /// Queue one failing read
    pub fn push_read_error(&self, message: &str) {
        self.lock().reads.push_back(Err(message.to_string()));
    }

    /// Make every subsequent open fail
    pub fn fail_open(&self, message: &str) {
        self.lock().open_error = Some(message.to_string());
    }

    /// Number of successful opens so far
    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    /// Number of closes so far
    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.inner.lock().expect("camera script lock")
    }
}

#[async_trait]
impl CameraBackend for ScriptedBackend {
    type Handle = ScriptedCamera;

    async fn open(&self, _camera_id: u32) -> Result<ScriptedCamera> {
        let mut state = self.inner.lock().expect("camera script lock");
        if let Some(reason) = state.open_error.clone() {
            return Err(Error::DeviceUnavailable(reason));
        }
        state.opens += 1;
        Ok(ScriptedCamera {
            shared: self.inner.clone(),
            frames_read: 0,
        })
    }
}

/// Handle produced by [`ScriptedBackend`]
#[derive(Debug)]
pub struct ScriptedCamera {
    shared: Arc<Mutex<ScriptState>>,
    frames_read: u32,
}

#[async_trait]
impl Camera for ScriptedCamera {
    async fn read_frame(&mut self) -> Result<Frame> {
        let next = {
            let mut state = self.shared.lock().expect("camera script lock");
            state.reads.pop_front()
        };
        match next {
            Some(Ok(data)) => {
                let frame = Frame {
                    index: self.frames_read,
                    data,
                };
                self.frames_read += 1;
                Ok(frame)
            }
            Some(Err(message)) => Err(Error::FrameRead(message)),
            None => Err(Error::FrameRead("camera script exhausted".to_string())),
        }
    }

    async fn close(&mut self) {
        self.shared.lock().expect("camera script lock").closes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_reads_in_order() {
        let backend = ScriptedBackend::default();
        backend.push_frame(vec![1]);
        backend.push_frame(vec![2]);

        let mut camera = backend.open(0).await.unwrap();
        let first = camera.read_frame().await.unwrap();
        let second = camera.read_frame().await.unwrap();

        assert_eq!(first.index, 0);
        assert_eq!(first.data, vec![1]);
        assert_eq!(second.index, 1);
        assert_eq!(second.data, vec![2]);
    }

    #[tokio::test]
    async fn test_scripted_open_failure() {
        let backend = ScriptedBackend::with_frames(1);
        backend.fail_open("device busy");

        let err = backend.open(0).await.unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable(_)));
        assert_eq!(backend.opens(), 0);
    }

    #[tokio::test]
    async fn test_scripted_read_error_then_exhaustion() {
        let backend = ScriptedBackend::default();
        backend.push_read_error("sensor fault");

        let mut camera = backend.open(0).await.unwrap();
        let err = camera.read_frame().await.unwrap_err();
        assert!(matches!(err, Error::FrameRead(_)));

        let err = camera.read_frame().await.unwrap_err();
        assert!(err.to_string().contains("exhausted"));
    }

    #[tokio::test]
    async fn test_scripted_close_is_counted() {
        let backend = ScriptedBackend::with_frames(1);
        let mut camera = backend.open(0).await.unwrap();
        camera.close().await;
        camera.close().await;

        assert_eq!(backend.opens(), 1);
        assert_eq!(backend.closes(), 2);
    }
}
