//! Capture session runner
//!
//! ## Responsibilities
//!
//! - Drive a fixed-count burst of device reads at a target cadence
//! - Persist frames and the session metadata document to the scratch directory
//! - Release the device and write `meta.json` no matter how the session went

use crate::camera::{Camera, CameraBackend};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::fs;

/// File name of the metadata document inside every session
pub const META_FILE_NAME: &str = "meta.json";

/// Floor for the post-frame pause. Keeps the loop from spinning when a frame
/// takes longer than the target interval, and always yields the device once
/// between reads.
const MIN_FRAME_SLEEP: Duration = Duration::from_millis(10);

/// Session metadata, written as `meta.json` next to the frames
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMeta {
    /// Whether the full burst completed
    pub success: bool,
    /// Failure description when `success` is false
    pub reason: Option<String>,
    /// Per-frame capture instants, in capture order. Empty for failed
    /// sessions even when some frames were captured first.
    pub timestamps: Vec<DateTime<Utc>>,
}

impl SessionMeta {
    /// Metadata for a completed burst
    pub fn succeeded(timestamps: Vec<DateTime<Utc>>) -> Self {
        Self {
            success: true,
            reason: None,
            timestamps,
        }
    }

    /// Metadata for a failed session
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            timestamps: Vec::new(),
        }
    }

    /// Fixed-schema JSON document: alphabetical keys, RFC 3339 timestamps,
    /// and a `count` field mirroring the timestamp list length
    pub fn to_document(&self) -> serde_json::Value {
        json!({
            "count": self.timestamps.len(),
            "reason": self.reason,
            "success": self.success,
            "timestamps": self
                .timestamps
                .iter()
                .map(|t| t.to_rfc3339())
                .collect::<Vec<_>>(),
        })
    }
}

/// Output handle of one runner invocation, consumed by the archiver
#[derive(Debug, Clone)]
pub struct CaptureSessionResult {
    /// Path of the metadata document. Present even for failed sessions.
    pub meta_path: PathBuf,
    /// Frames written to disk, in capture order
    pub frame_paths: Vec<PathBuf>,
}

impl CaptureSessionResult {
    pub fn frame_count(&self) -> usize {
        self.frame_paths.len()
    }
}

/// Pause to apply after producing one frame: the target interval minus the
/// time already spent reading, encoding and writing it, floored at
/// [`MIN_FRAME_SLEEP`]. An overrun never shortens later intervals.
fn sleep_after(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed).max(MIN_FRAME_SLEEP)
}

/// Drives one capture session end to end
pub struct CaptureRunner<B: CameraBackend> {
    backend: B,
    scratch_dir: PathBuf,
}

impl<B: CameraBackend> CaptureRunner<B> {
    pub fn new(backend: B, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Run one session: reset the scratch directory, open the device once,
    /// capture `capture_count` frames at the target cadence, then write
    /// `meta.json` and release the device.
    ///
    /// Capture failures never surface as errors here. A failed open or a
    /// failed read produces a failure-marked result whose metadata document
    /// still gets archived. The only `Err` cases are scratch-directory and
    /// metadata-write failures, where no session record can exist at all.
    pub async fn run(
        &self,
        camera_id: u32,
        interval: Duration,
        capture_count: u32,
    ) -> Result<CaptureSessionResult> {
        self.reset_scratch().await?;

        let mut frame_paths = Vec::new();

        let meta = match self.backend.open(camera_id).await {
            Ok(mut camera) => {
                let outcome = self
                    .capture_frames(&mut camera, interval, capture_count, &mut frame_paths)
                    .await;
                // Release before looking at the outcome so the device never
                // stays held past its session
                camera.close().await;

                match outcome {
                    Ok(timestamps) => SessionMeta::succeeded(timestamps),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            captured = frame_paths.len(),
                            requested = capture_count,
                            "Session aborted mid-capture"
                        );
                        SessionMeta::failed(e.to_string())
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    camera_id = camera_id,
                    error = %e,
                    "Failed to open camera"
                );
                SessionMeta::failed(e.to_string())
            }
        };

        let meta_path = self.write_meta(&meta).await?;

        tracing::info!(
            success = meta.success,
            frames = frame_paths.len(),
            "Capture session finished"
        );

        Ok(CaptureSessionResult {
            meta_path,
            frame_paths,
        })
    }

    /// Capture loop. Appends each persisted frame's path as it lands so the
    /// caller keeps partial output when a read fails mid-burst.
    async fn capture_frames(
        &self,
        camera: &mut B::Handle,
        interval: Duration,
        capture_count: u32,
        frame_paths: &mut Vec<PathBuf>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let mut timestamps = Vec::with_capacity(capture_count as usize);

        for i in 0..capture_count {
            let started = Instant::now();

            let frame = camera.read_frame().await?;
            let path = self.scratch_dir.join(format!("{:03}.jpeg", frame.index));
            fs::write(&path, &frame.data).await?;
            frame_paths.push(path);
            timestamps.push(Utc::now());

            tracing::debug!(
                index = i,
                total = capture_count,
                size = frame.data.len(),
                "Captured frame"
            );

            let pause = sleep_after(interval, started.elapsed());
            tokio::time::sleep(pause).await;
        }

        Ok(timestamps)
    }

    /// Wipe and recreate the scratch directory so stale frames from an
    /// earlier session can never leak into this one's archive
    async fn reset_scratch(&self) -> Result<()> {
        match fs::remove_dir_all(&self.scratch_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.scratch_dir).await?;
        Ok(())
    }

    async fn write_meta(&self, meta: &SessionMeta) -> Result<PathBuf> {
        let path = self.scratch_dir.join(META_FILE_NAME);
        let body = serde_json::to_string_pretty(&meta.to_document())?;
        fs::write(&path, body).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::ScriptedBackend;
    use tempfile::TempDir;

    fn runner(backend: ScriptedBackend, scratch: &TempDir) -> CaptureRunner<ScriptedBackend> {
        CaptureRunner::new(backend, scratch.path())
    }

    async fn read_meta(result: &CaptureSessionResult) -> serde_json::Value {
        let body = tokio::fs::read_to_string(&result.meta_path).await.unwrap();
        serde_json::from_str(&body).unwrap()
    }

    #[test]
    fn test_sleep_after_subtracts_elapsed() {
        assert_eq!(
            sleep_after(Duration::from_millis(100), Duration::from_millis(30)),
            Duration::from_millis(70)
        );
    }

    #[test]
    fn test_sleep_after_floors_on_overrun() {
        assert_eq!(
            sleep_after(Duration::from_millis(100), Duration::from_millis(250)),
            MIN_FRAME_SLEEP
        );
    }

    #[test]
    fn test_sleep_after_floors_zero_interval() {
        assert_eq!(sleep_after(Duration::ZERO, Duration::ZERO), MIN_FRAME_SLEEP);
    }

    #[test]
    fn test_meta_document_shape() {
        let meta = SessionMeta::succeeded(vec![Utc::now(), Utc::now()]);
        let doc = meta.to_document();
        assert_eq!(doc["count"], 2);
        assert_eq!(doc["success"], true);
        assert!(doc["reason"].is_null());
        assert_eq!(doc["timestamps"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_meta_document_renders_sorted_keys_and_indent() {
        // The rendered document is part of the archive format; keep it stable
        let at = DateTime::from_timestamp(1724568000, 0).unwrap();
        let meta = SessionMeta::succeeded(vec![at]);
        let body = serde_json::to_string_pretty(&meta.to_document()).unwrap();
        assert_eq!(
            body,
            r#"{
  "count": 1,
  "reason": null,
  "success": true,
  "timestamps": [
    "2024-08-25T06:40:00+00:00"
  ]
}"#
        );
    }

    #[tokio::test]
    async fn test_successful_session_writes_frames_and_meta() {
        let scratch = TempDir::new().unwrap();
        let backend = ScriptedBackend::with_frames(3);
        let result = runner(backend.clone(), &scratch)
            .run(0, Duration::ZERO, 3)
            .await
            .unwrap();

        assert_eq!(result.frame_count(), 3);
        for (i, path) in result.frame_paths.iter().enumerate() {
            assert_eq!(
                path.file_name().unwrap().to_str().unwrap(),
                format!("{i:03}.jpeg")
            );
            assert!(path.exists(), "frame file {} should exist", path.display());
        }

        let meta = read_meta(&result).await;
        assert_eq!(meta["success"], true);
        assert!(meta["reason"].is_null());
        assert_eq!(meta["count"], 3);

        let stamps: Vec<DateTime<Utc>> = meta["timestamps"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().parse().unwrap())
            .collect();
        assert_eq!(stamps.len(), 3);
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(backend.opens(), 1);
        assert_eq!(backend.closes(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_writes_failed_meta_and_no_frames() {
        let scratch = TempDir::new().unwrap();
        let backend = ScriptedBackend::with_frames(3);
        backend.fail_open("device busy");

        let result = runner(backend.clone(), &scratch)
            .run(0, Duration::ZERO, 3)
            .await
            .unwrap();

        assert_eq!(result.frame_count(), 0);
        let meta = read_meta(&result).await;
        assert_eq!(meta["success"], false);
        assert!(meta["reason"]
            .as_str()
            .unwrap()
            .contains("Camera unavailable"));
        assert_eq!(meta["count"], 0);

        // Only meta.json in scratch
        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(scratch.path()).await.unwrap();
        while let Some(entry) = dir.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec![META_FILE_NAME]);
        assert_eq!(backend.closes(), 0);
    }

    #[tokio::test]
    async fn test_read_failure_keeps_earlier_frames_and_closes() {
        let scratch = TempDir::new().unwrap();
        let backend = ScriptedBackend::default();
        backend.push_frame(vec![1]);
        backend.push_frame(vec![2]);
        backend.push_read_error("sensor fault");

        let result = runner(backend.clone(), &scratch)
            .run(0, Duration::ZERO, 5)
            .await
            .unwrap();

        assert_eq!(result.frame_count(), 2);
        assert!(result.frame_paths.iter().all(|p| p.exists()));

        let meta = read_meta(&result).await;
        assert_eq!(meta["success"], false);
        assert!(meta["reason"]
            .as_str()
            .unwrap()
            .contains("Device read failure"));
        // Failed sessions carry no timestamps, even partial ones
        assert_eq!(meta["count"], 0);
        assert!(meta["timestamps"].as_array().unwrap().is_empty());

        assert_eq!(backend.closes(), 1);
    }

    #[tokio::test]
    async fn test_scratch_reset_clears_previous_session() {
        let scratch = TempDir::new().unwrap();
        let stale = scratch.path().join("stale.jpeg");
        tokio::fs::write(&stale, b"old").await.unwrap();

        let backend = ScriptedBackend::with_frames(1);
        runner(backend, &scratch)
            .run(0, Duration::ZERO, 1)
            .await
            .unwrap();

        assert!(!stale.exists(), "stale frame should have been wiped");
        assert!(scratch.path().join("000.jpeg").exists());
    }

    #[tokio::test]
    async fn test_zero_captures_yields_empty_success() {
        let scratch = TempDir::new().unwrap();
        let backend = ScriptedBackend::default();

        let result = runner(backend.clone(), &scratch)
            .run(0, Duration::from_millis(50), 0)
            .await
            .unwrap();

        assert_eq!(result.frame_count(), 0);
        let meta = read_meta(&result).await;
        assert_eq!(meta["success"], true);
        assert_eq!(meta["count"], 0);
        assert_eq!(backend.opens(), 1);
        assert_eq!(backend.closes(), 1);
    }

    #[tokio::test]
    async fn test_cadence_spends_at_least_the_interval() {
        let scratch = TempDir::new().unwrap();
        let backend = ScriptedBackend::with_frames(3);

        let started = Instant::now();
        runner(backend, &scratch)
            .run(0, Duration::from_millis(50), 3)
            .await
            .unwrap();

        // Three post-frame pauses of >= 50ms each
        assert!(started.elapsed() >= Duration::from_millis(150));
    }
}
