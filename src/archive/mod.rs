//! Session archiver
//!
//! ## Responsibilities
//!
//! - Bundle a session's frames and metadata document into one zip container
//! - Upload the container under its unix-timestamp name
//!
//! Frames are already JPEG-compressed, so entries are stored uncompressed.
//! The upload name doubles as the retention sort key.

use crate::capture::{CaptureSessionResult, META_FILE_NAME};
use crate::error::{Error, Result};
use crate::store::ObjectStore;
use chrono::{DateTime, Utc};
use std::io::{Cursor, Write};
use tokio::fs;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Extension of every uploaded session archive
pub const ARCHIVE_EXT: &str = "zip";

/// Name an archive after its upload instant, e.g. `1724568000.zip`
pub fn archive_name(uploaded_at: DateTime<Utc>) -> String {
    format!("{}.{}", uploaded_at.timestamp(), ARCHIVE_EXT)
}

/// Bundles capture sessions and hands them to the store
pub struct SessionArchiver<S: ObjectStore> {
    store: S,
}

impl<S: ObjectStore> SessionArchiver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Bundle one session and upload it. Returns the uploaded object name.
    ///
    /// Any failure maps to `Error::Archive`: the session is lost but the
    /// caller's cycle carries on.
    pub async fn archive(&self, session: &CaptureSessionResult) -> Result<String> {
        let bytes = self
            .bundle(session)
            .await
            .map_err(|e| Error::Archive(format!("bundling failed: {e}")))?;
        let size = bytes.len();

        let name = archive_name(Utc::now());
        self.store
            .put(&name, bytes)
            .await
            .map_err(|e| Error::Archive(format!("upload of {name} failed: {e}")))?;

        tracing::info!(
            name = %name,
            frames = session.frame_count(),
            size = size,
            "Session archive uploaded"
        );
        Ok(name)
    }

    /// Build the zip in memory: every frame by its file name, then the
    /// metadata document. Session payloads are a handful of JPEGs, well
    /// within memory.
    async fn bundle(&self, session: &CaptureSessionResult) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        for path in &session.frame_paths {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    Error::Archive(format!("frame path {} has no file name", path.display()))
                })?;
            let data = fs::read(path).await?;
            writer.start_file(file_name, options)?;
            writer.write_all(&data)?;
        }

        let meta = fs::read(&session.meta_path).await?;
        writer.start_file(META_FILE_NAME, options)?;
        writer.write_all(&meta)?;

        Ok(writer.finish()?.into_inner())
    }
}
