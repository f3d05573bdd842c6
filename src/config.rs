//! Agent configuration
//!
//! ## Responsibilities
//! - Load the process-wide configuration once at startup
//! - Reject startup with the offending key named when a value is missing or malformed
//! - Accept values from environment variables or from a JSON settings file

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable pointing at an optional JSON settings file.
/// When set, the file replaces the environment as the settings source.
pub const SETTINGS_FILE_VAR: &str = "FIELDCAM_SETTINGS_FILE";

/// Recognized settings keys, shared by the env and JSON sources
pub mod keys {
    pub const DROPBOX_ACCESS_TOKEN: &str = "DROPBOX_ACCESS_TOKEN";
    pub const CAPTURE_TMP_FOLDER_PATH: &str = "CAPTURE_TMP_FOLDER_PATH";
    pub const CAMERA_ID: &str = "CAMERA_ID";
    pub const SESSION_CAPTURE_INTERVAL_SECONDS: &str = "SESSION_CAPTURE_INTERVAL_SECONDS";
    pub const SESSION_N_CAPTURES: &str = "SESSION_N_CAPTURES";
    pub const INTERVAL_SESSION_SECONDS: &str = "INTERVAL_SESSION_SECONDS";
    pub const MAX_UPLOAD_SESSIONS: &str = "MAX_UPLOAD_SESSIONS";
}

/// Agent configuration, immutable after startup
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Dropbox OAuth access token
    pub dropbox_access_token: String,
    /// Local scratch directory, wiped at the start of every session
    pub scratch_dir: PathBuf,
    /// Camera device index (/dev/video{N})
    pub camera_id: u32,
    /// Target seconds between the starts of consecutive frame captures
    pub capture_interval_secs: f64,
    /// Frames captured per session
    pub captures_per_session: u32,
    /// Idle seconds between the end of one cycle and the start of the next
    pub inter_session_delay_secs: f64,
    /// Number of most recent session archives kept remote
    pub max_retained_sessions: usize,
}

impl AgentConfig {
    /// Load from the JSON settings file when `FIELDCAM_SETTINGS_FILE` is set,
    /// otherwise from environment variables.
    pub fn load() -> Result<Self> {
        match std::env::var(SETTINGS_FILE_VAR) {
            Ok(path) if !path.is_empty() => Self::from_json_file(Path::new(&path)),
            _ => Self::from_env(),
        }
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a flat JSON object whose fields use the same keys as the
    /// environment variables. Numeric fields may be JSON numbers or strings.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read settings file {}: {}", path.display(), e))
        })?;
        let doc: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            Error::Config(format!("settings file {} is not valid JSON: {}", path.display(), e))
        })?;
        Self::from_lookup(|key| doc.get(key).and_then(setting_to_string))
    }

    /// Build and validate from a key lookup. Every failure names the key so
    /// the operator knows what to fix.
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key).ok_or_else(|| Error::Config(format!("missing required setting: {key}")))
        };

        let config = Self {
            dropbox_access_token: get(keys::DROPBOX_ACCESS_TOKEN)?,
            scratch_dir: PathBuf::from(get(keys::CAPTURE_TMP_FOLDER_PATH)?),
            camera_id: parse_setting(keys::CAMERA_ID, &get(keys::CAMERA_ID)?)?,
            capture_interval_secs: parse_setting(
                keys::SESSION_CAPTURE_INTERVAL_SECONDS,
                &get(keys::SESSION_CAPTURE_INTERVAL_SECONDS)?,
            )?,
            captures_per_session: parse_setting(
                keys::SESSION_N_CAPTURES,
                &get(keys::SESSION_N_CAPTURES)?,
            )?,
            inter_session_delay_secs: parse_setting(
                keys::INTERVAL_SESSION_SECONDS,
                &get(keys::INTERVAL_SESSION_SECONDS)?,
            )?,
            max_retained_sessions: parse_setting(
                keys::MAX_UPLOAD_SESSIONS,
                &get(keys::MAX_UPLOAD_SESSIONS)?,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.dropbox_access_token.trim().is_empty() {
            return Err(Error::Config(format!(
                "{} must not be empty",
                keys::DROPBOX_ACCESS_TOKEN
            )));
        }
        if self.scratch_dir.as_os_str().is_empty() {
            return Err(Error::Config(format!(
                "{} must not be empty",
                keys::CAPTURE_TMP_FOLDER_PATH
            )));
        }
        validate_duration_secs(
            keys::SESSION_CAPTURE_INTERVAL_SECONDS,
            self.capture_interval_secs,
        )?;
        validate_duration_secs(
            keys::INTERVAL_SESSION_SECONDS,
            self.inter_session_delay_secs,
        )?;
        Ok(())
    }

    /// Target interval between frame capture starts
    pub fn capture_interval(&self) -> Duration {
        // validated representable at load
        Duration::from_secs_f64(self.capture_interval_secs)
    }

    /// Idle pause between cycles
    pub fn inter_session_delay(&self) -> Duration {
        Duration::from_secs_f64(self.inter_session_delay_secs)
    }
}

/// Render a JSON settings value as the string the parsers expect.
/// Null is treated as absent; everything else keeps its JSON rendering so
/// malformed shapes fail with the key named instead of "missing".
fn setting_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Parse one setting, naming the key and the raw value on failure
fn parse_setting<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| Error::Config(format!("invalid value for {key}: {raw:?} ({e})")))
}

/// Check a seconds setting converts to a `Duration`, naming the key on
/// failure. Rejects negative or non-finite values and values past the
/// `Duration` range.
fn validate_duration_secs(key: &str, secs: f64) -> Result<()> {
    Duration::try_from_secs_f64(secs)
        .map(|_| ())
        .map_err(|e| Error::Config(format!("invalid value for {key}: {secs} ({e})")))
}

// ============================================================
// Tests
// ============================================================
