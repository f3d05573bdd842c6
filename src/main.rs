//! Fieldcam - unattended field-recording agent
//!
//! Main entry point: configuration, logging, store credential check, then
//! the capture/archive/prune cycle until the process is stopped.

use fieldcam::agent::Agent;
use fieldcam::camera::FfmpegBackend;
use fieldcam::config::AgentConfig;
use fieldcam::store::DropboxStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldcam=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting fieldcam v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; a missing or malformed setting stops startup here
    let config = AgentConfig::load().map_err(|e| anyhow::anyhow!("configuration rejected: {e}"))?;
    tracing::info!(
        camera_id = config.camera_id,
        scratch_dir = %config.scratch_dir.display(),
        captures_per_session = config.captures_per_session,
        capture_interval_secs = config.capture_interval_secs,
        inter_session_delay_secs = config.inter_session_delay_secs,
        max_retained_sessions = config.max_retained_sessions,
        "Configuration loaded"
    );

    // Verify the store credential before the first session
    let store = DropboxStore::new(config.dropbox_access_token.clone());
    let account = store
        .current_account()
        .await
        .map_err(|e| anyhow::anyhow!("store credential check failed: {e}"))?;
    tracing::info!(
        account_id = %account.account_id,
        display_name = %account.name.display_name,
        email = %account.email,
        "Store account verified"
    );

    let agent = Agent::new(config, FfmpegBackend, store);
    agent.run().await;

    Ok(())
}
