//! Agent control loop
//!
//! ## Responsibilities
//!
//! - Run each cycle strictly in order: capture, archive, prune
//! - Absorb per-cycle failures so one bad session never stops the agent
//! - Idle for the configured delay between cycles
//!
//! Exactly one cycle step runs at a time. The camera, the scratch directory
//! and the remote namespace each have a single owner per phase, so there is
//! nothing to lock.

use crate::archive::SessionArchiver;
use crate::camera::CameraBackend;
use crate::capture::CaptureRunner;
use crate::config::AgentConfig;
use crate::retention::RetentionPruner;
use crate::store::ObjectStore;

/// The capture/archive/prune cycle, wired to one camera and one store
pub struct Agent<B, S>
where
    B: CameraBackend,
    S: ObjectStore + Clone,
{
    config: AgentConfig,
    runner: CaptureRunner<B>,
    archiver: SessionArchiver<S>,
    pruner: RetentionPruner<S>,
}

impl<B, S> Agent<B, S>
where
    B: CameraBackend,
    S: ObjectStore + Clone,
{
    pub fn new(config: AgentConfig, backend: B, store: S) -> Self {
        let runner = CaptureRunner::new(backend, config.scratch_dir.clone());
        let archiver = SessionArchiver::new(store.clone());
        let pruner = RetentionPruner::new(store);
        Self {
            config,
            runner,
            archiver,
            pruner,
        }
    }

    /// Run one full cycle. Every failure is logged and absorbed here, at the
    /// cycle boundary; nothing propagates to the caller.
    pub async fn run_once(&self) {
        tracing::info!(
            camera_id = self.config.camera_id,
            captures = self.config.captures_per_session,
            "Session begin"
        );

        let session = match self
            .runner
            .run(
                self.config.camera_id,
                self.config.capture_interval(),
                self.config.captures_per_session,
            )
            .await
        {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::error!(error = %e, "Capture session could not run");
                None
            }
        };

        if let Some(session) = session {
            match self.archiver.archive(&session).await {
                Ok(name) => {
                    tracing::info!(name = %name, "Capture session uploaded");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Session archive failed, session lost");
                }
            }
        }

        if let Err(e) = self.pruner.prune(self.config.max_retained_sessions).await {
            tracing::error!(error = %e, "Retention pass failed, nothing deleted");
        }

        tracing::info!("Session end");
    }

    /// Cycle forever with the configured idle delay in between
    pub async fn run(&self) {
        loop {
            self.run_once().await;

            tracing::info!(
                delay_secs = self.config.inter_session_delay_secs,
                "Waiting before next session"
            );
            tokio::time::sleep(self.config.inter_session_delay()).await;
        }
    }
}
