//! Fieldcam Library
//!
//! Unattended field-recording agent
//!
//! ## Architecture (5 Components)
//!
//! 1. CaptureRunner - One timed burst of frames per session
//! 2. SessionArchiver - Zip bundling and upload
//! 3. RetentionPruner - Remote retention of the newest N sessions
//! 4. Agent - The capture/archive/prune cycle
//! 5. Collaborators - Camera device and object store seams
//!
//! ## Design Principles
//!
//! - One session at a time: no shared mutable state, no locks
//! - Failures are session records too: failed sessions still upload their
//!   metadata document
//! - Deletions only run against a complete listing

pub mod agent;
pub mod archive;
pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod retention;
pub mod store;

pub use config::AgentConfig;
pub use error::{Error, Result};
