//! Subscriber setup for the engine's structured events.
//!
//! The engine emits `DROP`, `POWER`, `INTERFACE`, `ACL`, `SOFTWARE`, `ARP`,
//! and `MESSAGE` events through `tracing`; this module installs a global
//! subscriber that writes them as JSON lines so a run leaves an auditable
//! record.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error as ThisError;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, ThisError)]
pub enum LoggingError {
    #[error("could not open log file: {0}")]
    Io(#[from] std::io::Error),
    #[error("a global subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] SetGlobalDefaultError),
}

/// Installs a global subscriber appending JSON events to the given file.
/// Call once, before the first step of the first scenario.
pub fn init_logging(path: impl AsRef<Path>) -> Result<(), LoggingError> {
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path.as_ref())?;
    let subscriber = FmtSubscriber::builder()
        .with_writer(Arc::new(file))
        .json()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
