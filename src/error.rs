// SPDX-License-Identifier: MIT

//! Error types for the tracking subsystem.
//!
//! Nothing here is fatal to the host application: callers are expected to
//! catch, log with context, and fall back to "try again on next trigger".

/// Tracking subsystem error type.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// A native SDK call rejected (bridge/network failure).
    #[error("SDK call failed: {0}")]
    Sdk(String),

    /// `getCurrentPosition` failed (timeout, provider off, permission).
    #[error("Position unavailable: {0}")]
    Position(String),

    /// Sync gave up after exhausting all attempts.
    #[error("Sync failed after {attempts} attempts")]
    SyncExhausted { attempts: u32 },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias for the tracking subsystem.
pub type Result<T> = std::result::Result<T, TrackerError>;
