use crate::types::Tick;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Rewind target {target} is outside the retention window (oldest snapshot: {oldest:?})")]
    OutOfRetentionWindow { target: Tick, oldest: Option<Tick> },

    #[error("Rewind target {target} is ahead of the live tick {live}")]
    TargetBeyondLive { target: Tick, live: Tick },

    #[error("Journal entry at tick {tick} ({kind}) references an entity that no longer exists")]
    DanglingJournalReference { tick: Tick, kind: &'static str },

    #[error("Capture for tick {tick} conflicts with prune cutoff {cutoff}")]
    InconsistentCaptureWrite { tick: Tick, cutoff: Tick },

    #[error("'{operation}' is not allowed in {mode} mode")]
    ModeViolation { operation: &'static str, mode: &'static str },

    #[error("Journal append at tick {tick} would precede newest entry at tick {newest}")]
    JournalOrder { tick: Tick, newest: Tick },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SpineError {
    /// Errors the controller and engine recover from locally.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            SpineError::InconsistentCaptureWrite { .. }
                | SpineError::Database(_)
                | SpineError::Serialization(_)
                | SpineError::Other(_)
        )
    }
}

pub type SpineResult<T> = Result<T, SpineError>;
