//! Time-control commands: the mode signal read by the engine each tick.

use crate::types::Tick;
use serde::{Deserialize, Serialize};

/// All time-control commands.
/// Variants added over time, never removed or reordered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum TimeCommand {
    // ── Clock control ─────────────────────────────
    Pause,
    Resume,
    SetSpeed { speed: crate::clock::SimSpeed },

    // ── Rewind ────────────────────────────────────
    /// Enter playback at `target`.
    Rewind { target: Tick },
    /// Leave playback and catch up to the live tick.
    ResumePlayback,
    /// Leave playback and make the rewound tick the live one.
    Branch,
}

/// Commands queued for the next engine tick.
///
/// Only the latest rewind request of a frame takes effect; earlier ones are
/// dropped before anything is applied.
#[derive(Debug, Default)]
pub struct TimeControl {
    queued: Vec<TimeCommand>,
}

impl TimeControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, command: TimeCommand) {
        self.queued.push(command);
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Drain this frame's commands in submission order with superseded
    /// rewind requests removed.
    pub fn drain(&mut self) -> Vec<TimeCommand> {
        let last_rewind = self
            .queued
            .iter()
            .rposition(|c| matches!(c, TimeCommand::Rewind { .. }));

        std::mem::take(&mut self.queued)
            .into_iter()
            .enumerate()
            .filter_map(|(i, cmd)| match cmd {
                TimeCommand::Rewind { target } if Some(i) != last_rewind => {
                    log::debug!("time control: rewind to {target} superseded");
                    None
                }
                other => Some(other),
            })
            .collect()
    }
}
