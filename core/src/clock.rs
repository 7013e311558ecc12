//! Simulation clock: owns the live tick, speed control, and pause.

use crate::types::{RunId, Tick};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    pub run_id:       RunId,
    pub current_tick: Tick,
    pub speed:        SimSpeed,
    pub paused:       bool,
}

impl SimClock {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            current_tick: 0,
            speed: SimSpeed::Normal,
            paused: true,
        }
    }

    /// Advance one tick. Returns the new tick number.
    /// Panics if called while paused; callers must check.
    pub fn advance(&mut self) -> Tick {
        assert!(!self.paused, "advance() called on paused clock");
        self.current_tick += 1;
        self.current_tick
    }

    /// Move the live tick back to `tick`. Only used when a rewound timeline
    /// becomes the live one.
    pub fn rewind_to(&mut self, tick: Tick) {
        debug_assert!(tick <= self.current_tick);
        self.current_tick = tick;
    }

    pub fn pause(&mut self)  { self.paused = true;  }
    pub fn resume(&mut self) { self.paused = false; }

    pub fn set_speed(&mut self, speed: SimSpeed) {
        self.speed = speed;
    }

    /// Ticks covered per engine step; also the catch-up stride.
    pub fn ticks_per_step(&self) -> Tick {
        match self.speed {
            SimSpeed::Normal      => 1,
            SimSpeed::Accelerated => 4,
            SimSpeed::FastForward => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimSpeed {
    Normal,       // 1 tick/step
    Accelerated,  // 4 ticks/step
    FastForward,  // 16 ticks/step
}
