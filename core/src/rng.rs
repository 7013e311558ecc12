//! Deterministic random number generation.
//!
//! RULE: Nothing in the simulation may call any platform RNG.
//! All randomness flows through SubsystemRng instances derived
//! from the single master seed of the run.
//!
//! Each subsystem gets a fresh stream per tick, seeded from
//! (master_seed, subsystem slot, tick). This means:
//!   - Adding a new subsystem never changes existing subsystems' streams.
//!   - A tick re-simulated after a rewind draws exactly the same numbers.

use crate::types::Tick;
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG for a single subsystem and tick.
pub struct SubsystemRng {
    pub name: &'static str,
    inner:    Pcg64Mcg,
}

impl SubsystemRng {
    /// Create a subsystem RNG from the master seed, a stable subsystem
    /// index and the tick being simulated.
    pub fn new(master_seed: u64, subsystem_index: u64, tick: Tick) -> Self {
        let derived_seed = master_seed
            ^ subsystem_index.wrapping_mul(0x9e37_79b9_7f4a_7c15)
            ^ tick.wrapping_mul(0xbf58_476d_1ce4_e5b9);
        Self {
            name:  "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a float in [0.0, 1.0) at f32 precision.
    pub fn next_f32(&mut self) -> f32 {
        let bits = self.inner.next_u32();
        (bits >> 8) as f32 * (1.0 / (1u32 << 24) as f32)
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// Hands out per-subsystem, per-tick RNGs for a single run.
#[derive(Debug, Clone, Copy)]
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn for_subsystem_at_tick(&self, slot: SubsystemSlot, tick: Tick) -> SubsystemRng {
        SubsystemRng::new(self.master_seed, slot as u64, tick).with_name(slot.name())
    }
}

/// Stable subsystem slot assignments.
/// NEVER reorder or remove entries; only append.
/// Reordering changes every subsystem's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum SubsystemSlot {
    Mining = 0,
    Hauling = 1,
    Training = 2,
    Telemetry = 3,
    // Add new subsystems here. Append only.
}

impl SubsystemSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mining    => "mining",
            Self::Hauling   => "hauling",
            Self::Training  => "training",
            Self::Telemetry => "telemetry",
        }
    }
}
