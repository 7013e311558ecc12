//! Deterministic rewind spine for a tick-based mining simulation.
//!
//! Leaf-first: journal and snapshot store, capacity manager, recorder,
//! rewind controller. The world, gameplay subsystems and engine drive them.

pub mod adapters;
pub mod capacity;
pub mod clock;
pub mod command;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod event;
pub mod hauling;
pub mod journal;
pub mod mining;
pub mod recorder;
pub mod rng;
pub mod snapshot;
pub mod spine;
pub mod store;
pub mod subsystem;
pub mod telemetry;
pub mod training;
pub mod types;
pub mod world;
