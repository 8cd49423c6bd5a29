//! Per-drone flight simulation: the engine and the tasks it spawns.

pub mod battery_loop;
pub mod delivery_timer;
pub mod engine;
pub mod movement_loop;
pub mod return_loop;

pub use engine::{DeliveryProgress, FlightEngine, FlightPhase, FlightStarted};
