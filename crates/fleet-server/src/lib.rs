//! Shared library surface for the fleet server, its binaries and tests.

pub mod api;
pub mod config;
pub mod loops;
pub mod service;
pub mod state;

pub use service::FleetService;
