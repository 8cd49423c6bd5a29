//! Fleet CLI - command line tools for the drone fleet dispatch system.
//!
//! Binaries:
//! - demo_fleet: in-process fleet simulation with random orders
//! - plan_route: grid route planning around no-fly zones

pub mod scenario;

pub use scenario::{parse_zone, random_orders, seed_fleet, Scenario};
