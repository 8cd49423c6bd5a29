//! Server configuration from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use fleet_core::{Position, SimulationConfig, DEFAULT_SPEED_SCALE, GRID_SIZE};

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub base_x: f64,
    pub base_y: f64,
    pub grid_size: i32,
    pub movement_tick_ms: u64,
    pub battery_tick_ms: u64,
    pub battery_drain_pct: f64,
    pub speed_scale: f64,
    pub min_leg_secs: f64,
    pub arrival_tolerance: f64,
}

impl Default for Config {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            server_port: 3000,
            base_x: sim.base.x,
            base_y: sim.base.y,
            grid_size: GRID_SIZE,
            movement_tick_ms: sim.movement_tick.as_millis() as u64,
            battery_tick_ms: sim.battery_tick.as_millis() as u64,
            battery_drain_pct: sim.battery_drain_pct,
            speed_scale: DEFAULT_SPEED_SCALE,
            min_leg_secs: sim.min_leg_duration.as_secs_f64(),
            arrival_tolerance: sim.arrival_tolerance,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env_or("FLEET_PORT", defaults.server_port),
            base_x: env_or("FLEET_BASE_X", defaults.base_x),
            base_y: env_or("FLEET_BASE_Y", defaults.base_y),
            grid_size: env_or("FLEET_GRID_SIZE", defaults.grid_size),
            movement_tick_ms: env_or("FLEET_MOVEMENT_TICK_MS", defaults.movement_tick_ms).max(1),
            battery_tick_ms: env_or("FLEET_BATTERY_TICK_MS", defaults.battery_tick_ms).max(1),
            battery_drain_pct: env_or("FLEET_BATTERY_DRAIN_PCT", defaults.battery_drain_pct),
            speed_scale: env_or("FLEET_SPEED_SCALE", defaults.speed_scale),
            min_leg_secs: env_or("FLEET_MIN_LEG_SECS", defaults.min_leg_secs),
            arrival_tolerance: env_or("FLEET_ARRIVAL_TOLERANCE", defaults.arrival_tolerance),
        }
    }

    pub fn base(&self) -> Position {
        Position::new(self.base_x, self.base_y)
    }

    pub fn simulation(&self) -> SimulationConfig {
        let min_leg_secs = if self.min_leg_secs.is_finite() {
            self.min_leg_secs.max(0.0)
        } else {
            0.0
        };
        SimulationConfig {
            base: self.base(),
            grid_size: self.grid_size,
            movement_tick: Duration::from_millis(self.movement_tick_ms),
            battery_tick: Duration::from_millis(self.battery_tick_ms),
            battery_drain_pct: self.battery_drain_pct,
            speed_scale: self.speed_scale,
            min_leg_duration: Duration::from_secs_f64(min_leg_secs),
            arrival_tolerance: self.arrival_tolerance,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
