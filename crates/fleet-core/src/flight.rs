//! Flight simulation primitives: timing constants, kinematics and the
//! per-flight delivery queue.

use crate::models::{Order, OrderStatus, Position, DISTANCE_UNITS_PER_CELL, GRID_SIZE};
use crate::ranking::{rank_queue, RankMethod};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Grid units per second gained per km/h of airframe max speed.
///
/// A simulation-scale choice, not a physical conversion: at 0.01 a 60 km/h
/// drone crosses the full 50-unit grid in roughly 83 seconds.
pub const DEFAULT_SPEED_SCALE: f64 = 0.01;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub base: Position,
    pub grid_size: i32,
    pub movement_tick: Duration,
    pub battery_tick: Duration,
    /// Battery percentage drained per battery tick while flying.
    pub battery_drain_pct: f64,
    pub speed_scale: f64,
    pub min_leg_duration: Duration,
    /// Grid units within which a drone counts as arrived.
    pub arrival_tolerance: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            base: Position::new(0.0, 0.0),
            grid_size: GRID_SIZE,
            movement_tick: Duration::from_millis(500),
            battery_tick: Duration::from_secs(5),
            battery_drain_pct: 1.0,
            speed_scale: DEFAULT_SPEED_SCALE,
            min_leg_duration: Duration::from_secs(1),
            arrival_tolerance: 0.1,
        }
    }
}

impl SimulationConfig {
    /// Grid units per second for an airframe.
    pub fn grid_speed(&self, max_speed_kmh: f64) -> f64 {
        (max_speed_kmh * self.speed_scale).max(f64::EPSILON)
    }

    /// Grid units covered in one movement tick.
    pub fn step_length(&self, max_speed_kmh: f64) -> f64 {
        self.grid_speed(max_speed_kmh) * self.movement_tick.as_secs_f64()
    }

    /// Leg duration: metric distance over metric speed, floored at the minimum.
    pub fn travel_time(&self, from: Position, to: Position, max_speed_kmh: f64) -> Duration {
        let distance_units = from.distance_to(&to) * DISTANCE_UNITS_PER_CELL;
        let speed_units_per_s = self.grid_speed(max_speed_kmh) * DISTANCE_UNITS_PER_CELL;
        let secs = distance_units / speed_units_per_s;
        if !secs.is_finite() {
            return self.min_leg_duration;
        }
        Duration::from_secs_f64(secs).max(self.min_leg_duration)
    }

    pub fn has_arrived(&self, position: Position, target: Position) -> bool {
        position.distance_to(&target) <= self.arrival_tolerance
    }
}

/// Advance `position` toward `target` by at most `step` grid units.
pub fn step_toward(position: Position, target: Position, step: f64) -> Position {
    let distance = position.distance_to(&target);
    if distance <= step || distance <= f64::EPSILON {
        return target;
    }
    let ratio = step / distance;
    Position::new(
        position.x + (target.x - position.x) * ratio,
        position.y + (target.y - position.y) * ratio,
    )
}

/// Ranked orders of one flight and the cursor over them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryQueue {
    order_ids: Vec<String>,
    destinations: Vec<Position>,
    cursor: usize,
    /// Bumped whenever a leg starts; completions carrying an older value are stale.
    generation: u64,
    flight_complete: bool,
}

impl DeliveryQueue {
    /// Queue for a fresh flight: `orders` ranked by priority, then distance
    /// from the drone.
    pub fn from_orders(mut orders: Vec<Order>, drone_position: Position, base: Position) -> Self {
        rank_queue(&mut orders, RankMethod::Priority, drone_position, base);
        Self::from_ranked(orders)
    }

    /// Rebuild an interrupted flight's queue from the orders still assigned
    /// to the drone. The in-route order, if any, stays at the head.
    pub fn reconstruct(orders: Vec<Order>, drone_position: Position, base: Position) -> Self {
        let (mut in_route, mut allocated): (Vec<Order>, Vec<Order>) = orders
            .into_iter()
            .filter(|order| order.status.is_assigned())
            .partition(|order| order.status == OrderStatus::InRoute);
        in_route.sort_by(|a, b| a.id.cmp(&b.id));
        rank_queue(&mut allocated, RankMethod::Priority, drone_position, base);
        in_route.extend(allocated);
        Self::from_ranked(in_route)
    }

    fn from_ranked(orders: Vec<Order>) -> Self {
        Self {
            destinations: orders.iter().map(|order| order.destination).collect(),
            order_ids: orders.into_iter().map(|order| order.id).collect(),
            cursor: 0,
            generation: 0,
            flight_complete: false,
        }
    }

    pub fn len(&self) -> usize {
        self.order_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order_ids.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_flight_complete(&self) -> bool {
        self.flight_complete
    }

    pub fn order_ids(&self) -> &[String] {
        &self.order_ids
    }

    pub fn current_order(&self) -> Option<&str> {
        self.order_ids.get(self.cursor).map(String::as_str)
    }

    pub fn current_destination(&self) -> Option<Position> {
        self.destinations.get(self.cursor).copied()
    }

    /// Destinations not yet reached, current leg first.
    pub fn remaining_destinations(&self) -> &[Position] {
        &self.destinations[self.cursor.min(self.destinations.len())..]
    }

    /// Order ids already delivered on this flight.
    pub fn delivered(&self) -> &[String] {
        &self.order_ids[..self.cursor.min(self.order_ids.len())]
    }

    /// Start (or restart) the leg at the cursor and return its generation.
    pub fn begin_leg(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Whether a completion raised for `generation` still applies.
    pub fn is_current(&self, generation: u64) -> bool {
        !self.flight_complete && generation == self.generation && self.cursor < self.order_ids.len()
    }

    /// Move past the current order and retire its generation. Marks the
    /// flight complete when the queue is exhausted. Returns `true` when more
    /// orders remain.
    pub fn advance(&mut self) -> bool {
        self.generation += 1;
        if self.cursor < self.order_ids.len() {
            self.cursor += 1;
        }
        if self.cursor >= self.order_ids.len() {
            self.flight_complete = true;
            false
        } else {
            true
        }
    }
}
