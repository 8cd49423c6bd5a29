//! Delivery order ranking.
//!
//! Two independent contracts live here: ordering one drone's delivery queue,
//! and scoring pending orders for fleet-wide allocation.

use crate::models::{Order, Position};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Ordering rule for a single drone's delivery queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RankMethod {
    /// High before medium before low, ties by distance from the drone.
    #[default]
    Priority,
    /// Nearest to base first.
    DistanceFromBase,
    /// Oldest order first.
    FirstComeFirstServed,
}

/// Strategy for fleet-wide allocation scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizationMethod {
    #[default]
    PriorityDistanceWeight,
    PriorityOnly,
    DistanceOnly,
}

/// An order with the score it was ranked by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredOrder {
    pub order_id: String,
    pub score: f64,
    pub priority: crate::models::OrderPriority,
    pub distance_from_base: f64,
    pub weight_kg: f64,
}

/// Stable sort of `orders` by `method`.
pub fn rank_queue(
    orders: &mut [Order],
    method: RankMethod,
    drone_position: Position,
    base: Position,
) {
    match method {
        RankMethod::Priority => orders.sort_by(|a, b| {
            b.priority.cmp(&a.priority).then_with(|| {
                compare_f64(
                    drone_position.distance_to(&a.destination),
                    drone_position.distance_to(&b.destination),
                )
            })
        }),
        RankMethod::DistanceFromBase => orders.sort_by(|a, b| {
            compare_f64(
                base.distance_to(&a.destination),
                base.distance_to(&b.destination),
            )
        }),
        RankMethod::FirstComeFirstServed => orders.sort_by_key(|order| order.created_at),
    }
}

/// Weighted allocation score; higher is better.
pub fn score(order: &Order, base: Position) -> f64 {
    order.priority.weight() * 100.0
        - base.distance_to(&order.destination) * 0.1
        - order.weight_kg * 0.5
}

/// Score and sort candidate orders, best first.
pub fn rank_candidates(
    orders: &[Order],
    method: OptimizationMethod,
    base: Position,
) -> Vec<ScoredOrder> {
    let mut scored: Vec<ScoredOrder> = orders
        .iter()
        .map(|order| {
            let distance_from_base = base.distance_to(&order.destination);
            let value = match method {
                OptimizationMethod::PriorityDistanceWeight => score(order, base),
                OptimizationMethod::PriorityOnly => order.priority.weight(),
                OptimizationMethod::DistanceOnly => -distance_from_base,
            };
            ScoredOrder {
                order_id: order.id.clone(),
                score: value,
                priority: order.priority,
                distance_from_base,
                weight_kg: order.weight_kg,
            }
        })
        .collect();

    scored.sort_by(|a, b| compare_f64(b.score, a.score));
    scored
}

fn compare_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}
