//! Demo fleets and random order books.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rand::Rng;

use fleet_core::{
    Drone, DroneStatus, DroneType, NoFlyZone, Order, OrderPriority, OrderStatus, Position,
};
use fleet_server::state::AppState;

/// Orders are kept this far inside the grid edge.
const EDGE_MARGIN: f64 = 2.0;

/// A seeded fleet: drone types, drones parked at base, zones and orders.
pub struct Scenario {
    pub drone_types: Vec<DroneType>,
    pub drones: Vec<Drone>,
    pub zones: Vec<NoFlyZone>,
    pub orders: Vec<Order>,
}

impl Scenario {
    /// A mixed fleet of `drone_count` drones at `base` with `order_count`
    /// random orders on a `grid_size` grid.
    pub fn demo(drone_count: usize, order_count: usize, base: Position, grid_size: i32) -> Self {
        let drone_types = vec![
            DroneType {
                id: "courier-s".to_string(),
                model: "Courier S".to_string(),
                max_speed_kmh: 72.0,
                capacity_kg: 5.0,
            },
            DroneType {
                id: "hauler-l".to_string(),
                model: "Hauler L".to_string(),
                max_speed_kmh: 45.0,
                capacity_kg: 15.0,
            },
        ];

        let drones = (0..drone_count)
            .map(|idx| {
                let drone_type = &drone_types[idx % drone_types.len()];
                Drone {
                    id: format!("DRONE{:03}", idx + 1),
                    serial_number: format!("SN-{:05}", 1000 + idx),
                    type_id: drone_type.id.clone(),
                    position: base,
                    status: DroneStatus::Idle,
                    battery_pct: 100.0,
                    capacity_kg: drone_type.capacity_kg,
                    current_load_kg: 0.0,
                    target: None,
                    total_deliveries: 0,
                    emergency_landings: 0,
                }
            })
            .collect();

        let zones = vec![NoFlyZone::new(
            "stadium",
            "Stadium",
            vec![
                Position::new(20.0, 20.0),
                Position::new(28.0, 20.0),
                Position::new(28.0, 28.0),
                Position::new(20.0, 28.0),
            ],
        )];

        Self {
            drone_types,
            drones,
            zones,
            orders: random_orders(order_count, grid_size),
        }
    }
}

/// `count` pending orders with random destinations, weights and priorities.
pub fn random_orders(count: usize, grid_size: i32) -> Vec<Order> {
    let mut rng = rand::rng();
    let max = (grid_size as f64 - EDGE_MARGIN).max(EDGE_MARGIN + 1.0);

    (0..count)
        .map(|idx| {
            let priority = match rng.random_range(0..3) {
                0 => OrderPriority::Low,
                1 => OrderPriority::Medium,
                _ => OrderPriority::High,
            };
            let weight_kg: f64 = rng.random_range(0.5..4.0);
            Order {
                id: format!("ORDER{:04}", idx + 1),
                destination: Position::new(
                    rng.random_range(EDGE_MARGIN..max).round(),
                    rng.random_range(EDGE_MARGIN..max).round(),
                ),
                weight_kg: (weight_kg * 10.0).round() / 10.0,
                priority,
                status: OrderStatus::Pending,
                drone_id: None,
                created_at: Utc::now(),
            }
        })
        .collect()
}

/// Load a scenario into the store.
pub fn seed_fleet(state: &AppState, scenario: &Scenario) -> Result<()> {
    for drone_type in &scenario.drone_types {
        state.register_drone_type(drone_type.clone());
    }
    for drone in &scenario.drones {
        state
            .register_drone(drone.clone())
            .with_context(|| format!("registering drone {}", drone.id))?;
    }
    for zone in &scenario.zones {
        state
            .register_zone(zone.clone())
            .with_context(|| format!("registering zone {}", zone.id))?;
    }
    for order in &scenario.orders {
        state
            .register_order(order.clone())
            .with_context(|| format!("registering order {}", order.id))?;
    }
    Ok(())
}

/// Parse a rectangular zone given as `min_x,min_y,max_x,max_y`.
pub fn parse_zone(id: usize, spec: &str) -> Result<NoFlyZone> {
    let values = spec
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<f64>, _>>()
        .with_context(|| format!("zone '{}' must be four numbers", spec))?;
    let [min_x, min_y, max_x, max_y] = values[..] else {
        bail!("zone '{}' must be min_x,min_y,max_x,max_y", spec);
    };
    if min_x >= max_x || min_y >= max_y {
        bail!("zone '{}' has no area", spec);
    }
    Ok(NoFlyZone::new(
        format!("zone-{}", id + 1),
        format!("Zone {}", id + 1),
        vec![
            Position::new(min_x, min_y),
            Position::new(max_x, min_y),
            Position::new(max_x, max_y),
            Position::new(min_x, max_y),
        ],
    ))
}
