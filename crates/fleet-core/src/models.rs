//! Core data models for the fleet dispatch system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side length of the operating grid.
pub const GRID_SIZE: i32 = 50;

/// Distance units (meters) covered by one grid unit.
pub const DISTANCE_UNITS_PER_CELL: f64 = 100.0;

/// Continuous position on the operating grid.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in grid units.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Nearest integer grid cell.
    pub fn to_cell(&self) -> GridCell {
        GridCell::new(self.x.round() as i32, self.y.round() as i32)
    }

    /// Whether the position lies on a `size` x `size` grid (edges included).
    pub fn within_grid(&self, size: i32) -> bool {
        let max = size as f64;
        self.x.is_finite()
            && self.y.is_finite()
            && (0.0..=max).contains(&self.x)
            && (0.0..=max).contains(&self.y)
    }
}

/// Integer cell on the pathfinding grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

impl GridCell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn to_position(&self) -> Position {
        Position::new(self.x as f64, self.y as f64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DroneStatus {
    /// On the ground with no payload
    #[default]
    Idle,
    /// On the ground with at least one allocated order
    Loading,
    /// Airborne and working through its delivery queue
    Flying,
    /// Airborne, heading back to base
    Returning,
}

impl DroneStatus {
    /// Whether the drone may still take or drop orders.
    pub fn is_grounded(&self) -> bool {
        matches!(self, DroneStatus::Idle | DroneStatus::Loading)
    }
}

/// Airframe model shared by several drones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroneType {
    pub id: String,
    pub model: String,
    pub max_speed_kmh: f64,
    pub capacity_kg: f64,
}

/// A registered delivery drone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drone {
    pub id: String,
    pub serial_number: String,
    pub type_id: String,
    pub position: Position,
    pub status: DroneStatus,
    pub battery_pct: f64,
    pub capacity_kg: f64,
    pub current_load_kg: f64,
    #[serde(default)]
    pub target: Option<Position>,
    #[serde(default)]
    pub total_deliveries: u32,
    #[serde(default)]
    pub emergency_landings: u32,
}

impl Drone {
    /// Payload still available before hitting capacity.
    pub fn remaining_capacity_kg(&self) -> f64 {
        (self.capacity_kg - self.current_load_kg).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderPriority {
    Low,
    Medium,
    High,
}

impl OrderPriority {
    /// Weight used by fleet allocation scoring.
    pub fn weight(&self) -> f64 {
        match self {
            OrderPriority::Low => 1.0,
            OrderPriority::Medium => 2.0,
            OrderPriority::High => 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    Pending,
    Allocated,
    InRoute,
    Delivered,
}

impl OrderStatus {
    /// Statuses in which an order counts against a drone's load.
    pub fn is_assigned(&self) -> bool {
        matches!(self, OrderStatus::Allocated | OrderStatus::InRoute)
    }
}

/// A delivery order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub destination: Position,
    pub weight_kg: f64,
    pub priority: OrderPriority,
    pub status: OrderStatus,
    #[serde(default)]
    pub drone_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Axis-aligned bounding box of a zone polygon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Box enclosing `points`, or `None` when it would be empty or degenerate.
    pub fn from_points(points: &[Position]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = BoundingBox {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };
        for point in &points[1..] {
            bbox.min_x = bbox.min_x.min(point.x);
            bbox.max_x = bbox.max_x.max(point.x);
            bbox.min_y = bbox.min_y.min(point.y);
            bbox.max_y = bbox.max_y.max(point.y);
        }
        bbox.is_valid().then_some(bbox)
    }

    pub fn is_valid(&self) -> bool {
        [self.min_x, self.max_x, self.min_y, self.max_y]
            .iter()
            .all(|value| value.is_finite())
            && self.min_x < self.max_x
            && self.min_y < self.max_y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// A polygonal no-fly zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoFlyZone {
    pub id: String,
    pub name: String,
    pub polygon: Vec<Position>,
    /// Cached at construction; `None` for degenerate polygons.
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

impl NoFlyZone {
    pub fn new(id: impl Into<String>, name: impl Into<String>, polygon: Vec<Position>) -> Self {
        let bounding_box = if polygon.len() >= 3 {
            BoundingBox::from_points(&polygon)
        } else {
            None
        };
        Self {
            id: id.into(),
            name: name.into(),
            polygon,
            bounding_box,
        }
    }

    /// Validate zone geometry. Returns list of validation errors (empty = valid).
    pub fn validate(&self, grid_size: i32) -> Vec<String> {
        let mut errors = Vec::new();
        if self.polygon.len() < 3 {
            errors.push("Polygon must have at least 3 vertices".to_string());
        }
        for (idx, point) in self.polygon.iter().enumerate() {
            if !point.within_grid(grid_size) {
                errors.push(format!(
                    "Vertex {} ({}, {}) lies outside the 0..{} grid",
                    idx, point.x, point.y, grid_size
                ));
            }
        }
        errors
    }
}

/// Partial update applied to a stored drone.
#[derive(Debug, Clone, Default)]
pub struct DronePatch {
    pub position: Option<Position>,
    pub status: Option<DroneStatus>,
    pub battery_pct: Option<f64>,
    pub current_load_kg: Option<f64>,
    /// `Some(None)` clears the target.
    pub target: Option<Option<Position>>,
    pub total_deliveries: Option<u32>,
    pub emergency_landings: Option<u32>,
}

impl DronePatch {
    pub fn position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn status(mut self, status: DroneStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn battery(mut self, battery_pct: f64) -> Self {
        self.battery_pct = Some(battery_pct);
        self
    }

    pub fn load(mut self, current_load_kg: f64) -> Self {
        self.current_load_kg = Some(current_load_kg);
        self
    }

    pub fn target(mut self, target: Option<Position>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn total_deliveries(mut self, count: u32) -> Self {
        self.total_deliveries = Some(count);
        self
    }

    pub fn emergency_landings(mut self, count: u32) -> Self {
        self.emergency_landings = Some(count);
        self
    }

    pub fn apply(&self, drone: &mut Drone) {
        if let Some(position) = self.position {
            drone.position = position;
        }
        if let Some(status) = self.status {
            drone.status = status;
        }
        if let Some(battery) = self.battery_pct {
            drone.battery_pct = battery.clamp(0.0, 100.0);
        }
        if let Some(load) = self.current_load_kg {
            drone.current_load_kg = load.max(0.0);
        }
        if let Some(target) = self.target {
            drone.target = target;
        }
        if let Some(count) = self.total_deliveries {
            drone.total_deliveries = count;
        }
        if let Some(count) = self.emergency_landings {
            drone.emergency_landings = count;
        }
    }
}

/// Partial update applied to a stored order.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    /// `Some(None)` clears the drone reference.
    pub drone_id: Option<Option<String>>,
}

impl OrderPatch {
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn drone(mut self, drone_id: Option<String>) -> Self {
        self.drone_id = Some(drone_id);
        self
    }

    pub fn apply(&self, order: &mut Order) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(drone_id) = &self.drone_id {
            order.drone_id = drone_id.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_rejects_degenerate_polygons() {
        let line = vec![
            Position::new(1.0, 1.0),
            Position::new(2.0, 1.0),
            Position::new(3.0, 1.0),
        ];
        assert!(BoundingBox::from_points(&line).is_none());

        let zone = NoFlyZone::new("z1", "line", line);
        assert!(zone.bounding_box.is_none());
    }

    #[test]
    fn zone_with_two_points_has_no_box() {
        let zone = NoFlyZone::new(
            "z2",
            "pair",
            vec![Position::new(0.0, 0.0), Position::new(5.0, 5.0)],
        );
        assert!(zone.bounding_box.is_none());
        assert!(!zone.validate(GRID_SIZE).is_empty());
    }

    #[test]
    fn order_status_serializes_kebab_case() {
        let json = serde_json::to_string(&OrderStatus::InRoute).unwrap();
        assert_eq!(json, "\"in-route\"");
    }

    #[test]
    fn patch_clears_target_and_floors_load() {
        let mut drone = Drone {
            id: "d1".to_string(),
            serial_number: "SN-1".to_string(),
            type_id: "t1".to_string(),
            position: Position::default(),
            status: DroneStatus::Loading,
            battery_pct: 80.0,
            capacity_kg: 10.0,
            current_load_kg: 2.0,
            target: Some(Position::new(4.0, 4.0)),
            total_deliveries: 0,
            emergency_landings: 0,
        };
        DronePatch::default().target(None).load(-1.0).apply(&mut drone);
        assert!(drone.target.is_none());
        assert_eq!(drone.current_load_kg, 0.0);
    }
}
