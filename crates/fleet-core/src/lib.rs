pub mod allocation;
pub mod error;
pub mod flight;
pub mod models;
pub mod pathfinder;
pub mod ranking;
pub mod store;
pub mod zones;

pub use allocation::{
    allocate, check_allocation, deallocate, optimize_allocation, AllocationOutcome,
    DroneAllocationPlan,
};
pub use error::{EntityKind, FleetError, Result};
pub use flight::{step_toward, DeliveryQueue, SimulationConfig, DEFAULT_SPEED_SCALE};
pub use models::{
    BoundingBox, Drone, DronePatch, DroneStatus, DroneType, GridCell, NoFlyZone, Order,
    OrderPatch, OrderPriority, OrderStatus, Position, DISTANCE_UNITS_PER_CELL, GRID_SIZE,
};
pub use pathfinder::{direct_line, path_distance, GridPathfinder, PathfinderConfig, RoutePlan};
pub use ranking::{rank_candidates, rank_queue, score, OptimizationMethod, RankMethod, ScoredOrder};
pub use store::EntityStore;
pub use zones::{polygon_contains, ExclusionZoneIndex, Zone};
