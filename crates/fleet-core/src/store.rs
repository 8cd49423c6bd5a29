//! Entity store collaborator.
//!
//! Every allocation and simulation step is expressed through this trait, so
//! the persistence mechanism behind it stays out of the core.

use crate::error::Result;
use crate::models::{
    Drone, DronePatch, DroneStatus, DroneType, NoFlyZone, Order, OrderPatch,
};

pub trait EntityStore: Send + Sync {
    fn get_drone(&self, id: &str) -> Option<Drone>;

    /// Apply `patch` atomically and return the updated drone.
    fn update_drone(&self, id: &str, patch: DronePatch) -> Result<Drone>;

    fn get_drone_type(&self, id: &str) -> Option<DroneType>;

    fn get_order(&self, id: &str) -> Option<Order>;

    /// Apply `patch` atomically and return the updated order.
    fn update_order(&self, id: &str, patch: OrderPatch) -> Result<Order>;

    /// All orders currently referencing `drone_id`, in any status.
    fn find_orders_by_drone(&self, drone_id: &str) -> Vec<Order>;

    fn find_pending_orders(&self) -> Vec<Order>;

    fn find_drones_by_status(&self, status: DroneStatus) -> Vec<Drone>;

    fn find_all_zones(&self) -> Vec<NoFlyZone>;
}
