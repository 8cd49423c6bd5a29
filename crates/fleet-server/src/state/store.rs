//! In-memory entity store using DashMap.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use fleet_core::{
    Drone, DronePatch, DroneStatus, DroneType, EntityKind, EntityStore, FleetError, NoFlyZone,
    Order, OrderPatch, OrderStatus, Result, GRID_SIZE,
};

/// Application state - thread-safe store for drones, orders and zones.
pub struct AppState {
    drone_types: DashMap<String, DroneType>,
    drones: DashMap<String, Drone>,
    orders: DashMap<String, Order>,
    zones: DashMap<String, NoFlyZone>,
    drone_counter: AtomicU32,
    grid_size: i32,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(GRID_SIZE)
    }
}

impl AppState {
    pub fn new(grid_size: i32) -> Self {
        Self {
            drone_types: DashMap::new(),
            drones: DashMap::new(),
            orders: DashMap::new(),
            zones: DashMap::new(),
            drone_counter: AtomicU32::new(1),
            grid_size,
        }
    }

    /// Get next drone ID number.
    pub fn next_drone_id(&self) -> u32 {
        self.drone_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn register_drone_type(&self, drone_type: DroneType) {
        self.drone_types.insert(drone_type.id.clone(), drone_type);
    }

    /// Register a drone. Its type must already exist and its id must be new.
    pub fn register_drone(&self, drone: Drone) -> Result<Drone> {
        if !self.drone_types.contains_key(&drone.type_id) {
            return Err(FleetError::NotFound {
                kind: EntityKind::DroneType,
                id: drone.type_id.clone(),
            });
        }
        if !drone.position.within_grid(self.grid_size) {
            return Err(FleetError::OutOfRange {
                x: drone.position.x,
                y: drone.position.y,
            });
        }
        match self.drones.entry(drone.id.clone()) {
            Entry::Occupied(_) => Err(FleetError::InvalidState(format!(
                "Drone {} is already registered",
                drone.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(drone.clone());
                tracing::debug!(drone_id = %drone.id, "Registered drone");
                Ok(drone)
            }
        }
    }

    /// Register a new order. New orders always start pending and unowned.
    pub fn register_order(&self, mut order: Order) -> Result<Order> {
        if !order.destination.within_grid(self.grid_size) {
            return Err(FleetError::OutOfRange {
                x: order.destination.x,
                y: order.destination.y,
            });
        }
        if !(order.weight_kg.is_finite() && order.weight_kg > 0.0) {
            return Err(FleetError::InvalidState(format!(
                "Order {} weight must be positive",
                order.id
            )));
        }
        order.status = OrderStatus::Pending;
        order.drone_id = None;
        match self.orders.entry(order.id.clone()) {
            Entry::Occupied(_) => Err(FleetError::InvalidState(format!(
                "Order {} already exists",
                order.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(order)
            }
        }
    }

    /// Register a no-fly zone, recomputing its cached bounding box.
    pub fn register_zone(&self, zone: NoFlyZone) -> Result<NoFlyZone> {
        let zone = NoFlyZone::new(zone.id, zone.name, zone.polygon);
        let problems = zone.validate(self.grid_size);
        if !problems.is_empty() {
            return Err(FleetError::InvalidState(format!(
                "Zone {} is invalid: {}",
                zone.id,
                problems.join("; ")
            )));
        }
        tracing::info!("Registered no-fly zone '{}' ({})", zone.name, zone.id);
        self.zones.insert(zone.id.clone(), zone.clone());
        Ok(zone)
    }

    pub fn remove_drone(&self, id: &str) -> bool {
        self.drones.remove(id).is_some()
    }

    pub fn remove_order(&self, id: &str) -> bool {
        self.orders.remove(id).is_some()
    }

    pub fn remove_zone(&self, id: &str) -> bool {
        self.zones.remove(id).is_some()
    }

    /// Get all drones, ordered by id.
    pub fn get_all_drones(&self) -> Vec<Drone> {
        let mut drones: Vec<Drone> = self.drones.iter().map(|r| r.value().clone()).collect();
        drones.sort_by(|a, b| a.id.cmp(&b.id));
        drones
    }

    /// Get all orders, oldest first.
    pub fn get_all_orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.iter().map(|r| r.value().clone()).collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        orders
    }

    pub fn drone_count(&self) -> usize {
        self.drones.len()
    }
}

impl EntityStore for AppState {
    fn get_drone(&self, id: &str) -> Option<Drone> {
        self.drones.get(id).map(|r| r.value().clone())
    }

    fn update_drone(&self, id: &str, patch: DronePatch) -> Result<Drone> {
        let mut entry = self
            .drones
            .get_mut(id)
            .ok_or_else(|| FleetError::drone_not_found(id))?;
        patch.apply(entry.value_mut());
        Ok(entry.value().clone())
    }

    fn get_drone_type(&self, id: &str) -> Option<DroneType> {
        self.drone_types.get(id).map(|r| r.value().clone())
    }

    fn get_order(&self, id: &str) -> Option<Order> {
        self.orders.get(id).map(|r| r.value().clone())
    }

    fn update_order(&self, id: &str, patch: OrderPatch) -> Result<Order> {
        let mut entry = self
            .orders
            .get_mut(id)
            .ok_or_else(|| FleetError::order_not_found(id))?;
        patch.apply(entry.value_mut());
        Ok(entry.value().clone())
    }

    fn find_orders_by_drone(&self, drone_id: &str) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|r| r.value().drone_id.as_deref() == Some(drone_id))
            .map(|r| r.value().clone())
            .collect();
        orders.sort_by(|a, b| a.id.cmp(&b.id));
        orders
    }

    fn find_pending_orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|r| r.value().status == OrderStatus::Pending)
            .map(|r| r.value().clone())
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        orders
    }

    fn find_drones_by_status(&self, status: DroneStatus) -> Vec<Drone> {
        let mut drones: Vec<Drone> = self
            .drones
            .iter()
            .filter(|r| r.value().status == status)
            .map(|r| r.value().clone())
            .collect();
        drones.sort_by(|a, b| a.id.cmp(&b.id));
        drones
    }

    fn find_all_zones(&self) -> Vec<NoFlyZone> {
        let mut zones: Vec<NoFlyZone> = self.zones.iter().map(|r| r.value().clone()).collect();
        zones.sort_by(|a, b| a.id.cmp(&b.id));
        zones
    }
}
