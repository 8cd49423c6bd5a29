//! Order-to-drone allocation policy.
//!
//! Preconditions are checked in a fixed order so callers always see the most
//! fundamental failure first. Callers must serialize these operations per
//! fleet; the store only guarantees per-record atomicity.

use crate::error::{FleetError, Result};
use crate::models::{Drone, DronePatch, DroneStatus, Order, OrderPatch, OrderStatus, Position};
use crate::ranking::{rank_candidates, OptimizationMethod, ScoredOrder};
use crate::store::EntityStore;
use serde::{Deserialize, Serialize};

/// Tolerance for floating point payload sums.
const LOAD_EPSILON_KG: f64 = 1e-9;

/// Result of a committed allocation change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub drone: Drone,
    pub order: Order,
    pub message: String,
}

/// Candidate orders suggested for one drone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroneAllocationPlan {
    pub drone_id: String,
    pub remaining_capacity_kg: f64,
    pub candidates: Vec<ScoredOrder>,
}

/// Check whether `order` may be added to `drone` without mutating either.
pub fn check_allocation(drone: &Drone, order: &Order) -> Result<()> {
    if !drone.status.is_grounded() {
        return Err(FleetError::InvalidState(format!(
            "Drone {} is {:?} and cannot accept orders",
            drone.id, drone.status
        )));
    }
    if order.status != OrderStatus::Pending || order.drone_id.is_some() {
        return Err(FleetError::InvalidState(format!(
            "Order {} is not pending (status {:?})",
            order.id, order.status
        )));
    }
    let attempted_kg = drone.current_load_kg + order.weight_kg;
    if attempted_kg > drone.capacity_kg + LOAD_EPSILON_KG {
        return Err(FleetError::capacity_exceeded(drone.capacity_kg, attempted_kg));
    }
    Ok(())
}

pub fn allocate(store: &dyn EntityStore, drone_id: &str, order_id: &str) -> Result<AllocationOutcome> {
    let drone = store
        .get_drone(drone_id)
        .ok_or_else(|| FleetError::drone_not_found(drone_id))?;
    let order = store
        .get_order(order_id)
        .ok_or_else(|| FleetError::order_not_found(order_id))?;

    check_allocation(&drone, &order)?;

    let order = store.update_order(
        order_id,
        OrderPatch::default()
            .status(OrderStatus::Allocated)
            .drone(Some(drone_id.to_string())),
    )?;
    let drone = store.update_drone(
        drone_id,
        DronePatch::default()
            .load(drone.current_load_kg + order.weight_kg)
            .status(DroneStatus::Loading)
            .target(Some(order.destination)),
    )?;

    let message = format!(
        "Order {} allocated to drone {} ({:.2}/{:.2}kg)",
        order.id, drone.id, drone.current_load_kg, drone.capacity_kg
    );
    Ok(AllocationOutcome {
        drone,
        order,
        message,
    })
}

pub fn deallocate(
    store: &dyn EntityStore,
    drone_id: &str,
    order_id: &str,
) -> Result<AllocationOutcome> {
    let drone = store
        .get_drone(drone_id)
        .ok_or_else(|| FleetError::drone_not_found(drone_id))?;
    let order = store
        .get_order(order_id)
        .ok_or_else(|| FleetError::order_not_found(order_id))?;

    if order.drone_id.as_deref() != Some(drone_id) || !order.status.is_assigned() {
        return Err(FleetError::InvalidState(format!(
            "Order {} is not allocated to drone {}",
            order_id, drone_id
        )));
    }
    if !drone.status.is_grounded() {
        return Err(FleetError::InvalidState(format!(
            "Drone {} is {:?}; orders cannot be removed once airborne",
            drone_id, drone.status
        )));
    }

    let order = store.update_order(
        order_id,
        OrderPatch::default()
            .status(OrderStatus::Pending)
            .drone(None),
    )?;

    let remaining_kg = (drone.current_load_kg - order.weight_kg).max(0.0);
    let patch = if remaining_kg <= LOAD_EPSILON_KG {
        DronePatch::default()
            .load(0.0)
            .status(DroneStatus::Idle)
            .target(None)
    } else {
        DronePatch::default().load(remaining_kg)
    };
    let drone = store.update_drone(drone_id, patch)?;

    let message = format!(
        "Order {} removed from drone {} ({:.2}/{:.2}kg)",
        order.id, drone.id, drone.current_load_kg, drone.capacity_kg
    );
    Ok(AllocationOutcome {
        drone,
        order,
        message,
    })
}

/// Suggest pending orders for each drone without committing anything.
///
/// Orders are ranked once by `method`, then handed out greedily: each drone
/// takes, in rank order, every not-yet-suggested order that fits its remaining
/// capacity.
pub fn optimize_allocation(
    store: &dyn EntityStore,
    drone_ids: &[String],
    method: OptimizationMethod,
    base: Position,
) -> Result<Vec<DroneAllocationPlan>> {
    let drones = drone_ids
        .iter()
        .map(|id| store.get_drone(id).ok_or_else(|| FleetError::drone_not_found(id)))
        .collect::<Result<Vec<Drone>>>()?;

    let pending = store.find_pending_orders();
    let ranked = rank_candidates(&pending, method, base);
    let mut taken = vec![false; ranked.len()];

    let mut plans = Vec::with_capacity(drones.len());
    for drone in drones {
        let mut remaining_kg = drone.remaining_capacity_kg();
        let mut candidates = Vec::new();
        if drone.status.is_grounded() {
            for (idx, candidate) in ranked.iter().enumerate() {
                if taken[idx] || candidate.weight_kg > remaining_kg + LOAD_EPSILON_KG {
                    continue;
                }
                taken[idx] = true;
                remaining_kg -= candidate.weight_kg;
                candidates.push(candidate.clone());
            }
        }
        plans.push(DroneAllocationPlan {
            remaining_capacity_kg: drone.remaining_capacity_kg(),
            drone_id: drone.id,
            candidates,
        });
    }

    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DroneType, NoFlyZone, OrderPriority};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        drones: Mutex<HashMap<String, Drone>>,
        orders: Mutex<HashMap<String, Order>>,
    }

    impl EntityStore for MemoryStore {
        fn get_drone(&self, id: &str) -> Option<Drone> {
            self.drones.lock().unwrap().get(id).cloned()
        }

        fn update_drone(&self, id: &str, patch: DronePatch) -> Result<Drone> {
            let mut drones = self.drones.lock().unwrap();
            let drone = drones.get_mut(id).ok_or_else(|| FleetError::drone_not_found(id))?;
            patch.apply(drone);
            Ok(drone.clone())
        }

        fn get_drone_type(&self, _id: &str) -> Option<DroneType> {
            None
        }

        fn get_order(&self, id: &str) -> Option<Order> {
            self.orders.lock().unwrap().get(id).cloned()
        }

        fn update_order(&self, id: &str, patch: OrderPatch) -> Result<Order> {
            let mut orders = self.orders.lock().unwrap();
            let order = orders.get_mut(id).ok_or_else(|| FleetError::order_not_found(id))?;
            patch.apply(order);
            Ok(order.clone())
        }

        fn find_orders_by_drone(&self, drone_id: &str) -> Vec<Order> {
            self.orders
                .lock()
                .unwrap()
                .values()
                .filter(|o| o.drone_id.as_deref() == Some(drone_id))
                .cloned()
                .collect()
        }

        fn find_pending_orders(&self) -> Vec<Order> {
            let mut pending: Vec<Order> = self
                .orders
                .lock()
                .unwrap()
                .values()
                .filter(|o| o.status == OrderStatus::Pending)
                .cloned()
                .collect();
            pending.sort_by(|a, b| a.id.cmp(&b.id));
            pending
        }

        fn find_drones_by_status(&self, status: DroneStatus) -> Vec<Drone> {
            self.drones
                .lock()
                .unwrap()
                .values()
                .filter(|d| d.status == status)
                .cloned()
                .collect()
        }

        fn find_all_zones(&self) -> Vec<NoFlyZone> {
            Vec::new()
        }
    }

    impl MemoryStore {
        fn with_drone(self, id: &str, capacity_kg: f64, load_kg: f64) -> Self {
            self.drones.lock().unwrap().insert(
                id.to_string(),
                Drone {
                    id: id.to_string(),
                    serial_number: format!("SN-{}", id),
                    type_id: "t1".to_string(),
                    position: Position::default(),
                    status: if load_kg > 0.0 {
                        DroneStatus::Loading
                    } else {
                        DroneStatus::Idle
                    },
                    battery_pct: 100.0,
                    capacity_kg,
                    current_load_kg: load_kg,
                    target: None,
                    total_deliveries: 0,
                    emergency_landings: 0,
                },
            );
            self
        }

        fn with_order(self, id: &str, weight_kg: f64, priority: OrderPriority, x: f64) -> Self {
            self.orders.lock().unwrap().insert(
                id.to_string(),
                Order {
                    id: id.to_string(),
                    destination: Position::new(x, 10.0),
                    weight_kg,
                    priority,
                    status: OrderStatus::Pending,
                    drone_id: None,
                    created_at: Utc::now(),
                },
            );
            self
        }

        fn assigned_weight(&self, drone_id: &str) -> f64 {
            self.find_orders_by_drone(drone_id)
                .iter()
                .filter(|o| o.status.is_assigned())
                .map(|o| o.weight_kg)
                .sum()
        }
    }

    #[test]
    fn capacity_exceeded_leaves_load_unchanged() {
        let store = MemoryStore::default()
            .with_drone("d1", 10.0, 8.0)
            .with_order("o1", 5.0, OrderPriority::High, 5.0);

        let err = allocate(&store, "d1", "o1").unwrap_err();
        match err {
            FleetError::CapacityExceeded {
                capacity_kg,
                attempted_kg,
                overflow_kg,
            } => {
                assert_eq!(capacity_kg, 10.0);
                assert_eq!(attempted_kg, 13.0);
                assert_eq!(overflow_kg, 3.0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.get_drone("d1").unwrap().current_load_kg, 8.0);
        assert_eq!(store.get_order("o1").unwrap().status, OrderStatus::Pending);
    }

    #[test]
    fn allocate_sets_loading_and_target() {
        let store = MemoryStore::default()
            .with_drone("d1", 10.0, 0.0)
            .with_order("o1", 3.0, OrderPriority::Low, 5.0)
            .with_order("o2", 2.0, OrderPriority::Low, 9.0);

        allocate(&store, "d1", "o1").unwrap();
        let outcome = allocate(&store, "d1", "o2").unwrap();

        assert_eq!(outcome.drone.status, DroneStatus::Loading);
        assert_eq!(outcome.drone.current_load_kg, 5.0);
        assert_eq!(outcome.drone.target, Some(Position::new(9.0, 10.0)));
        assert_eq!(outcome.order.status, OrderStatus::Allocated);
        assert_eq!(outcome.order.drone_id.as_deref(), Some("d1"));
    }

    #[test]
    fn precondition_order_is_respected() {
        let store = MemoryStore::default()
            .with_drone("d1", 10.0, 0.0)
            .with_order("o1", 1.0, OrderPriority::Low, 5.0);

        assert!(matches!(
            allocate(&store, "missing", "nope"),
            Err(FleetError::NotFound { kind: crate::error::EntityKind::Drone, .. })
        ));
        assert!(matches!(
            allocate(&store, "d1", "nope"),
            Err(FleetError::NotFound { kind: crate::error::EntityKind::Order, .. })
        ));

        store
            .update_drone("d1", DronePatch::default().status(DroneStatus::Flying))
            .unwrap();
        assert!(matches!(
            allocate(&store, "d1", "o1"),
            Err(FleetError::InvalidState(_))
        ));
    }

    #[test]
    fn order_cannot_be_allocated_twice() {
        let store = MemoryStore::default()
            .with_drone("d1", 10.0, 0.0)
            .with_drone("d2", 10.0, 0.0)
            .with_order("o1", 4.0, OrderPriority::Low, 5.0);

        allocate(&store, "d1", "o1").unwrap();
        assert!(matches!(
            allocate(&store, "d2", "o1"),
            Err(FleetError::InvalidState(_))
        ));
        assert_eq!(store.get_drone("d2").unwrap().current_load_kg, 0.0);
    }

    #[test]
    fn deallocate_returns_to_idle_when_empty() {
        let store = MemoryStore::default()
            .with_drone("d1", 10.0, 0.0)
            .with_order("o1", 3.0, OrderPriority::Low, 5.0)
            .with_order("o2", 2.0, OrderPriority::Low, 9.0);

        allocate(&store, "d1", "o1").unwrap();
        allocate(&store, "d1", "o2").unwrap();

        let outcome = deallocate(&store, "d1", "o1").unwrap();
        assert_eq!(outcome.drone.status, DroneStatus::Loading);
        assert_eq!(outcome.drone.current_load_kg, 2.0);
        assert_eq!(outcome.drone.target, Some(Position::new(9.0, 10.0)));
        assert_eq!(outcome.order.status, OrderStatus::Pending);
        assert!(outcome.order.drone_id.is_none());

        let outcome = deallocate(&store, "d1", "o2").unwrap();
        assert_eq!(outcome.drone.status, DroneStatus::Idle);
        assert_eq!(outcome.drone.current_load_kg, 0.0);
        assert!(outcome.drone.target.is_none());
    }

    #[test]
    fn deallocate_refused_for_foreign_order_or_airborne_drone() {
        let store = MemoryStore::default()
            .with_drone("d1", 10.0, 0.0)
            .with_drone("d2", 10.0, 0.0)
            .with_order("o1", 3.0, OrderPriority::Low, 5.0);

        allocate(&store, "d1", "o1").unwrap();
        assert!(matches!(
            deallocate(&store, "d2", "o1"),
            Err(FleetError::InvalidState(_))
        ));

        store
            .update_drone("d1", DronePatch::default().status(DroneStatus::Flying))
            .unwrap();
        assert!(matches!(
            deallocate(&store, "d1", "o1"),
            Err(FleetError::InvalidState(_))
        ));
        assert_eq!(store.get_drone("d1").unwrap().current_load_kg, 3.0);
    }

    #[test]
    fn load_matches_assigned_orders_across_sequences() {
        let store = MemoryStore::default()
            .with_drone("d1", 10.0, 0.0)
            .with_order("a", 4.0, OrderPriority::Low, 1.0)
            .with_order("b", 5.0, OrderPriority::Low, 2.0)
            .with_order("c", 3.0, OrderPriority::Low, 3.0)
            .with_order("d", 1.0, OrderPriority::Low, 4.0);

        let steps: [(bool, &str); 9] = [
            (true, "a"),
            (true, "b"),
            (true, "c"),
            (true, "d"),
            (false, "a"),
            (true, "c"),
            (false, "b"),
            (true, "a"),
            (false, "d"),
        ];
        for (is_allocate, order_id) in steps {
            let _ = if is_allocate {
                allocate(&store, "d1", order_id)
            } else {
                deallocate(&store, "d1", order_id)
            };
            let drone = store.get_drone("d1").unwrap();
            assert!(drone.current_load_kg <= drone.capacity_kg);
            assert!((drone.current_load_kg - store.assigned_weight("d1")).abs() < 1e-9);
        }
    }

    #[test]
    fn optimize_hands_out_each_order_once_within_capacity() {
        let store = MemoryStore::default()
            .with_drone("d1", 5.0, 0.0)
            .with_drone("d2", 10.0, 0.0)
            .with_order("o1", 4.0, OrderPriority::High, 5.0)
            .with_order("o2", 4.0, OrderPriority::Medium, 5.0)
            .with_order("o3", 4.0, OrderPriority::Low, 5.0);

        let plans = optimize_allocation(
            &store,
            &["d1".to_string(), "d2".to_string()],
            OptimizationMethod::PriorityOnly,
            Position::default(),
        )
        .unwrap();

        let d1: Vec<&str> = plans[0].candidates.iter().map(|c| c.order_id.as_str()).collect();
        let d2: Vec<&str> = plans[1].candidates.iter().map(|c| c.order_id.as_str()).collect();
        assert_eq!(d1, vec!["o1"]);
        assert_eq!(d2, vec!["o2", "o3"]);
        assert_eq!(plans[0].drone_id, "d1");
        assert_eq!(plans[0].remaining_capacity_kg, 5.0);
        assert_eq!(plans[1].remaining_capacity_kg, 10.0);

        // Suggestions are not committed.
        assert_eq!(store.get_order("o1").unwrap().status, OrderStatus::Pending);
    }

    #[test]
    fn optimize_rejects_unknown_drone() {
        let store = MemoryStore::default();
        assert!(matches!(
            optimize_allocation(
                &store,
                &["ghost".to_string()],
                OptimizationMethod::default(),
                Position::default(),
            ),
            Err(FleetError::NotFound { .. })
        ));
    }
}
