//! Flight simulation scenarios.
//!
//! Runs the engine in-process on a paused tokio clock, so minutes of
//! simulated flight complete instantly and deterministically.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use fleet_core::{
    Drone, DronePatch, DroneStatus, DroneType, EntityStore, FleetError, NoFlyZone, Order,
    OrderPatch, OrderPriority, OrderStatus, Position, Result,
};
use fleet_server::config::Config;
use fleet_server::loops::FlightEngine;
use fleet_server::state::AppState;
use fleet_server::FleetService;

/// Store that refuses the next drone retarget, as if the drone vanished
/// halfway through a store update.
struct FlakyStore {
    inner: Arc<AppState>,
    fail_retarget: AtomicBool,
}

impl EntityStore for FlakyStore {
    fn get_drone(&self, id: &str) -> Option<Drone> {
        self.inner.get_drone(id)
    }

    fn update_drone(&self, id: &str, patch: DronePatch) -> Result<Drone> {
        if patch.target.is_some() && self.fail_retarget.swap(false, Ordering::SeqCst) {
            return Err(FleetError::drone_not_found(id));
        }
        self.inner.update_drone(id, patch)
    }

    fn get_drone_type(&self, id: &str) -> Option<DroneType> {
        self.inner.get_drone_type(id)
    }

    fn get_order(&self, id: &str) -> Option<Order> {
        self.inner.get_order(id)
    }

    fn update_order(&self, id: &str, patch: OrderPatch) -> Result<Order> {
        self.inner.update_order(id, patch)
    }

    fn find_orders_by_drone(&self, drone_id: &str) -> Vec<Order> {
        self.inner.find_orders_by_drone(drone_id)
    }

    fn find_pending_orders(&self) -> Vec<Order> {
        self.inner.find_pending_orders()
    }

    fn find_drones_by_status(&self, status: DroneStatus) -> Vec<Drone> {
        self.inner.find_drones_by_status(status)
    }

    fn find_all_zones(&self) -> Vec<NoFlyZone> {
        self.inner.find_all_zones()
    }
}

fn flaky_engine(state: &Arc<AppState>) -> (Arc<FlightEngine>, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore {
        inner: state.clone(),
        fail_retarget: AtomicBool::new(true),
    });
    let engine = FlightEngine::new(store.clone(), Config::default().simulation());
    (engine, store)
}

fn setup() -> (Arc<FleetService>, Arc<AppState>) {
    let config = Config::default();
    let state = Arc::new(AppState::new(config.grid_size));
    state.register_drone_type(DroneType {
        id: "quad".to_string(),
        model: "Quad X".to_string(),
        max_speed_kmh: 60.0,
        capacity_kg: 10.0,
    });
    state
        .register_drone(Drone {
            id: "D1".to_string(),
            serial_number: "SN-D1".to_string(),
            type_id: "quad".to_string(),
            position: Position::new(0.0, 0.0),
            status: DroneStatus::Idle,
            battery_pct: 100.0,
            capacity_kg: 10.0,
            current_load_kg: 0.0,
            target: None,
            total_deliveries: 0,
            emergency_landings: 0,
        })
        .unwrap();
    let service = Arc::new(FleetService::new(state.clone(), config.simulation()));
    (service, state)
}

fn add_order(state: &AppState, id: &str, x: f64, y: f64, priority: OrderPriority) {
    state
        .register_order(Order {
            id: id.to_string(),
            destination: Position::new(x, y),
            weight_kg: 2.0,
            priority,
            status: OrderStatus::Pending,
            drone_id: None,
            created_at: Utc::now(),
        })
        .unwrap();
}

fn drone(state: &AppState) -> Drone {
    state.get_drone("D1").expect("drone D1")
}

fn order(state: &AppState, id: &str) -> Order {
    state.get_order(id).expect("order")
}

/// Two orders: high priority at distance 5, medium at distance 10.
async fn launch_two_orders(service: &FleetService, state: &AppState) {
    add_order(state, "far", 6.0, 8.0, OrderPriority::Medium);
    add_order(state, "near", 3.0, 4.0, OrderPriority::High);
    service.allocate_order("D1", "far").await.unwrap();
    service.allocate_order("D1", "near").await.unwrap();
    let started = service.start_flight("D1").await.unwrap();
    assert_eq!(started.order_id, "near");
    assert_eq!(started.total_legs, 2);
}

#[tokio::test(start_paused = true)]
async fn full_flight_delivers_in_ranked_order_and_lands_at_base() {
    let (service, state) = setup();
    launch_two_orders(&service, &state).await;

    assert_eq!(drone(&state).status, DroneStatus::Flying);
    assert_eq!(order(&state, "near").status, OrderStatus::InRoute);
    assert_eq!(order(&state, "far").status, OrderStatus::Allocated);

    // First leg takes ~8.3s.
    sleep(Duration::from_secs(10)).await;
    assert_eq!(order(&state, "near").status, OrderStatus::Delivered);
    assert_eq!(order(&state, "far").status, OrderStatus::InRoute);
    assert_eq!(drone(&state).total_deliveries, 1);

    // Second leg ends ~16.7s; delivered orders are released on the way home.
    sleep(Duration::from_secs(10)).await;
    let returning = drone(&state);
    assert_eq!(returning.status, DroneStatus::Returning);
    assert_eq!(returning.current_load_kg, 0.0);
    assert_eq!(returning.target, Some(Position::new(0.0, 0.0)));
    assert!(returning.battery_pct < 100.0);
    for id in ["near", "far"] {
        let delivered = order(&state, id);
        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert!(delivered.drone_id.is_none());
    }

    sleep(Duration::from_secs(60)).await;
    let landed = drone(&state);
    assert_eq!(landed.status, DroneStatus::Idle);
    assert_eq!(landed.position, Position::new(0.0, 0.0));
    assert_eq!(landed.battery_pct, 100.0);
    assert!(landed.target.is_none());
    assert_eq!(landed.total_deliveries, 2);
    assert!(!service.engine().is_active("D1"));
}

#[tokio::test(start_paused = true)]
async fn progress_cursor_only_moves_forward() {
    let (service, state) = setup();
    add_order(&state, "a", 2.0, 0.0, OrderPriority::High);
    add_order(&state, "b", 4.0, 0.0, OrderPriority::Medium);
    add_order(&state, "c", 6.0, 0.0, OrderPriority::Low);
    for id in ["a", "b", "c"] {
        service.allocate_order("D1", id).await.unwrap();
    }
    service.start_flight("D1").await.unwrap();

    let mut last_leg = 0;
    let mut seen_legs = Vec::new();
    let mut last_battery = 100.0;
    while let Ok(progress) = service.get_delivery_progress("D1").await {
        if progress.current_order_id.is_none() {
            break;
        }
        assert!(progress.leg_index >= last_leg);
        assert_eq!(progress.total_legs, 3);
        assert!(progress.battery_pct <= last_battery);
        assert!(progress.total_remaining_secs >= progress.leg_remaining_secs);
        if seen_legs.last() != Some(&progress.leg_index) {
            seen_legs.push(progress.leg_index);
        }
        last_leg = progress.leg_index;
        last_battery = progress.battery_pct;
        sleep(Duration::from_millis(250)).await;
    }

    assert_eq!(seen_legs, vec![0, 1, 2]);
    for id in ["a", "b", "c"] {
        let delivered = order(&state, id);
        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert!(delivered.drone_id.is_none());
    }
    assert_eq!(drone(&state).total_deliveries, 3);
}

#[tokio::test(start_paused = true)]
async fn empty_battery_forces_emergency_landing() {
    let (service, state) = setup();
    add_order(&state, "remote", 40.0, 40.0, OrderPriority::High);
    service.allocate_order("D1", "remote").await.unwrap();
    state
        .update_drone("D1", DronePatch::default().battery(2.0))
        .unwrap();
    service.start_flight("D1").await.unwrap();

    // Two battery ticks drain 2%.
    sleep(Duration::from_secs(12)).await;
    let landed = drone(&state);
    assert_eq!(landed.status, DroneStatus::Idle);
    assert_eq!(landed.battery_pct, 0.0);
    assert!(landed.target.is_none());
    assert_eq!(landed.emergency_landings, 1);
    assert!(landed.position.x > 0.0 && landed.position.x < 40.0);
    assert!(!service.engine().is_active("D1"));

    let stranded = order(&state, "remote");
    assert_eq!(stranded.status, OrderStatus::InRoute);
    assert_eq!(stranded.drone_id.as_deref(), Some("D1"));

    sleep(Duration::from_secs(60)).await;
    let later = drone(&state);
    assert_eq!(later.position, landed.position);
    assert_eq!(later.battery_pct, 0.0);
    assert_eq!(later.status, DroneStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_freezes_the_drone() {
    let (service, state) = setup();
    add_order(&state, "remote", 30.0, 30.0, OrderPriority::High);
    service.allocate_order("D1", "remote").await.unwrap();
    service.start_flight("D1").await.unwrap();

    sleep(Duration::from_secs(3)).await;
    assert!(service.engine().stop_flight("D1").await.unwrap());
    assert!(!service.engine().stop_flight("D1").await.unwrap());

    let stopped = drone(&state);
    assert_eq!(stopped.status, DroneStatus::Idle);
    assert!(stopped.position.x > 0.0);
    assert_eq!(order(&state, "remote").status, OrderStatus::InRoute);

    sleep(Duration::from_secs(30)).await;
    let later = drone(&state);
    assert_eq!(later.position, stopped.position);
    assert_eq!(later.battery_pct, stopped.battery_pct);
    assert!(service.get_delivery_progress("D1").await.is_err());
}

#[tokio::test(start_paused = true)]
async fn deleted_drone_ends_its_simulation() {
    let (service, state) = setup();
    add_order(&state, "remote", 30.0, 30.0, OrderPriority::High);
    service.allocate_order("D1", "remote").await.unwrap();
    service.start_flight("D1").await.unwrap();
    assert!(service.engine().is_active("D1"));

    sleep(Duration::from_secs(2)).await;
    assert!(state.remove_drone("D1"));

    sleep(Duration::from_secs(2)).await;
    assert!(!service.engine().is_active("D1"));
    assert_eq!(service.engine().active_flights(), 0);
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_while_airborne() {
    let (service, state) = setup();
    add_order(&state, "a", 10.0, 10.0, OrderPriority::High);
    service.allocate_order("D1", "a").await.unwrap();
    service.start_flight("D1").await.unwrap();

    assert!(service.start_flight("D1").await.is_err());
    add_order(&state, "late", 5.0, 5.0, OrderPriority::High);
    assert!(service.allocate_order("D1", "late").await.is_err());
}

#[tokio::test(start_paused = true)]
async fn interrupted_flight_resumes_from_stored_state() {
    let (service, state) = setup();
    add_order(&state, "current", 3.0, 4.0, OrderPriority::Low);
    add_order(&state, "queued", 6.0, 8.0, OrderPriority::High);
    for id in ["current", "queued"] {
        state
            .update_order(
                id,
                OrderPatch::default()
                    .status(OrderStatus::Allocated)
                    .drone(Some("D1".to_string())),
            )
            .unwrap();
    }
    state
        .update_order("current", OrderPatch::default().status(OrderStatus::InRoute))
        .unwrap();
    state
        .update_drone(
            "D1",
            DronePatch::default()
                .status(DroneStatus::Flying)
                .load(4.0)
                .position(Position::new(1.0, 1.0)),
        )
        .unwrap();

    assert_eq!(service.resume(), 1);
    let progress = service.get_delivery_progress("D1").await.unwrap();
    assert_eq!(progress.current_order_id.as_deref(), Some("current"));
    assert_eq!(progress.total_legs, 2);

    sleep(Duration::from_secs(120)).await;
    let landed = drone(&state);
    assert_eq!(landed.status, DroneStatus::Idle);
    assert_eq!(landed.position, Position::new(0.0, 0.0));
    assert_eq!(order(&state, "queued").status, OrderStatus::Delivered);
}

#[tokio::test(start_paused = true)]
async fn reset_returns_unloaded_drone_to_base() {
    let (service, state) = setup();
    state
        .update_drone(
            "D1",
            DronePatch::default()
                .position(Position::new(12.0, 7.0))
                .battery(35.0),
        )
        .unwrap();

    let reset = service.reset_to_base("D1").await.unwrap();
    assert_eq!(reset.position, Position::new(0.0, 0.0));
    assert_eq!(reset.battery_pct, 100.0);
    assert_eq!(reset.status, DroneStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn failed_launch_leaves_drone_loaded_and_restartable() {
    let (service, state) = setup();
    add_order(&state, "a", 6.0, 8.0, OrderPriority::High);
    service.allocate_order("D1", "a").await.unwrap();
    let (engine, _store) = flaky_engine(&state);

    assert!(engine.start_flight("D1").is_err());
    assert!(!engine.is_active("D1"));
    let grounded = drone(&state);
    assert_eq!(grounded.status, DroneStatus::Loading);
    assert_eq!(grounded.target, Some(Position::new(6.0, 8.0)));
    assert_eq!(order(&state, "a").status, OrderStatus::Allocated);

    let started = engine.start_flight("D1").unwrap();
    assert_eq!(started.order_id, "a");
    assert_eq!(drone(&state).status, DroneStatus::Flying);
    assert_eq!(order(&state, "a").status, OrderStatus::InRoute);
}

#[tokio::test(start_paused = true)]
async fn failed_return_resume_does_not_hold_the_drone() {
    let (_service, state) = setup();
    state
        .update_drone(
            "D1",
            DronePatch::default()
                .status(DroneStatus::Returning)
                .position(Position::new(3.0, 4.0)),
        )
        .unwrap();
    let (engine, _store) = flaky_engine(&state);

    assert_eq!(engine.resume_flights(), 0);
    assert!(!engine.is_active("D1"));

    assert_eq!(engine.resume_flights(), 1);
    sleep(Duration::from_secs(30)).await;
    let landed = drone(&state);
    assert_eq!(landed.status, DroneStatus::Idle);
    assert_eq!(landed.position, Position::new(0.0, 0.0));
}
