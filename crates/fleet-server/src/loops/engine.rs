//! Flight simulation engine.
//!
//! One `FlightHandle` per airborne drone. Every tick of that drone's delivery
//! timer, movement, battery and return loops takes the handle's state lock and
//! re-checks cancellation and the leg generation before touching the store.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use fleet_core::{
    DeliveryQueue, Drone, DronePatch, DroneStatus, EntityKind, EntityStore, ExclusionZoneIndex,
    FleetError, GridCell, GridPathfinder, OrderPatch, OrderStatus, PathfinderConfig, Position,
    Result, SimulationConfig,
};

use super::{battery_loop, delivery_timer, movement_loop, return_loop};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightPhase {
    Delivering,
    Returning,
}

/// Registry entry for one drone's simulation.
pub struct FlightHandle {
    pub(super) drone_id: String,
    /// Cancelled on stop, emergency landing or abort. Parent of every task token.
    pub(super) token: CancellationToken,
    pub(super) state: Mutex<FlightState>,
}

impl FlightHandle {
    pub(super) fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub(super) struct FlightState {
    pub(super) phase: FlightPhase,
    pub(super) queue: DeliveryQueue,
    pub(super) max_speed_kmh: f64,
    /// Scope of the battery loop and the delivery legs.
    pub(super) flight_token: CancellationToken,
    pub(super) leg: Option<LegState>,
}

pub(super) struct LegState {
    pub(super) generation: u64,
    pub(super) token: CancellationToken,
    pub(super) started_at: Instant,
    pub(super) duration: Duration,
    pub(super) target: Position,
    pub(super) route: Vec<GridCell>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlightStarted {
    pub drone_id: String,
    pub order_id: String,
    pub delivery_time_secs: f64,
    pub total_legs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryProgress {
    pub drone_id: String,
    pub phase: FlightPhase,
    pub leg_index: usize,
    pub total_legs: usize,
    pub current_order_id: Option<String>,
    pub leg_remaining_secs: f64,
    pub total_remaining_secs: f64,
    pub position: Position,
    pub battery_pct: f64,
    pub target: Option<Position>,
    pub route: Vec<GridCell>,
}

pub struct FlightEngine {
    pub(super) store: Arc<dyn EntityStore>,
    pub(super) config: SimulationConfig,
    pathfinder: GridPathfinder,
    flights: DashMap<String, Arc<FlightHandle>>,
}

impl FlightEngine {
    pub fn new(store: Arc<dyn EntityStore>, config: SimulationConfig) -> Arc<Self> {
        let pathfinder = GridPathfinder::new(PathfinderConfig {
            grid_size: config.grid_size,
            ..PathfinderConfig::default()
        });
        Arc::new(Self {
            store,
            config,
            pathfinder,
            flights: DashMap::new(),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn is_active(&self, drone_id: &str) -> bool {
        self.flights.contains_key(drone_id)
    }

    pub fn active_flights(&self) -> usize {
        self.flights.len()
    }

    /// Launch a loaded drone on its delivery run.
    pub fn start_flight(self: &Arc<Self>, drone_id: &str) -> Result<FlightStarted> {
        let drone = self
            .store
            .get_drone(drone_id)
            .ok_or_else(|| FleetError::drone_not_found(drone_id))?;
        if drone.status != DroneStatus::Loading {
            return Err(FleetError::InvalidState(format!(
                "Drone {} must be loading to start a flight (currently {:?})",
                drone_id, drone.status
            )));
        }

        let orders: Vec<_> = self
            .store
            .find_orders_by_drone(drone_id)
            .into_iter()
            .filter(|order| order.status == OrderStatus::Allocated)
            .collect();
        if orders.is_empty() {
            return Err(FleetError::InvalidState(format!(
                "Drone {} has no allocated orders",
                drone_id
            )));
        }

        let max_speed_kmh = self.max_speed_for(&drone)?;
        let order_ids: Vec<String> = orders.iter().map(|order| order.id.clone()).collect();
        let queue = DeliveryQueue::from_orders(orders, drone.position, self.config.base);
        let total_legs = queue.len();
        let handle = self.register(drone_id, queue, max_speed_kmh, FlightPhase::Delivering)?;

        match self.launch(&handle, total_legs) {
            Ok(started) => {
                tracing::info!(
                    drone_id,
                    order_id = %started.order_id,
                    legs = total_legs,
                    "Flight started, first leg {:.1}s",
                    started.delivery_time_secs
                );
                Ok(started)
            }
            Err(err) => {
                self.release(&handle);
                self.rollback_launch(&drone, &order_ids);
                Err(err)
            }
        }
    }

    /// Put a drone whose launch failed back on the ground as it was.
    fn rollback_launch(&self, drone: &Drone, order_ids: &[String]) {
        for order_id in order_ids {
            let in_route = self
                .store
                .get_order(order_id)
                .is_some_and(|order| order.status == OrderStatus::InRoute);
            if !in_route {
                continue;
            }
            if let Err(err) = self
                .store
                .update_order(order_id, OrderPatch::default().status(OrderStatus::Allocated))
            {
                tracing::warn!(order_id = %order_id, error = %err, "Could not roll back order");
            }
        }
        if let Err(err) = self.store.update_drone(
            &drone.id,
            DronePatch::default().status(drone.status).target(drone.target),
        ) {
            tracing::warn!(drone_id = %drone.id, error = %err, "Could not roll back launch");
        }
    }

    fn launch(self: &Arc<Self>, handle: &Arc<FlightHandle>, total_legs: usize) -> Result<FlightStarted> {
        self.store
            .update_drone(&handle.drone_id, DronePatch::default().status(DroneStatus::Flying))?;
        let (duration, order_id) = self.arm_flight(handle)?;
        Ok(FlightStarted {
            drone_id: handle.drone_id.clone(),
            order_id,
            delivery_time_secs: duration.as_secs_f64(),
            total_legs,
        })
    }

    /// Arm the first leg and the battery loop of a freshly registered handle.
    fn arm_flight(self: &Arc<Self>, handle: &Arc<FlightHandle>) -> Result<(Duration, String)> {
        let mut state = handle.state.try_lock().map_err(|_| {
            FleetError::InvalidState(format!("Drone {} flight state is busy", handle.drone_id))
        })?;
        let duration = self.begin_leg(handle, &mut state)?;
        let order_id = state.queue.current_order().unwrap_or_default().to_string();
        tokio::spawn(battery_loop::run_battery_loop(
            self.clone(),
            handle.clone(),
            state.flight_token.clone(),
        ));
        Ok((duration, order_id))
    }

    /// Cancel every task for the drone. Idempotent; a drone caught airborne is
    /// left idle where it stands and its orders are not finalized.
    pub async fn stop_flight(&self, drone_id: &str) -> Result<bool> {
        if self.store.get_drone(drone_id).is_none() {
            return Err(FleetError::drone_not_found(drone_id));
        }

        let stopped = match self.flights.remove(drone_id) {
            Some((_, handle)) => {
                handle.token.cancel();
                let mut state = handle.state.lock().await;
                state.leg = None;
                true
            }
            None => false,
        };

        let drone = self
            .store
            .get_drone(drone_id)
            .ok_or_else(|| FleetError::drone_not_found(drone_id))?;
        if matches!(drone.status, DroneStatus::Flying | DroneStatus::Returning) {
            self.store.update_drone(
                drone_id,
                DronePatch::default().status(DroneStatus::Idle).target(None),
            )?;
        }
        if stopped {
            tracing::info!(drone_id, "Flight stopped");
        }
        Ok(stopped)
    }

    pub async fn progress(&self, drone_id: &str) -> Result<DeliveryProgress> {
        let drone = self
            .store
            .get_drone(drone_id)
            .ok_or_else(|| FleetError::drone_not_found(drone_id))?;
        let handle = self
            .flights
            .get(drone_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                FleetError::InvalidState(format!("Drone {} is not flying", drone_id))
            })?;

        let state = handle.state.lock().await;
        let (leg_remaining, total_remaining, route) = match (state.phase, &state.leg) {
            (FlightPhase::Delivering, Some(leg)) => {
                let leg_remaining = leg.duration.saturating_sub(leg.started_at.elapsed());
                let mut from = leg.target;
                let mut total = leg_remaining;
                for next in state.queue.remaining_destinations().iter().skip(1) {
                    total += self.config.travel_time(from, *next, state.max_speed_kmh);
                    from = *next;
                }
                (leg_remaining, total, leg.route.clone())
            }
            _ => {
                let remaining =
                    self.config
                        .travel_time(drone.position, self.config.base, state.max_speed_kmh);
                (remaining, remaining, Vec::new())
            }
        };

        Ok(DeliveryProgress {
            drone_id: drone_id.to_string(),
            phase: state.phase,
            leg_index: state.queue.cursor(),
            total_legs: state.queue.len(),
            current_order_id: state.queue.current_order().map(str::to_string),
            leg_remaining_secs: leg_remaining.as_secs_f64(),
            total_remaining_secs: total_remaining.as_secs_f64(),
            position: drone.position,
            battery_pct: drone.battery_pct,
            target: drone.target,
            route,
        })
    }

    /// Pick up flights interrupted by a restart. Returns how many resumed.
    pub fn resume_flights(self: &Arc<Self>) -> usize {
        let mut resumed = 0;

        for drone in self.store.find_drones_by_status(DroneStatus::Flying) {
            let orders = self.store.find_orders_by_drone(&drone.id);
            let queue = DeliveryQueue::reconstruct(orders, drone.position, self.config.base);
            match self.resume_delivering(&drone, queue) {
                Ok(()) => resumed += 1,
                Err(err) => {
                    tracing::warn!(drone_id = %drone.id, error = %err, "Could not resume flight")
                }
            }
        }

        for drone in self.store.find_drones_by_status(DroneStatus::Returning) {
            match self.resume_returning(&drone) {
                Ok(()) => resumed += 1,
                Err(err) => {
                    tracing::warn!(drone_id = %drone.id, error = %err, "Could not resume return")
                }
            }
        }

        if resumed > 0 {
            tracing::info!("Resumed {} interrupted flight(s)", resumed);
        }
        resumed
    }

    fn resume_delivering(self: &Arc<Self>, drone: &Drone, queue: DeliveryQueue) -> Result<()> {
        if queue.is_empty() {
            return self.resume_returning(drone);
        }
        let max_speed_kmh = self.max_speed_for(drone)?;
        let handle = self.register(&drone.id, queue, max_speed_kmh, FlightPhase::Delivering)?;
        let resumed = self.arm_flight(&handle).map(|_| ());
        if resumed.is_err() {
            self.release(&handle);
        }
        resumed
    }

    fn resume_returning(self: &Arc<Self>, drone: &Drone) -> Result<()> {
        let max_speed_kmh = self.max_speed_for(drone)?;
        let queue = DeliveryQueue::from_orders(Vec::new(), drone.position, self.config.base);
        let handle = self.register(&drone.id, queue, max_speed_kmh, FlightPhase::Returning)?;
        if let Err(err) = self.store.update_drone(
            &drone.id,
            DronePatch::default()
                .status(DroneStatus::Returning)
                .load(0.0)
                .target(Some(self.config.base)),
        ) {
            self.release(&handle);
            return Err(err);
        }
        tokio::spawn(return_loop::run_return_loop(
            self.clone(),
            handle.clone(),
            handle.token.child_token(),
        ));
        Ok(())
    }

    fn max_speed_for(&self, drone: &Drone) -> Result<f64> {
        self.store
            .get_drone_type(&drone.type_id)
            .map(|drone_type| drone_type.max_speed_kmh)
            .ok_or_else(|| FleetError::NotFound {
                kind: EntityKind::DroneType,
                id: drone.type_id.clone(),
            })
    }

    fn register(
        &self,
        drone_id: &str,
        queue: DeliveryQueue,
        max_speed_kmh: f64,
        phase: FlightPhase,
    ) -> Result<Arc<FlightHandle>> {
        match self.flights.entry(drone_id.to_string()) {
            Entry::Occupied(_) => Err(FleetError::InvalidState(format!(
                "Drone {} already has an active flight",
                drone_id
            ))),
            Entry::Vacant(slot) => {
                let token = CancellationToken::new();
                let handle = Arc::new(FlightHandle {
                    drone_id: drone_id.to_string(),
                    state: Mutex::new(FlightState {
                        phase,
                        queue,
                        max_speed_kmh,
                        flight_token: token.child_token(),
                        leg: None,
                    }),
                    token,
                });
                slot.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    /// Cancel the handle and drop it from the registry if it is still the
    /// registered one.
    pub(super) fn release(&self, handle: &Arc<FlightHandle>) {
        handle.token.cancel();
        self.flights
            .remove_if(&handle.drone_id, |_, current| Arc::ptr_eq(current, handle));
    }

    pub(super) fn abort(&self, handle: &Arc<FlightHandle>, err: &FleetError) {
        tracing::warn!(
            drone_id = %handle.drone_id,
            error = %err,
            "Flight simulation terminated"
        );
        self.release(handle);
    }

    fn leg_route(&self, from: Position, to: Position) -> Vec<GridCell> {
        let zones = self.store.find_all_zones();
        let index = ExclusionZoneIndex::new(&zones);
        match self.pathfinder.plan_route(from, to, &index) {
            Ok(plan) => plan.path,
            Err(err) => {
                tracing::debug!(error = %err, "No grid route for leg");
                Vec::new()
            }
        }
    }

    /// Arm the leg at the queue cursor: order in-route, drone retargeted,
    /// timer and movement loop spawned under a fresh leg token.
    pub(super) fn begin_leg(
        self: &Arc<Self>,
        handle: &Arc<FlightHandle>,
        state: &mut FlightState,
    ) -> Result<Duration> {
        let order_id = state
            .queue
            .current_order()
            .map(str::to_string)
            .ok_or_else(|| FleetError::InvalidState("Delivery queue is exhausted".to_string()))?;
        let drone = self
            .store
            .get_drone(&handle.drone_id)
            .ok_or_else(|| FleetError::drone_not_found(&handle.drone_id))?;
        let order = self
            .store
            .update_order(&order_id, OrderPatch::default().status(OrderStatus::InRoute))?;
        let target = order.destination;
        self.store
            .update_drone(&handle.drone_id, DronePatch::default().target(Some(target)))?;

        if let Some(previous) = state.leg.take() {
            previous.token.cancel();
        }

        let duration = self
            .config
            .travel_time(drone.position, target, state.max_speed_kmh);
        let generation = state.queue.begin_leg();
        let token = state.flight_token.child_token();
        state.leg = Some(LegState {
            generation,
            token: token.clone(),
            started_at: Instant::now(),
            duration,
            target,
            route: self.leg_route(drone.position, target),
        });

        tracing::debug!(
            drone_id = %handle.drone_id,
            order_id = %order_id,
            generation,
            "Leg armed for {:.1}s",
            duration.as_secs_f64()
        );

        tokio::spawn(delivery_timer::run_delivery_timer(
            self.clone(),
            handle.clone(),
            token.clone(),
            generation,
            duration,
        ));
        tokio::spawn(movement_loop::run_movement_loop(
            self.clone(),
            handle.clone(),
            token,
            generation,
            target,
        ));
        Ok(duration)
    }

    /// Finish the leg tagged `generation`. Whichever of the timer and the
    /// movement loop gets here first wins; the other finds a stale generation.
    pub(super) async fn complete_leg(self: &Arc<Self>, handle: &Arc<FlightHandle>, generation: u64) {
        let mut state = handle.state.lock().await;
        if handle.is_stopped() || !state.queue.is_current(generation) {
            return;
        }
        if let Err(err) = self.finish_leg(handle, &mut state) {
            drop(state);
            self.abort(handle, &err);
        }
    }

    fn finish_leg(self: &Arc<Self>, handle: &Arc<FlightHandle>, state: &mut FlightState) -> Result<()> {
        let leg = state.leg.take();
        if let Some(leg) = &leg {
            leg.token.cancel();
        }

        let order_id = state
            .queue
            .current_order()
            .map(str::to_string)
            .ok_or_else(|| FleetError::InvalidState("Delivery queue is exhausted".to_string()))?;
        let drone = self
            .store
            .get_drone(&handle.drone_id)
            .ok_or_else(|| FleetError::drone_not_found(&handle.drone_id))?;
        let order = self
            .store
            .update_order(&order_id, OrderPatch::default().status(OrderStatus::Delivered))?;

        let mut patch = DronePatch::default()
            .load(drone.current_load_kg - order.weight_kg)
            .total_deliveries(drone.total_deliveries + 1);
        if let Some(leg) = &leg {
            patch = patch.position(leg.target);
        }
        self.store.update_drone(&handle.drone_id, patch)?;

        tracing::info!(
            drone_id = %handle.drone_id,
            order_id = %order_id,
            "Order delivered ({}/{})",
            state.queue.cursor() + 1,
            state.queue.len()
        );

        if state.queue.advance() {
            self.begin_leg(handle, state)?;
            Ok(())
        } else {
            self.finish_deliveries(handle, state)
        }
    }

    /// Queue exhausted: release delivered orders and head home.
    fn finish_deliveries(
        self: &Arc<Self>,
        handle: &Arc<FlightHandle>,
        state: &mut FlightState,
    ) -> Result<()> {
        state.flight_token.cancel();
        state.phase = FlightPhase::Returning;

        for order_id in state.queue.delivered() {
            if let Err(err) = self
                .store
                .update_order(order_id, OrderPatch::default().drone(None))
            {
                tracing::warn!(order_id = %order_id, error = %err, "Could not release delivered order");
            }
        }

        self.store.update_drone(
            &handle.drone_id,
            DronePatch::default()
                .status(DroneStatus::Returning)
                .load(0.0)
                .target(Some(self.config.base)),
        )?;
        tracing::info!(drone_id = %handle.drone_id, "All deliveries complete, returning to base");

        tokio::spawn(return_loop::run_return_loop(
            self.clone(),
            handle.clone(),
            handle.token.child_token(),
        ));
        Ok(())
    }

    /// Battery exhausted mid-flight: stop everything and put the drone down
    /// where it is. Orders keep their state and drone link.
    pub(super) fn emergency_land(&self, handle: &Arc<FlightHandle>, state: &mut FlightState) {
        self.release(handle);
        state.leg = None;

        if let Err(err) = self.store.update_drone(
            &handle.drone_id,
            DronePatch::default()
                .status(DroneStatus::Idle)
                .battery(0.0)
                .target(None),
        ) {
            tracing::error!(drone_id = %handle.drone_id, error = %err, "Emergency landing update failed");
            return;
        }

        let landings = self
            .store
            .get_drone(&handle.drone_id)
            .map(|drone| drone.emergency_landings + 1);
        if let Some(count) = landings {
            if let Err(err) = self
                .store
                .update_drone(&handle.drone_id, DronePatch::default().emergency_landings(count))
            {
                tracing::warn!(drone_id = %handle.drone_id, error = %err, "Could not record emergency landing");
            }
        }
        tracing::warn!(drone_id = %handle.drone_id, "Battery depleted, emergency landing");
    }

    /// Drone reached base after its deliveries.
    pub(super) fn land_at_base(&self, handle: &Arc<FlightHandle>) -> Result<()> {
        self.release(handle);
        self.store.update_drone(
            &handle.drone_id,
            DronePatch::default()
                .status(DroneStatus::Idle)
                .position(self.config.base)
                .battery(100.0)
                .target(None),
        )?;
        tracing::info!(drone_id = %handle.drone_id, "Landed at base");
        Ok(())
    }
}
