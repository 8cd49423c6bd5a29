//! Fleet operations facade used by the HTTP API and the demo binaries.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use fleet_core::{
    allocation, Drone, DroneAllocationPlan, DronePatch, DroneStatus, EntityStore, ExclusionZoneIndex,
    FleetError, GridPathfinder, OptimizationMethod, PathfinderConfig, Position, Result, RoutePlan,
    SimulationConfig,
};

use crate::loops::{DeliveryProgress, FlightEngine, FlightStarted};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RouteRequest {
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: f64,
    pub end_y: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocationResponse {
    pub success: bool,
    pub message: String,
    pub drone_id: String,
    pub order_id: String,
    pub current_load_kg: f64,
    pub capacity_kg: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopResponse {
    pub success: bool,
    pub drone_id: String,
    pub message: String,
}

pub struct FleetService {
    state: Arc<AppState>,
    engine: Arc<FlightEngine>,
    pathfinder: GridPathfinder,
    /// Serializes every load-changing operation across the fleet.
    allocation_lock: Mutex<()>,
}

impl FleetService {
    pub fn new(state: Arc<AppState>, config: SimulationConfig) -> Self {
        let pathfinder = GridPathfinder::new(PathfinderConfig {
            grid_size: config.grid_size,
            ..PathfinderConfig::default()
        });
        let engine = FlightEngine::new(state.clone(), config);
        Self {
            state,
            engine,
            pathfinder,
            allocation_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn engine(&self) -> &Arc<FlightEngine> {
        &self.engine
    }

    pub fn base(&self) -> Position {
        self.engine.config().base
    }

    /// Resume flights left airborne by a previous run.
    pub fn resume(&self) -> usize {
        self.engine.resume_flights()
    }

    pub fn calculate_route(&self, req: RouteRequest) -> Result<RoutePlan> {
        let zones = self.state.find_all_zones();
        let index = ExclusionZoneIndex::new(&zones);
        self.pathfinder.plan_route(
            Position::new(req.start_x, req.start_y),
            Position::new(req.end_x, req.end_y),
            &index,
        )
    }

    pub async fn allocate_order(&self, drone_id: &str, order_id: &str) -> Result<AllocationResponse> {
        let _guard = self.allocation_lock.lock().await;
        let outcome = allocation::allocate(self.state.as_ref(), drone_id, order_id)?;
        tracing::info!(drone_id, order_id, "{}", outcome.message);
        Ok(AllocationResponse {
            success: true,
            message: outcome.message,
            drone_id: outcome.drone.id,
            order_id: outcome.order.id,
            current_load_kg: outcome.drone.current_load_kg,
            capacity_kg: outcome.drone.capacity_kg,
        })
    }

    pub async fn deallocate_order(
        &self,
        drone_id: &str,
        order_id: &str,
    ) -> Result<AllocationResponse> {
        let _guard = self.allocation_lock.lock().await;
        let outcome = allocation::deallocate(self.state.as_ref(), drone_id, order_id)?;
        tracing::info!(drone_id, order_id, "{}", outcome.message);
        Ok(AllocationResponse {
            success: true,
            message: outcome.message,
            drone_id: outcome.drone.id,
            order_id: outcome.order.id,
            current_load_kg: outcome.drone.current_load_kg,
            capacity_kg: outcome.drone.capacity_kg,
        })
    }

    /// Start a flight. Holds the allocation lock so no order can be added to
    /// the drone between queue construction and takeoff.
    pub async fn start_flight(&self, drone_id: &str) -> Result<FlightStarted> {
        let _guard = self.allocation_lock.lock().await;
        self.engine.start_flight(drone_id)
    }

    pub async fn stop_flight(&self, drone_id: &str) -> Result<StopResponse> {
        let stopped = self.engine.stop_flight(drone_id).await?;
        let message = if stopped {
            format!("Flight for drone {} stopped", drone_id)
        } else {
            format!("Drone {} has no active flight", drone_id)
        };
        Ok(StopResponse {
            success: true,
            drone_id: drone_id.to_string(),
            message,
        })
    }

    pub async fn get_delivery_progress(&self, drone_id: &str) -> Result<DeliveryProgress> {
        self.engine.progress(drone_id).await
    }

    pub fn optimize_allocation(
        &self,
        drone_ids: &[String],
        method: OptimizationMethod,
    ) -> Result<Vec<DroneAllocationPlan>> {
        allocation::optimize_allocation(self.state.as_ref(), drone_ids, method, self.base())
    }

    /// Put an unloaded drone back at base, idle and fully charged.
    pub async fn reset_to_base(&self, drone_id: &str) -> Result<Drone> {
        let _guard = self.allocation_lock.lock().await;
        let drone = self
            .state
            .get_drone(drone_id)
            .ok_or_else(|| FleetError::drone_not_found(drone_id))?;
        if drone.current_load_kg > 0.0 {
            return Err(FleetError::InvalidState(format!(
                "Drone {} still carries {:.2}kg; deallocate its orders first",
                drone_id, drone.current_load_kg
            )));
        }

        self.engine.stop_flight(drone_id).await?;
        let drone = self.state.update_drone(
            drone_id,
            DronePatch::default()
                .status(DroneStatus::Idle)
                .position(self.base())
                .battery(100.0)
                .target(None),
        )?;
        tracing::info!(drone_id, "Drone reset to base");
        Ok(drone)
    }
}
