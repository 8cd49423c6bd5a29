//! REST API routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::loops::{DeliveryProgress, FlightStarted};
use crate::service::{AllocationResponse, FleetService, RouteRequest, StopResponse};
use fleet_core::{
    Drone, DroneAllocationPlan, DroneStatus, DroneType, EntityStore, FleetError, NoFlyZone,
    OptimizationMethod, Order, OrderPriority, OrderStatus, Position, RoutePlan,
};

type ApiResult<T> = Result<(StatusCode, Json<T>), (StatusCode, Json<Value>)>;

/// Create the API router.
pub fn create_router() -> Router<Arc<FleetService>> {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/v1/routes", post(calculate_route))
        .route(
            "/v1/allocations",
            post(allocate_order).delete(deallocate_order),
        )
        .route("/v1/allocations/optimize", post(optimize_allocation))
        .route("/v1/drone-types", post(create_drone_type))
        .route("/v1/drones", get(list_drones).post(create_drone))
        .route("/v1/drones/:drone_id", get(get_drone))
        .route(
            "/v1/drones/:drone_id/flight",
            post(start_flight).delete(stop_flight),
        )
        .route("/v1/drones/:drone_id/progress", get(get_progress))
        .route("/v1/drones/:drone_id/reset", post(reset_drone))
        .route("/v1/orders", get(list_orders).post(create_order))
        .route("/v1/zones", get(list_zones).post(create_zone))
}

/// Map a domain error onto an HTTP status and JSON body.
pub fn error_response(err: FleetError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        FleetError::NotFound { .. } => StatusCode::NOT_FOUND,
        FleetError::InvalidState(_) => StatusCode::CONFLICT,
        FleetError::CapacityExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        FleetError::OutOfRange { .. } => StatusCode::BAD_REQUEST,
        FleetError::NoPathFound { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    let mut payload = json!({ "success": false, "error": err.to_string() });
    if let FleetError::CapacityExceeded {
        capacity_kg,
        attempted_kg,
        overflow_kg,
    } = err
    {
        payload["capacity_kg"] = json!(capacity_kg);
        payload["attempted_kg"] = json!(attempted_kg);
        payload["overflow_kg"] = json!(overflow_kg);
    }
    (status, Json(payload))
}

fn ok<T>(value: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(value)))
}

async fn calculate_route(
    State(service): State<Arc<FleetService>>,
    Json(req): Json<RouteRequest>,
) -> ApiResult<RoutePlan> {
    service.calculate_route(req).map_err(error_response).and_then(ok)
}

#[derive(Debug, Deserialize)]
struct AllocationRequest {
    drone_id: String,
    order_id: String,
}

async fn allocate_order(
    State(service): State<Arc<FleetService>>,
    Json(req): Json<AllocationRequest>,
) -> ApiResult<AllocationResponse> {
    service
        .allocate_order(&req.drone_id, &req.order_id)
        .await
        .map_err(error_response)
        .and_then(ok)
}

async fn deallocate_order(
    State(service): State<Arc<FleetService>>,
    Json(req): Json<AllocationRequest>,
) -> ApiResult<AllocationResponse> {
    service
        .deallocate_order(&req.drone_id, &req.order_id)
        .await
        .map_err(error_response)
        .and_then(ok)
}

#[derive(Debug, Deserialize)]
struct OptimizeRequest {
    drone_ids: Vec<String>,
    #[serde(default)]
    method: OptimizationMethod,
}

async fn optimize_allocation(
    State(service): State<Arc<FleetService>>,
    Json(req): Json<OptimizeRequest>,
) -> ApiResult<Vec<DroneAllocationPlan>> {
    service
        .optimize_allocation(&req.drone_ids, req.method)
        .map_err(error_response)
        .and_then(ok)
}

async fn start_flight(
    State(service): State<Arc<FleetService>>,
    Path(drone_id): Path<String>,
) -> ApiResult<FlightStarted> {
    service
        .start_flight(&drone_id)
        .await
        .map_err(error_response)
        .and_then(ok)
}

async fn stop_flight(
    State(service): State<Arc<FleetService>>,
    Path(drone_id): Path<String>,
) -> ApiResult<StopResponse> {
    service
        .stop_flight(&drone_id)
        .await
        .map_err(error_response)
        .and_then(ok)
}

async fn get_progress(
    State(service): State<Arc<FleetService>>,
    Path(drone_id): Path<String>,
) -> ApiResult<DeliveryProgress> {
    service
        .get_delivery_progress(&drone_id)
        .await
        .map_err(error_response)
        .and_then(ok)
}

async fn reset_drone(
    State(service): State<Arc<FleetService>>,
    Path(drone_id): Path<String>,
) -> ApiResult<Drone> {
    service
        .reset_to_base(&drone_id)
        .await
        .map_err(error_response)
        .and_then(ok)
}

async fn create_drone_type(
    State(service): State<Arc<FleetService>>,
    Json(drone_type): Json<DroneType>,
) -> ApiResult<DroneType> {
    if !(drone_type.max_speed_kmh > 0.0 && drone_type.capacity_kg > 0.0) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": "max_speed_kmh and capacity_kg must be positive"
            })),
        ));
    }
    service.state().register_drone_type(drone_type.clone());
    tracing::info!("Registered drone type {} ({})", drone_type.model, drone_type.id);
    Ok((StatusCode::CREATED, Json(drone_type)))
}

#[derive(Debug, Deserialize)]
struct CreateDroneRequest {
    id: Option<String>,
    serial_number: Option<String>,
    type_id: String,
    position: Option<Position>,
}

async fn create_drone(
    State(service): State<Arc<FleetService>>,
    Json(req): Json<CreateDroneRequest>,
) -> ApiResult<Drone> {
    let state = service.state();
    let drone_type = state.get_drone_type(&req.type_id).ok_or_else(|| {
        error_response(FleetError::NotFound {
            kind: fleet_core::EntityKind::DroneType,
            id: req.type_id.clone(),
        })
    })?;

    let id = req
        .id
        .unwrap_or_else(|| format!("DRONE{:04}", state.next_drone_id()));
    let drone = Drone {
        serial_number: req
            .serial_number
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        type_id: drone_type.id,
        position: req.position.unwrap_or_else(|| service.base()),
        status: DroneStatus::Idle,
        battery_pct: 100.0,
        capacity_kg: drone_type.capacity_kg,
        current_load_kg: 0.0,
        target: None,
        total_deliveries: 0,
        emergency_landings: 0,
        id,
    };
    let drone = state.register_drone(drone).map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(drone)))
}

async fn list_drones(State(service): State<Arc<FleetService>>) -> Json<Vec<Drone>> {
    Json(service.state().get_all_drones())
}

async fn get_drone(
    State(service): State<Arc<FleetService>>,
    Path(drone_id): Path<String>,
) -> ApiResult<Drone> {
    service
        .state()
        .get_drone(&drone_id)
        .ok_or_else(|| error_response(FleetError::drone_not_found(&drone_id)))
        .and_then(ok)
}

#[derive(Debug, Deserialize)]
struct CreateOrderRequest {
    id: Option<String>,
    destination: Position,
    weight_kg: f64,
    #[serde(default)]
    priority: Option<OrderPriority>,
}

async fn create_order(
    State(service): State<Arc<FleetService>>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<Order> {
    let order = Order {
        id: req.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        destination: req.destination,
        weight_kg: req.weight_kg,
        priority: req.priority.unwrap_or(OrderPriority::Medium),
        status: OrderStatus::Pending,
        drone_id: None,
        created_at: Utc::now(),
    };
    let order = service.state().register_order(order).map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(State(service): State<Arc<FleetService>>) -> Json<Vec<Order>> {
    Json(service.state().get_all_orders())
}

#[derive(Debug, Deserialize)]
struct CreateZoneRequest {
    id: Option<String>,
    name: String,
    polygon: Vec<Position>,
}

async fn create_zone(
    State(service): State<Arc<FleetService>>,
    Json(req): Json<CreateZoneRequest>,
) -> ApiResult<NoFlyZone> {
    let id = req.id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let zone = service
        .state()
        .register_zone(NoFlyZone::new(id, req.name, req.polygon))
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(zone)))
}

async fn list_zones(State(service): State<Arc<FleetService>>) -> Json<Vec<NoFlyZone>> {
    Json(service.state().find_all_zones())
}
