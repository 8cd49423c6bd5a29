//! API routes for the fleet server.

mod routes;

use crate::service::FleetService;
use axum::Router;
use std::sync::Arc;

pub use routes::error_response;

pub fn routes() -> Router<Arc<FleetService>> {
    routes::create_router()
}
