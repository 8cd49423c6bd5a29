//! Return-to-base flight after the last delivery.

use std::sync::Arc;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use fleet_core::{step_toward, DronePatch, FleetError};

use super::engine::{FlightEngine, FlightHandle};

pub async fn run_return_loop(
    engine: Arc<FlightEngine>,
    handle: Arc<FlightHandle>,
    token: CancellationToken,
) {
    let period = engine.config.movement_tick;
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if !return_tick(&engine, &handle, &token).await {
                    break;
                }
            }
        }
    }
}

async fn return_tick(
    engine: &FlightEngine,
    handle: &Arc<FlightHandle>,
    token: &CancellationToken,
) -> bool {
    let state = handle.state.lock().await;
    if token.is_cancelled() || handle.is_stopped() {
        return false;
    }

    let Some(drone) = engine.store.get_drone(&handle.drone_id) else {
        drop(state);
        engine.abort(handle, &FleetError::drone_not_found(&handle.drone_id));
        return false;
    };

    let base = engine.config.base;
    let next = step_toward(drone.position, base, engine.config.step_length(state.max_speed_kmh));
    if engine.config.has_arrived(next, base) {
        if let Err(err) = engine.land_at_base(handle) {
            tracing::warn!(drone_id = %handle.drone_id, error = %err, "Landing at base failed");
        }
        return false;
    }

    if let Err(err) = engine
        .store
        .update_drone(&handle.drone_id, DronePatch::default().position(next))
    {
        drop(state);
        engine.abort(handle, &err);
        return false;
    }
    true
}
