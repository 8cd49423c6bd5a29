//! Battery drain while delivering.

use std::sync::Arc;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use fleet_core::{DronePatch, FleetError};

use super::engine::{FlightEngine, FlightHandle, FlightPhase};

pub async fn run_battery_loop(
    engine: Arc<FlightEngine>,
    handle: Arc<FlightHandle>,
    flight_token: CancellationToken,
) {
    let period = engine.config.battery_tick;
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = flight_token.cancelled() => break,
            _ = ticker.tick() => {
                if !drain_tick(&engine, &handle, &flight_token).await {
                    break;
                }
            }
        }
    }
}

/// Returns false once the loop should stop.
async fn drain_tick(
    engine: &FlightEngine,
    handle: &Arc<FlightHandle>,
    flight_token: &CancellationToken,
) -> bool {
    let mut state = handle.state.lock().await;
    if flight_token.is_cancelled() || handle.is_stopped() || state.phase != FlightPhase::Delivering {
        return false;
    }

    let Some(drone) = engine.store.get_drone(&handle.drone_id) else {
        drop(state);
        engine.abort(handle, &FleetError::drone_not_found(&handle.drone_id));
        return false;
    };

    let battery = (drone.battery_pct - engine.config.battery_drain_pct).max(0.0);
    if let Err(err) = engine
        .store
        .update_drone(&handle.drone_id, DronePatch::default().battery(battery))
    {
        drop(state);
        engine.abort(handle, &err);
        return false;
    }

    if battery <= 0.0 {
        engine.emergency_land(handle, &mut state);
        return false;
    }
    true
}
