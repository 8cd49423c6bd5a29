//! Per-leg movement loop.
//!
//! Steps the drone toward the leg target every movement tick and completes
//! the leg once the drone is within arrival tolerance.

use std::sync::Arc;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use fleet_core::{step_toward, DronePatch, FleetError, Position};

use super::engine::{FlightEngine, FlightHandle};

enum Tick {
    Moving,
    Arrived,
    Halt,
}

pub async fn run_movement_loop(
    engine: Arc<FlightEngine>,
    handle: Arc<FlightHandle>,
    leg_token: CancellationToken,
    generation: u64,
    target: Position,
) {
    let period = engine.config.movement_tick;
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = leg_token.cancelled() => break,
            _ = ticker.tick() => {
                match movement_tick(&engine, &handle, &leg_token, generation, target).await {
                    Tick::Moving => {}
                    Tick::Arrived => {
                        engine.complete_leg(&handle, generation).await;
                        break;
                    }
                    Tick::Halt => break,
                }
            }
        }
    }
}

async fn movement_tick(
    engine: &FlightEngine,
    handle: &Arc<FlightHandle>,
    leg_token: &CancellationToken,
    generation: u64,
    target: Position,
) -> Tick {
    let state = handle.state.lock().await;
    if leg_token.is_cancelled() || handle.is_stopped() || !state.queue.is_current(generation) {
        return Tick::Halt;
    }

    let Some(drone) = engine.store.get_drone(&handle.drone_id) else {
        drop(state);
        engine.abort(handle, &FleetError::drone_not_found(&handle.drone_id));
        return Tick::Halt;
    };

    let step = engine.config.step_length(state.max_speed_kmh);
    let next = step_toward(drone.position, target, step);
    if let Err(err) = engine
        .store
        .update_drone(&handle.drone_id, DronePatch::default().position(next))
    {
        drop(state);
        engine.abort(handle, &err);
        return Tick::Halt;
    }

    if engine.config.has_arrived(next, target) {
        Tick::Arrived
    } else {
        Tick::Moving
    }
}
