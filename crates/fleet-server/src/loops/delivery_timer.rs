//! One-shot delivery timer for a single leg.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::engine::{FlightEngine, FlightHandle};

/// Fire the leg's completion after `duration` unless the leg is cancelled first.
pub async fn run_delivery_timer(
    engine: Arc<FlightEngine>,
    handle: Arc<FlightHandle>,
    leg_token: CancellationToken,
    generation: u64,
    duration: Duration,
) {
    tokio::select! {
        _ = leg_token.cancelled() => {}
        _ = sleep(duration) => {
            tracing::debug!(drone_id = %handle.drone_id, generation, "Delivery timer fired");
            engine.complete_leg(&handle, generation).await;
        }
    }
}
