//! Demo Fleet - in-process dispatch run with random orders.
//!
//! Seeds a small fleet, lets the optimizer suggest a load for every drone,
//! commits those suggestions, launches the flights and prints a status line
//! per drone until the whole fleet is back at base.
//!
//! Usage:
//!   cargo run -p fleet-cli --bin demo_fleet -- --drones 3 --orders 10

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleet_cli::{seed_fleet, Scenario};
use fleet_core::{DroneStatus, OptimizationMethod};
use fleet_server::config::Config;
use fleet_server::state::AppState;
use fleet_server::FleetService;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    /// Priority, distance and weight combined
    Weighted,
    /// Priority only
    Priority,
    /// Distance from base only
    Distance,
}

impl From<Method> for OptimizationMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Weighted => OptimizationMethod::PriorityDistanceWeight,
            Method::Priority => OptimizationMethod::PriorityOnly,
            Method::Distance => OptimizationMethod::DistanceOnly,
        }
    }
}

/// In-process fleet simulation
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of drones
    #[arg(long, default_value_t = 3)]
    drones: usize,

    /// Number of random orders
    #[arg(long, default_value_t = 10)]
    orders: usize,

    /// Allocation strategy
    #[arg(long, value_enum, default_value = "weighted")]
    method: Method,

    /// Simulation speed-up applied to the speed scale
    #[arg(long, default_value_t = 10.0)]
    speedup: f64,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 300)]
    duration: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("fleet_server=info".parse()?))
        .init();

    let args = Args::parse();
    let mut config = Config::from_env();
    config.speed_scale *= args.speedup.max(0.1);

    let state = Arc::new(AppState::new(config.grid_size));
    let scenario = Scenario::demo(args.drones, args.orders, config.base(), config.grid_size);
    seed_fleet(&state, &scenario)?;
    let service = FleetService::new(state.clone(), config.simulation());

    println!(
        "Seeded {} drones and {} orders ({:?} allocation)",
        args.drones, args.orders, args.method
    );

    let drone_ids: Vec<String> = scenario.drones.iter().map(|d| d.id.clone()).collect();
    let plans = service.optimize_allocation(&drone_ids, args.method.into())?;
    for plan in &plans {
        for candidate in &plan.candidates {
            match service.allocate_order(&plan.drone_id, &candidate.order_id).await {
                Ok(resp) => println!("  {}", resp.message),
                Err(e) => eprintln!("  Skipped {}: {}", candidate.order_id, e),
            }
        }
    }

    for drone_id in &drone_ids {
        match service.start_flight(drone_id).await {
            Ok(started) => println!(
                "{} departs with {} order(s), first leg {:.1}s",
                drone_id, started.total_legs, started.delivery_time_secs
            ),
            Err(e) => println!("{} stays grounded: {}", drone_id, e),
        }
    }

    let deadline = time::Instant::now() + Duration::from_secs(args.duration);
    let mut ticker = time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;

        let drones = state.get_all_drones();
        let airborne = drones
            .iter()
            .filter(|d| matches!(d.status, DroneStatus::Flying | DroneStatus::Returning))
            .count();

        for drone in &drones {
            let leg = match service.get_delivery_progress(&drone.id).await {
                Ok(progress) => format!(
                    "leg {}/{} {:>5.1}s left",
                    (progress.leg_index + 1).min(progress.total_legs.max(1)),
                    progress.total_legs,
                    progress.total_remaining_secs
                ),
                Err(_) => "-".to_string(),
            };
            println!(
                "  {:<9} {:<9} ({:>5.1},{:>5.1}) battery {:>5.1}% load {:>4.1}kg {}",
                drone.id,
                format!("{:?}", drone.status),
                drone.position.x,
                drone.position.y,
                drone.battery_pct,
                drone.current_load_kg,
                leg
            );
        }

        if airborne == 0 {
            break;
        }
        if time::Instant::now() >= deadline {
            println!("Time limit reached with {} drone(s) airborne", airborne);
            for drone_id in &drone_ids {
                service.stop_flight(drone_id).await?;
            }
            break;
        }
        println!();
    }

    let drones = state.get_all_drones();
    let delivered: u32 = drones.iter().map(|d| d.total_deliveries).sum();
    let landings: u32 = drones.iter().map(|d| d.emergency_landings).sum();
    let pending = state
        .get_all_orders()
        .iter()
        .filter(|o| o.drone_id.is_none() && o.status == fleet_core::OrderStatus::Pending)
        .count();
    println!(
        "Delivered {} order(s), {} still pending, {} emergency landing(s)",
        delivered, pending, landings
    );
    Ok(())
}
