//! Plan a grid route between two points, avoiding rectangular no-fly zones.
//!
//! Usage:
//!   cargo run -p fleet-cli --bin plan_route -- --from 0,0 --to 40,30 --zone 15,10,25,35

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashSet;

use fleet_cli::parse_zone;
use fleet_core::{
    ExclusionZoneIndex, GridCell, GridPathfinder, PathfinderConfig, Position, GRID_SIZE,
};

/// Grid route planner
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Start point as x,y
    #[arg(long, default_value = "0,0")]
    from: String,

    /// End point as x,y
    #[arg(long)]
    to: String,

    /// Rectangular no-fly zone as min_x,min_y,max_x,max_y (repeatable)
    #[arg(long)]
    zone: Vec<String>,

    /// Fail instead of falling back to a straight line
    #[arg(long)]
    strict: bool,

    /// Print the route as JSON
    #[arg(long)]
    json: bool,

    /// Draw the grid with the route
    #[arg(long)]
    draw: bool,
}

fn parse_point(spec: &str) -> Result<Position> {
    let (x, y) = spec
        .split_once(',')
        .with_context(|| format!("point '{}' must be x,y", spec))?;
    Ok(Position::new(
        x.trim().parse().with_context(|| format!("bad x in '{}'", spec))?,
        y.trim().parse().with_context(|| format!("bad y in '{}'", spec))?,
    ))
}

fn draw(path: &[GridCell], index: &ExclusionZoneIndex) {
    let on_path: HashSet<GridCell> = path.iter().copied().collect();
    for y in (0..=GRID_SIZE).rev() {
        let row: String = (0..=GRID_SIZE)
            .map(|x| {
                let cell = GridCell::new(x, y);
                if path.first() == Some(&cell) {
                    'S'
                } else if path.last() == Some(&cell) {
                    'E'
                } else if on_path.contains(&cell) {
                    '*'
                } else if index.contains_cell(cell) {
                    '#'
                } else {
                    '.'
                }
            })
            .collect();
        println!("{}", row);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let from = parse_point(&args.from)?;
    let to = parse_point(&args.to)?;
    let zones = args
        .zone
        .iter()
        .enumerate()
        .map(|(idx, spec)| parse_zone(idx, spec))
        .collect::<Result<Vec<_>>>()?;

    let index = ExclusionZoneIndex::new(&zones);
    let pathfinder = GridPathfinder::new(PathfinderConfig {
        allow_fallback: !args.strict,
        ..PathfinderConfig::default()
    });
    let plan = pathfinder.plan_route(from, to, &index)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!(
            "Route: {} waypoints, {:.2} distance units",
            plan.waypoint_count, plan.total_distance
        );
        let cells: Vec<String> = plan
            .path
            .iter()
            .map(|cell| format!("({},{})", cell.x, cell.y))
            .collect();
        println!("{}", cells.join(" -> "));
    }

    if args.draw {
        draw(&plan.path, &index);
    }
    Ok(())
}
