//! Grid A* pathfinder around exclusion zones.
//!
//! Searches an integer grid with 8-way connectivity and unit step cost. When
//! no route exists (or there is nothing to avoid) it falls back to a straight
//! interpolated line so callers always get a usable waypoint list.

use crate::error::{FleetError, Result};
use crate::models::{GridCell, Position, DISTANCE_UNITS_PER_CELL, GRID_SIZE};
use crate::zones::ExclusionZoneIndex;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (0, 1),
    (1, 0),
    (0, -1),
    (-1, 0),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathfinderConfig {
    /// Cells run from 0 to `grid_size` inclusive on both axes.
    pub grid_size: i32,
    /// Return the direct line instead of `NoPathFound` when A* fails.
    pub allow_fallback: bool,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            grid_size: GRID_SIZE,
            allow_fallback: true,
        }
    }
}

/// Route between two grid positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePlan {
    pub path: Vec<GridCell>,
    pub total_distance: f64,
    pub waypoint_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    f_score: u32,
    /// Insertion sequence; earlier entries win ties on `f_score`.
    seq: u64,
    g_score: u32,
    cell: GridCell,
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_score
            .cmp(&other.f_score)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[derive(Debug, Clone, Default)]
pub struct GridPathfinder {
    config: PathfinderConfig,
}

impl GridPathfinder {
    pub fn new(config: PathfinderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PathfinderConfig {
        &self.config
    }

    pub fn in_bounds(&self, cell: GridCell) -> bool {
        let bounds = 0..=self.config.grid_size;
        bounds.contains(&cell.x) && bounds.contains(&cell.y)
    }

    /// Waypoints from `start` to `end` inclusive. Never empty.
    pub fn find_path(
        &self,
        start: GridCell,
        end: GridCell,
        zones: &ExclusionZoneIndex,
    ) -> Result<Vec<GridCell>> {
        if start == end {
            return Ok(vec![start]);
        }
        if zones.is_empty() {
            return Ok(direct_line(start, end));
        }

        match self.search(start, end, zones) {
            Some(path) => Ok(path),
            None if self.config.allow_fallback => Ok(direct_line(start, end)),
            None => Err(FleetError::NoPathFound {
                from_x: start.x,
                from_y: start.y,
                to_x: end.x,
                to_y: end.y,
            }),
        }
    }

    /// Validate coordinates, route between them and measure the result.
    pub fn plan_route(
        &self,
        start: Position,
        end: Position,
        zones: &ExclusionZoneIndex,
    ) -> Result<RoutePlan> {
        for point in [start, end] {
            if !point.within_grid(self.config.grid_size) {
                return Err(FleetError::OutOfRange {
                    x: point.x,
                    y: point.y,
                });
            }
        }

        let path = self.find_path(start.to_cell(), end.to_cell(), zones)?;
        Ok(RoutePlan {
            total_distance: path_distance(&path),
            waypoint_count: path.len(),
            path,
        })
    }

    fn search(
        &self,
        start: GridCell,
        end: GridCell,
        zones: &ExclusionZoneIndex,
    ) -> Option<Vec<GridCell>> {
        let mut open_set: BinaryHeap<Reverse<OpenNode>> = BinaryHeap::new();
        let mut closed_set: HashSet<GridCell> = HashSet::new();
        let mut g_score: HashMap<GridCell, u32> = HashMap::new();
        let mut came_from: HashMap<GridCell, GridCell> = HashMap::new();
        let mut seq = 0u64;

        g_score.insert(start, 0);
        open_set.push(Reverse(OpenNode {
            f_score: manhattan(start, end),
            seq,
            g_score: 0,
            cell: start,
        }));

        while let Some(Reverse(current)) = open_set.pop() {
            if current.cell == end {
                return Some(reconstruct(&came_from, end));
            }
            let best_g = g_score.get(&current.cell).copied().unwrap_or(u32::MAX);
            if current.g_score > best_g {
                continue;
            }
            if !closed_set.insert(current.cell) {
                continue;
            }

            for (dx, dy) in NEIGHBOR_OFFSETS {
                let next = GridCell::new(current.cell.x + dx, current.cell.y + dy);
                if !self.in_bounds(next) || closed_set.contains(&next) {
                    continue;
                }
                // The goal is entered even when it sits inside a zone.
                if next != end && zones.contains_cell(next) {
                    continue;
                }

                let tentative_g = best_g + 1;
                if tentative_g < g_score.get(&next).copied().unwrap_or(u32::MAX) {
                    came_from.insert(next, current.cell);
                    g_score.insert(next, tentative_g);
                    seq += 1;
                    open_set.push(Reverse(OpenNode {
                        f_score: tentative_g + manhattan(next, end),
                        seq,
                        g_score: tentative_g,
                        cell: next,
                    }));
                }
            }
        }

        None
    }
}

fn manhattan(a: GridCell, b: GridCell) -> u32 {
    a.x.abs_diff(b.x) + a.y.abs_diff(b.y)
}

fn reconstruct(came_from: &HashMap<GridCell, GridCell>, end: GridCell) -> Vec<GridCell> {
    let mut path = vec![end];
    let mut current = end;
    while let Some(prev) = came_from.get(&current) {
        path.push(*prev);
        current = *prev;
    }
    path.reverse();
    path
}

/// Straight line from `start` to `end` in rounded integer steps.
pub fn direct_line(start: GridCell, end: GridCell) -> Vec<GridCell> {
    let dx = (end.x - start.x) as f64;
    let dy = (end.y - start.y) as f64;
    let steps = start.x.abs_diff(end.x).max(start.y.abs_diff(end.y)).max(1);

    let mut path: Vec<GridCell> = Vec::with_capacity(steps as usize + 1);
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let cell = GridCell::new(
            (start.x as f64 + t * dx).round() as i32,
            (start.y as f64 + t * dy).round() as i32,
        );
        if path.last() != Some(&cell) {
            path.push(cell);
        }
    }
    path
}

/// Sum of Euclidean waypoint distances in distance units, rounded to 2 decimals.
pub fn path_distance(path: &[GridCell]) -> f64 {
    let grid_units: f64 = path
        .windows(2)
        .map(|pair| pair[0].to_position().distance_to(&pair[1].to_position()))
        .sum();
    (grid_units * DISTANCE_UNITS_PER_CELL * 100.0).round() / 100.0
}
