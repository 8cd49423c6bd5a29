//! Exclusion zone index for pathfinding and route validation.
//!
//! Each no-fly zone is reduced once to the cheapest shape that answers
//! membership: its bounding box when the polygon yields a valid one, the raw
//! polygon otherwise.

use crate::models::{BoundingBox, GridCell, NoFlyZone, Position};

/// Membership shape of one indexed zone.
#[derive(Debug, Clone, PartialEq)]
pub enum Zone {
    BoundingBox(BoundingBox),
    Polygon(Vec<Position>),
}

impl Zone {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        match self {
            Zone::BoundingBox(bbox) => bbox.contains(x, y),
            Zone::Polygon(points) => polygon_contains(points, x, y),
        }
    }
}

#[derive(Debug, Clone)]
struct IndexedZone {
    id: String,
    shape: Zone,
}

/// Precomputed membership summaries for a set of no-fly zones.
#[derive(Debug, Clone, Default)]
pub struct ExclusionZoneIndex {
    zones: Vec<IndexedZone>,
}

impl ExclusionZoneIndex {
    pub fn new(zones: &[NoFlyZone]) -> Self {
        let zones = zones
            .iter()
            .filter(|zone| zone.polygon.len() >= 3)
            .map(|zone| {
                let shape = match zone
                    .bounding_box
                    .filter(BoundingBox::is_valid)
                    .or_else(|| BoundingBox::from_points(&zone.polygon))
                {
                    Some(bbox) => Zone::BoundingBox(bbox),
                    None => Zone::Polygon(zone.polygon.clone()),
                };
                IndexedZone {
                    id: zone.id.clone(),
                    shape,
                }
            })
            .collect();
        Self { zones }
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// True if the point falls inside any zone.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.zones.iter().any(|zone| zone.shape.contains(x, y))
    }

    pub fn contains_cell(&self, cell: GridCell) -> bool {
        self.contains(cell.x as f64, cell.y as f64)
    }

    /// Id of the first zone containing the point.
    pub fn zone_at(&self, x: f64, y: f64) -> Option<&str> {
        self.zones
            .iter()
            .find(|zone| zone.shape.contains(x, y))
            .map(|zone| zone.id.as_str())
    }

    /// Indices of waypoints that fall inside a zone.
    pub fn route_violations(&self, path: &[GridCell]) -> Vec<usize> {
        if self.zones.is_empty() {
            return Vec::new();
        }
        path.iter()
            .enumerate()
            .filter(|(_, cell)| self.contains_cell(**cell))
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// Ray casting: count crossings of a horizontal ray with polygon edges.
pub fn polygon_contains(polygon: &[Position], x: f64, y: f64) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (polygon[i].x, polygon[i].y);
        let (xj, yj) = (polygon[j].x, polygon[j].y);

        if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }

    inside
}
