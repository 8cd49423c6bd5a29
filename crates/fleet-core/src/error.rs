//! Error taxonomy shared by the routing, allocation and simulation layers.

use thiserror::Error;

/// Entity kind named in [`FleetError::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Drone,
    DroneType,
    Order,
    Zone,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Drone => write!(f, "Drone"),
            EntityKind::DroneType => write!(f, "Drone type"),
            EntityKind::Order => write!(f, "Order"),
            EntityKind::Zone => write!(f, "Zone"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FleetError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("{0}")]
    InvalidState(String),

    #[error(
        "Capacity exceeded: {attempted_kg:.2}kg would exceed the {capacity_kg:.2}kg limit by {overflow_kg:.2}kg"
    )]
    CapacityExceeded {
        capacity_kg: f64,
        attempted_kg: f64,
        overflow_kg: f64,
    },

    #[error("Coordinates ({x}, {y}) are outside the operating grid")]
    OutOfRange { x: f64, y: f64 },

    #[error("No path found from ({from_x}, {from_y}) to ({to_x}, {to_y})")]
    NoPathFound {
        from_x: i32,
        from_y: i32,
        to_x: i32,
        to_y: i32,
    },
}

impl FleetError {
    pub fn capacity_exceeded(capacity_kg: f64, attempted_kg: f64) -> Self {
        FleetError::CapacityExceeded {
            capacity_kg,
            attempted_kg,
            overflow_kg: attempted_kg - capacity_kg,
        }
    }

    pub fn drone_not_found(id: impl Into<String>) -> Self {
        FleetError::NotFound {
            kind: EntityKind::Drone,
            id: id.into(),
        }
    }

    pub fn order_not_found(id: impl Into<String>) -> Self {
        FleetError::NotFound {
            kind: EntityKind::Order,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
