//! Phase assignments and the cycle model.
//!
//! A *phase* is one configuration of every lane signal, held for a
//! contiguous time slice. A *cycle* is the ordered sequence of phases,
//! repeated indefinitely. Each lane receives exactly one assignment per
//! phase; the wire tags below are the exact tokens written to the
//! parent→child pipes and accepted in the YAML configuration.

use serde::{Deserialize, Serialize};

/// Per-lane signal assignment within a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseAssignment {
    /// Vehicle lane has right of way.
    #[serde(rename = "GREEN_PHASE")]
    GreenVehicle,
    /// Vehicle lane is held.
    #[serde(rename = "RED_PHASE")]
    RedVehicle,
    /// Pedestrian crossing is walking.
    #[serde(rename = "GREEN_PED")]
    GreenPedestrian,
    /// Pedestrian crossing is held.
    #[serde(rename = "RED_PED")]
    RedPedestrian,
    /// Unrecognized tag. Valid on the wire, rejected in configuration.
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl PhaseAssignment {
    /// The ASCII token sent over the parent→child pipe.
    pub fn wire_tag(self) -> &'static str {
        match self {
            Self::GreenVehicle => "GREEN_PHASE",
            Self::RedVehicle => "RED_PHASE",
            Self::GreenPedestrian => "GREEN_PED",
            Self::RedPedestrian => "RED_PED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse a wire token. Anything unrecognized maps to [`Self::Unknown`].
    pub fn from_wire(tag: &str) -> Self {
        match tag {
            "GREEN_PHASE" => Self::GreenVehicle,
            "RED_PHASE" => Self::RedVehicle,
            "GREEN_PED" => Self::GreenPedestrian,
            "RED_PED" => Self::RedPedestrian,
            _ => Self::Unknown,
        }
    }

    pub fn is_green(self) -> bool {
        matches!(self, Self::GreenVehicle | Self::GreenPedestrian)
    }

    /// The kind of lane this assignment belongs to, if determinate.
    pub fn lane_kind(self) -> Option<LaneKind> {
        match self {
            Self::GreenVehicle | Self::RedVehicle => Some(LaneKind::Vehicle),
            Self::GreenPedestrian | Self::RedPedestrian => Some(LaneKind::Pedestrian),
            Self::Unknown => None,
        }
    }
}

/// Fixed kind of a lane, derived from the first phase row at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneKind {
    /// Vehicle lane group, observed by a vehicle watcher.
    Vehicle,
    /// Pedestrian crossing, observed by a pedestrian watcher.
    Pedestrian,
}
