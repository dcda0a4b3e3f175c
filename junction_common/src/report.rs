//! Cycle report payload types.
//!
//! One report is assembled per cycle wrap and POSTed as JSON to the
//! configured endpoint. Field names follow the receiving service's
//! camelCase schema.

use serde::{Deserialize, Serialize};

/// Top-level per-cycle report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JunctionReport {
    pub sub_location_id: u32,
    pub name: String,
    pub description: String,
    /// Durations committed for the next cycle [seconds].
    pub next_cycle_phase_durations: Vec<f32>,
    pub cycle_data: Vec<PhaseReport>,
}

/// Per-phase slice of the report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    pub junction_id: u32,
    pub phase: usize,
    /// Duration this phase ran [seconds].
    pub phase_duration: f32,
    pub vehicle_lane_densities: Vec<VehicleLaneReport>,
    #[serde(rename = "pedestrianLaneDensities")]
    pub pedestrian_lane_counts: Vec<PedestrianLaneReport>,
    pub id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehicleLaneReport {
    pub lane_id: String,
    pub lane_name: String,
    pub density: f32,
    pub vehicles: Vec<VehicleTypeCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleTypeCount {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PedestrianLaneReport {
    pub lane_id: String,
    pub lane_name: String,
    /// Waiting pedestrian count observed for this phase.
    pub count: f32,
}
