//! YAML junction configuration loading and validation.
//!
//! The configuration fixes everything the controller needs at startup:
//! junction identity, the phase table (P rows × N lanes), initial phase
//! durations, density normalization parameters, per-lane stream sources,
//! relay board credentials, and the report endpoint. Config faults are
//! fatal: the loader returns an error that the supervisor prints before
//! exiting non-zero.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::consts::{
    DEFAULT_HTTP_URL, DEFAULT_SECRET_KEY, DEFAULT_STANDBY_DURATION_MS, RELAY_CHANNEL_COUNT,
};
use crate::phase::{LaneKind, PhaseAssignment};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// YAML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Unknown field (strict parsing with `deny_unknown_fields`).
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

fn default_standby_duration() -> u64 {
    DEFAULT_STANDBY_DURATION_MS
}
fn default_http_url() -> String {
    DEFAULT_HTTP_URL.to_string()
}
fn default_secret_key() -> String {
    DEFAULT_SECRET_KEY.to_string()
}

/// One video source: warp/calibration config path and stream URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSource(pub String, pub String);

impl StreamSource {
    pub fn config_path(&self) -> &str {
        &self.0
    }
    pub fn stream_link(&self) -> &str {
        &self.1
    }
}

/// Complete junction configuration — loaded from one YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JunctionConfig {
    /// Numeric junction identifier, echoed in every cycle report.
    pub junction_id: u32,
    /// Human-readable junction name.
    pub junction_name: String,
    /// Report sub-location; defaults to `junction_id` when omitted.
    #[serde(default)]
    pub sub_location_id: Option<u32>,

    /// Phase table: P rows, each with one assignment per lane.
    pub phases: Vec<Vec<PhaseAssignment>>,
    /// Initial per-phase durations [ms]; length P. Their sum fixes the
    /// full cycle duration for the lifetime of the process.
    pub phase_durations: Vec<u32>,
    /// Flashing-yellow hold after a child crash [ms].
    #[serde(default = "default_standby_duration")]
    pub standby_duration: u64,

    /// Green-phase density scale factor.
    pub density_multiplier_green_phase: f32,
    /// Red-phase density scale factor (applied to `densityMax − d`).
    pub density_multiplier_red_phase: f32,
    /// Lower clamp for normalized densities.
    pub density_min: f32,
    /// Upper clamp for normalized densities.
    pub density_max: f32,
    /// Floor for every recomputed phase duration [ms].
    pub min_phase_duration_ms: u32,
    /// Floor for phases with waiting pedestrians [ms].
    pub min_pedestrian_duration_ms: u32,

    /// One `[configPath, streamUri]` pair per lane; length N.
    pub stream_info: Vec<StreamSource>,

    /// Relay board host (telnet, port 23).
    pub relay_url: String,
    pub relay_username: String,
    pub relay_password: String,

    /// Cycle report endpoint.
    #[serde(default = "default_http_url")]
    pub http_url: String,
    /// Pre-shared report key, sent with every report.
    #[serde(default = "default_secret_key")]
    pub t_secret_key: String,
}

impl JunctionConfig {
    /// Load and validate the configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::ParseError(format!("{}: {}", path.display(), e))
            }
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate from a YAML string (also used by tests).
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| {
            let msg = e.to_string();
            if msg.contains("unknown field") {
                ConfigError::UnknownField(msg)
            } else {
                ConfigError::ParseError(msg)
            }
        })?;
        config.validate()?;
        info!(
            junction = config.junction_id,
            phases = config.phases.len(),
            vehicles = config.num_vehicle(),
            pedestrians = config.num_pedestrian(),
            "junction configuration loaded"
        );
        Ok(config)
    }

    /// Number of lanes (= children), fixed by the first phase row.
    pub fn num_children(&self) -> usize {
        self.phases.first().map_or(0, |row| row.len())
    }

    /// Per-lane kinds, derived from the first phase row.
    ///
    /// Only meaningful after [`Self::validate`], which guarantees every
    /// assignment is determinate and kinds are column-consistent.
    pub fn lane_kinds(&self) -> Vec<LaneKind> {
        self.phases
            .first()
            .map(|row| {
                row.iter()
                    .map(|a| a.lane_kind().unwrap_or(LaneKind::Vehicle))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn num_vehicle(&self) -> usize {
        self.lane_kinds()
            .iter()
            .filter(|k| **k == LaneKind::Vehicle)
            .count()
    }

    pub fn num_pedestrian(&self) -> usize {
        self.lane_kinds()
            .iter()
            .filter(|k| **k == LaneKind::Pedestrian)
            .count()
    }

    /// Fixed full-cycle duration: the sum of the loaded durations [ms].
    pub fn full_cycle_ms(&self) -> u64 {
        self.phase_durations.iter().map(|&d| d as u64).sum()
    }

    /// Per-phase share of the full cycle, from the loaded durations.
    pub fn phase_ratio(&self) -> Vec<f32> {
        let full = self.full_cycle_ms() as f32;
        self.phase_durations
            .iter()
            .map(|&d| d as f32 / full)
            .collect()
    }

    /// Effective sub-location for reports.
    pub fn effective_sub_location_id(&self) -> u32 {
        self.sub_location_id.unwrap_or(self.junction_id)
    }

    /// Validate all structural and numeric constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.phases.is_empty() {
            return Err(ConfigError::ValidationError(
                "phases must contain at least one phase".to_string(),
            ));
        }

        let lanes = self.phases[0].len();
        if lanes == 0 {
            return Err(ConfigError::ValidationError(
                "phases[0] must assign at least one lane".to_string(),
            ));
        }

        for (p, row) in self.phases.iter().enumerate() {
            if row.len() != lanes {
                return Err(ConfigError::ValidationError(format!(
                    "phases[{p}] has {} assignments, expected {lanes}",
                    row.len()
                )));
            }
            for (lane, a) in row.iter().enumerate() {
                if a.lane_kind().is_none() {
                    return Err(ConfigError::ValidationError(format!(
                        "phases[{p}][{lane}] is an unknown assignment"
                    )));
                }
            }
        }

        // A lane is wired to exactly one watcher kind for the process
        // lifetime, so its column may not change kind between phases.
        for lane in 0..lanes {
            let kind = self.phases[0][lane].lane_kind();
            for (p, row) in self.phases.iter().enumerate().skip(1) {
                if row[lane].lane_kind() != kind {
                    return Err(ConfigError::ValidationError(format!(
                        "lane {lane} changes kind in phases[{p}]"
                    )));
                }
            }
        }

        if self.phases.len() != self.phase_durations.len() {
            return Err(ConfigError::ValidationError(format!(
                "phases ({}) and phaseDurations ({}) lengths do not match",
                self.phases.len(),
                self.phase_durations.len()
            )));
        }

        for (p, &d) in self.phase_durations.iter().enumerate() {
            if d == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "phaseDurations[{p}] must be > 0"
                )));
            }
        }

        if self.stream_info.len() != lanes {
            return Err(ConfigError::ValidationError(format!(
                "streamInfo has {} entries, expected one per lane ({lanes})",
                self.stream_info.len()
            )));
        }

        if !self.density_min.is_finite() || !self.density_max.is_finite() {
            return Err(ConfigError::ValidationError(
                "densityMin/densityMax must be finite".to_string(),
            ));
        }
        if self.density_min >= self.density_max {
            return Err(ConfigError::ValidationError(format!(
                "densityMin ({}) must be < densityMax ({})",
                self.density_min, self.density_max
            )));
        }
        for (name, v) in [
            (
                "densityMultiplierGreenPhase",
                self.density_multiplier_green_phase,
            ),
            (
                "densityMultiplierRedPhase",
                self.density_multiplier_red_phase,
            ),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} ({v}) must be finite and >= 0"
                )));
            }
        }

        if self.min_phase_duration_ms == 0 {
            return Err(ConfigError::ValidationError(
                "minPhaseDurationMs must be > 0".to_string(),
            ));
        }
        if self.min_pedestrian_duration_ms == 0 {
            return Err(ConfigError::ValidationError(
                "minPedestrianDurationMs must be > 0".to_string(),
            ));
        }

        // Each lane occupies a green and a yellow channel on one bank.
        if lanes * 2 > RELAY_CHANNEL_COUNT {
            return Err(ConfigError::ValidationError(format!(
                "{lanes} lanes need {} relay channels, board has {RELAY_CHANNEL_COUNT}",
                lanes * 2
            )));
        }

        if self.relay_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "relayUrl cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
