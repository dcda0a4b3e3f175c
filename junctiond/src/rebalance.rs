//! Density normalization and phase duration recomputation.
//!
//! At the end of every cycle the parent converts the accumulated
//! per-phase per-lane densities into next-cycle durations: each phase
//! gets a share of the fixed full cycle proportional to its vehicle
//! demand, subject to a per-phase floor, a pedestrian floor, and a
//! revert-to-original guard. The sum is deliberately not re-normalized
//! after the floors apply, so heavily clamped cycles may exceed the
//! nominal full cycle duration; the revert guard only fires when a
//! single phase alone outgrows the full cycle.

use junction_common::config::JunctionConfig;
use junction_common::phase::{LaneKind, PhaseAssignment};
use tracing::{info, warn};

/// Normalization parameters, fixed at load time.
#[derive(Debug, Clone)]
pub struct DensityParams {
    pub multiplier_green: f32,
    pub multiplier_red: f32,
    pub min: f32,
    pub max: f32,
}

impl DensityParams {
    pub fn from_config(config: &JunctionConfig) -> Self {
        Self {
            multiplier_green: config.density_multiplier_green_phase,
            multiplier_red: config.density_multiplier_red_phase,
            min: config.density_min,
            max: config.density_max,
        }
    }
}

/// Transform a raw reported density by the phase it was observed in,
/// then clamp into the configured band.
///
/// Green lanes report flow density directly; red lanes report occupied
/// stationary area, inverted so that a fuller stop line means more
/// demand. Red pedestrian rows are zeroed: the waiting count a child
/// sends on a `RED_PED` command is attributed to the previous (green)
/// phase, so the red row itself carries no demand.
pub fn normalize_density(observed: PhaseAssignment, raw: f32, params: &DensityParams) -> f32 {
    let transformed = match observed {
        PhaseAssignment::GreenVehicle => raw * params.multiplier_green,
        PhaseAssignment::RedVehicle => (params.max - raw) * params.multiplier_red,
        PhaseAssignment::RedPedestrian => 0.0,
        PhaseAssignment::GreenPedestrian => raw,
        PhaseAssignment::Unknown => raw,
    };
    transformed.clamp(params.min, params.max)
}

/// Result of one end-of-cycle recomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceOutcome {
    /// Durations committed for the next cycle [ms].
    pub durations: Vec<u32>,
    /// Whether the revert guard fired.
    pub reverted: bool,
    /// Per-phase vehicle density totals (for the cycle report).
    pub phase_totals: Vec<f32>,
    /// Per-phase pedestrian count totals.
    pub pedestrian_totals: Vec<f32>,
}

/// Owns the immutable rebalance inputs: the originally loaded duration
/// vector, the fixed full cycle sum, and the clamping floors.
#[derive(Debug, Clone)]
pub struct DurationPlanner {
    original: Vec<u32>,
    full_cycle_ms: u64,
    ratio: Vec<f32>,
    min_phase_ms: u32,
    min_pedestrian_ms: u32,
}

impl DurationPlanner {
    pub fn from_config(config: &JunctionConfig) -> Self {
        Self {
            original: config.phase_durations.clone(),
            full_cycle_ms: config.full_cycle_ms(),
            ratio: config.phase_ratio(),
            min_phase_ms: config.min_phase_duration_ms,
            min_pedestrian_ms: config.min_pedestrian_duration_ms,
        }
    }

    /// The originally loaded duration vector.
    pub fn original_durations(&self) -> &[u32] {
        &self.original
    }

    /// Per-phase share of the full cycle at load time; doubles as the
    /// default density when a cycle yields no usable measurements.
    pub fn phase_ratio(&self) -> &[f32] {
        &self.ratio
    }

    /// Recompute next-cycle durations from a P×N density matrix.
    ///
    /// `kinds[child]` decides whether a column feeds the vehicle totals
    /// (which drive the rebalance) or the pedestrian totals (which only
    /// gate the pedestrian floor).
    pub fn recompute(&self, densities: &[Vec<f32>], kinds: &[LaneKind]) -> RebalanceOutcome {
        let phase_count = self.original.len();
        debug_assert_eq!(densities.len(), phase_count);

        let mut phase_totals = vec![0.0f32; phase_count];
        let mut pedestrian_totals = vec![0.0f32; phase_count];
        for (phase, row) in densities.iter().enumerate() {
            for (child, &density) in row.iter().enumerate() {
                match kinds[child] {
                    LaneKind::Vehicle => phase_totals[phase] += density,
                    LaneKind::Pedestrian => pedestrian_totals[phase] += density,
                }
            }
        }
        let total_density: f32 = phase_totals.iter().sum();

        let mut durations = Vec::with_capacity(phase_count);
        let mut valid = true;
        for phase in 0..phase_count {
            let share = if total_density == 0.0 {
                1.0
            } else {
                phase_totals[phase] / total_density
            };
            let mut d = (share * self.full_cycle_ms as f32).round() as u32;

            // Floor first, so every phase keeps room for its yellow.
            if d < self.min_phase_ms {
                d = self.min_phase_ms;
            }

            if d as u64 > self.full_cycle_ms {
                valid = false;
                break;
            }

            // Waiting pedestrians outrank the computed share.
            if pedestrian_totals[phase] > 0.0 && d < self.min_pedestrian_ms {
                d = self.min_pedestrian_ms;
            }

            durations.push(d);
        }

        let reverted = !valid;
        if reverted {
            warn!("recomputed durations exceed the full cycle, reverting to loaded values");
            durations = self.original.clone();
        }

        for (phase, &d) in durations.iter().enumerate() {
            info!("phase {phase} allocated {:.1} s", d as f32 / 1000.0);
        }

        RebalanceOutcome {
            durations,
            reverted,
            phase_totals,
            pedestrian_totals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use junction_common::phase::PhaseAssignment::*;

    fn params() -> DensityParams {
        DensityParams {
            multiplier_green: 1.0,
            multiplier_red: 0.5,
            min: 0.0,
            max: 1.0,
        }
    }

    fn planner(original: Vec<u32>, min_phase: u32, min_ped: u32) -> DurationPlanner {
        let full: u64 = original.iter().map(|&d| d as u64).sum();
        let ratio = original.iter().map(|&d| d as f32 / full as f32).collect();
        DurationPlanner {
            original,
            full_cycle_ms: full,
            ratio,
            min_phase_ms: min_phase,
            min_pedestrian_ms: min_ped,
        }
    }

    #[test]
    fn green_density_scales_and_clamps() {
        let p = params();
        assert_eq!(normalize_density(GreenVehicle, 0.9, &p), 0.9);
        assert_eq!(normalize_density(GreenVehicle, 1.7, &p), 1.0);
        assert_eq!(normalize_density(GreenVehicle, -0.2, &p), 0.0);
    }

    #[test]
    fn red_density_is_inverted() {
        let p = params();
        // Emptier stop line during red means the phase just served its
        // queue well; fuller means pent-up demand.
        assert!((normalize_density(RedVehicle, 0.2, &p) - 0.4).abs() < 1e-6);
        assert!((normalize_density(RedVehicle, 0.3, &p) - 0.35).abs() < 1e-6);
        // Monotonically decreasing in the raw value.
        assert!(normalize_density(RedVehicle, 0.1, &p) > normalize_density(RedVehicle, 0.9, &p));
    }

    #[test]
    fn red_pedestrian_is_zeroed_green_passes_through() {
        let p = params();
        assert_eq!(normalize_density(RedPedestrian, 4.0, &p), 0.0);
        // Pedestrian counts clamp into the density band like the
        // original controller's shared clamp.
        assert_eq!(normalize_density(GreenPedestrian, 0.7, &p), 0.7);
        assert_eq!(normalize_density(GreenPedestrian, 4.0, &p), 1.0);
    }

    #[test]
    fn rebalance_shifts_time_toward_demand() {
        // Two vehicle lanes over two phases; measurements after
        // normalization: phase 0 = [0.9, 0.7], phase 1 = [0.4, 0.35].
        let planner = planner(vec![20_000, 10_000], 2_000, 8_000);
        let kinds = [LaneKind::Vehicle, LaneKind::Vehicle];
        let outcome = planner.recompute(&[vec![0.9, 0.7], vec![0.4, 0.35]], &kinds);

        assert!(!outcome.reverted);
        assert_eq!(outcome.durations, vec![20_426, 9_574]);
        assert_eq!(outcome.durations.iter().sum::<u32>(), 30_000);
        assert!((outcome.phase_totals[0] - 1.6).abs() < 1e-6);
        assert!((outcome.phase_totals[1] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn zero_total_density_degenerates_to_full_cycle_each() {
        let planner = planner(vec![20_000, 10_000], 2_000, 8_000);
        let kinds = [LaneKind::Vehicle, LaneKind::Vehicle];
        let outcome = planner.recompute(&[vec![0.0, 0.0], vec![0.0, 0.0]], &kinds);
        assert!(!outcome.reverted);
        assert_eq!(outcome.durations, vec![30_000, 30_000]);
    }

    #[test]
    fn minimum_phase_floor_applies() {
        let planner = planner(vec![20_000, 10_000], 2_000, 8_000);
        let kinds = [LaneKind::Vehicle];
        // All demand on phase 0; phase 1 would round to 0 ms.
        let outcome = planner.recompute(&[vec![1.0], vec![0.0]], &kinds);
        assert!(!outcome.reverted);
        assert_eq!(outcome.durations[1], 2_000);
        assert!(outcome.durations.iter().all(|&d| d >= 2_000));
    }

    #[test]
    fn pedestrian_floor_applies_when_someone_waits() {
        // One vehicle lane and one crossing. Phase 1 computes below the
        // pedestrian minimum while a pedestrian is counted there.
        let planner = planner(vec![20_000, 10_000], 2_000, 8_000);
        let kinds = [LaneKind::Vehicle, LaneKind::Pedestrian];
        let outcome = planner.recompute(&[vec![0.9, 0.0], vec![0.1, 1.0]], &kinds);

        assert!(!outcome.reverted);
        // share = 0.1/1.0 → 3000 ms < 8000 ms pedestrian floor.
        assert_eq!(outcome.durations[1], 8_000);
    }

    #[test]
    fn pedestrian_floor_ignored_when_nobody_waits() {
        let planner = planner(vec![20_000, 10_000], 2_000, 8_000);
        let kinds = [LaneKind::Vehicle, LaneKind::Pedestrian];
        let outcome = planner.recompute(&[vec![0.9, 0.0], vec![0.1, 0.0]], &kinds);
        assert_eq!(outcome.durations[1], 3_000);
    }

    #[test]
    fn oversized_single_phase_reverts_whole_vector() {
        // Degenerate matrix drives every phase to the full cycle; with
        // a min floor above it the first phase exceeds the cycle and
        // the loaded vector is restored wholesale.
        let planner = planner(vec![20_000, 10_000], 31_000, 8_000);
        let kinds = [LaneKind::Vehicle, LaneKind::Vehicle];
        let outcome = planner.recompute(&[vec![0.0, 0.0], vec![0.0, 0.0]], &kinds);
        assert!(outcome.reverted);
        assert_eq!(outcome.durations, vec![20_000, 10_000]);
    }

    #[test]
    fn clamped_sum_may_exceed_full_cycle_without_revert() {
        // Three phases, nearly all demand on phase 0. Phases 1 and 2
        // clamp to the floor, pushing the sum past the nominal cycle;
        // the revert guard watches single phases, not the sum.
        let planner = planner(vec![10_000, 10_000, 10_000], 4_000, 8_000);
        let kinds = [LaneKind::Vehicle];
        let outcome = planner.recompute(&[vec![1.0], vec![0.001], vec![0.001]], &kinds);

        assert!(!outcome.reverted);
        let sum: u32 = outcome.durations.iter().sum();
        assert!(sum > 30_000, "floors drift the sum past the cycle: {sum}");
        assert!(outcome.durations.iter().all(|&d| d >= 4_000));
    }

    #[test]
    fn unclamped_rebalance_preserves_sum_within_rounding() {
        let planner = planner(vec![15_000, 15_000], 1_000, 1_000);
        let kinds = [LaneKind::Vehicle, LaneKind::Vehicle];
        let outcome = planner.recompute(&[vec![0.61, 0.52], vec![0.47, 0.44]], &kinds);
        let sum: i64 = outcome.durations.iter().map(|&d| d as i64).sum();
        assert!((sum - 30_000).abs() <= 2, "sum {sum} within rounding of 30000");
    }
}
