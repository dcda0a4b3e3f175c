//! End-to-end scenarios for the rebalance pipeline and relay bitmaps,
//! driven from real YAML configurations.

use junction_common::config::JunctionConfig;
use junction_common::phase::PhaseAssignment;
use junction_common::wire::{LaneMeasurement, WireError};
use junction_relay::bitmap::{writeall_command, ChannelLayout, ChannelMask};
use junctiond::rebalance::{normalize_density, DensityParams, DurationPlanner};

fn two_vehicle_config() -> JunctionConfig {
    JunctionConfig::from_yaml(
        r#"
junctionId: 1
junctionName: "Two Lane"
phases:
  - [GREEN_PHASE, RED_PHASE]
  - [RED_PHASE, GREEN_PHASE]
phaseDurations: [20000, 10000]
densityMultiplierGreenPhase: 1.0
densityMultiplierRedPhase: 0.5
densityMin: 0.0
densityMax: 1.0
minPhaseDurationMs: 2000
minPedestrianDurationMs: 8000
streamInfo:
  - [calib0.yaml, "rtsp://cam0"]
  - [calib1.yaml, "rtsp://cam1"]
relayUrl: 127.0.0.1
relayUsername: admin
relayPassword: admin
"#,
    )
    .unwrap()
}

fn ped_config() -> JunctionConfig {
    JunctionConfig::from_yaml(
        r#"
junctionId: 2
junctionName: "With Crossing"
phases:
  - [GREEN_PHASE, RED_PHASE, RED_PED]
  - [RED_PHASE, GREEN_PHASE, GREEN_PED]
phaseDurations: [20000, 10000]
densityMultiplierGreenPhase: 1.0
densityMultiplierRedPhase: 0.5
densityMin: 0.0
densityMax: 1.0
minPhaseDurationMs: 2000
minPedestrianDurationMs: 8000
streamInfo:
  - [calib0.yaml, "rtsp://cam0"]
  - [calib1.yaml, "rtsp://cam1"]
  - [calib2.yaml, "rtsp://cam2"]
relayUrl: 127.0.0.1
relayUsername: admin
relayPassword: admin
"#,
    )
    .unwrap()
}

// ─── Default-ratio fallback ─────────────────────────────────────────

#[test]
fn failed_collection_falls_back_to_ratio_and_keeps_durations() {
    // When a child read fails, the whole matrix is filled with the
    // loaded phase ratios; the recompute must then reproduce the
    // loaded durations exactly.
    let config = two_vehicle_config();
    let planner = DurationPlanner::from_config(&config);
    let kinds = config.lane_kinds();

    let ratio = planner.phase_ratio().to_vec();
    assert!((ratio[0] - 0.667).abs() < 1e-3);
    assert!((ratio[1] - 0.333).abs() < 1e-3);

    let densities: Vec<Vec<f32>> = ratio.iter().map(|&r| vec![r; 2]).collect();
    let outcome = planner.recompute(&densities, &kinds);

    assert!(!outcome.reverted);
    assert_eq!(outcome.durations, vec![20_000, 10_000]);
}

// ─── Demand rebalance through normalization ─────────────────────────

#[test]
fn raw_measurements_rebalance_the_cycle() {
    // Phase 0 observed green with raw densities [0.9, 0.7]; phase 1
    // observed red with raw [0.2, 0.3]. The red transform inverts and
    // halves, giving [0.4, 0.35]; shares then split 30 s as
    // 20426/9574 ms.
    let config = two_vehicle_config();
    let params = DensityParams::from_config(&config);
    let planner = DurationPlanner::from_config(&config);
    let kinds = config.lane_kinds();

    let raw = [[0.9f32, 0.7], [0.2, 0.3]];
    let mut densities = vec![vec![0.0f32; 2]; 2];
    for phase in 0..2 {
        for child in 0..2 {
            // Both lanes share the phase row's assignment kind here:
            // green row normalizes as green, red row as red.
            let observed = if phase == 0 {
                PhaseAssignment::GreenVehicle
            } else {
                PhaseAssignment::RedVehicle
            };
            densities[phase][child] = normalize_density(observed, raw[phase][child], &params);
        }
    }
    assert_eq!(densities[0], vec![0.9, 0.7]);
    assert!((densities[1][0] - 0.4).abs() < 1e-6);
    assert!((densities[1][1] - 0.35).abs() < 1e-6);

    let outcome = planner.recompute(&densities, &kinds);
    assert!(!outcome.reverted);
    assert_eq!(outcome.durations, vec![20_426, 9_574]);
    assert_eq!(outcome.durations.iter().sum::<u32>(), 30_000);
}

// ─── Pedestrian floor ───────────────────────────────────────────────

#[test]
fn waiting_pedestrians_raise_their_green_phase_floor() {
    let config = ped_config();
    let planner = DurationPlanner::from_config(&config);
    let kinds = config.lane_kinds();

    // Vehicle demand concentrates on phase 0; one pedestrian was
    // counted for phase 1 (the GREEN_PED row). Phase 1 computes to
    // 5000 ms and must clamp up to the 8000 ms pedestrian floor.
    let densities = vec![vec![1.0, 0.25, 0.0], vec![0.2, 0.05, 1.0]];
    let outcome = planner.recompute(&densities, &kinds);

    assert!(!outcome.reverted);
    assert_eq!(outcome.durations[1], 8_000);
    assert!(outcome.pedestrian_totals[1] > 0.0);
}

// ─── Revert guard ───────────────────────────────────────────────────

#[test]
fn oversized_phase_reverts_to_loaded_durations() {
    let config = JunctionConfig::from_yaml(
        &two_vehicle_config_yaml_with_min_phase(31_000),
    )
    .unwrap();
    let planner = DurationPlanner::from_config(&config);
    let kinds = config.lane_kinds();

    // Zero demand degenerates every phase to the full cycle, and the
    // 31 s floor pushes phase 0 past it.
    let outcome = planner.recompute(&vec![vec![0.0; 2]; 2], &kinds);
    assert!(outcome.reverted);
    assert_eq!(outcome.durations, vec![20_000, 10_000]);
}

fn two_vehicle_config_yaml_with_min_phase(min_phase_ms: u32) -> String {
    format!(
        r#"
junctionId: 1
junctionName: "Two Lane"
phases:
  - [GREEN_PHASE, RED_PHASE]
  - [RED_PHASE, GREEN_PHASE]
phaseDurations: [20000, 10000]
densityMultiplierGreenPhase: 1.0
densityMultiplierRedPhase: 0.5
densityMin: 0.0
densityMax: 1.0
minPhaseDurationMs: {min_phase_ms}
minPedestrianDurationMs: 8000
streamInfo:
  - [calib0.yaml, "rtsp://cam0"]
  - [calib1.yaml, "rtsp://cam1"]
relayUrl: 127.0.0.1
relayUsername: admin
relayPassword: admin
"#
    )
}

// ─── NaN frames ─────────────────────────────────────────────────────

#[test]
fn nan_frame_is_rejected_and_fallback_matches_s1() {
    // A child replying "nan;0;" must be rejected at parse time; the
    // scheduler then substitutes ratio densities, which leave the
    // durations untouched (same as the failed-read scenario).
    let err = LaneMeasurement::parse("nan;0;").unwrap_err();
    assert_eq!(err, WireError::NotANumber { field: "density" });

    let config = two_vehicle_config();
    let planner = DurationPlanner::from_config(&config);
    let ratio = planner.phase_ratio().to_vec();
    let densities: Vec<Vec<f32>> = ratio.iter().map(|&r| vec![r; 2]).collect();
    let outcome = planner.recompute(&densities, &config.lane_kinds());
    assert_eq!(outcome.durations, vec![20_000, 10_000]);
}

// ─── Transition bitmap ──────────────────────────────────────────────

#[test]
fn transition_and_next_phase_bitmaps() {
    // Two vehicle lanes swapping right of way. At T−5 s of phase 0 the
    // board shows lane 0's yellow (channel 2) and nothing for lane 1;
    // at T=0 of phase 1 it shows lane 1's green (channel 1) only.
    let config = two_vehicle_config();
    let layout = ChannelLayout::new(config.num_children());

    let transition = layout.transition_mask(&config.phases[0], &config.phases[1]);
    assert_eq!(transition, ChannelMask::channel(2));
    assert_eq!(writeall_command(transition), "relay writeall 0004");

    let next = layout.phase_mask(&config.phases[1]);
    assert_eq!(next, ChannelMask::channel(1));
    assert_eq!(writeall_command(next), "relay writeall 0002");
}

// ─── Invariant sweeps ───────────────────────────────────────────────

#[test]
fn recomputed_durations_respect_floors_and_sum_bounds() {
    let config = ped_config();
    let planner = DurationPlanner::from_config(&config);
    let kinds = config.lane_kinds();
    let phase_count = config.phases.len();
    let min_phase = config.min_phase_duration_ms;

    // Deterministic sweep over a grid of demand shapes.
    for a in 0..6 {
        for b in 0..6 {
            for ped in [0.0f32, 1.0, 3.0] {
                let densities = vec![
                    vec![a as f32 * 0.2, 0.3, 0.0],
                    vec![b as f32 * 0.15, 0.1, ped],
                ];
                let outcome = planner.recompute(&densities, &kinds);

                // Every committed duration respects the global floor.
                assert!(outcome.durations.iter().all(|&d| d >= min_phase));
                // Sum is at least P × minPhase.
                let sum: u64 = outcome.durations.iter().map(|&d| d as u64).sum();
                assert!(sum >= phase_count as u64 * min_phase as u64);

                // Pedestrian floor where demand exists.
                if !outcome.reverted && outcome.pedestrian_totals[1] > 0.0 {
                    assert!(outcome.durations[1] >= config.min_pedestrian_duration_ms);
                }
            }
        }
    }
}

#[test]
fn unclamped_recompute_preserves_the_cycle_sum() {
    let config = two_vehicle_config();
    let planner = DurationPlanner::from_config(&config);
    let kinds = config.lane_kinds();
    let full = config.full_cycle_ms() as i64;
    let phase_count = config.phases.len() as i64;

    for a in 1..8 {
        for b in 1..8 {
            let densities = vec![
                vec![a as f32 * 0.11, 0.4],
                vec![b as f32 * 0.09, 0.3],
            ];
            let outcome = planner.recompute(&densities, &kinds);
            if outcome.reverted || outcome.durations.iter().any(|&d| d == config.min_phase_duration_ms)
            {
                continue;
            }
            let sum: i64 = outcome.durations.iter().map(|&d| d as i64).sum();
            assert!(
                (sum - full).abs() <= phase_count,
                "sum {sum} drifted more than rounding from {full}"
            );
        }
    }
}

// ─── Phase bitmap exactness ─────────────────────────────────────────

#[test]
fn every_green_lane_maps_to_exactly_one_channel() {
    let config = ped_config();
    let layout = ChannelLayout::new(config.num_children());

    for phase in &config.phases {
        let mask = layout.phase_mask(phase);
        let expected: u32 = phase.iter().filter(|a| a.is_green()).count() as u32;
        assert_eq!(mask.bits().count_ones(), expected);
        for (lane, assignment) in phase.iter().enumerate() {
            assert_eq!(
                mask.contains(ChannelMask::channel(lane)),
                assignment.is_green()
            );
        }
    }
}
