//! Duration rebalance micro-benchmark.
//!
//! Measures the end-of-cycle recompute path on a realistic junction
//! shape (4 phases, 6 vehicle lanes + 2 crossings) and on the widest
//! layout the relay board supports.

use criterion::{criterion_group, criterion_main, Criterion};

use junction_common::config::JunctionConfig;
use junction_common::phase::LaneKind;
use junctiond::rebalance::DurationPlanner;

fn wide_config() -> JunctionConfig {
    let row = "[GREEN_PHASE, GREEN_PHASE, RED_PHASE, RED_PHASE, RED_PHASE, RED_PHASE, RED_PED, RED_PED]";
    let streams: String = (0..8)
        .map(|i| format!("  - [calib{i}.yaml, \"rtsp://cam{i}/stream\"]\n"))
        .collect();
    JunctionConfig::from_yaml(&format!(
        r#"
junctionId: 9
junctionName: "Bench"
phases:
  - {row}
  - {row}
  - {row}
  - {row}
phaseDurations: [20000, 15000, 15000, 10000]
densityMultiplierGreenPhase: 1.0
densityMultiplierRedPhase: 0.5
densityMin: 0.0
densityMax: 1.0
minPhaseDurationMs: 4000
minPedestrianDurationMs: 8000
streamInfo:
{streams}relayUrl: 127.0.0.1
relayUsername: admin
relayPassword: admin
"#
    ))
    .expect("bench config")
}

fn bench_recompute(c: &mut Criterion) {
    let config = wide_config();
    let planner = DurationPlanner::from_config(&config);
    let kinds: Vec<LaneKind> = config.lane_kinds();

    let densities: Vec<Vec<f32>> = (0..4)
        .map(|phase| {
            (0..8)
                .map(|child| 0.1 + 0.07 * phase as f32 + 0.05 * child as f32)
                .collect()
        })
        .collect();

    c.bench_function("rebalance_recompute_4x8", |b| {
        b.iter(|| planner.recompute(std::hint::black_box(&densities), &kinds))
    });
}

criterion_group!(benches, bench_recompute);
criterion_main!(benches);
