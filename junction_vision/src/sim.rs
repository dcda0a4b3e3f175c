//! Deterministic simulation watcher.
//!
//! Models a lane with a seeded xorshift generator so runs are
//! repeatable per stream link: queue density builds while the lane is
//! red and drains while it is green; pedestrians accumulate at the
//! curb and cross away on green.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tracing::debug;

use crate::{RenderMode, TrafficState, Watcher, WatcherKind};

const VEHICLE_TYPES: [&str; 4] = ["car", "motorcycle", "truck", "bus"];

pub struct SimWatcher {
    kind: WatcherKind,
    state: TrafficState,
    rng: u64,
    density: f32,
    speed: f32,
    vehicles: BTreeMap<String, u32>,
    waiting_pedestrians: u32,
}

impl SimWatcher {
    pub fn new(
        kind: WatcherKind,
        render_mode: RenderMode,
        stream_link: &str,
        stream_config: &str,
    ) -> Self {
        let mut hasher = DefaultHasher::new();
        stream_link.hash(&mut hasher);
        stream_config.hash(&mut hasher);
        let seed = hasher.finish() | 1;

        debug!(?kind, ?render_mode, stream_link, "simulation watcher ready");
        Self {
            kind,
            state: TrafficState::Red,
            rng: seed,
            density: 0.1,
            speed: 0.0,
            vehicles: BTreeMap::new(),
            waiting_pedestrians: 0,
        }
    }

    fn next_unit(&mut self) -> f32 {
        // xorshift64
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng = x;
        (x >> 40) as f32 / (1u64 << 24) as f32
    }

    fn step_vehicle(&mut self) {
        let jitter = self.next_unit();
        match self.state {
            TrafficState::Red => {
                // Queue grows while held; occasionally a new arrival is
                // classified and counted.
                self.density = (self.density + 0.002 + jitter * 0.004).min(1.0);
                self.speed = (self.speed - 0.5).max(0.0);
                if jitter > 0.85 {
                    let kind = VEHICLE_TYPES[(self.rng % VEHICLE_TYPES.len() as u64) as usize];
                    *self.vehicles.entry(kind.to_string()).or_insert(0) += 1;
                }
            }
            TrafficState::Green => {
                self.density = (self.density - 0.003 - jitter * 0.005).max(0.0);
                self.speed = (self.speed + 0.8 + jitter).min(45.0);
            }
        }
    }

    fn step_pedestrian(&mut self) {
        let jitter = self.next_unit();
        match self.state {
            TrafficState::Red => {
                // Instance count is a per-frame detection, not an
                // accumulator.
                self.waiting_pedestrians = 1 + (jitter * 5.0) as u32;
            }
            TrafficState::Green => {
                self.waiting_pedestrians = 0;
            }
        }
    }
}

impl Watcher for SimWatcher {
    fn process_frame(&mut self) {
        match self.kind {
            WatcherKind::Vehicle => self.step_vehicle(),
            WatcherKind::Pedestrian => self.step_pedestrian(),
        }
    }

    fn traffic_density(&self) -> f32 {
        self.density
    }

    fn average_speed(&self) -> f32 {
        self.speed
    }

    fn vehicle_counts(&self) -> BTreeMap<String, u32> {
        self.vehicles.clone()
    }

    fn instance_count(&self) -> u32 {
        self.waiting_pedestrians
    }

    fn set_traffic_state(&mut self, state: TrafficState) {
        if state != self.state {
            // Counts describe the window that just closed.
            self.vehicles.clear();
        }
        self.state = state;
    }
}
