//! Parent cycle driver.
//!
//! Runs the phase sequence forever: energize the relay for the phase,
//! command every child, collect the previous phase's measurements,
//! hold the phase for its scheduled duration (with a yellow cue 5 s
//! before the end), and on every wrap to phase 0 recompute the next
//! cycle's durations and emit the HTTP report.
//!
//! The loop polls the signal flags at each boundary and timer tick, so
//! shutdown and crash handling always run from here, never from signal
//! context.

use std::io::Write as _;
use std::thread;
use std::time::Duration;

use junction_common::config::JunctionConfig;
use junction_common::consts::TRANSITION_CUE_SECS;
use junction_common::phase::LaneKind;
use junction_common::report::{
    JunctionReport, PedestrianLaneReport, PhaseReport, VehicleLaneReport, VehicleTypeCount,
};
use junction_common::wire::LaneMeasurement;
use junction_relay::RelayController;
use tracing::{debug, info, warn};

use crate::ipc::{self, ParentChannel};
use crate::rebalance::{normalize_density, DensityParams, DurationPlanner, RebalanceOutcome};
use crate::reporter::Reporter;
use crate::signals;

/// Why the scheduler loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerExit {
    /// SIGINT: orderly shutdown.
    Shutdown,
    /// SIGCHLD: a worker died, standby handling is required.
    ChildCrashed,
}

pub struct ParentScheduler<'a> {
    config: &'a JunctionConfig,
    relay: &'a RelayController,
    reporter: &'a Reporter,
    channels: &'a [ParentChannel],
    kinds: Vec<LaneKind>,
    params: DensityParams,
    planner: DurationPlanner,
    /// Durations the current cycle runs with [ms].
    durations: Vec<u32>,
    /// P×N measurement matrix, rebuilt in place every cycle.
    accumulator: Vec<Vec<LaneMeasurement>>,
    cycle: u64,
}

impl<'a> ParentScheduler<'a> {
    pub fn new(
        config: &'a JunctionConfig,
        relay: &'a RelayController,
        reporter: &'a Reporter,
        channels: &'a [ParentChannel],
    ) -> Self {
        let phase_count = config.phases.len();
        let lanes = config.num_children();
        Self {
            config,
            relay,
            reporter,
            channels,
            kinds: config.lane_kinds(),
            params: DensityParams::from_config(config),
            planner: DurationPlanner::from_config(config),
            durations: config.phase_durations.clone(),
            accumulator: vec![vec![LaneMeasurement::default(); lanes]; phase_count],
            cycle: 0,
        }
    }

    /// Run phases until a signal flag asks us to stop.
    pub fn run(&mut self) -> SchedulerExit {
        let phase_count = self.config.phases.len();
        let mut phase_index = 0;

        loop {
            if let Some(exit) = self.poll_flags() {
                return exit;
            }

            if phase_index == 0 {
                self.cycle += 1;
            }
            info!(cycle = self.cycle, phase = phase_index, "entering phase");

            self.relay.set_phase_cycle(phase_index);
            if let Err(e) = self.relay.execute_phase() {
                warn!("relay phase execution failed: {e}");
            }

            self.send_phase_messages(phase_index);

            if !self.receive_prev_data(phase_index) {
                self.apply_default_densities();
            }

            if let Some(exit) = self.run_phase_timer(phase_index) {
                return exit;
            }

            phase_index = (phase_index + 1) % phase_count;
            if phase_index == 0 {
                self.finish_cycle();
            }
        }
    }

    fn poll_flags(&self) -> Option<SchedulerExit> {
        if signals::take_shutdown_request() {
            return Some(SchedulerExit::Shutdown);
        }
        if signals::take_child_exit() {
            return Some(SchedulerExit::ChildCrashed);
        }
        None
    }

    /// One write per child: its assignment tag for this phase.
    fn send_phase_messages(&self, phase_index: usize) {
        for (child, channel) in self.channels.iter().enumerate() {
            let assignment = self.config.phases[phase_index][child];
            if let Err(e) = ipc::send_phase_command(&channel.command_tx, assignment) {
                warn!(child, "failed to write phase command: {e}");
                break;
            }
            debug!(child, tag = assignment.wire_tag(), "phase command sent");
        }
    }

    /// One blocking read per child; each datum describes the phase the
    /// junction just left, so it lands at the previous phase index.
    /// Any failure poisons the whole collection.
    fn receive_prev_data(&mut self, phase_index: usize) -> bool {
        let phase_count = self.config.phases.len();
        let previous = (phase_index + phase_count - 1) % phase_count;

        for (child, channel) in self.channels.iter().enumerate() {
            match ipc::recv_measurement(&channel.data_rx) {
                Ok(mut measurement) => {
                    let observed = self.config.phases[previous][child];
                    measurement.density =
                        normalize_density(observed, measurement.density, &self.params);
                    debug!(
                        child,
                        density = measurement.density,
                        speed = measurement.speed,
                        "previous phase measurement"
                    );
                    self.accumulator[previous][child] = measurement;
                }
                Err(e) => {
                    warn!(child, "measurement collection failed: {e}");
                    return false;
                }
            }
        }
        true
    }

    /// Replace every density in the matrix with the loaded phase
    /// ratios. Speeds and vehicle counts keep their last values.
    fn apply_default_densities(&mut self) {
        let ratios = self.planner.phase_ratio().to_vec();
        for (phase, row) in self.accumulator.iter_mut().enumerate() {
            for measurement in row.iter_mut() {
                measurement.density = ratios[phase];
            }
        }
        info!("phase densities set to default ratio values");
    }

    /// Hold the phase for its scheduled duration with an integer-second
    /// countdown; fire the yellow transition when the countdown hits 5.
    fn run_phase_timer(&self, phase_index: usize) -> Option<SchedulerExit> {
        let seconds = u64::from(self.durations[phase_index] / 1000);

        for remaining in (1..=seconds).rev() {
            if let Some(exit) = self.poll_flags() {
                println!();
                return Some(exit);
            }

            print!("\rremaining time for phase {phase_index}: {remaining} seconds ");
            let _ = std::io::stdout().flush();

            if remaining == TRANSITION_CUE_SECS {
                if let Err(e) = self.relay.execute_transition_phase() {
                    warn!("relay transition failed: {e}");
                }
            }

            thread::sleep(Duration::from_secs(1));
        }
        println!();
        None
    }

    /// Cycle wrap: report what ran, then commit next-cycle durations.
    fn finish_cycle(&mut self) {
        let densities: Vec<Vec<f32>> = self
            .accumulator
            .iter()
            .map(|row| row.iter().map(|m| m.density).collect())
            .collect();
        let outcome = self.planner.recompute(&densities, &self.kinds);

        let report = self.build_report(&outcome);
        self.durations = outcome.durations;

        if let Err(e) = self.reporter.send_junction_report(&report) {
            warn!("cycle report delivery failed: {e}");
        }
    }

    /// Assemble the report for the cycle that just completed: observed
    /// measurements with the durations it actually ran, plus the
    /// durations committed for the next cycle.
    fn build_report(&self, outcome: &RebalanceOutcome) -> JunctionReport {
        let mut cycle_data = Vec::with_capacity(self.config.phases.len());

        for (phase, row) in self.accumulator.iter().enumerate() {
            let mut vehicle_lanes = Vec::new();
            let mut pedestrian_lanes = Vec::new();

            for (child, measurement) in row.iter().enumerate() {
                match self.kinds[child] {
                    LaneKind::Vehicle => vehicle_lanes.push(VehicleLaneReport {
                        lane_id: format!("Lane_{child}"),
                        lane_name: format!("Vehicle Lane {child}"),
                        density: measurement.density,
                        vehicles: measurement
                            .vehicles
                            .iter()
                            .map(|(kind, &count)| VehicleTypeCount {
                                kind: kind.clone(),
                                count,
                            })
                            .collect(),
                    }),
                    LaneKind::Pedestrian => pedestrian_lanes.push(PedestrianLaneReport {
                        lane_id: format!("Lane_{child}"),
                        lane_name: format!("Pedestrian Lane {child}"),
                        count: measurement.density,
                    }),
                }
            }

            cycle_data.push(PhaseReport {
                junction_id: self.config.junction_id,
                phase,
                phase_duration: self.durations[phase] as f32 / 1000.0,
                vehicle_lane_densities: vehicle_lanes,
                pedestrian_lane_counts: pedestrian_lanes,
                id: 0,
            });
        }

        JunctionReport {
            sub_location_id: self.config.effective_sub_location_id(),
            name: self.config.junction_name.clone(),
            description: format!(
                "Junction {} Report: Cycle {}",
                self.config.junction_id, self.cycle
            ),
            next_cycle_phase_durations: outcome
                .durations
                .iter()
                .map(|&d| d as f32 / 1000.0)
                .collect(),
            cycle_data,
        }
    }
}
