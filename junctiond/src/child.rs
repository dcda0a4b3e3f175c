//! Child worker runtimes.
//!
//! Each lane is owned by one long-lived child process. The worker
//! polls its command pipe without blocking, drives its watcher, and
//! replies with one measurement frame per phase transition. A reply
//! always describes the phase that just ended; the parent attributes
//! it to the previous phase index.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use junction_common::config::StreamSource;
use junction_common::consts::CHILD_POLL_SLEEP_US;
use junction_common::phase::{LaneKind, PhaseAssignment};
use junction_common::wire::LaneMeasurement;
use junction_vision::{spawn_watcher, RenderMode, TrafficState, Watcher, WatcherKind};
use tracing::{debug, error, info, warn};

use crate::ipc::{self, ChildChannel};
use crate::signals;

/// Child-process entry point. Never returns to the supervisor's frame.
pub fn worker_main(
    index: usize,
    kind: LaneKind,
    channel: ChildChannel,
    source: &StreamSource,
    render: RenderMode,
) -> ! {
    if let Err(e) = signals::install_child_handlers() {
        error!(child = index, "failed to install signal handlers: {e}");
        std::process::exit(1);
    }
    if let Err(e) = ipc::set_nonblocking(&channel.command_rx) {
        error!(child = index, "failed to set command pipe non-blocking: {e}");
        std::process::exit(1);
    }

    let watcher_kind = match kind {
        LaneKind::Vehicle => WatcherKind::Vehicle,
        LaneKind::Pedestrian => WatcherKind::Pedestrian,
    };
    let mut watcher = spawn_watcher(
        watcher_kind,
        render,
        source.stream_link(),
        source.config_path(),
    );

    info!(child = index, ?kind, "worker ready");
    match kind {
        LaneKind::Vehicle => run_vehicle(index, &channel, watcher.as_mut()),
        LaneKind::Pedestrian => run_pedestrian(index, &channel, watcher.as_mut()),
    }
    info!(child = index, "worker exiting");
    std::process::exit(0);
}

/// Vehicle lane loop: process frames continuously while green, idle
/// while red, report at every phase boundary.
pub fn run_vehicle(index: usize, channel: &ChildChannel, watcher: &mut dyn Watcher) {
    let mut green = false;

    loop {
        if signals::TERMINATED.load(Ordering::SeqCst) {
            info!(child = index, "termination signal received");
            return;
        }

        match ipc::try_recv_phase_command(&channel.command_rx) {
            Ok(Some(command)) => {
                debug!(child = index, ?command, "phase command received");
                handle_vehicle_command(index, command, channel, watcher, &mut green);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(child = index, "command pipe lost: {e}");
                return;
            }
        }

        if green {
            watcher.process_frame();
        } else {
            thread::sleep(Duration::from_micros(CHILD_POLL_SLEEP_US));
        }
    }
}

fn handle_vehicle_command(
    index: usize,
    command: PhaseAssignment,
    channel: &ChildChannel,
    watcher: &mut dyn Watcher,
    green: &mut bool,
) {
    match command {
        PhaseAssignment::GreenVehicle => {
            // The counts and density describe the red window that just
            // ended; one frame is flushed before reading them.
            let vehicles = watcher.vehicle_counts();
            watcher.process_frame();
            let measurement = LaneMeasurement {
                density: watcher.traffic_density(),
                speed: watcher.average_speed(),
                vehicles,
            };
            reply(index, channel, &measurement);
            watcher.set_traffic_state(TrafficState::Green);
            *green = true;
        }
        PhaseAssignment::RedVehicle => {
            // Green-phase measurements are already current: the loop
            // has been processing frames the whole time.
            let measurement = LaneMeasurement {
                density: watcher.traffic_density(),
                speed: watcher.average_speed(),
                vehicles: watcher.vehicle_counts(),
            };
            reply(index, channel, &measurement);
            watcher.set_traffic_state(TrafficState::Red);
            *green = false;
        }
        other => {
            warn!(child = index, ?other, "unexpected command on vehicle lane");
        }
    }
}

/// Pedestrian crossing loop: one frame per red command, reply with the
/// detected waiting count; walking pedestrians are ignored.
pub fn run_pedestrian(index: usize, channel: &ChildChannel, watcher: &mut dyn Watcher) {
    loop {
        if signals::TERMINATED.load(Ordering::SeqCst) {
            info!(child = index, "termination signal received");
            return;
        }

        match ipc::try_recv_phase_command(&channel.command_rx) {
            Ok(Some(PhaseAssignment::RedPedestrian)) => {
                watcher.process_frame();
                let measurement =
                    LaneMeasurement::new(watcher.instance_count() as f32, 0.0);
                reply(index, channel, &measurement);
                watcher.set_traffic_state(TrafficState::Red);
            }
            Ok(Some(PhaseAssignment::GreenPedestrian)) => {
                reply(index, channel, &LaneMeasurement::new(0.0, 0.0));
                watcher.set_traffic_state(TrafficState::Green);
            }
            Ok(Some(other)) => {
                warn!(child = index, ?other, "unexpected command on pedestrian lane");
            }
            Ok(None) => {}
            Err(e) => {
                warn!(child = index, "command pipe lost: {e}");
                return;
            }
        }

        thread::sleep(Duration::from_micros(CHILD_POLL_SLEEP_US));
    }
}

fn reply(index: usize, channel: &ChildChannel, measurement: &LaneMeasurement) {
    if let Err(e) = ipc::send_measurement(&channel.data_tx, measurement) {
        warn!(child = index, "failed to write measurement frame: {e}");
    }
}
