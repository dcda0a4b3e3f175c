//! Per-lane vision watcher interface.
//!
//! A watcher is the external collaborator that turns a video stream
//! into demand numbers: traffic density and vehicle type counts for a
//! vehicle lane, a waiting-pedestrian count for a crossing. The
//! scheduler core is deliberately blind to how those numbers are
//! produced; child workers drive whichever backend [`spawn_watcher`]
//! hands them.
//!
//! The built-in backend is a deterministic simulation, which lets the
//! whole fork/pipe/relay pipeline run end-to-end on a machine with no
//! cameras. Real video backends implement [`Watcher`] and register in
//! [`spawn_watcher`].

mod sim;

use std::collections::BTreeMap;

pub use sim::SimWatcher;

/// Signal state a vehicle watcher tracks to pick its measurement mode:
/// flow-based density during green, stationary-area density during red.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficState {
    Green,
    Red,
}

/// What kind of lane the watcher observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherKind {
    Vehicle,
    Pedestrian,
}

/// Whether the backend should open debug windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Gui,
    Headless,
}

/// Interface between a child worker and its lane's vision pipeline.
pub trait Watcher {
    /// Ingest and process the next available frame.
    fn process_frame(&mut self);

    /// Current lane demand estimate.
    fn traffic_density(&self) -> f32;

    /// Mean tracked-object speed over the recent window.
    fn average_speed(&self) -> f32;

    /// Detected vehicle counts by type since the last state change.
    fn vehicle_counts(&self) -> BTreeMap<String, u32>;

    /// Current instance count (waiting pedestrians).
    fn instance_count(&self) -> u32;

    /// Switch the measurement mode at a phase boundary.
    fn set_traffic_state(&mut self, state: TrafficState);
}

/// Build the watcher backend for one lane.
pub fn spawn_watcher(
    kind: WatcherKind,
    render_mode: RenderMode,
    stream_link: &str,
    stream_config: &str,
) -> Box<dyn Watcher> {
    Box::new(SimWatcher::new(kind, render_mode, stream_link, stream_config))
}
