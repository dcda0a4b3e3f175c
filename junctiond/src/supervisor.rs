//! Process lifecycle supervision.
//!
//! The supervisor creates one pipe pair per lane, forks one worker per
//! lane, and hands the parent ends to the scheduler. Signals reach the
//! main loop as atomic flags; when the scheduler returns, the
//! supervisor performs the matching teardown. Whatever the exit path,
//! the relay board ends de-energized and every live child gets a
//! SIGTERM.

use std::time::Duration;

use junction_common::config::{ConfigError, JunctionConfig};
use junction_relay::RelayController;
use junction_vision::RenderMode;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::child;
use crate::ipc::{ChildChannel, ParentChannel, PipePair};
use crate::reporter::{Reporter, ReporterError};
use crate::scheduler::{ParentScheduler, SchedulerExit};
use crate::signals;

/// Startup failures. Everything here is fatal and exits non-zero.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("pipe creation failed: {0}")]
    PipeCreate(Errno),

    #[error("fork failed: {0}")]
    Fork(Errno),

    #[error("signal handler installation failed: {0}")]
    Signals(Errno),

    #[error("report transport setup failed: {0}")]
    Reporter(#[from] ReporterError),
}

pub struct Supervisor {
    config: JunctionConfig,
    render: RenderMode,
}

impl Supervisor {
    pub fn new(config: JunctionConfig, render: RenderMode) -> Self {
        Self { config, render }
    }

    /// Fork the workers and drive the junction until a signal stops us.
    ///
    /// Returns `Ok(())` on signal-driven exits (the process exit code
    /// is 0 for both orderly shutdown and crash-standby teardown).
    pub fn run(self) -> Result<(), SupervisorError> {
        let lanes = self.config.num_children();
        let kinds = self.config.lane_kinds();
        info!(
            parent = %nix::unistd::getpid(),
            lanes,
            vehicles = self.config.num_vehicle(),
            pedestrians = self.config.num_pedestrian(),
            "starting junction controller"
        );

        // Handlers go in before the forks so a worker dying during
        // startup still flips the crash flag. Children replace them
        // with their own first thing.
        signals::install_parent_handlers().map_err(SupervisorError::Signals)?;

        let mut pairs = Vec::with_capacity(lanes);
        for _ in 0..lanes {
            let parent_to_child = PipePair::create().map_err(SupervisorError::PipeCreate)?;
            let child_to_parent = PipePair::create().map_err(SupervisorError::PipeCreate)?;
            pairs.push((parent_to_child, child_to_parent));
        }

        let mut child_pids: Vec<Pid> = Vec::with_capacity(lanes);
        for index in 0..lanes {
            match unsafe { fork() }.map_err(SupervisorError::Fork)? {
                ForkResult::Child => {
                    let inherited = std::mem::take(&mut pairs);
                    let channel = claim_child_channel(inherited, index);
                    let source = self.config.stream_info[index].clone();
                    child::worker_main(index, kinds[index], channel, &source, self.render);
                }
                ForkResult::Parent { child } => {
                    info!(pid = %child, lane = index, kind = ?kinds[index], "worker forked");
                    child_pids.push(child);
                }
            }
        }

        let channels = claim_parent_channels(pairs);

        let relay = RelayController::from_config(&self.config);
        let reporter = Reporter::from_config(&self.config)?;
        let mut scheduler = ParentScheduler::new(&self.config, &relay, &reporter, &channels);

        let exit = scheduler.run();
        self.teardown(exit, &relay, &mut child_pids);
        Ok(())
    }

    fn teardown(&self, exit: SchedulerExit, relay: &RelayController, child_pids: &mut Vec<Pid>) {
        match exit {
            SchedulerExit::Shutdown => {
                info!("interrupt received, turning off all relays");
                if let Err(e) = relay.turn_off_all() {
                    warn!("failed to de-energize relay: {e}");
                }
            }
            SchedulerExit::ChildCrashed => {
                reap_children(child_pids);
                warn!(
                    live = child_pids.len(),
                    "a worker crashed unexpectedly, holding standby"
                );
                relay.standby_mode(Duration::from_millis(self.config.standby_duration));
            }
        }

        terminate_children(child_pids);
        info!(parent = %nix::unistd::getpid(), "junction controller exiting");
    }
}

/// Child side of the fork: keep this lane's read/write ends, close all
/// other inherited pipe fds by dropping them.
fn claim_child_channel(pairs: Vec<(PipePair, PipePair)>, index: usize) -> ChildChannel {
    let mut command_rx = None;
    let mut data_tx = None;
    for (i, (parent_to_child, child_to_parent)) in pairs.into_iter().enumerate() {
        if i == index {
            command_rx = Some(parent_to_child.read);
            data_tx = Some(child_to_parent.write);
        }
        // Every other fd, including our own unused ends, drops here.
    }
    match (command_rx, data_tx) {
        (Some(command_rx), Some(data_tx)) => ChildChannel {
            command_rx,
            data_tx,
        },
        _ => {
            error!(index, "lane index has no pipe pair");
            std::process::exit(1);
        }
    }
}

/// Parent side: keep the command write ends and data read ends, close
/// the children's ends by dropping them.
fn claim_parent_channels(pairs: Vec<(PipePair, PipePair)>) -> Vec<ParentChannel> {
    pairs
        .into_iter()
        .map(|(parent_to_child, child_to_parent)| ParentChannel {
            command_tx: parent_to_child.write,
            data_rx: child_to_parent.read,
        })
        .collect()
}

/// Reap every zombie without blocking and drop reaped pids from the
/// live set.
fn reap_children(child_pids: &mut Vec<Pid>) {
    loop {
        match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(pid, status)) => {
                info!(%pid, status, "reaped worker");
                child_pids.retain(|p| *p != pid);
            }
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                info!(%pid, ?signal, "reaped signaled worker");
                child_pids.retain(|p| *p != pid);
            }
            Ok(WaitStatus::StillAlive) => break,
            Ok(_) => continue,
            Err(Errno::ECHILD) => break,
            Err(e) => {
                warn!("waitpid failed: {e}");
                break;
            }
        }
    }
}

/// SIGTERM every remaining worker.
fn terminate_children(child_pids: &[Pid]) {
    for pid in child_pids {
        info!(%pid, "terminating worker");
        match kill(*pid, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!(%pid, "failed to terminate worker: {e}"),
        }
    }
}
