//! Pipe pairs and frame transport between parent and children.
//!
//! Each child gets two unidirectional pipes created before the fork:
//! parent→child for phase command tags, child→parent for measurement
//! frames. After the fork each side closes the ends it does not own,
//! leaving every pipe with exactly one writer and one reader. Frames
//! are written whole (one message per `write`) and never exceed
//! [`FRAME_CAPACITY`] bytes including the trailing NUL.

use std::os::fd::{AsFd, OwnedFd};

use junction_common::consts::FRAME_CAPACITY;
use junction_common::phase::PhaseAssignment;
use junction_common::wire::{frame_payload, LaneMeasurement, WireError};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use tracing::error;

/// Both ends of one freshly created pipe.
pub struct PipePair {
    pub read: OwnedFd,
    pub write: OwnedFd,
}

impl PipePair {
    pub fn create() -> Result<Self, Errno> {
        let (read, write) = nix::unistd::pipe()?;
        Ok(Self { read, write })
    }
}

/// The parent's ends for one child: command sink, measurement source.
pub struct ParentChannel {
    pub command_tx: OwnedFd,
    pub data_rx: OwnedFd,
}

/// The child's ends: command source, measurement sink.
pub struct ChildChannel {
    pub command_rx: OwnedFd,
    pub data_tx: OwnedFd,
}

/// Put `fd` into non-blocking mode (the child's command source).
pub fn set_nonblocking(fd: &impl AsFd) -> Result<(), Errno> {
    fcntl(fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK))?;
    Ok(())
}

/// Write one phase command frame: the tag plus a trailing NUL.
pub fn send_phase_command(fd: &impl AsFd, assignment: PhaseAssignment) -> Result<(), Errno> {
    let tag = assignment.wire_tag();
    let mut frame = [0u8; FRAME_CAPACITY];
    frame[..tag.len()].copy_from_slice(tag.as_bytes());
    nix::unistd::write(fd, &frame[..tag.len() + 1])?;
    Ok(())
}

/// Non-blocking poll for a phase command. `Ok(None)` means no frame
/// has arrived, which is a valid state (continue current behavior).
pub fn try_recv_phase_command(fd: &impl AsFd) -> Result<Option<PhaseAssignment>, Errno> {
    let mut buf = [0u8; FRAME_CAPACITY];
    match nix::unistd::read(fd, &mut buf) {
        Ok(0) => Err(Errno::EPIPE),
        Ok(n) => {
            let tag = frame_payload(&buf[..n]).unwrap_or("");
            Ok(Some(PhaseAssignment::from_wire(tag)))
        }
        Err(Errno::EAGAIN) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Encode and write one measurement frame. An oversized payload is a
/// producer bug: it is logged and dropped, never truncated or split.
pub fn send_measurement(fd: &impl AsFd, measurement: &LaneMeasurement) -> Result<(), Errno> {
    let frame = match measurement.encode() {
        Ok(frame) => frame,
        Err(WireError::FrameOverflow) => {
            error!("measurement frame exceeds {FRAME_CAPACITY} bytes, dropping");
            return Ok(());
        }
        Err(e) => {
            error!("measurement frame encode failed: {e}");
            return Ok(());
        }
    };
    let mut buf = [0u8; FRAME_CAPACITY];
    buf[..frame.len()].copy_from_slice(frame.as_bytes());
    nix::unistd::write(fd, &buf[..frame.len() + 1])?;
    Ok(())
}

/// Blocking read of one measurement frame from a child.
///
/// Returns the parse result; any read failure or EOF surfaces as an
/// error so the caller can fall back to default-ratio densities.
pub fn recv_measurement(fd: &impl AsFd) -> Result<LaneMeasurement, RecvError> {
    let mut buf = [0u8; FRAME_CAPACITY];
    let n = nix::unistd::read(fd, &mut buf).map_err(RecvError::Read)?;
    if n == 0 {
        return Err(RecvError::Closed);
    }
    let payload = frame_payload(&buf[..n]).map_err(RecvError::Malformed)?;
    LaneMeasurement::parse(payload).map_err(RecvError::Malformed)
}

/// Why a measurement read yielded nothing usable.
#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    #[error("pipe read failed: {0}")]
    Read(Errno),
    #[error("pipe closed by peer")]
    Closed,
    #[error("malformed measurement frame: {0}")]
    Malformed(WireError),
}
