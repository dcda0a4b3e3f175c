//! Async-signal-safe signal handling.
//!
//! Handlers only flip atomics; all real work (reaping, relay standby,
//! child termination) happens in the main loop, which polls the flags
//! at every timer tick and phase boundary. This keeps the signal
//! context free of I/O and locks.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

/// SIGINT arrived: orderly shutdown requested.
pub static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
/// SIGCHLD arrived: at least one child changed state.
pub static CHILD_EXITED: AtomicBool = AtomicBool::new(false);
/// SIGTERM arrived (child side): leave the worker loop.
pub static TERMINATED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

extern "C" fn on_sigchld(_: libc::c_int) {
    CHILD_EXITED.store(true, Ordering::SeqCst);
}

extern "C" fn on_sigterm(_: libc::c_int) {
    TERMINATED.store(true, Ordering::SeqCst);
}

/// Install the parent's handlers. SIGPIPE is ignored so a write to a
/// dead child surfaces as EPIPE instead of killing the scheduler.
pub fn install_parent_handlers() -> Result<(), nix::errno::Errno> {
    let int = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let chld = SigAction::new(
        SigHandler::Handler(on_sigchld),
        SaFlags::SA_NOCLDSTOP,
        SigSet::empty(),
    );
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    unsafe {
        sigaction(Signal::SIGINT, &int)?;
        sigaction(Signal::SIGCHLD, &chld)?;
        sigaction(Signal::SIGPIPE, &ignore)?;
    }
    Ok(())
}

/// Replace inherited parent handlers with the child's own: SIGTERM
/// requests a clean worker exit, everything else reverts to default.
pub fn install_child_handlers() -> Result<(), nix::errno::Errno> {
    let term = SigAction::new(
        SigHandler::Handler(on_sigterm),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    unsafe {
        sigaction(Signal::SIGTERM, &term)?;
        sigaction(Signal::SIGINT, &default)?;
        sigaction(Signal::SIGCHLD, &default)?;
    }
    Ok(())
}

/// Consume the shutdown flag.
pub fn take_shutdown_request() -> bool {
    SHUTDOWN_REQUESTED.swap(false, Ordering::SeqCst)
}

/// Consume the child-exited flag.
pub fn take_child_exit() -> bool {
    CHILD_EXITED.swap(false, Ordering::SeqCst)
}
