//! # Junction Controller Daemon
//!
//! Multi-process adaptive phase scheduler for a single road junction.
//! The parent process owns the cyclic phase sequence, drives the relay
//! board, and rebalances phase durations from demand measured by one
//! child process per lane; children talk to the parent over pipe pairs
//! with a bounded ASCII framing.
//!
//! # Module Structure
//!
//! - [`supervisor`] - fork/exec of children, signal-driven lifecycle
//! - [`scheduler`] - the parent cycle loop and phase timer
//! - [`child`] - vehicle and pedestrian worker runtimes
//! - [`ipc`] - pipe pairs and frame transport
//! - [`rebalance`] - density normalization and duration recomputation
//! - [`reporter`] - per-cycle HTTP report transport
//! - [`signals`] - async-signal-safe flag handlers

pub mod child;
pub mod ipc;
pub mod rebalance;
pub mod reporter;
pub mod scheduler;
pub mod signals;
pub mod supervisor;
