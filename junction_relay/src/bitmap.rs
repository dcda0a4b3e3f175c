//! Channel bitmap derivation.
//!
//! The board exposes one 16-channel bank. Lane `i` owns two channels:
//! its green lamp group on channel `i` and its yellow lamp group on
//! channel `lanes + i`. Red lamp groups are wired normally-on through
//! the board, so the controller only ever asserts green/yellow sets.
//! `relay writeall <hex>` replaces the whole bank, which keeps the
//! single-asserted-bitmap invariant by construction.

use bitflags::bitflags;
use junction_common::consts::RELAY_CHANNEL_COUNT;
use junction_common::phase::{LaneKind, PhaseAssignment};

bitflags! {
    /// Set of energized relay channels (bit `i` = channel `i`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChannelMask: u16 {
        const ALL = 0xffff;
    }
}

impl ChannelMask {
    /// Mask with only channel `index` set.
    pub fn channel(index: usize) -> Self {
        debug_assert!(index < RELAY_CHANNEL_COUNT);
        Self::from_bits_retain(1 << index)
    }
}

/// The board-level command that asserts exactly `mask`.
pub fn writeall_command(mask: ChannelMask) -> String {
    format!("relay writeall {:04x}", mask.bits())
}

/// Fixed lane → channel assignment for one junction.
#[derive(Debug, Clone)]
pub struct ChannelLayout {
    lanes: usize,
}

impl ChannelLayout {
    pub fn new(lanes: usize) -> Self {
        debug_assert!(lanes * 2 <= RELAY_CHANNEL_COUNT);
        Self { lanes }
    }

    /// Green lamp channel of lane `lane`.
    pub fn green(&self, lane: usize) -> usize {
        lane
    }

    /// Yellow lamp channel of lane `lane`.
    pub fn yellow(&self, lane: usize) -> usize {
        self.lanes + lane
    }

    /// Channels energized while `phase` is held: the green channel of
    /// every lane whose assignment is green.
    pub fn phase_mask(&self, phase: &[PhaseAssignment]) -> ChannelMask {
        let mut mask = ChannelMask::empty();
        for (lane, assignment) in phase.iter().enumerate() {
            if assignment.is_green() {
                mask |= ChannelMask::channel(self.green(lane));
            }
        }
        mask
    }

    /// Channels energized during the yellow transition from `current`
    /// to `next`: a vehicle lane losing its green shows yellow, a lane
    /// keeping its green stays green, everything else goes dark.
    pub fn transition_mask(
        &self,
        current: &[PhaseAssignment],
        next: &[PhaseAssignment],
    ) -> ChannelMask {
        let mut mask = ChannelMask::empty();
        for (lane, (&cur, &nxt)) in current.iter().zip(next.iter()).enumerate() {
            match (cur, nxt) {
                (PhaseAssignment::GreenVehicle, PhaseAssignment::GreenVehicle) => {
                    mask |= ChannelMask::channel(self.green(lane));
                }
                (PhaseAssignment::GreenVehicle, _) => {
                    mask |= ChannelMask::channel(self.yellow(lane));
                }
                (PhaseAssignment::GreenPedestrian, PhaseAssignment::GreenPedestrian) => {
                    mask |= ChannelMask::channel(self.green(lane));
                }
                _ => {}
            }
        }
        mask
    }

    /// Channels flashed in standby: the yellow channel of every vehicle
    /// lane.
    pub fn standby_mask(&self, kinds: &[LaneKind]) -> ChannelMask {
        let mut mask = ChannelMask::empty();
        for (lane, kind) in kinds.iter().enumerate() {
            if *kind == LaneKind::Vehicle {
                mask |= ChannelMask::channel(self.yellow(lane));
            }
        }
        mask
    }
}
