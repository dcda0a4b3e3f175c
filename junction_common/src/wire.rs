//! Pipe wire format between the parent scheduler and its child workers.
//!
//! Both directions carry one NUL-terminated ASCII message per `write`,
//! at most [`FRAME_CAPACITY`] bytes. Parent→child frames are bare phase
//! tags (see [`crate::phase::PhaseAssignment::wire_tag`]). Child→parent
//! frames are measurement triples:
//!
//! ```text
//! <density %.2f>;<speed %.2f>;<type:count,type:count,...>\0
//! ```
//!
//! The vehicle map may be empty, but both semicolons are always present.
//! Frames that cannot be represented within the capacity are dropped at
//! the producer with an error log; the consumer rejects malformed or
//! NaN-carrying frames and the scheduler falls back to default-ratio
//! densities for the cycle.

use core::fmt::Write as _;
use std::collections::BTreeMap;

use thiserror::Error;

use crate::consts::FRAME_CAPACITY;

/// A bounded, NUL-terminable frame payload.
pub type FrameBuf = heapless::String<FRAME_CAPACITY>;

/// Wire format errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Frame does not contain the two mandatory semicolons.
    #[error("measurement frame missing field delimiters")]
    MissingDelimiter,

    /// Density or speed field failed to parse as a number.
    #[error("invalid {field} value: '{raw}'")]
    InvalidNumber { field: &'static str, raw: String },

    /// Density or speed field parsed as NaN.
    #[error("NaN detected in {field} field")]
    NotANumber { field: &'static str },

    /// A vehicle map entry had a non-numeric count.
    #[error("invalid vehicle count entry: '{entry}'")]
    InvalidVehicleCount { entry: String },

    /// Encoded frame would exceed [`FRAME_CAPACITY`] bytes.
    #[error("frame exceeds {FRAME_CAPACITY} byte capacity")]
    FrameOverflow,

    /// Frame bytes are not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    Encoding,
}

/// One lane's measurement for one phase, as carried on the wire and as
/// accumulated by the parent.
///
/// `density` is raw on the wire and phase-normalized once stored by the
/// parent. `vehicles` is keyed by detected vehicle type; ordered so the
/// encoded frame is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaneMeasurement {
    pub density: f32,
    pub speed: f32,
    pub vehicles: BTreeMap<String, u32>,
}

impl LaneMeasurement {
    pub fn new(density: f32, speed: f32) -> Self {
        Self {
            density,
            speed,
            vehicles: BTreeMap::new(),
        }
    }

    /// Encode into a bounded frame buffer (without the trailing NUL).
    pub fn encode(&self) -> Result<FrameBuf, WireError> {
        let mut buf = FrameBuf::new();
        write!(buf, "{:.2};{:.2};", self.density, self.speed)
            .map_err(|_| WireError::FrameOverflow)?;
        let mut first = true;
        for (kind, count) in &self.vehicles {
            if !first {
                buf.push(',').map_err(|_| WireError::FrameOverflow)?;
            }
            write!(buf, "{kind}:{count}").map_err(|_| WireError::FrameOverflow)?;
            first = false;
        }
        Ok(buf)
    }

    /// Parse a frame previously produced by [`Self::encode`].
    pub fn parse(raw: &str) -> Result<Self, WireError> {
        let mut fields = raw.splitn(3, ';');
        let density_raw = fields.next().ok_or(WireError::MissingDelimiter)?;
        let speed_raw = fields.next().ok_or(WireError::MissingDelimiter)?;
        let vehicles_raw = fields.next().ok_or(WireError::MissingDelimiter)?;

        let density = parse_field("density", density_raw)?;
        let speed = parse_field("speed", speed_raw)?;

        let mut vehicles = BTreeMap::new();
        for entry in vehicles_raw.split(',') {
            if entry.is_empty() {
                continue;
            }
            // Entries without a colon are skipped, not fatal.
            let Some((kind, count_raw)) = entry.split_once(':') else {
                continue;
            };
            let count: u32 =
                count_raw
                    .parse()
                    .map_err(|_| WireError::InvalidVehicleCount {
                        entry: entry.to_string(),
                    })?;
            vehicles.insert(kind.to_string(), count);
        }

        Ok(Self {
            density,
            speed,
            vehicles,
        })
    }
}

fn parse_field(field: &'static str, raw: &str) -> Result<f32, WireError> {
    let value: f32 = raw.trim().parse().map_err(|_| WireError::InvalidNumber {
        field,
        raw: raw.to_string(),
    })?;
    if value.is_nan() {
        return Err(WireError::NotANumber { field });
    }
    Ok(value)
}

/// Extract the payload of a received frame: bytes up to the first NUL,
/// decoded as UTF-8.
pub fn frame_payload(buf: &[u8]) -> Result<&str, WireError> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..end]).map_err(|_| WireError::Encoding)
}
