//! Parsing of the sensor board's serial text output.
//!
//! The board prints one sensor group per line, for example
//! `acc analog: -12.50 3.25 981.00`, framed by `print start` and
//! `print end` marker lines. Each recognised line updates a
//! [`PartialSample`] in place. Groups not seen yet read as zero.

use std::sync::LazyLock;

use regex::Regex;

use crate::constants::CHANNEL_COUNT;
use crate::decode::DecodeError;
use crate::telemetry::TelemetrySample;

/// Decimal numbers as the board prints them. Integers without a fraction
/// are not readings.
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+\.\d+").expect("number pattern is valid"));

/// Line tag, first channel index, and channel count for each group, in the
/// order tags are tried.
const GROUPS: [(&str, usize, usize); 7] = [
    ("acc analog", 0, 3),
    ("mag analog", 3, 3),
    ("gyr analog", 6, 3),
    ("lia analog", 9, 3),
    ("grv analog", 12, 3),
    ("eul analog", 15, 3),
    ("qua analog", 18, 4),
];

const MARKERS: [&str; 2] = ["print start", "print end"];

/// Channels accumulated from serial lines, in wire order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialSample {
    channels: [f64; CHANNEL_COUNT],
}

impl Default for PartialSample {
    fn default() -> Self {
        Self {
            channels: [0.0; CHANNEL_COUNT],
        }
    }
}

impl PartialSample {
    pub fn channels(&self) -> &[f64; CHANNEL_COUNT] {
        &self.channels
    }

    /// Snapshot of everything read so far.
    ///
    /// Fails only when a printed literal overflowed `f64`.
    pub fn sample(&self) -> Result<TelemetrySample, DecodeError> {
        TelemetrySample::try_from_channels(self.channels)
    }
}

/// Applies one serial line to `partial`.
///
/// Returns `true` when a group was updated. Marker lines, unknown lines and
/// lines with fewer numbers than the group needs leave `partial` untouched.
/// Extra numbers past the group's width are ignored.
pub fn parse_line(line: &str, partial: &mut PartialSample) -> bool {
    let line = line.trim();
    if MARKERS.iter().any(|m| line.contains(m)) {
        return false;
    }
    let Some(&(_, first, width)) = GROUPS.iter().find(|(tag, _, _)| line.contains(tag)) else {
        return false;
    };

    let numbers: Vec<f64> = NUMBER
        .find_iter(line)
        .filter_map(|m| m.as_str().parse().ok())
        .take(width)
        .collect();
    if numbers.len() < width {
        return false;
    }
    partial.channels[first..first + width].copy_from_slice(&numbers);
    true
}
