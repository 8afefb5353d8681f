//! Wire format and sample model for IMU dashboard telemetry.
//!
//! The sensor bridge pushes one flat JSON object per sample; [`decode`]
//! turns it into a [`TelemetrySample`] or rejects the whole frame. The
//! [`line`] module reads the sensor board's serial text on the producing side.

pub mod constants;
pub mod decode;
pub mod line;
pub mod telemetry;

// Re-export primary types for convenience.
pub use decode::{DecodeError, decode};
pub use line::{PartialSample, parse_line};
pub use telemetry::{EulerAngles, Quaternion, TelemetrySample, Vector3};
