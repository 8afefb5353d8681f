use serde::{Deserialize, Serialize};

use crate::constants::{CHANNEL_COUNT, CHANNEL_NAMES};
use crate::decode::DecodeError;

/// Three-axis reading (acceleration, magnetic field, angular rate, ...).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Orientation as Euler angles, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EulerAngles {
    pub heading: f64,
    pub roll: f64,
    pub pitch: f64,
}

/// Orientation quaternion. Unit norm is not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// One fully validated IMU sample: 22 finite channels in 7 groups.
///
/// A sample only exists when every channel is present and finite; there is
/// no way to build a partially populated one. Serializes to (and
/// deserializes from) the flat wire object pushed by the sensor bridge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireSample", try_from = "WireSample")]
pub struct TelemetrySample {
    /// Accelerometer (mg).
    pub acceleration: Vector3,
    /// Magnetometer (µT).
    pub magnetometer: Vector3,
    /// Gyroscope (dps).
    pub gyroscope: Vector3,
    /// Linear acceleration, gravity removed (mg).
    pub linear_acceleration: Vector3,
    /// Gravity vector (mg).
    pub gravity: Vector3,
    pub euler: EulerAngles,
    pub quaternion: Quaternion,
}

impl TelemetrySample {
    /// Builds a sample from channels in [`CHANNEL_NAMES`] order.
    ///
    /// Fails with [`DecodeError::SchemaMismatch`] naming the first channel
    /// that is NaN or infinite.
    pub fn try_from_channels(c: [f64; CHANNEL_COUNT]) -> Result<Self, DecodeError> {
        if let Some(i) = c.iter().position(|v| !v.is_finite()) {
            return Err(DecodeError::SchemaMismatch {
                field: CHANNEL_NAMES[i].to_string(),
                reason: format!("expected a finite number, got {}", c[i]),
            });
        }
        Ok(Self {
            acceleration: Vector3 { x: c[0], y: c[1], z: c[2] },
            magnetometer: Vector3 { x: c[3], y: c[4], z: c[5] },
            gyroscope: Vector3 { x: c[6], y: c[7], z: c[8] },
            linear_acceleration: Vector3 { x: c[9], y: c[10], z: c[11] },
            gravity: Vector3 { x: c[12], y: c[13], z: c[14] },
            euler: EulerAngles {
                heading: c[15],
                roll: c[16],
                pitch: c[17],
            },
            quaternion: Quaternion {
                w: c[18],
                x: c[19],
                y: c[20],
                z: c[21],
            },
        })
    }

    /// All channels in [`CHANNEL_NAMES`] order.
    pub fn channels(&self) -> [f64; CHANNEL_COUNT] {
        let Self {
            acceleration: a,
            magnetometer: m,
            gyroscope: g,
            linear_acceleration: l,
            gravity: v,
            euler: e,
            quaternion: q,
        } = *self;
        [
            a.x, a.y, a.z, m.x, m.y, m.z, g.x, g.y, g.z, l.x, l.y, l.z, v.x, v.y, v.z,
            e.heading, e.roll, e.pitch, q.w, q.x, q.y, q.z,
        ]
    }

    /// Encodes the sample as a wire frame.
    pub fn to_json(&self) -> String {
        // Finite f64 fields always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Flat wire representation, one field per channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireSample {
    acc_x: f64,
    acc_y: f64,
    acc_z: f64,
    mag_x: f64,
    mag_y: f64,
    mag_z: f64,
    gyr_x: f64,
    gyr_y: f64,
    gyr_z: f64,
    lia_x: f64,
    lia_y: f64,
    lia_z: f64,
    grv_x: f64,
    grv_y: f64,
    grv_z: f64,
    eul_heading: f64,
    eul_roll: f64,
    eul_pitch: f64,
    qua_w: f64,
    qua_x: f64,
    qua_y: f64,
    qua_z: f64,
}

impl TryFrom<WireSample> for TelemetrySample {
    type Error = DecodeError;

    fn try_from(w: WireSample) -> Result<Self, Self::Error> {
        Self::try_from_channels([
            w.acc_x,
            w.acc_y,
            w.acc_z,
            w.mag_x,
            w.mag_y,
            w.mag_z,
            w.gyr_x,
            w.gyr_y,
            w.gyr_z,
            w.lia_x,
            w.lia_y,
            w.lia_z,
            w.grv_x,
            w.grv_y,
            w.grv_z,
            w.eul_heading,
            w.eul_roll,
            w.eul_pitch,
            w.qua_w,
            w.qua_x,
            w.qua_y,
            w.qua_z,
        ])
    }
}

impl From<TelemetrySample> for WireSample {
    fn from(s: TelemetrySample) -> Self {
        let [
            acc_x,
            acc_y,
            acc_z,
            mag_x,
            mag_y,
            mag_z,
            gyr_x,
            gyr_y,
            gyr_z,
            lia_x,
            lia_y,
            lia_z,
            grv_x,
            grv_y,
            grv_z,
            eul_heading,
            eul_roll,
            eul_pitch,
            qua_w,
            qua_x,
            qua_y,
            qua_z,
        ] = s.channels();
        Self {
            acc_x,
            acc_y,
            acc_z,
            mag_x,
            mag_y,
            mag_z,
            gyr_x,
            gyr_y,
            gyr_z,
            lia_x,
            lia_y,
            lia_z,
            grv_x,
            grv_y,
            grv_z,
            eul_heading,
            eul_roll,
            eul_pitch,
            qua_w,
            qua_x,
            qua_y,
            qua_z,
        }
    }
}
