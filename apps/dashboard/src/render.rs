//! Plain-text rendering of client state.

use std::time::Duration;

use tokio::time::Instant;

use imu_dash_client::{ClientState, ErrorKind, LinkState};
use imu_dash_protocol::TelemetrySample;

/// Decides what to print for each state update.
///
/// The status line is printed when link health or the last error changes.
/// The table is printed for a new sample, at most once per `refresh`. A
/// sample that arrives inside the period is held and printed by the next
/// update or [`flush`](Renderer::flush) once the period is over, so the
/// last sample of a burst is never lost.
pub struct Renderer {
    precision: usize,
    quaternion_precision: usize,
    refresh: Duration,
    last_status: Option<(LinkState, Option<ErrorKind>)>,
    last_table_at: Option<Instant>,
    shown_sample_at: Option<Instant>,
    pending: Option<(TelemetrySample, Instant)>,
}

impl Renderer {
    pub fn new(precision: usize, quaternion_precision: usize, refresh: Duration) -> Self {
        Self {
            precision,
            quaternion_precision,
            refresh,
            last_status: None,
            last_table_at: None,
            shown_sample_at: None,
            pending: None,
        }
    }

    /// Lines to print for `state`, possibly none.
    pub fn render(&mut self, state: &ClientState, now: Instant) -> Vec<String> {
        let mut lines = Vec::new();

        let status = (state.link_state, state.last_error);
        if self.last_status != Some(status) {
            self.last_status = Some(status);
            lines.push(status_line(state, now));
        }

        if let (Some(sample), Some(at)) = (state.latest_sample, state.last_sample_at) {
            if self.shown_sample_at != Some(at) {
                self.pending = Some((sample, at));
            }
        }
        lines.extend(self.flush(now));

        lines
    }

    /// Table rows for a held sample, if one is waiting and the refresh
    /// period has passed.
    pub fn flush(&mut self, now: Instant) -> Vec<String> {
        let due = self
            .last_table_at
            .is_none_or(|t| now.saturating_duration_since(t) >= self.refresh);
        if !due {
            return Vec::new();
        }
        let Some((sample, at)) = self.pending.take() else {
            return Vec::new();
        };
        self.shown_sample_at = Some(at);
        self.last_table_at = Some(now);
        sample_table(&sample, self.precision, self.quaternion_precision)
    }
}

pub fn status_line(state: &ClientState, now: Instant) -> String {
    let detail = match state.link_state {
        LinkState::Connecting if state.attempt > 0 => {
            format!("connecting (attempt {})", state.attempt + 1)
        }
        LinkState::Connecting => "connecting".to_string(),
        LinkState::Open => "open".to_string(),
        LinkState::Stalled => match state.last_sample_at {
            Some(at) => format!(
                "stalled, no data for {:.1}s",
                now.saturating_duration_since(at).as_secs_f64()
            ),
            None => "stalled, no data yet".to_string(),
        },
        LinkState::Closed => format!("closed, retry #{} scheduled", state.attempt),
    };

    match state.last_error {
        Some(err) => format!("[link] {detail} ({err})"),
        None => format!("[link] {detail}"),
    }
}

pub fn sample_table(
    sample: &TelemetrySample,
    precision: usize,
    quaternion_precision: usize,
) -> Vec<String> {
    let xyz = ["x", "y", "z"];
    let v = |v: &imu_dash_protocol::Vector3| [v.x, v.y, v.z];
    let e = &sample.euler;
    let q = &sample.quaternion;

    vec![
        row("Accelerometer", "mg", &xyz, &v(&sample.acceleration), precision),
        row("Magnetometer", "µT", &xyz, &v(&sample.magnetometer), precision),
        row("Gyroscope", "dps", &xyz, &v(&sample.gyroscope), precision),
        row(
            "Linear accel",
            "mg",
            &xyz,
            &v(&sample.linear_acceleration),
            precision,
        ),
        row("Gravity", "mg", &xyz, &v(&sample.gravity), precision),
        row(
            "Euler",
            "deg",
            &["heading", "roll", "pitch"],
            &[e.heading, e.roll, e.pitch],
            precision,
        ),
        row(
            "Quaternion",
            "",
            &["w", "x", "y", "z"],
            &[q.w, q.x, q.y, q.z],
            quaternion_precision,
        ),
    ]
}

fn row(title: &str, unit: &str, labels: &[&str], values: &[f64], precision: usize) -> String {
    let width = precision + 6;
    let mut line = format!("{title:<14}{unit:>4} ");
    for (label, value) in labels.iter().zip(values) {
        line.push_str(&format!("  {label} {value:>width$.precision$}"));
    }
    line
}
