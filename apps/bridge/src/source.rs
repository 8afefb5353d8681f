//! Producers of telemetry frames: the serial sensor board, or a recorded
//! capture of its output.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use imu_dash_protocol::{PartialSample, parse_line};

use crate::server::BridgeError;

/// Baud rate the sensor board prints at.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Tried after any ports the system reports.
const DEFAULT_DEVICE_PATHS: &[&str] = &["/dev/ttyACM0", "/dev/ttyUSB0"];

/// Wait before trying to reopen after no port could be opened.
pub const REOPEN_DELAY: Duration = Duration::from_secs(5);

/// Reads lines from `reader` until EOF, publishing the accumulated sample
/// after every line that updated a group. `pace` is slept after each
/// published frame.
pub async fn pump_lines<R>(
    reader: R,
    partial: &mut PartialSample,
    frames: &broadcast::Sender<String>,
    pace: Duration,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if !parse_line(&line, partial) {
            trace!(line = %line.trim(), "skipping line");
            continue;
        }
        match partial.sample() {
            // No connected dashboard is not an error.
            Ok(sample) => {
                let _ = frames.send(sample.to_json());
            }
            Err(e) => warn!(error = %e, "dropping reading"),
        }
        if !pace.is_zero() {
            tokio::time::sleep(pace).await;
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SerialSource {
    /// Device paths to try in order. Empty means discover.
    pub devices: Vec<String>,
    pub baud: u32,
    pub reopen_delay: Duration,
}

impl SerialSource {
    /// Streams the board's output until cancelled, reopening the port after
    /// every read failure. Readings survive a reopen.
    pub async fn run(&self, frames: broadcast::Sender<String>, cancel: CancellationToken) {
        let mut partial = PartialSample::default();
        loop {
            let (path, port) = match self.open() {
                Ok(opened) => opened,
                Err(e) => {
                    warn!(error = %e, delay_s = self.reopen_delay.as_secs(), "retrying later");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        () = tokio::time::sleep(self.reopen_delay) => continue,
                    }
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => return,
                result = pump_lines(BufReader::new(port), &mut partial, &frames, Duration::ZERO) => {
                    match result {
                        Ok(()) => warn!(%path, "serial port closed"),
                        Err(e) => warn!(%path, error = %e, "serial read failed"),
                    }
                }
            }
        }
    }

    fn candidates(&self) -> Vec<String> {
        if !self.devices.is_empty() {
            return self.devices.clone();
        }
        let mut paths: Vec<String> = match tokio_serial::available_ports() {
            Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
            Err(e) => {
                debug!(error = %e, "could not list serial ports");
                Vec::new()
            }
        };
        for path in DEFAULT_DEVICE_PATHS {
            if !paths.iter().any(|p| p == path) {
                paths.push((*path).to_string());
            }
        }
        paths
    }

    fn open(&self) -> Result<(String, tokio_serial::SerialStream), BridgeError> {
        let paths = self.candidates();
        for path in &paths {
            debug!(%path, "trying serial port");
            let opened = tokio_serial::new(path, self.baud)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async();
            match opened {
                Ok(port) => {
                    info!(%path, baud = self.baud, "serial port opened");
                    return Ok((path.clone(), port));
                }
                Err(e) => warn!(%path, error = %e, "failed to open serial port"),
            }
        }
        Err(BridgeError::NoSerialPort(paths.join(", ")))
    }
}

/// Plays back a capture of the board's serial output.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    pub path: PathBuf,
    /// Pause after each published frame.
    pub interval: Duration,
    /// Start over at end of file instead of stopping.
    pub repeat: bool,
}

impl ReplaySource {
    pub async fn run(
        &self,
        frames: broadcast::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        loop {
            let file = tokio::fs::File::open(&self.path).await?;
            let mut partial = PartialSample::default();
            info!(path = %self.path.display(), "replaying capture");

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                result = pump_lines(BufReader::new(file), &mut partial, &frames, self.interval) => result?,
            }
            if !self.repeat {
                info!("capture finished");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use imu_dash_protocol::decode;

    use super::*;

    const CAPTURE: &str = "print start\n\
        acc analog: -12.50 3.25 981.00\n\
        mag analog: 22.10 -5.00 40.40\n\
        noise without numbers\n\
        qua analog: 1.0000 0.0000 0.0000 0.0000\n\
        print end\n";

    fn drain(rx: &mut broadcast::Receiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame);
        }
        out
    }

    #[tokio::test]
    async fn publishes_after_each_updating_line() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut partial = PartialSample::default();

        pump_lines(CAPTURE.as_bytes(), &mut partial, &tx, Duration::ZERO)
            .await
            .unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 3);

        let first = decode(&frames[0]).unwrap();
        assert_eq!(first.acceleration.z, 981.0);
        assert_eq!(first.magnetometer.x, 0.0);

        let last = decode(&frames[2]).unwrap();
        assert_eq!(last.acceleration.x, -12.5);
        assert_eq!(last.magnetometer.z, 40.4);
        assert_eq!(last.quaternion.w, 1.0);
    }

    #[tokio::test]
    async fn no_dashboards_is_fine() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        let mut partial = PartialSample::default();
        pump_lines(CAPTURE.as_bytes(), &mut partial, &tx, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(partial.channels()[0], -12.5);
    }

    #[tokio::test]
    async fn readings_carry_across_readers() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut partial = PartialSample::default();
        pump_lines(&b"gyr analog: 1.00 2.00 3.00\n"[..], &mut partial, &tx, Duration::ZERO)
            .await
            .unwrap();
        // Cut off mid-line, as a failing port would.
        pump_lines(&b"eul analog: 90.00 0.00 0.00\nacc ana"[..], &mut partial, &tx, Duration::ZERO)
            .await
            .unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        let last = decode(&frames[1]).unwrap();
        assert_eq!(last.gyroscope.y, 2.0);
        assert_eq!(last.euler.heading, 90.0);
    }

    #[tokio::test]
    async fn replay_paces_frames() {
        tokio::time::pause();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.txt");
        std::fs::write(&path, CAPTURE).unwrap();

        let (tx, mut rx) = broadcast::channel(16);
        let replay = ReplaySource {
            path,
            interval: Duration::from_millis(100),
            repeat: false,
        };
        let start = tokio::time::Instant::now();
        replay.run(tx, CancellationToken::new()).await.unwrap();

        assert_eq!(drain(&mut rx).len(), 3);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn repeating_replay_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.txt");
        std::fs::write(&path, CAPTURE).unwrap();

        let (tx, mut rx) = broadcast::channel(64);
        let cancel = CancellationToken::new();
        let replay = ReplaySource {
            path,
            interval: Duration::from_millis(5),
            repeat: true,
        };
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { replay.run(tx, cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();
        assert!(drain(&mut rx).len() > 3, "capture played more than once");
    }

    #[tokio::test]
    async fn missing_capture_is_an_error() {
        let (tx, _rx) = broadcast::channel(4);
        let replay = ReplaySource {
            path: PathBuf::from("/nonexistent/capture.txt"),
            interval: Duration::ZERO,
            repeat: false,
        };
        assert!(matches!(
            replay.run(tx, CancellationToken::new()).await,
            Err(BridgeError::Io(_))
        ));
    }

    #[tokio::test]
    async fn missing_device_is_reported() {
        let source = SerialSource {
            devices: vec!["/dev/imu-bridge-test-absent".into()],
            baud: DEFAULT_BAUD,
            reopen_delay: REOPEN_DELAY,
        };
        let err = source.open().unwrap_err();
        assert!(err.to_string().contains("imu-bridge-test-absent"));
    }
}
