//! Wires the telemetry client to the terminal renderer.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use imu_dash_client::{ClientState, TelemetryClient};

use crate::config::DashboardConfig;
use crate::render::Renderer;

/// `tokio::time::interval` rejects a zero period.
const MIN_REFRESH: Duration = Duration::from_millis(1);

/// Runs the dashboard until Ctrl+C.
pub async fn run(config: DashboardConfig) -> anyhow::Result<()> {
    let client = TelemetryClient::websocket(config.url.clone(), config.client_config());
    let updates = client.subscribe();
    client.start();

    let refresh = config.refresh().max(MIN_REFRESH);
    let renderer = Renderer::new(config.precision, config.quaternion_precision, refresh);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tokio::select! {
        result = &mut shutdown => {
            result?;
            tracing::info!("interrupt received, shutting down");
        }
        () = render_loop(updates, renderer, refresh) => {}
    }

    client.dispose();
    Ok(())
}

/// Prints every state change until the client goes away. The refresh tick
/// flushes a table held back by throttling.
async fn render_loop(
    mut updates: watch::Receiver<ClientState>,
    mut renderer: Renderer,
    refresh: Duration,
) {
    let mut tick = tokio::time::interval(refresh);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let initial = updates.borrow_and_update().clone();
    print_lines(renderer.render(&initial, Instant::now()));
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                print_lines(renderer.render(&state, Instant::now()));
            }
            _ = tick.tick() => print_lines(renderer.flush(Instant::now())),
        }
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}
