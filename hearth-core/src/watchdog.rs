//! Keep-alive probe.
//!
//! Some networks leave a dead TCP session half-open for a long time. Every
//! period the watchdog sends `PING :watchdog` and waits one period for any
//! PONG. One miss earns a second probe; two misses in a row count as a
//! dead connection.

use std::time::Duration;

use tokio::sync::watch;

use crate::writer::Writer;

pub const WATCHDOG_TOKEN: &str = "watchdog";

/// Consecutive unanswered probes before giving up on the session.
const MAX_MISSES: u32 = 2;

enum Probe {
    Answered,
    Missed,
    Stopped,
}

/// Probe until `stop` turns true. `on_failure` runs each time the session
/// is judged dead.
pub(crate) async fn run<F>(
    period: Duration,
    writer: Writer,
    mut stop: watch::Receiver<bool>,
    on_failure: F,
) where
    F: Fn() + Send + 'static,
{
    let mut pongs = writer.subscribe_pongs();
    let mut misses = 0;
    tracing::debug!(period_secs = period.as_secs(), "Watchdog started");

    loop {
        if idle(period, &mut stop).await {
            break;
        }
        if !writer.is_connected() {
            // Reconnect in progress; the transport already knows.
            misses = 0;
            continue;
        }

        match probe(period, &writer, &mut pongs, &mut stop).await {
            Probe::Stopped => break,
            Probe::Answered => misses = 0,
            Probe::Missed => {
                misses += 1;
                if misses < MAX_MISSES {
                    tracing::info!("Watchdog PING went unanswered, retrying once");
                    continue;
                }
                misses = 0;
                tracing::warn!(
                    period_secs = period.as_secs(),
                    "Watchdog failed to receive a PONG, forcing reconnect"
                );
                on_failure();
            }
        }
    }
    tracing::debug!("Watchdog stopped");
}

/// Sleep one period. Returns true if told to stop meanwhile.
async fn idle(period: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    if *stop.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(period) => *stop.borrow(),
        _ = stop.changed() => true,
    }
}

async fn probe(
    period: Duration,
    writer: &Writer,
    pongs: &mut watch::Receiver<Option<String>>,
    stop: &mut watch::Receiver<bool>,
) -> Probe {
    pongs.borrow_and_update();
    writer.send_ping(WATCHDOG_TOKEN);
    tokio::select! {
        changed = pongs.changed() => match changed {
            Ok(()) => Probe::Answered,
            Err(_) => Probe::Stopped,
        },
        _ = tokio::time::sleep(period) => Probe::Missed,
        _ = stop.changed() => Probe::Stopped,
    }
}
