use std::{ops::ControlFlow, time::Duration};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, info, Instrument};

use crate::{
    daemon::focus::tracker::{FocusTracker, TrackerCommand},
    input_api::{power::PowerEventSource, InputMonitor},
    utils::clock::Clock,
};

/// Drives the [FocusTracker]: samples the input monitor once per tick and forwards power events
/// and commands in between. This is the only place the tracker is mutated from.
pub struct FocusTicker {
    tracker: FocusTracker,
    monitor: Box<dyn InputMonitor>,
    power_events: Box<dyn PowerEventSource>,
    commands: mpsc::Receiver<TrackerCommand>,
    shutdown: CancellationToken,
    tick_frequency: Duration,
    time_provider: Box<dyn Clock>,
}

impl FocusTicker {
    pub fn new(
        tracker: FocusTracker,
        monitor: Box<dyn InputMonitor>,
        power_events: Box<dyn PowerEventSource>,
        commands: mpsc::Receiver<TrackerCommand>,
        shutdown: CancellationToken,
        tick_frequency: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            tracker,
            monitor,
            power_events,
            commands,
            shutdown,
            tick_frequency,
            time_provider,
        }
    }

    async fn tick(&mut self) {
        let now = self.time_provider.time();
        match self.monitor.get_idle_time() {
            Ok(idle_ms) => {
                self.tracker
                    .tick(idle_ms as f64 / 1000., now)
                    .instrument(debug_span!("Tick"))
                    .await
            }
            // Skipping a tick only loses a second of data.
            Err(e) => error!("Failed to read idle time {e:?}"),
        }
    }

    /// Executes the tick loop. Returns once shutdown was requested, after all data was saved.
    pub async fn run(mut self) -> Result<()> {
        let mut tick_point = self.time_provider.instant() + self.tick_frequency;
        let mut power_events_open = true;
        let mut commands_open = true;

        loop {
            tokio::select! {
                biased;

                // Cancellation means we stop the loop, which drops the tracker and with it the
                // sending side of the persistence queue.
                _ = self.shutdown.cancelled() => {
                    info!("Stopping, saving all data");
                    let now = self.time_provider.time();
                    self.tracker.flush_all(now).await;
                    return Ok(());
                }
                event = self.power_events.next_event(), if power_events_open => match event {
                    Some(event) => self.tracker.handle_power_event(event).await,
                    None => {
                        debug!("Power event source finished");
                        power_events_open = false;
                    }
                },
                command = self.commands.recv(), if commands_open => match command {
                    Some(command) => {
                        debug!("Received command {command:?}");
                        let now = self.time_provider.time();
                        if let ControlFlow::Break(()) = self.tracker.handle_command(command, now).await {
                            // Everything was deleted, so there is nothing to save.
                            self.shutdown.cancel();
                            return Ok(());
                        }
                    }
                    None => commands_open = false,
                },
                _ = self.time_provider.sleep_until(tick_point) => {
                    self.tick().await;
                    tick_point += self.tick_frequency;
                    // Missed ticks are skipped instead of replayed, each of them would count as a
                    // second of work.
                    let now = self.time_provider.instant();
                    if tick_point < now {
                        debug!("Skipping missed ticks");
                        tick_point = now + self.tick_frequency;
                    }
                }
            }
        }
    }
}
