use std::time::Duration;

use anyhow::Result;
use tokio::{select, sync::watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::daemon::config::Config;

use super::PersistenceHandle;

pub const CONFIG_SETTLE_TIME: Duration = Duration::from_millis(200);

/// Writes the config once it stopped changing for [CONFIG_SETTLE_TIME], so that dragging a slider
/// in a settings screen doesn't produce a write per step.
pub struct ConfigDebouncer {
    receiver: watch::Receiver<Config>,
    persistence: PersistenceHandle,
    settle_time: Duration,
    shutdown: CancellationToken,
}

impl ConfigDebouncer {
    pub fn new(
        receiver: watch::Receiver<Config>,
        persistence: PersistenceHandle,
        settle_time: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            persistence,
            settle_time,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                changed = self.receiver.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }

            loop {
                select! {
                    _ = self.shutdown.cancelled() => {
                        self.write();
                        return Ok(());
                    }
                    changed = self.receiver.changed() => {
                        if changed.is_err() {
                            self.write();
                            return Ok(());
                        }
                    }
                    _ = tokio::time::sleep(self.settle_time) => break,
                }
            }
            self.write();
        }
    }

    fn write(&mut self) {
        let config = self.receiver.borrow_and_update().clone();
        debug!("Config settled, saving");
        self.persistence.schedule_config(config);
    }
}
