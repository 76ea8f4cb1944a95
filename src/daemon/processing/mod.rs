use anyhow::{anyhow, Result};
use job::PersistJob;
use module::JobProcessor;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::{
    config::Config,
    storage::{activity_storage::DailyActivityMap, entities::ActivitySnapshot},
};

pub mod debounce;
pub mod job;
pub mod local_save;
pub mod module;

/// Serial writer of persistence jobs. Jobs are processed strictly in the order they were queued,
/// so a later copy of some data always overwrites an earlier one.
pub struct PersistenceModule<Processor> {
    receiver: mpsc::UnboundedReceiver<PersistJob>,
    processor: Processor,
}

impl<P: JobProcessor> PersistenceModule<P> {
    pub fn new(receiver: mpsc::UnboundedReceiver<PersistJob>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    /// Runs until every [PersistenceHandle] is dropped.
    pub async fn run(mut self) -> Result<()> {
        while let Some(job) = self.receiver.recv().await {
            let job = match job {
                PersistJob::Barrier(ack) => {
                    // Nobody might be waiting anymore, which is fine.
                    let _ = ack.send(());
                    continue;
                }
                job => job,
            };

            debug!("Processing {job}");
            let description = job.to_string();
            match self.processor.process_next(job).await {
                Ok(_) => {
                    info!("Persisted {description}")
                }
                Err(e) => {
                    // The next save retries with fresher data.
                    error!("Error persisting {description}: {e:?}")
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}

/// Sending side of the persistence queue. Queueing never blocks; waiting is opt-in through
/// [PersistenceHandle::wait_idle].
#[derive(Clone)]
pub struct PersistenceHandle {
    sender: mpsc::UnboundedSender<PersistJob>,
}

impl PersistenceHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PersistJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn schedule_snapshot(&self, snapshot: ActivitySnapshot) {
        self.send(PersistJob::Snapshot(snapshot));
    }

    pub fn schedule_daily(&self, days: DailyActivityMap) {
        self.send(PersistJob::Daily(days));
    }

    pub fn schedule_config(&self, config: Config) {
        self.send(PersistJob::Config(config));
    }

    pub fn clear_all(&self) {
        self.send(PersistJob::ClearAll);
    }

    /// Waits until everything queued so far has been written.
    pub async fn wait_idle(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(PersistJob::Barrier(ack))
            .map_err(|_| anyhow!("Persistence queue is closed"))?;
        done.await?;
        Ok(())
    }

    /// Queues both data files and waits until they are on disk.
    pub async fn flush(&self, snapshot: ActivitySnapshot, days: DailyActivityMap) -> Result<()> {
        self.schedule_snapshot(snapshot);
        self.schedule_daily(days);
        self.wait_idle().await
    }

    fn send(&self, job: PersistJob) {
        if let Err(e) = self.sender.send(job) {
            error!("Persistence queue is closed, dropping {}", e.0);
        }
    }
}
