use std::fmt::Display;

use tokio::sync::oneshot;

use crate::daemon::{
    config::Config,
    storage::{activity_storage::DailyActivityMap, entities::ActivitySnapshot},
};

/// Unit of work for the persistence queue. Jobs own copies of the data, so the focus loop can keep
/// mutating its state while they are being written.
#[derive(Debug)]
pub enum PersistJob {
    Snapshot(ActivitySnapshot),
    Daily(DailyActivityMap),
    Config(Config),
    /// Delete everything. Jobs queued afterwards are ignored.
    ClearAll,
    /// Acknowledged once every job queued before it has been processed.
    Barrier(oneshot::Sender<()>),
}

impl Display for PersistJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistJob::Snapshot(snapshot) => {
                write!(f, "snapshot (work time {})", snapshot.work_time)
            }
            PersistJob::Daily(days) => write!(f, "{} daily records", days.len()),
            PersistJob::Config(_) => write!(f, "config"),
            PersistJob::ClearAll => write!(f, "clear all"),
            PersistJob::Barrier(_) => write!(f, "barrier"),
        }
    }
}
