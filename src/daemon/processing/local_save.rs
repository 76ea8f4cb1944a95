use anyhow::Result;
use tracing::{debug, info};

use crate::daemon::storage::activity_storage::ActivityStorage;

use super::{job::PersistJob, module::JobProcessor};

/// Represents saving module. Saving module main goal is to bridge
/// [PersistenceModule](super::PersistenceModule) and [ActivityStorage].
pub struct LocalSaver<S: ActivityStorage> {
    storage: S,
    /// Set after everything was deleted. The process is about to exit, and writing anything now
    /// would resurrect the deleted data.
    cleared: bool,
}

impl<S: ActivityStorage> LocalSaver<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            cleared: false,
        }
    }
}

impl<S: ActivityStorage> JobProcessor for LocalSaver<S> {
    async fn process_next(&mut self, job: PersistJob) -> Result<()> {
        if self.cleared {
            debug!("Ignoring {job} after clearing all data");
            return Ok(());
        }

        match job {
            PersistJob::Snapshot(snapshot) => self.storage.save_snapshot(&snapshot).await,
            PersistJob::Daily(days) => self.storage.save_daily(&days).await,
            PersistJob::Config(config) => self.storage.save_config(&config).await,
            PersistJob::ClearAll => {
                self.cleared = true;
                self.storage.clear_all().await?;
                info!("Cleared all data");
                Ok(())
            }
            // Barriers are acknowledged by the module.
            PersistJob::Barrier(_) => Ok(()),
        }
    }

    async fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use crate::{
        daemon::{
            config::Config,
            storage::{activity_storage::FileActivityStorage, entities::ActivitySnapshot},
        },
        utils::dir::AppPaths,
    };

    use super::*;

    #[tokio::test]
    async fn test_writes_are_ignored_after_clear() -> Result<()> {
        let dir = tempdir()?;
        let paths = AppPaths::new(dir.path().to_path_buf());
        let mut saver = LocalSaver::new(FileActivityStorage::new(paths.clone())?);

        saver
            .process_next(PersistJob::Snapshot(ActivitySnapshot::default()))
            .await?;
        saver
            .process_next(PersistJob::Config(Config::default()))
            .await?;
        assert!(paths.activity().exists());
        assert!(paths.config().exists());

        saver.process_next(PersistJob::ClearAll).await?;
        assert!(!paths.activity().exists());
        assert!(!paths.config().exists());

        saver
            .process_next(PersistJob::Config(Config::default()))
            .await?;
        saver
            .process_next(PersistJob::Snapshot(ActivitySnapshot::default()))
            .await?;
        assert!(!paths.activity().exists());
        assert!(!paths.config().exists());
        Ok(())
    }
}
