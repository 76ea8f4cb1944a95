use std::{collections::BTreeMap, future::Future, ops::Deref, path::Path};

use anyhow::Result;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::{
    daemon::config::{load_config, save_config, Config},
    fs::operations::{read_locked, remove_if_exists, write_atomic},
    utils::dir::AppPaths,
};

use super::entities::{ActivitySnapshot, DailyActivityData};

/// Every known day, keyed by `yyyy-MM-dd`.
pub type DailyActivityMap = BTreeMap<String, DailyActivityData>;

/// Interface for abstracting durable storage of activity data.
pub trait ActivityStorage {
    /// Reads the live snapshot. Broken or missing data is reported as `None`, never as an error.
    fn load_snapshot(&self) -> impl Future<Output = Option<ActivitySnapshot>>;

    fn save_snapshot(&self, snapshot: &ActivitySnapshot) -> impl Future<Output = Result<()>>;

    /// Reads all daily aggregates. Broken or missing data is reported as an empty map.
    fn load_daily(&self) -> impl Future<Output = DailyActivityMap>;

    fn save_daily(&self, days: &DailyActivityMap) -> impl Future<Output = Result<()>>;

    /// Reads the config, falling back to defaults.
    fn load_config(&self) -> impl Future<Output = Config>;

    fn save_config(&self, config: &Config) -> impl Future<Output = Result<()>>;

    /// Removes everything that was persisted, including the config.
    fn clear_all(&self) -> impl Future<Output = Result<()>>;
}

impl<T: Deref> ActivityStorage for T
where
    T::Target: ActivityStorage,
{
    fn load_snapshot(&self) -> impl Future<Output = Option<ActivitySnapshot>> {
        self.deref().load_snapshot()
    }

    fn save_snapshot(&self, snapshot: &ActivitySnapshot) -> impl Future<Output = Result<()>> {
        self.deref().save_snapshot(snapshot)
    }

    fn load_daily(&self) -> impl Future<Output = DailyActivityMap> {
        self.deref().load_daily()
    }

    fn save_daily(&self, days: &DailyActivityMap) -> impl Future<Output = Result<()>> {
        self.deref().save_daily(days)
    }

    fn load_config(&self) -> impl Future<Output = Config> {
        self.deref().load_config()
    }

    fn save_config(&self, config: &Config) -> impl Future<Output = Result<()>> {
        self.deref().save_config(config)
    }

    fn clear_all(&self) -> impl Future<Output = Result<()>> {
        self.deref().clear_all()
    }
}

/// The main realization of [ActivityStorage]: one json file per kind of data inside the
/// application directory.
pub struct FileActivityStorage {
    paths: AppPaths,
}

impl FileActivityStorage {
    pub fn new(paths: AppPaths) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(paths.dir())?;

        Ok(Self { paths })
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }
}

impl ActivityStorage for FileActivityStorage {
    async fn load_snapshot(&self) -> Option<ActivitySnapshot> {
        read_json(&self.paths.activity()).await
    }

    async fn save_snapshot(&self, snapshot: &ActivitySnapshot) -> Result<()> {
        let data = serde_json::to_vec(snapshot)?;
        write_atomic(&self.paths.activity(), &data).await?;
        debug!("Saved activity snapshot, work time {}", snapshot.work_time);
        Ok(())
    }

    async fn load_daily(&self) -> DailyActivityMap {
        let mut days: DailyActivityMap = read_json(&self.paths.daily()).await.unwrap_or_default();
        // The map key is the source of truth for which day a record belongs to.
        for (key, day) in days.iter_mut() {
            if day.date_key() != key {
                day.set_date_key(key.clone());
            }
        }
        days
    }

    async fn save_daily(&self, days: &DailyActivityMap) -> Result<()> {
        let data = serde_json::to_vec(days)?;
        write_atomic(&self.paths.daily(), &data).await?;
        debug!("Saved {} daily records", days.len());
        Ok(())
    }

    async fn load_config(&self) -> Config {
        load_config(&self.paths.config()).await
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        save_config(&self.paths.config(), config).await
    }

    async fn clear_all(&self) -> Result<()> {
        for path in [self.paths.activity(), self.paths.daily(), self.paths.config()] {
            if remove_if_exists(&path).await? {
                info!("Removed {path:?}");
            }
        }
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match read_locked(path).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failed to read {path:?}: {e}");
            return None;
        }
    };
    serde_json::from_slice(&bytes)
        .inspect_err(|e| {
            // Might happen after a crash during the very first write or after manual edits.
            warn!("Ignoring corrupted data in {path:?}: {e}")
        })
        .ok()
}
