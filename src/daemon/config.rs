//! User tunable parameters. The config is always replaced as a whole value: the tick loop reads
//! the latest value each second and the persistence layer writes it out after it settles.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{
    daemon::storage::entities::lenient,
    fs::operations::{read_locked, write_atomic},
};

pub const DEFAULT_FOCUS_DURATION_SEC: u32 = 60 * 60;
pub const DEFAULT_ACTIVE_THRESHOLD_SEC: u32 = 5;
pub const DEFAULT_REST_RESET_SEC: u32 = 180;
pub const DEFAULT_THEME_COLOR: &str = "FF8A3D";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ConfigRecord")]
pub struct Config {
    /// Continuous work after which the user is warned.
    pub focus_duration_sec: u32,
    /// Idle time below which the user counts as working.
    pub active_threshold_sec: u32,
    /// Idle time after which the user counts as resting and the focus session ends.
    pub rest_reset_sec: u32,
    pub theme_color: String,
    pub user_name: String,
    pub launch_at_login: bool,
    pub is_first_launch: bool,
    /// Ask the notification sink for a full screen reminder in addition to a notification.
    pub full_screen_notification: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            focus_duration_sec: DEFAULT_FOCUS_DURATION_SEC,
            active_threshold_sec: DEFAULT_ACTIVE_THRESHOLD_SEC,
            rest_reset_sec: DEFAULT_REST_RESET_SEC,
            theme_color: DEFAULT_THEME_COLOR.into(),
            user_name: String::new(),
            launch_at_login: false,
            is_first_launch: true,
            full_screen_notification: false,
        }
    }
}

impl Config {
    /// Durations of zero would make every comparison in the state machine degenerate.
    pub fn sanitized(mut self) -> Self {
        self.focus_duration_sec = self.focus_duration_sec.max(1);
        self.active_threshold_sec = self.active_threshold_sec.max(1);
        self.rest_reset_sec = self.rest_reset_sec.max(1);
        self
    }

    pub fn apply(&self, patch: ConfigPatch) -> Config {
        let ConfigPatch {
            focus_duration_sec,
            active_threshold_sec,
            rest_reset_sec,
            theme_color,
            user_name,
            launch_at_login,
            is_first_launch,
            full_screen_notification,
        } = patch;
        let current = self.clone();
        Config {
            focus_duration_sec: focus_duration_sec.unwrap_or(current.focus_duration_sec),
            active_threshold_sec: active_threshold_sec.unwrap_or(current.active_threshold_sec),
            rest_reset_sec: rest_reset_sec.unwrap_or(current.rest_reset_sec),
            theme_color: theme_color.unwrap_or(current.theme_color),
            user_name: user_name.unwrap_or(current.user_name),
            launch_at_login: launch_at_login.unwrap_or(current.launch_at_login),
            is_first_launch: is_first_launch.unwrap_or(current.is_first_launch),
            full_screen_notification: full_screen_notification
                .unwrap_or(current.full_screen_notification),
        }
        .sanitized()
    }
}

/// Partial config update. Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub focus_duration_sec: Option<u32>,
    pub active_threshold_sec: Option<u32>,
    pub rest_reset_sec: Option<u32>,
    pub theme_color: Option<String>,
    pub user_name: Option<String>,
    pub launch_at_login: Option<bool>,
    pub is_first_launch: Option<bool>,
    pub full_screen_notification: Option<bool>,
}

/// On-disk shape of [Config]. Every field is optional so that files written by older versions,
/// or edited by hand, still decode.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConfigRecord {
    #[serde(deserialize_with = "lenient::deserialize")]
    focus_duration_sec: Option<u32>,
    #[serde(deserialize_with = "lenient::deserialize")]
    active_threshold_sec: Option<u32>,
    #[serde(deserialize_with = "lenient::deserialize")]
    rest_reset_sec: Option<u32>,
    #[serde(deserialize_with = "lenient::deserialize")]
    theme_color: Option<String>,
    #[serde(deserialize_with = "lenient::deserialize")]
    user_name: Option<String>,
    #[serde(deserialize_with = "lenient::deserialize")]
    launch_at_login: Option<bool>,
    #[serde(deserialize_with = "lenient::deserialize")]
    is_first_launch: Option<bool>,
    #[serde(deserialize_with = "lenient::deserialize")]
    full_screen_notification: Option<bool>,
}

impl From<ConfigRecord> for Config {
    fn from(record: ConfigRecord) -> Self {
        Config::default().apply(ConfigPatch {
            focus_duration_sec: record.focus_duration_sec,
            active_threshold_sec: record.active_threshold_sec,
            rest_reset_sec: record.rest_reset_sec,
            theme_color: record.theme_color,
            user_name: record.user_name,
            launch_at_login: record.launch_at_login,
            is_first_launch: record.is_first_launch,
            full_screen_notification: record.full_screen_notification,
        })
    }
}

/// Reads the config file. Anything unreadable results in defaults, which also means the
/// application treats itself as launched for the first time.
pub async fn load_config(path: &Path) -> Config {
    match read_locked(path).await {
        Ok(Some(bytes)) => match serde_json::from_slice::<Config>(&bytes) {
            Ok(config) => config,
            Err(e) => {
                warn!("Config file {path:?} is not valid json, using defaults: {e}");
                Config::default()
            }
        },
        Ok(None) => {
            debug!("No config at {path:?}");
            Config::default()
        }
        Err(e) => {
            warn!("Failed to read config {path:?}, using defaults: {e}");
            Config::default()
        }
    }
}

pub async fn save_config(path: &Path, config: &Config) -> Result<()> {
    let data = serde_json::to_vec_pretty(config)?;
    write_atomic(path, &data).await?;
    Ok(())
}

/// Owner of the current config. Writers replace the whole value, readers get the latest one
/// without any locking on their side.
pub struct ConfigStore {
    sender: watch::Sender<Config>,
}

impl ConfigStore {
    pub fn new(config: Config) -> Self {
        let (sender, _) = watch::channel(config.sanitized());
        Self { sender }
    }

    pub fn current(&self) -> Config {
        self.sender.borrow().clone()
    }

    /// Replaces the config. Returns whether anything changed; subscribers are only notified in
    /// that case.
    pub fn replace(&self, config: Config) -> bool {
        let config = config.sanitized();
        self.sender.send_if_modified(|current| {
            if *current == config {
                false
            } else {
                *current = config;
                true
            }
        })
    }

    pub fn apply(&self, patch: ConfigPatch) -> bool {
        let next = self.sender.borrow().apply(patch);
        self.replace(next)
    }

    pub fn subscribe(&self) -> watch::Receiver<Config> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() -> Result<()> {
        let config: Config = serde_json::from_str(r#"{"userName": "Ann"}"#)?;
        assert_eq!(
            config,
            Config {
                user_name: "Ann".into(),
                ..Config::default()
            }
        );
        Ok(())
    }

    #[test]
    fn test_mistyped_and_unknown_fields_are_tolerated() -> Result<()> {
        let config: Config = serde_json::from_str(
            r#"{"focusDurationSec": "a lot", "restResetSec": 600, "workHours": [1, 2]}"#,
        )?;
        assert_eq!(config.focus_duration_sec, DEFAULT_FOCUS_DURATION_SEC);
        assert_eq!(config.rest_reset_sec, 600);
        Ok(())
    }

    #[test]
    fn test_non_positive_durations_are_clamped() -> Result<()> {
        let config: Config = serde_json::from_str(r#"{"activeThresholdSec": 0}"#)?;
        assert_eq!(config.active_threshold_sec, 1);

        let patched = Config::default().apply(ConfigPatch {
            focus_duration_sec: Some(0),
            ..Default::default()
        });
        assert_eq!(patched.focus_duration_sec, 1);
        Ok(())
    }

    #[test]
    fn test_serialized_field_names() -> Result<()> {
        let value = serde_json::to_value(Config::default())?;
        assert_eq!(value["focusDurationSec"], 3600);
        assert_eq!(value["activeThresholdSec"], 5);
        assert_eq!(value["restResetSec"], 180);
        assert_eq!(value["isFirstLaunch"], true);
        Ok(())
    }

    #[test]
    fn test_store_notifies_only_on_change() {
        let store = ConfigStore::new(Config::default());
        let mut receiver = store.subscribe();

        assert!(!store.replace(Config::default()));
        assert!(!receiver.has_changed().unwrap());

        assert!(store.apply(ConfigPatch {
            rest_reset_sec: Some(300),
            ..Default::default()
        }));
        assert!(receiver.has_changed().unwrap());
        assert_eq!(receiver.borrow_and_update().rest_reset_sec, 300);
        assert_eq!(store.current().rest_reset_sec, 300);
    }

    #[tokio::test]
    async fn test_load_and_save() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");

        assert_eq!(load_config(&path).await, Config::default());

        let config = Config {
            is_first_launch: false,
            focus_duration_sec: 45 * 60,
            ..Config::default()
        };
        save_config(&path, &config).await?;
        assert_eq!(load_config(&path).await, config);

        std::fs::write(&path, "{ not json")?;
        assert_eq!(load_config(&path).await, Config::default());
        Ok(())
    }
}
