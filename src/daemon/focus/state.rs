use std::fmt::Display;

use serde::Serialize;

use crate::daemon::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Active,
    Warning,
    Paused,
    Idle,
}

impl AppState {
    /// States in which input counts towards the focus session.
    pub fn is_working(&self) -> bool {
        matches!(self, AppState::Active | AppState::Warning)
    }
}

impl Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppState::Active => write!(f, "active"),
            AppState::Warning => write!(f, "warning"),
            AppState::Paused => write!(f, "paused"),
            AppState::Idle => write!(f, "idle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransitionCause {
    /// Screen is off, but not for long enough to count as rest.
    ScreenOff,
    /// Screen has been off for at least the rest reset duration.
    ScreenOffRest,
    /// Woke up after sleeping for at least the rest reset duration.
    LongSleep,
    /// No input for at least the rest reset duration.
    DeepIdle,
    /// Input after a rest.
    InputResumed,
    /// Input after a short pause.
    PauseResumed,
    /// Idle time between the active threshold and the rest reset duration.
    InputPaused,
    LimitReached,
    /// Focus duration was raised above the current work time.
    LimitRaised,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangeEvent {
    pub old_state: AppState,
    pub new_state: AppState,
    pub cause: TransitionCause,
}

/// What a status bar shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub minutes: u32,
    pub state: AppState,
}

pub const WARNING_TITLE: &str = "Time for a break";

/// Sent once per continuous warning episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningNotice {
    /// Minutes of continuous focus, never less than the configured focus duration.
    pub minutes: u32,
    pub message: String,
    /// The host should also show a full screen reminder.
    pub full_screen: bool,
}

impl WarningNotice {
    pub fn new(work_time: u32, config: &Config) -> Self {
        let minutes = (work_time / 60).max(config.focus_duration_sec / 60);
        Self {
            minutes,
            message: format!("You have been focused for {minutes} minutes, get up and move around."),
            full_screen: config.full_screen_notification,
        }
    }
}

/// How urgently the current data should reach the disk. Ordered by urgency.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PersistRequest {
    #[default]
    None,
    /// Queue a write, don't wait for it.
    Periodic,
    /// Queue a write and wait until it is done.
    Flush,
}

/// Everything a single tick or power event produced.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickOutcome {
    pub transitions: Vec<StateChangeEvent>,
    pub data_mutated: bool,
    pub persist: PersistRequest,
    pub warning: Option<WarningNotice>,
}

impl TickOutcome {
    pub fn request(&mut self, persist: PersistRequest) {
        self.persist = self.persist.max(persist);
    }
}
