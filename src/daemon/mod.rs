use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use collection::ticker::FocusTicker;
use focus::{
    state::StatusUpdate,
    tracker::{FocusTracker, TrackerCommand, TrackerEvent},
};
use notify::{DesktopNotifier, LogNotifier, NotificationSink};
use processing::{
    debounce::{ConfigDebouncer, CONFIG_SETTLE_TIME},
    local_save::LocalSaver,
    PersistenceHandle, PersistenceModule,
};
use storage::activity_storage::{ActivityStorage, FileActivityStorage};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    input_api::{
        platform_screen_monitor,
        power::{
            ChannelPowerEvents, CombinedPowerEvents, PowerEvent, PowerEventSource,
            ScreenPowerEvents, SuspendDetector,
        },
        GenericInputMonitor, InputMonitor, ScreenStateMonitor,
    },
    utils::{
        clock::{Clock, DefaultClock},
        dir::AppPaths,
    },
};

pub mod args;
pub mod collection;
pub mod config;
pub mod focus;
pub mod notify;
pub mod processing;
pub mod shutdown;
pub mod storage;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
const CHANNEL_BUFFER: usize = 16;

/// Ways to talk to a daemon running in the same process, for example from an embedded UI.
pub struct DaemonPorts {
    pub commands: mpsc::Sender<TrackerCommand>,
    pub power_events: mpsc::Sender<PowerEvent>,
    pub status: watch::Receiver<StatusUpdate>,
    pub events: broadcast::Receiver<TrackerEvent>,
    pub shutdown: CancellationToken,
}

/// All modules of a daemon, ready to run.
pub struct Daemon<S: ActivityStorage> {
    ticker: FocusTicker,
    persistence: PersistenceModule<LocalSaver<S>>,
    debouncer: ConfigDebouncer,
    shutdown: CancellationToken,
}

impl<S: ActivityStorage> Daemon<S> {
    /// Runs until shutdown. Every module finishes its work before this returns: the tick loop
    /// flushes, and the persistence queue drains.
    pub async fn run(self) -> Result<()> {
        let (_, ticker_result, persistence_result, debounce_result) = tokio::join!(
            shutdown::detect_shutdown(self.shutdown),
            self.ticker.run(),
            self.persistence.run(),
            self.debouncer.run(),
        );

        if let Err(ticker_result) = ticker_result {
            error!("Tick loop got an error {:?}", ticker_result);
        }

        if let Err(persistence_result) = persistence_result {
            error!("Persistence module got an error {:?}", persistence_result);
        }

        if let Err(debounce_result) = debounce_result {
            error!("Config debouncer got an error {:?}", debounce_result);
        }

        info!("Daemon stopped");
        Ok(())
    }
}

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf, desktop_notifications: bool) -> Result<()> {
    // A relative directory would point somewhere else after the change below.
    let dir = std::path::absolute(dir)?;
    std::env::set_current_dir("/")?;

    let storage = FileActivityStorage::new(AppPaths::new(dir))?;
    let monitor = GenericInputMonitor::new()?;
    let screen = platform_screen_monitor()
        .inspect_err(|e| warn!("Screen state is not available {e:?}"))
        .ok()
        .flatten();
    let notifier: Box<dyn NotificationSink> = if desktop_notifications {
        Box::new(DesktopNotifier::new(env!("CARGO_PKG_NAME")))
    } else {
        Box::new(LogNotifier)
    };

    let (daemon, _ports) =
        build_daemon(storage, Box::new(monitor), screen, notifier, DefaultClock).await;
    daemon.run().await
}

/// Loads persisted state and connects all modules.
pub async fn build_daemon<S: ActivityStorage>(
    storage: S,
    monitor: Box<dyn InputMonitor>,
    screen: Option<Box<dyn ScreenStateMonitor>>,
    notifier: Box<dyn NotificationSink>,
    clock: impl Clock + Clone,
) -> (Daemon<S>, DaemonPorts) {
    let shutdown = CancellationToken::new();
    let (persistence_handle, jobs) = PersistenceHandle::channel();

    let tracker = FocusTracker::load(&storage, persistence_handle.clone(), notifier, clock.time()).await;
    info!(
        "Loaded focus state {:?} with config {:?}",
        tracker.status(),
        tracker.config().current()
    );

    let debouncer = ConfigDebouncer::new(
        tracker.config().subscribe(),
        persistence_handle,
        CONFIG_SETTLE_TIME,
        shutdown.clone(),
    );

    let (power_sender, host_events) = ChannelPowerEvents::channel(CHANNEL_BUFFER);
    let mut power_sources: Vec<Box<dyn PowerEventSource>> = vec![
        Box::new(host_events),
        Box::new(SuspendDetector::new(Box::new(clock.clone()))),
    ];
    if let Some(screen) = screen {
        power_sources.push(Box::new(ScreenPowerEvents::new(
            screen,
            Box::new(clock.clone()),
        )));
    }
    let power_events = CombinedPowerEvents::new(power_sources);
    let (command_sender, commands) = mpsc::channel(CHANNEL_BUFFER);

    let ports = DaemonPorts {
        commands: command_sender,
        power_events: power_sender,
        status: tracker.subscribe_status(),
        events: tracker.subscribe_events(),
        shutdown: shutdown.clone(),
    };

    let ticker = FocusTicker::new(
        tracker,
        monitor,
        Box::new(power_events),
        commands,
        shutdown.clone(),
        DEFAULT_TICK_INTERVAL,
        Box::new(clock),
    );

    let daemon = Daemon {
        ticker,
        persistence: PersistenceModule::new(jobs, LocalSaver::new(storage)),
        debouncer,
        shutdown,
    };
    (daemon, ports)
}
