use std::ops::ControlFlow;

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{error, info};

use crate::{
    daemon::{
        config::{ConfigPatch, ConfigStore},
        notify::NotificationSink,
        processing::PersistenceHandle,
        storage::{
            activity_storage::{ActivityStorage, DailyActivityMap},
            daily_store::DailyAggregateStore,
            entities::{DailyActivityData, MINUTES_PER_HOUR},
        },
    },
    input_api::power::PowerEvent,
    utils::time::format_clock,
};

use super::{
    machine::{FocusStateMachine, TickInput},
    state::{AppState, PersistRequest, StateChangeEvent, StatusUpdate, TickOutcome, WarningNotice},
};

const EVENT_CAPACITY: usize = 64;

/// Requests coming from a user interface.
#[derive(Debug)]
pub enum TrackerCommand {
    SetConfig(ConfigPatch),
    /// Marks the first launch as done and saves the config right away.
    CompleteOnboarding,
    SelectDate(NaiveDate),
    /// Deletes every piece of persisted data and stops the daemon.
    ClearAllData,
    /// Writes everything and acknowledges once it is on disk.
    FlushAll(oneshot::Sender<()>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum TrackerEvent {
    StateChanged(StateChangeEvent),
    DataMutated,
    Warning(WarningNotice),
}

/// Everything a user interface shows.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusView<'a> {
    pub app_state: AppState,
    pub work_time_seconds: u32,
    pub minute_activity: &'a [u32],
    pub fatigue_heat: &'a [f64],
    pub daily_activities: &'a DailyActivityMap,
    pub selected_date: NaiveDate,
}

/// Owns all focus state of the daemon and routes the results of every tick to persistence,
/// notifications and subscribers. There is exactly one tracker per daemon and only the tick loop
/// touches it.
pub struct FocusTracker {
    machine: FocusStateMachine,
    days: DailyAggregateStore,
    config: ConfigStore,
    persistence: PersistenceHandle,
    notifier: Box<dyn NotificationSink>,
    status: watch::Sender<StatusUpdate>,
    events: broadcast::Sender<TrackerEvent>,
    selected_date: NaiveDate,
}

impl FocusTracker {
    pub fn new(
        machine: FocusStateMachine,
        mut days: DailyAggregateStore,
        config: ConfigStore,
        persistence: PersistenceHandle,
        notifier: Box<dyn NotificationSink>,
        now: DateTime<Local>,
    ) -> Self {
        days.get_or_create(machine.current_day());
        machine.sync_current_hour(&mut days);
        let (status, _) = watch::channel(machine.status());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            machine,
            days,
            config,
            persistence,
            notifier,
            status,
            events,
            selected_date: now.date_naive(),
        }
    }

    /// Restores the tracker from whatever was persisted.
    pub async fn load(
        storage: &impl ActivityStorage,
        persistence: PersistenceHandle,
        notifier: Box<dyn NotificationSink>,
        now: DateTime<Local>,
    ) -> Self {
        let config = ConfigStore::new(storage.load_config().await);
        let days = DailyAggregateStore::load(storage).await;
        let machine = match storage.load_snapshot().await {
            Some(snapshot) => FocusStateMachine::restore(snapshot, now),
            None => {
                info!("No activity snapshot, starting fresh");
                FocusStateMachine::new(now)
            }
        };
        Self::new(machine, days, config, persistence, notifier, now)
    }

    pub async fn tick(&mut self, idle_seconds: f64, now: DateTime<Local>) {
        let config = self.config.current();
        let outcome = self
            .machine
            .tick(TickInput { idle_seconds, now }, &config, &mut self.days);
        self.apply_outcome(outcome, now).await;
    }

    pub async fn handle_power_event(&mut self, event: PowerEvent) {
        info!("Power event {:?}", event.kind);
        let config = self.config.current();
        let outcome = self
            .machine
            .handle_power_event(&event, &config, &mut self.days);
        self.apply_outcome(outcome, event.at).await;
    }

    /// Applies a command. Breaks when the daemon should stop.
    pub async fn handle_command(
        &mut self,
        command: TrackerCommand,
        now: DateTime<Local>,
    ) -> ControlFlow<()> {
        match command {
            TrackerCommand::SetConfig(patch) => {
                if self.config.apply(patch) {
                    info!("Config updated");
                }
            }
            TrackerCommand::CompleteOnboarding => {
                self.config.apply(ConfigPatch {
                    is_first_launch: Some(false),
                    ..Default::default()
                });
                self.persistence.schedule_config(self.config.current());
                info!("Onboarding completed");
            }
            TrackerCommand::SelectDate(date) => self.selected_date = date,
            TrackerCommand::ClearAllData => {
                self.clear_all(now).await;
                return ControlFlow::Break(());
            }
            TrackerCommand::FlushAll(ack) => {
                self.flush_all(now).await;
                let _ = ack.send(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Writes the snapshot and every daily record and waits until they are on disk.
    pub async fn flush_all(&mut self, now: DateTime<Local>) {
        self.machine.sync_current_hour(&mut self.days);
        match self
            .persistence
            .flush(self.machine.snapshot(), self.days.snapshot())
            .await
        {
            Ok(_) => info!("All data saved"),
            Err(e) => error!("Failed to save all data {e:?}"),
        }
        self.machine.mark_saved(now);
    }

    pub fn view(&self) -> FocusView<'_> {
        FocusView {
            app_state: self.machine.state(),
            work_time_seconds: self.machine.work_time(),
            minute_activity: self.machine.ledger().minute_activity(),
            fatigue_heat: self.machine.ledger().fatigue_heat(),
            daily_activities: self.days.days(),
            selected_date: self.selected_date,
        }
    }

    pub fn status(&self) -> StatusUpdate {
        self.machine.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusUpdate> {
        self.status.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn machine(&self) -> &FocusStateMachine {
        &self.machine
    }

    pub fn days(&self) -> &DailyAggregateStore {
        &self.days
    }

    /// Minute activity of an hour of the current day. The hour in progress is served live.
    pub fn minute_history_for(&self, hour: u32) -> Vec<u32> {
        if hour == self.machine.current_hour() {
            return self.machine.ledger().minute_activity().to_vec();
        }
        self.days
            .get(self.machine.current_day())
            .and_then(|day| day.minute_history_for(hour))
            .map_or_else(|| vec![0; MINUTES_PER_HOUR], <[u32]>::to_vec)
    }

    /// First hour of the current day that has a minute history. Falls back to the hour in
    /// progress when no hour has finished yet.
    pub fn earliest_recorded_hour(&self) -> u32 {
        self.days
            .get(self.machine.current_day())
            .and_then(DailyActivityData::earliest_recorded_hour)
            .unwrap_or(self.machine.current_hour())
    }

    pub fn daily_data_for(&self, date: NaiveDate) -> Option<&DailyActivityData> {
        self.days.get_for_date(date)
    }

    /// Work time of the current session as `MM:SS`.
    pub fn formatted_time(&self) -> String {
        format_clock(self.machine.work_time())
    }

    async fn apply_outcome(&mut self, outcome: TickOutcome, now: DateTime<Local>) {
        let TickOutcome {
            transitions,
            data_mutated,
            persist,
            warning,
        } = outcome;

        // Sending fails only when nobody listens.
        for transition in transitions {
            let _ = self.events.send(TrackerEvent::StateChanged(transition));
        }
        if data_mutated {
            let _ = self.events.send(TrackerEvent::DataMutated);
        }
        if let Some(notice) = warning {
            self.notifier.dispatch_warning(&notice);
            let _ = self.events.send(TrackerEvent::Warning(notice));
        }

        match persist {
            PersistRequest::None => {}
            PersistRequest::Periodic => {
                self.machine.sync_current_hour(&mut self.days);
                self.persistence.schedule_snapshot(self.machine.snapshot());
                self.persistence.schedule_daily(self.days.snapshot());
            }
            PersistRequest::Flush => self.flush_all(now).await,
        }

        self.status.send_replace(self.machine.status());
    }

    async fn clear_all(&mut self, now: DateTime<Local>) {
        info!("Clearing all data");
        if let Some(transition) = self.machine.reset(now) {
            let _ = self.events.send(TrackerEvent::StateChanged(transition));
        }
        self.days.clear();
        self.days.get_or_create(self.machine.current_day());
        self.selected_date = now.date_naive();

        self.persistence.clear_all();
        if let Err(e) = self.persistence.wait_idle().await {
            error!("Failed to wait for data removal {e:?}");
        }

        let _ = self.events.send(TrackerEvent::DataMutated);
        self.status.send_replace(self.machine.status());
    }
}
