use std::cmp::Ordering;

use chrono::{DateTime, Local, TimeDelta, Timelike, Utc};
use tracing::{debug, info, warn};

use crate::{
    daemon::{
        config::Config,
        storage::{daily_store::DailyAggregateStore, entities::ActivitySnapshot},
    },
    input_api::power::{PowerEvent, PowerEventKind},
    utils::time::{date_to_key, format_duration, key_to_date, seconds_between},
};

use super::{
    ledger::ActivityLedger,
    state::{
        AppState, PersistRequest, StateChangeEvent, StatusUpdate, TickOutcome, TransitionCause,
        WarningNotice,
    },
};

/// Mutated data is written at least this often, in seconds.
pub const PERIODIC_SAVE_SEC: u32 = 5 * 60;

/// A single sample of the input monitor.
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    /// Seconds since the last keyboard or mouse event.
    pub idle_seconds: f64,
    pub now: DateTime<Local>,
}

/// Converts idle time samples into focus and rest periods.
///
/// The machine owns the data of the hour in progress and writes finished hours and sessions into
/// the [DailyAggregateStore] it is given. It never performs any IO: everything the outside world
/// should know about is returned as a [TickOutcome].
#[derive(Debug, Clone)]
pub struct FocusStateMachine {
    state: AppState,
    /// Seconds of work in the current focus session.
    work_time: u32,
    ledger: ActivityLedger,
    last_tick_hour: u32,
    last_tick_day: String,
    screen_off_since: Option<DateTime<Local>>,
    rest_start_time: Option<DateTime<Local>>,
    warning_dispatched: bool,
    last_save: DateTime<Local>,
}

impl FocusStateMachine {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            state: AppState::Active,
            work_time: 0,
            ledger: ActivityLedger::default(),
            last_tick_hour: now.hour(),
            last_tick_day: date_to_key(now.date_naive()),
            screen_off_since: None,
            rest_start_time: None,
            warning_dispatched: false,
            last_save: now,
        }
    }

    /// Continues from a persisted snapshot. If the snapshot belongs to an earlier hour, the first
    /// tick moves its data into the daily aggregates.
    pub fn restore(snapshot: ActivitySnapshot, now: DateTime<Local>) -> Self {
        let mut machine = Self::new(now);
        machine.ledger =
            ActivityLedger::from_parts(&snapshot.minute_activity, &snapshot.fatigue_heat);
        machine.work_time = snapshot.work_time;
        if let Some(hour) = snapshot.last_tick_hour {
            machine.last_tick_hour = hour;
        }
        if let Some(day) = snapshot.last_tick_day.filter(|d| key_to_date(d).is_some()) {
            machine.last_tick_day = day;
        }
        debug!(
            "Restored work time {} for {} hour {}",
            machine.work_time, machine.last_tick_day, machine.last_tick_hour
        );
        machine
    }

    pub fn snapshot(&self) -> ActivitySnapshot {
        ActivitySnapshot {
            minute_activity: self.ledger.minute_activity().to_vec(),
            work_time: self.work_time,
            last_tick_hour: Some(self.last_tick_hour),
            fatigue_heat: self.ledger.fatigue_heat().to_vec(),
            last_tick_day: Some(self.last_tick_day.clone()),
        }
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn work_time(&self) -> u32 {
        self.work_time
    }

    pub fn ledger(&self) -> &ActivityLedger {
        &self.ledger
    }

    /// Day key of the hour the ledger belongs to.
    pub fn current_day(&self) -> &str {
        &self.last_tick_day
    }

    pub fn current_hour(&self) -> u32 {
        self.last_tick_hour
    }

    pub fn rest_start_time(&self) -> Option<DateTime<Local>> {
        self.rest_start_time
    }

    pub fn is_screen_off(&self) -> bool {
        self.screen_off_since.is_some()
    }

    pub fn status(&self) -> StatusUpdate {
        StatusUpdate {
            minutes: self.work_time / 60,
            state: self.state,
        }
    }

    pub fn tick(
        &mut self,
        input: TickInput,
        config: &Config,
        days: &mut DailyAggregateStore,
    ) -> TickOutcome {
        let TickInput { idle_seconds, now } = input;
        let mut outcome = TickOutcome::default();

        self.roll_over(now, days, &mut outcome);

        if let Some(off_since) = self.screen_off_since {
            if seconds_between(&off_since, &now) >= config.rest_reset_sec {
                if self.state != AppState::Idle {
                    self.close_focus(
                        now,
                        off_since,
                        days,
                        TransitionCause::ScreenOffRest,
                        &mut outcome,
                    );
                }
            } else if self.state.is_working() {
                self.transition(AppState::Paused, TransitionCause::ScreenOff, &mut outcome);
            }
        } else if idle_seconds >= config.rest_reset_sec as f64 {
            if self.state != AppState::Idle {
                let idle_for = TimeDelta::milliseconds((idle_seconds * 1000.) as i64);
                let rest_start = now.checked_sub_signed(idle_for).unwrap_or(now);
                self.close_focus(
                    now,
                    rest_start,
                    days,
                    TransitionCause::DeepIdle,
                    &mut outcome,
                );
            }
        } else if idle_seconds < config.active_threshold_sec as f64 {
            self.on_input(now, config, days, &mut outcome);
        } else if self.state.is_working() {
            self.transition(AppState::Paused, TransitionCause::InputPaused, &mut outcome);
        }

        self.sync_current_hour(days);

        if outcome.data_mutated && seconds_between(&self.last_save, &now) >= PERIODIC_SAVE_SEC {
            outcome.request(PersistRequest::Periodic);
        }
        if outcome.persist > PersistRequest::None {
            self.last_save = now;
        }
        outcome
    }

    pub fn handle_power_event(
        &mut self,
        event: &PowerEvent,
        config: &Config,
        days: &mut DailyAggregateStore,
    ) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        self.roll_over(event.at, days, &mut outcome);

        match event.kind {
            PowerEventKind::ScreenSleep | PowerEventKind::SystemSleep => {
                // The screen usually goes dark before the system sleeps, the rest started then.
                self.screen_off_since.get_or_insert(event.at);
                outcome.request(PersistRequest::Flush);
            }
            PowerEventKind::ScreenWake | PowerEventKind::SystemWake => {
                if let Some(off_since) = self.screen_off_since.take() {
                    let slept = seconds_between(&off_since, &event.at);
                    info!("Screen was off for {}", format_duration(slept));
                    if slept >= config.rest_reset_sec && self.state != AppState::Idle {
                        self.close_focus(
                            event.at,
                            off_since,
                            days,
                            TransitionCause::LongSleep,
                            &mut outcome,
                        );
                    }
                }
            }
            PowerEventKind::PowerOff => outcome.request(PersistRequest::Flush),
        }

        self.sync_current_hour(days);
        if outcome.persist > PersistRequest::None {
            self.last_save = event.at;
        }
        outcome
    }

    /// Writes the live total of the hour in progress into its daily record.
    pub fn sync_current_hour(&self, days: &mut DailyAggregateStore) {
        let total = self.ledger.total_seconds();
        if total > 0 {
            days.update_hour(&self.last_tick_day, self.last_tick_hour, total);
        }
    }

    /// Drops all live data and starts over as active. Screen state is kept since it reflects the
    /// hardware. Returns the state change, if there was one.
    pub fn reset(&mut self, now: DateTime<Local>) -> Option<StateChangeEvent> {
        let old_state = self.state;
        let screen_off_since = self.screen_off_since;
        *self = Self::new(now);
        self.screen_off_since = screen_off_since;
        (old_state != self.state).then_some(StateChangeEvent {
            old_state,
            new_state: self.state,
            cause: TransitionCause::Reset,
        })
    }

    pub fn mark_saved(&mut self, now: DateTime<Local>) {
        self.last_save = now;
    }

    fn roll_over(
        &mut self,
        now: DateTime<Local>,
        days: &mut DailyAggregateStore,
        outcome: &mut TickOutcome,
    ) {
        let hour = now.hour();
        let day = date_to_key(now.date_naive());
        // Day keys sort chronologically.
        match (day.as_str(), hour).cmp(&(self.last_tick_day.as_str(), self.last_tick_hour)) {
            Ordering::Equal => return,
            Ordering::Less => {
                // Events can be stamped before the last tick, and the clock can be moved back.
                // The hour in progress keeps collecting until time passes it again.
                debug!("Ignoring {day} hour {hour}, already tracking a later hour");
                return;
            }
            Ordering::Greater => {}
        }

        let total = self.ledger.total_seconds();
        if total > 0 {
            days.update_hour(&self.last_tick_day, self.last_tick_hour, total);
            days.set_minute_history(
                &self.last_tick_day,
                self.last_tick_hour,
                self.ledger.minute_activity(),
            );
        }
        debug!(
            "Hour {} of {} finished with {}",
            self.last_tick_hour,
            self.last_tick_day,
            format_duration(total)
        );

        self.ledger.reset();
        days.get_or_create(&day);
        self.last_tick_hour = hour;
        self.last_tick_day = day;
        outcome.data_mutated = true;
    }

    fn on_input(
        &mut self,
        now: DateTime<Local>,
        config: &Config,
        days: &mut DailyAggregateStore,
        outcome: &mut TickOutcome,
    ) {
        match self.state {
            AppState::Idle => {
                if let Some(start) = self.rest_start_time.take() {
                    // A long sleep or shutdown is not all rest.
                    let duration = seconds_between(&start, &now).min(config.rest_reset_sec);
                    days.record_rest_session(
                        &self.last_tick_day,
                        start.with_timezone(&Utc),
                        duration,
                    );
                    info!("Rest session of {} closed", format_duration(duration));
                    outcome.data_mutated = true;
                    outcome.request(PersistRequest::Flush);
                }
                self.transition(AppState::Active, TransitionCause::InputResumed, outcome);
            }
            AppState::Paused => {
                let next = if self.work_time >= config.focus_duration_sec {
                    AppState::Warning
                } else {
                    AppState::Active
                };
                self.transition(next, TransitionCause::PauseResumed, outcome);
            }
            AppState::Active | AppState::Warning => {}
        }

        let minute = now.minute();
        self.work_time = self.work_time.saturating_add(1);
        self.ledger.record_second(minute);
        outcome.data_mutated = true;

        let limit = config.focus_duration_sec;
        if self.work_time >= limit {
            if self.state != AppState::Warning {
                warn!("Focus limit of {} reached", format_duration(limit));
                self.transition(AppState::Warning, TransitionCause::LimitReached, outcome);
            }
            let overrun = self.work_time - limit;
            let severity = (overrun as f64 / limit as f64).min(1.);
            self.ledger.raise_fatigue(minute, severity);

            if !self.warning_dispatched {
                self.warning_dispatched = true;
                outcome.warning = Some(WarningNotice::new(self.work_time, config));
            }
        } else {
            self.warning_dispatched = false;
            if self.state == AppState::Warning {
                self.transition(AppState::Active, TransitionCause::LimitRaised, outcome);
            }
        }
    }

    fn close_focus(
        &mut self,
        now: DateTime<Local>,
        rest_start: DateTime<Local>,
        days: &mut DailyAggregateStore,
        cause: TransitionCause,
        outcome: &mut TickOutcome,
    ) {
        let start = now - TimeDelta::seconds(self.work_time.into());
        days.record_focus_session(
            &self.last_tick_day,
            start.with_timezone(&Utc),
            self.work_time,
        );
        info!("Focus session of {} closed", format_duration(self.work_time));

        self.rest_start_time = Some(rest_start);
        self.transition(AppState::Idle, cause, outcome);
        self.work_time = 0;
        self.warning_dispatched = false;
        outcome.data_mutated = true;
        outcome.request(PersistRequest::Flush);
    }

    fn transition(&mut self, new_state: AppState, cause: TransitionCause, outcome: &mut TickOutcome) {
        if self.state == new_state {
            return;
        }
        info!("State changed from {} to {new_state} ({cause:?})", self.state);
        outcome.transitions.push(StateChangeEvent {
            old_state: self.state,
            new_state,
            cause,
        });
        self.state = new_state;
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use crate::daemon::storage::entities::{Session, SessionKind};

    use super::*;

    const DAY: &str = "2024-05-01";

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 5, 1, hour, minute, second)
            .unwrap()
    }

    fn config_with_focus(focus_duration_sec: u32) -> Config {
        Config {
            focus_duration_sec,
            ..Config::default()
        }
    }

    fn tick_at(idle_seconds: f64, now: DateTime<Local>) -> TickInput {
        TickInput { idle_seconds, now }
    }

    /// Ticks once per second for `count` seconds after `start` with the same idle time.
    fn run(
        machine: &mut FocusStateMachine,
        days: &mut DailyAggregateStore,
        config: &Config,
        start: DateTime<Local>,
        count: i64,
        idle_seconds: f64,
    ) -> Vec<TickOutcome> {
        (1..=count)
            .map(|i| {
                machine.tick(
                    tick_at(idle_seconds, start + TimeDelta::seconds(i)),
                    config,
                    days,
                )
            })
            .collect()
    }

    fn sessions(days: &DailyAggregateStore) -> Vec<Session> {
        days.get(DAY).unwrap().sessions().to_vec()
    }

    #[test]
    fn test_warning_after_focus_limit() {
        let config = config_with_focus(60);
        let mut days = DailyAggregateStore::default();
        let mut machine = FocusStateMachine::new(at(10, 0, 0));

        let outcomes = run(&mut machine, &mut days, &config, at(10, 0, 0), 61, 0.);

        assert_eq!(machine.state(), AppState::Warning);
        assert_eq!(machine.work_time(), 61);
        let warnings: Vec<_> = outcomes.iter().filter_map(|o| o.warning.clone()).collect();
        assert_eq!(
            warnings,
            vec![WarningNotice::new(60, &config)],
            "warning is dispatched once per episode"
        );
        assert_eq!(warnings[0].minutes, 1);

        let reached = outcomes.iter().flat_map(|o| &o.transitions).collect::<Vec<_>>();
        assert_eq!(
            reached,
            vec![&StateChangeEvent {
                old_state: AppState::Active,
                new_state: AppState::Warning,
                cause: TransitionCause::LimitReached
            }]
        );

        // 10:00:01..10:00:59 in minute 0, 10:01:00 and 10:01:01 in minute 1.
        assert_eq!(machine.ledger().minute_activity()[0], 59);
        assert_eq!(machine.ledger().minute_activity()[1], 2);
        assert_eq!(machine.ledger().fatigue_heat()[0], 0.);
        assert!((machine.ledger().fatigue_heat()[1] - 1. / 60.).abs() < 1e-9);
        assert_eq!(days.get(DAY).unwrap().hourly()[10], 61);
    }

    #[test]
    fn test_deep_idle_closes_focus_session() {
        let config = Config::default();
        let mut days = DailyAggregateStore::default();
        let mut machine = FocusStateMachine::new(at(10, 0, 0));
        run(&mut machine, &mut days, &config, at(10, 0, 0), 45, 0.);

        let now = at(10, 5, 0);
        let outcome = machine.tick(tick_at(200., now), &config, &mut days);

        assert_eq!(machine.state(), AppState::Idle);
        assert_eq!(machine.work_time(), 0);
        assert_eq!(machine.rest_start_time(), Some(now - TimeDelta::seconds(200)));
        assert_eq!(outcome.persist, PersistRequest::Flush);
        assert_eq!(outcome.transitions[0].cause, TransitionCause::DeepIdle);
        assert_eq!(
            sessions(&days),
            vec![Session {
                start_time: (now - TimeDelta::seconds(45)).with_timezone(&Utc),
                duration_sec: 45,
                kind: SessionKind::Focus,
            }]
        );

        // Staying idle changes nothing.
        let outcome = machine.tick(tick_at(201., now + TimeDelta::seconds(1)), &config, &mut days);
        assert_eq!(outcome.persist, PersistRequest::None);
        assert_eq!(sessions(&days).len(), 1);
    }

    #[test]
    fn test_input_after_rest_closes_rest_session() {
        let config = Config::default();
        let mut days = DailyAggregateStore::default();
        let mut machine = FocusStateMachine::new(at(10, 0, 0));
        machine.tick(tick_at(200., at(10, 0, 1)), &config, &mut days);
        let rest_start = at(10, 0, 1) - TimeDelta::seconds(200);

        let outcome = machine.tick(tick_at(2., at(10, 20, 0)), &config, &mut days);

        assert_eq!(machine.state(), AppState::Active);
        assert_eq!(machine.rest_start_time(), None);
        assert_eq!(outcome.persist, PersistRequest::Flush);
        assert_eq!(outcome.transitions[0].cause, TransitionCause::InputResumed);
        // The resuming tick already counts as work.
        assert_eq!(machine.work_time(), 1);

        let rest = sessions(&days).pop().unwrap();
        assert_eq!(rest.kind, SessionKind::Rest);
        assert_eq!(rest.start_time, rest_start.with_timezone(&Utc));
        assert_eq!(rest.duration_sec, config.rest_reset_sec, "rest is capped");
        let day = days.get(DAY).unwrap();
        assert_eq!(day.rest_session_count(), 1);
        assert_eq!(day.total_rest_seconds(), 180);
    }

    #[test]
    fn test_short_idle_pauses() {
        let config = config_with_focus(10);
        let mut days = DailyAggregateStore::default();
        let mut machine = FocusStateMachine::new(at(10, 0, 0));
        run(&mut machine, &mut days, &config, at(10, 0, 0), 5, 0.);

        let outcome = machine.tick(tick_at(30., at(10, 0, 6)), &config, &mut days);
        assert_eq!(machine.state(), AppState::Paused);
        assert_eq!(outcome.transitions[0].cause, TransitionCause::InputPaused);
        assert_eq!(machine.work_time(), 5);

        machine.tick(tick_at(0., at(10, 0, 7)), &config, &mut days);
        assert_eq!(machine.state(), AppState::Active);
        assert_eq!(machine.work_time(), 6);

        run(&mut machine, &mut days, &config, at(10, 0, 7), 5, 0.);
        assert_eq!(machine.state(), AppState::Warning);
        machine.tick(tick_at(30., at(10, 0, 13)), &config, &mut days);
        assert_eq!(machine.state(), AppState::Paused);

        // Resuming past the limit goes straight back to warning without a second notice.
        let outcome = machine.tick(tick_at(0., at(10, 0, 14)), &config, &mut days);
        assert_eq!(machine.state(), AppState::Warning);
        assert_eq!(outcome.transitions[0].cause, TransitionCause::PauseResumed);
        assert_eq!(outcome.warning, None);
    }

    #[test]
    fn test_raising_limit_leaves_warning() {
        let mut config = config_with_focus(60);
        let mut days = DailyAggregateStore::default();
        let mut machine = FocusStateMachine::new(at(10, 0, 0));
        run(&mut machine, &mut days, &config, at(10, 0, 0), 61, 0.);

        config.focus_duration_sec = 120;
        let outcome = machine.tick(tick_at(0., at(10, 1, 2)), &config, &mut days);
        assert_eq!(machine.state(), AppState::Active);
        assert_eq!(outcome.transitions[0].cause, TransitionCause::LimitRaised);

        let outcomes = run(&mut machine, &mut days, &config, at(10, 1, 2), 58, 0.);
        assert_eq!(machine.work_time(), 120);
        assert_eq!(
            outcomes.iter().filter(|o| o.warning.is_some()).count(),
            1,
            "a new episode warns again"
        );
    }

    #[test]
    fn test_hour_rollover_moves_minutes_into_history() {
        let config = Config::default();
        let mut days = DailyAggregateStore::default();
        let mut snapshot = ActivitySnapshot {
            last_tick_hour: Some(10),
            last_tick_day: Some(DAY.into()),
            ..Default::default()
        };
        snapshot.minute_activity[3] = 40;
        snapshot.minute_activity[59] = 2;
        snapshot.fatigue_heat[59] = 0.5;
        let previous_minutes = snapshot.minute_activity.clone();
        let mut machine = FocusStateMachine::restore(snapshot, at(11, 0, 0));

        let outcome = machine.tick(tick_at(30., at(11, 0, 5)), &config, &mut days);

        assert!(outcome.data_mutated);
        let day = days.get(DAY).unwrap();
        assert_eq!(day.hourly()[10], 42);
        assert_eq!(day.minute_history_for(10), Some(previous_minutes.as_slice()));
        assert_eq!(day.total_active_seconds(), 42);
        assert_eq!(machine.ledger().minute_activity(), &[0; 60]);
        assert_eq!(machine.ledger().fatigue_heat(), &[0.; 60]);
        assert_eq!(machine.current_hour(), 11);
    }

    #[test]
    fn test_midnight_flushes_into_previous_day() {
        let config = Config::default();
        let mut days = DailyAggregateStore::default();
        let mut machine = FocusStateMachine::new(at(23, 59, 0));
        run(&mut machine, &mut days, &config, at(23, 59, 0), 30, 0.);

        let after_midnight = Local.with_ymd_and_hms(2024, 5, 2, 0, 0, 1).unwrap();
        machine.tick(tick_at(0., after_midnight), &config, &mut days);

        assert_eq!(days.get(DAY).unwrap().hourly()[23], 30);
        let next_day = days.get("2024-05-02").unwrap();
        assert_eq!(next_day.hourly()[0], 1);
        assert_eq!(next_day.hourly()[23], 0);
        assert_eq!(machine.current_day(), "2024-05-02");
    }

    #[test]
    fn test_screen_off_pauses_then_rests() {
        let config = Config::default();
        let mut days = DailyAggregateStore::default();
        let mut machine = FocusStateMachine::new(at(10, 0, 0));
        run(&mut machine, &mut days, &config, at(10, 0, 0), 100, 0.);

        let off_at = at(10, 2, 0);
        let outcome = machine.handle_power_event(
            &PowerEvent::new(PowerEventKind::ScreenSleep, off_at),
            &config,
            &mut days,
        );
        assert_eq!(outcome.persist, PersistRequest::Flush);
        assert!(machine.is_screen_off());

        // Input readings are ignored while the screen is off.
        machine.tick(tick_at(0., at(10, 2, 10)), &config, &mut days);
        assert_eq!(machine.state(), AppState::Paused);
        assert_eq!(machine.work_time(), 100);

        let outcome = machine.tick(tick_at(0., at(10, 5, 0)), &config, &mut days);
        assert_eq!(machine.state(), AppState::Idle);
        assert_eq!(outcome.transitions[0].cause, TransitionCause::ScreenOffRest);
        assert_eq!(machine.rest_start_time(), Some(off_at));
        assert_eq!(sessions(&days)[0].duration_sec, 100);

        machine.handle_power_event(
            &PowerEvent::new(PowerEventKind::ScreenWake, at(10, 6, 0)),
            &config,
            &mut days,
        );
        assert!(!machine.is_screen_off());
        assert_eq!(sessions(&days).len(), 1, "already idle, nothing to close");
    }

    #[test]
    fn test_long_sleep_closes_focus_on_wake() {
        let config = Config::default();
        let mut days = DailyAggregateStore::default();
        let mut machine = FocusStateMachine::new(at(10, 0, 0));
        run(&mut machine, &mut days, &config, at(10, 0, 0), 20, 0.);

        machine.handle_power_event(
            &PowerEvent::new(PowerEventKind::SystemSleep, at(10, 1, 0)),
            &config,
            &mut days,
        );
        let outcome = machine.handle_power_event(
            &PowerEvent::new(PowerEventKind::SystemWake, at(10, 40, 0)),
            &config,
            &mut days,
        );

        assert_eq!(outcome.persist, PersistRequest::Flush);
        assert_eq!(outcome.transitions[0].cause, TransitionCause::LongSleep);
        assert_eq!(machine.state(), AppState::Idle);
        assert_eq!(machine.rest_start_time(), Some(at(10, 1, 0)));
        assert_eq!(sessions(&days)[0].duration_sec, 20);

        // A short sleep keeps the session going.
        let mut machine = FocusStateMachine::new(at(10, 0, 0));
        machine.handle_power_event(
            &PowerEvent::new(PowerEventKind::ScreenSleep, at(10, 1, 0)),
            &config,
            &mut days,
        );
        let outcome = machine.handle_power_event(
            &PowerEvent::new(PowerEventKind::ScreenWake, at(10, 2, 0)),
            &config,
            &mut days,
        );
        assert!(outcome.transitions.is_empty());
        assert_eq!(machine.state(), AppState::Active);
    }

    #[test]
    fn test_backwards_clock_gives_empty_rest() {
        let config = Config::default();
        let mut days = DailyAggregateStore::default();
        let mut machine = FocusStateMachine::new(at(10, 0, 0));
        machine.tick(tick_at(200., at(10, 30, 0)), &config, &mut days);

        // Clock moved back before the rest started.
        machine.tick(tick_at(0., at(10, 10, 0)), &config, &mut days);
        let rest = sessions(&days).pop().unwrap();
        assert_eq!(rest.kind, SessionKind::Rest);
        assert_eq!(rest.duration_sec, 0);
    }

    #[test]
    fn test_periodic_save_cadence() {
        let config = Config::default();
        let mut days = DailyAggregateStore::default();
        let mut machine = FocusStateMachine::new(at(10, 0, 0));

        let outcomes = run(&mut machine, &mut days, &config, at(10, 0, 0), 601, 0.);
        let saves: Vec<_> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| o.persist == PersistRequest::Periodic)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(saves, vec![300, 600]);
    }

    #[test]
    fn test_snapshot_restore_and_reset() {
        let config = Config::default();
        let mut days = DailyAggregateStore::default();
        let mut machine = FocusStateMachine::new(at(10, 0, 0));
        run(&mut machine, &mut days, &config, at(10, 0, 0), 90, 0.);

        let snapshot = machine.snapshot();
        assert_eq!(snapshot.work_time, 90);
        assert_eq!(snapshot.last_tick_hour, Some(10));
        assert_eq!(snapshot.last_tick_day.as_deref(), Some(DAY));

        let restored = FocusStateMachine::restore(snapshot.clone(), at(10, 2, 0));
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(
            restored.status(),
            StatusUpdate {
                minutes: 1,
                state: AppState::Active
            }
        );

        assert_eq!(machine.reset(at(10, 3, 0)), None);
        assert_eq!(machine.work_time(), 0);
        assert_eq!(machine.ledger(), &ActivityLedger::default());

        machine.tick(tick_at(200., at(10, 4, 0)), &config, &mut days);
        assert_eq!(
            machine.reset(at(10, 5, 0)),
            Some(StateChangeEvent {
                old_state: AppState::Idle,
                new_state: AppState::Active,
                cause: TransitionCause::Reset,
            })
        );
        assert_eq!(machine.rest_start_time(), None);
    }

    #[test]
    fn test_late_power_event_keeps_current_hour() {
        let config = Config::default();
        let mut days = DailyAggregateStore::default();
        let mut machine = FocusStateMachine::new(at(10, 59, 50));
        run(&mut machine, &mut days, &config, at(10, 59, 50), 5, 0.);
        run(&mut machine, &mut days, &config, at(10, 59, 59), 5, 0.);
        let before = days.get(DAY).unwrap().hourly()[11];
        assert_eq!(before, 5);

        // The suspend detector stamps the sleep with its last check, before the last tick.
        machine.handle_power_event(
            &PowerEvent::new(PowerEventKind::SystemSleep, at(10, 59, 55)),
            &config,
            &mut days,
        );
        assert_eq!(machine.current_hour(), 11);
        machine.handle_power_event(
            &PowerEvent::new(PowerEventKind::SystemWake, at(11, 0, 5)),
            &config,
            &mut days,
        );
        machine.tick(tick_at(0., at(11, 0, 6)), &config, &mut days);

        let day = days.get(DAY).unwrap();
        assert_eq!(day.hourly()[11], before + 1);
        assert_eq!(day.hourly()[10], 5);
        assert_eq!(day.minute_history_for(11), None);
        assert_eq!(machine.state(), AppState::Active);
    }

    #[test]
    fn test_backwards_clock_keeps_later_hour() {
        let config = Config::default();
        let mut days = DailyAggregateStore::default();
        let mut machine = FocusStateMachine::new(at(11, 0, 0));
        run(&mut machine, &mut days, &config, at(11, 0, 0), 10, 0.);

        machine.tick(tick_at(0., at(10, 30, 0)), &config, &mut days);
        assert_eq!(machine.current_hour(), 11);
        assert_eq!(machine.ledger().total_seconds(), 11);
        assert_eq!(days.get(DAY).unwrap().hourly()[11], 11);
        assert_eq!(days.get(DAY).unwrap().hourly()[10], 0);
    }
}
