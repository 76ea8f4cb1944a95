//! Screen and system power events. The focus tracker only depends on [PowerEventSource]; how the
//! events are produced is up to the host.

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta};
use futures::future::select_all;
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, error, info};

use super::ScreenStateMonitor;
use crate::utils::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEventKind {
    ScreenSleep,
    ScreenWake,
    SystemSleep,
    SystemWake,
    PowerOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerEvent {
    pub kind: PowerEventKind,
    /// When the event happened. For synthesized events this can be in the past.
    pub at: DateTime<Local>,
}

impl PowerEvent {
    pub fn new(kind: PowerEventKind, at: DateTime<Local>) -> Self {
        Self { kind, at }
    }
}

/// Source of edge-triggered power notifications.
///
/// `next_event` must be cancel safe: the tick loop polls it inside `select!` and drops the
/// future whenever a tick is due.
#[async_trait]
pub trait PowerEventSource: Send {
    /// Returns `None` once the source can't produce any more events.
    async fn next_event(&mut self) -> Option<PowerEvent>;
}

/// Events pushed by whoever embeds the daemon, for example a desktop shell integration.
pub struct ChannelPowerEvents {
    receiver: mpsc::Receiver<PowerEvent>,
}

impl ChannelPowerEvents {
    pub fn channel(buffer: usize) -> (mpsc::Sender<PowerEvent>, Self) {
        let (sender, receiver) = mpsc::channel(buffer);
        (sender, Self { receiver })
    }
}

#[async_trait]
impl PowerEventSource for ChannelPowerEvents {
    async fn next_event(&mut self) -> Option<PowerEvent> {
        self.receiver.recv().await
    }
}

/// Detects that the machine was suspended.
///
/// The monotonic clock stops while the system sleeps but the wall clock doesn't, so a large
/// difference between the two over one check period means the process was frozen. Such a gap is
/// reported as a system sleep at the last check followed by a wake now.
pub struct SuspendDetector {
    clock: Box<dyn Clock>,
    period: Duration,
    threshold: TimeDelta,
    last_check: Option<(DateTime<Local>, Instant)>,
    /// Kept across calls, the future of `next_event` is dropped on every tick.
    next_check: Option<Instant>,
    pending: VecDeque<PowerEvent>,
}

pub const DEFAULT_SUSPEND_CHECK_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_SUSPEND_THRESHOLD: TimeDelta = TimeDelta::seconds(30);

impl SuspendDetector {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self::with_settings(
            clock,
            DEFAULT_SUSPEND_CHECK_PERIOD,
            DEFAULT_SUSPEND_THRESHOLD,
        )
    }

    pub fn with_settings(clock: Box<dyn Clock>, period: Duration, threshold: TimeDelta) -> Self {
        Self {
            clock,
            period,
            threshold,
            last_check: None,
            next_check: None,
            pending: VecDeque::new(),
        }
    }

    fn check(&mut self) {
        let now = (self.clock.time(), self.clock.instant());
        let Some((last_time, last_instant)) = self.last_check.replace(now) else {
            return;
        };
        let wall = now.0.signed_duration_since(last_time);
        let Ok(monotonic) = TimeDelta::from_std(now.1.duration_since(last_instant)) else {
            return;
        };
        let frozen = wall - monotonic;
        debug!("Suspend check: wall {wall}, monotonic {monotonic}");
        if frozen >= self.threshold {
            info!("Detected suspend of {}s", frozen.num_seconds());
            self.pending
                .push_back(PowerEvent::new(PowerEventKind::SystemSleep, last_time));
            self.pending
                .push_back(PowerEvent::new(PowerEventKind::SystemWake, now.0));
        }
    }
}

#[async_trait]
impl PowerEventSource for SuspendDetector {
    async fn next_event(&mut self) -> Option<PowerEvent> {
        if self.last_check.is_none() {
            self.check();
        }
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let deadline = *self
                .next_check
                .get_or_insert_with(|| self.clock.instant() + self.period);
            self.clock.sleep_until(deadline).await;
            self.next_check = None;
            self.check();
        }
    }
}

/// Polls a [ScreenStateMonitor] and reports when the screen turns off or back on.
pub struct ScreenPowerEvents {
    monitor: Box<dyn ScreenStateMonitor>,
    clock: Box<dyn Clock>,
    period: Duration,
    screen_off: bool,
    next_check: Option<Instant>,
}

pub const DEFAULT_SCREEN_CHECK_PERIOD: Duration = Duration::from_secs(5);

impl ScreenPowerEvents {
    pub fn new(monitor: Box<dyn ScreenStateMonitor>, clock: Box<dyn Clock>) -> Self {
        Self::with_period(monitor, clock, DEFAULT_SCREEN_CHECK_PERIOD)
    }

    pub fn with_period(
        monitor: Box<dyn ScreenStateMonitor>,
        clock: Box<dyn Clock>,
        period: Duration,
    ) -> Self {
        Self {
            monitor,
            clock,
            period,
            screen_off: false,
            next_check: None,
        }
    }

    fn check(&mut self) -> Option<PowerEvent> {
        let screen_off = match self.monitor.is_screen_off() {
            Ok(screen_off) => screen_off,
            Err(e) => {
                error!("Failed to read screen state {e:?}");
                return None;
            }
        };
        if screen_off == self.screen_off {
            return None;
        }
        self.screen_off = screen_off;
        let kind = if screen_off {
            PowerEventKind::ScreenSleep
        } else {
            PowerEventKind::ScreenWake
        };
        info!("Screen state changed {kind:?}");
        Some(PowerEvent::new(kind, self.clock.time()))
    }
}

#[async_trait]
impl PowerEventSource for ScreenPowerEvents {
    async fn next_event(&mut self) -> Option<PowerEvent> {
        loop {
            let deadline = *self
                .next_check
                .get_or_insert_with(|| self.clock.instant() + self.period);
            self.clock.sleep_until(deadline).await;
            self.next_check = None;
            if let Some(event) = self.check() {
                return Some(event);
            }
        }
    }
}

/// Merges several sources into one. Exhausted sources are dropped, the combination is exhausted
/// once all of them are.
pub struct CombinedPowerEvents {
    sources: Vec<Box<dyn PowerEventSource>>,
}

impl CombinedPowerEvents {
    pub fn new(sources: Vec<Box<dyn PowerEventSource>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl PowerEventSource for CombinedPowerEvents {
    async fn next_event(&mut self) -> Option<PowerEvent> {
        loop {
            if self.sources.is_empty() {
                return None;
            }
            let (event, index, remaining) =
                select_all(self.sources.iter_mut().map(|source| source.next_event())).await;
            drop(remaining);
            match event {
                Some(event) => return Some(event),
                None => {
                    self.sources.remove(index);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;
    use chrono::{Local, TimeZone};

    use super::*;
    use crate::{input_api::MockScreenStateMonitor, utils::clock::TestClock};

    /// Wall clock that can be pushed forward without moving tokio's timer.
    #[derive(Clone)]
    struct JumpingClock {
        inner: TestClock,
        jump: Arc<Mutex<TimeDelta>>,
    }

    #[async_trait]
    impl Clock for JumpingClock {
        fn time(&self) -> DateTime<Local> {
            self.inner.time() + *self.jump.lock().unwrap()
        }

        fn instant(&self) -> Instant {
            self.inner.instant()
        }

        async fn sleep_until(&self, instant: Instant) {
            self.inner.sleep_until(instant).await
        }
    }

    fn start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 7, 4, 12, 0, 0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_detector_reports_sleep_and_wake() {
        let clock = JumpingClock {
            inner: TestClock::starting_at(start()),
            jump: Arc::new(Mutex::new(TimeDelta::zero())),
        };
        let jump = clock.jump.clone();
        let mut detector = SuspendDetector::new(Box::new(clock));

        let waiting = tokio::time::timeout(Duration::from_secs(20), detector.next_event()).await;
        assert!(waiting.is_err(), "no events without a gap");

        *jump.lock().unwrap() = TimeDelta::minutes(10);
        let sleep = detector.next_event().await.unwrap();
        let wake = detector.next_event().await.unwrap();

        assert_eq!(sleep.kind, PowerEventKind::SystemSleep);
        assert_eq!(wake.kind, PowerEventKind::SystemWake);
        assert!(wake.at - sleep.at >= TimeDelta::minutes(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_detector_is_cancel_safe() {
        let clock = JumpingClock {
            inner: TestClock::starting_at(start()),
            jump: Arc::new(Mutex::new(TimeDelta::zero())),
        };
        let jump = clock.jump.clone();
        let mut detector = SuspendDetector::new(Box::new(clock));
        let _ = tokio::time::timeout(Duration::from_secs(1), detector.next_event()).await;
        *jump.lock().unwrap() = TimeDelta::minutes(10);

        // Polled the way the tick loop does it: dropped after a second, every second.
        let mut received = None;
        for _ in 0..10 {
            if let Ok(event) =
                tokio::time::timeout(Duration::from_secs(1), detector.next_event()).await
            {
                received = event;
                break;
            }
        }
        assert_eq!(received.map(|e| e.kind), Some(PowerEventKind::SystemSleep));
    }

    #[tokio::test(start_paused = true)]
    async fn test_screen_events_follow_monitor() {
        let mut readings = vec![
            Ok(false),
            Err(anyhow!("connection lost")),
            Ok(true),
            Ok(true),
            Ok(false),
        ]
        .into_iter();
        let mut monitor = MockScreenStateMonitor::new();
        monitor
            .expect_is_screen_off()
            .times(5)
            .returning(move || readings.next().unwrap_or(Ok(false)));
        let mut screen = ScreenPowerEvents::new(
            Box::new(monitor),
            Box::new(TestClock::starting_at(start())),
        );

        let sleep = screen.next_event().await.unwrap();
        assert_eq!(sleep.kind, PowerEventKind::ScreenSleep);
        assert_eq!(sleep.at, start() + TimeDelta::seconds(15));

        // Dropped halfway the way the tick loop does it, the check still happens on time.
        let dropped = tokio::time::timeout(Duration::from_secs(3), screen.next_event()).await;
        assert!(dropped.is_err());
        let wake = screen.next_event().await.unwrap();
        assert_eq!(wake.kind, PowerEventKind::ScreenWake);
        assert_eq!(wake.at, start() + TimeDelta::seconds(25));
    }

    #[tokio::test]
    async fn test_combined_sources() {
        let (first_sender, first) = ChannelPowerEvents::channel(4);
        let (second_sender, second) = ChannelPowerEvents::channel(4);
        let mut combined = CombinedPowerEvents::new(vec![Box::new(first), Box::new(second)]);

        drop(first_sender);
        second_sender
            .send(PowerEvent::new(PowerEventKind::ScreenSleep, start()))
            .await
            .unwrap();

        assert_eq!(
            combined.next_event().await.map(|e| e.kind),
            Some(PowerEventKind::ScreenSleep)
        );
        drop(second_sender);
        assert_eq!(combined.next_event().await, None);
    }
}
