use crate::daemon::storage::entities::{MAX_SECONDS_PER_MINUTE, MINUTES_PER_HOUR};

/// Minute resolution data of the hour in progress: seconds of activity and fatigue heat.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityLedger {
    minute_activity: [u32; MINUTES_PER_HOUR],
    fatigue_heat: [f64; MINUTES_PER_HOUR],
}

impl Default for ActivityLedger {
    fn default() -> Self {
        Self {
            minute_activity: [0; MINUTES_PER_HOUR],
            fatigue_heat: [0.; MINUTES_PER_HOUR],
        }
    }
}

impl ActivityLedger {
    /// Builds a ledger from persisted arrays. Arrays of the wrong length are ignored.
    pub fn from_parts(minute_activity: &[u32], fatigue_heat: &[f64]) -> Self {
        let mut ledger = Self::default();
        if let Ok(minutes) = <[u32; MINUTES_PER_HOUR]>::try_from(minute_activity) {
            ledger.minute_activity = minutes.map(|v| v.min(MAX_SECONDS_PER_MINUTE));
        }
        if let Ok(heat) = <[f64; MINUTES_PER_HOUR]>::try_from(fatigue_heat) {
            ledger.fatigue_heat = heat.map(|v| if v.is_finite() { v.clamp(0., 1.) } else { 0. });
        }
        ledger
    }

    pub fn minute_activity(&self) -> &[u32] {
        &self.minute_activity
    }

    pub fn fatigue_heat(&self) -> &[f64] {
        &self.fatigue_heat
    }

    /// Adds a second of activity to `minute`, a full minute stays at 60.
    pub fn record_second(&mut self, minute: u32) {
        if let Some(slot) = self.minute_activity.get_mut(minute as usize) {
            *slot = (*slot + 1).min(MAX_SECONDS_PER_MINUTE);
        }
    }

    /// Raises the heat of `minute` to `severity`. Heat never goes down within an hour, so a
    /// lower severity is ignored.
    pub fn raise_fatigue(&mut self, minute: u32, severity: f64) {
        if let Some(slot) = self.fatigue_heat.get_mut(minute as usize) {
            *slot = slot.max(severity.clamp(0., 1.));
        }
    }

    pub fn total_seconds(&self) -> u32 {
        self.minute_activity.iter().sum()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
