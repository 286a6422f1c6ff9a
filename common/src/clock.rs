use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::types::TimeOfDay;

/// 2020-01-01T00:00:00Z. Anything earlier means SNTP has not set the clock yet.
const SYNCED_EPOCH_FLOOR: i64 = 1_577_836_800;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    #[error("system clock is not synchronized yet")]
    NotSynchronized,
    #[error("unknown timezone `{0}`")]
    UnknownZone(String),
}

/// Process-wide zone-aware clock. `set_active_zone` and `read_local_time`
/// must never interleave with another caller.
pub trait ZoneClock {
    fn set_active_zone(&mut self, zone: &str) -> Result<(), ClockError>;

    fn read_local_time(&mut self) -> Result<TimeOfDay, ClockError>;

    /// Blocks for `ms` to let the network time stack settle.
    fn settle(&mut self, ms: u64);
}

pub struct SystemZoneClock {
    active: Tz,
}

impl Default for SystemZoneClock {
    fn default() -> Self {
        Self { active: Tz::UTC }
    }
}

impl SystemZoneClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_synchronized() -> bool {
        Utc::now().timestamp() >= SYNCED_EPOCH_FLOOR
    }
}

impl ZoneClock for SystemZoneClock {
    fn set_active_zone(&mut self, zone: &str) -> Result<(), ClockError> {
        self.active = zone
            .parse::<Tz>()
            .map_err(|_| ClockError::UnknownZone(zone.to_string()))?;
        Ok(())
    }

    fn read_local_time(&mut self) -> Result<TimeOfDay, ClockError> {
        local_time_at(Utc::now(), self.active)
    }

    fn settle(&mut self, ms: u64) {
        if ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(ms));
        }
    }
}

pub fn local_time_at(now: DateTime<Utc>, zone: Tz) -> Result<TimeOfDay, ClockError> {
    if now.timestamp() < SYNCED_EPOCH_FLOOR {
        return Err(ClockError::NotSynchronized);
    }
    let local = now.with_timezone(&zone);
    Ok(TimeOfDay::new(
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    ))
}
