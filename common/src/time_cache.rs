use crate::{
    catalog::CATALOG_LEN,
    clock::{ClockError, ZoneClock},
    config::ClockConfig,
    types::TimeOfDay,
};

/// Slot 0 holds the home zone, slot `i + 1` holds catalog entry `i`.
pub const HOME_SLOT: usize = 0;
pub const SLOT_COUNT: usize = CATALOG_LEN + 1;
/// Any index outside `0..SLOT_COUNT` reads straight through the cache.
pub const PASS_THROUGH: usize = usize::MAX;

pub fn slot_for_catalog(index: usize) -> usize {
    index + 1
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    time: TimeOfDay,
    last_update_ms: u64,
    valid: bool,
}

pub struct TimeCache<C> {
    clock: C,
    slots: [Slot; SLOT_COUNT],
    ttl_ms: u64,
    warmup_ms: u64,
    zone_settle_ms: u64,
    read_attempts: u8,
    retry_backoff_ms: u64,
    warmed_up: bool,
    home_seeded: bool,
    failed_reads: u64,
}

impl<C: ZoneClock> TimeCache<C> {
    pub fn new(clock: C, config: &ClockConfig) -> Self {
        Self {
            clock,
            slots: [Slot::default(); SLOT_COUNT],
            ttl_ms: config.cache_ttl_ms,
            warmup_ms: config.sync_warmup_ms,
            zone_settle_ms: config.zone_settle_ms,
            read_attempts: config.read_attempts.max(1),
            retry_backoff_ms: config.read_retry_backoff_ms,
            warmed_up: false,
            home_seeded: false,
            failed_reads: 0,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// An unreadable clock yields midnight.
    pub fn get(&mut self, zone: &str, slot: usize, now_ms: u64) -> TimeOfDay {
        if let Some(cached) = self.slots.get(slot) {
            if cached.valid && now_ms.saturating_sub(cached.last_update_ms) < self.ttl_ms {
                return cached.time;
            }
        }

        let time = self.read_zone(zone).unwrap_or_else(|_| {
            self.failed_reads = self.failed_reads.saturating_add(1);
            TimeOfDay::MIDNIGHT
        });

        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = Slot {
                time,
                last_update_ms: now_ms,
                valid: true,
            };
            if slot == HOME_SLOT {
                self.home_seeded = true;
            }
        }

        time
    }

    pub fn invalidate(&mut self, slot: usize) {
        if let Some(entry) = self.slots.get_mut(slot) {
            entry.valid = false;
        }
    }

    pub fn invalidate_all(&mut self) {
        for entry in self.slots.iter_mut() {
            entry.valid = false;
        }
    }

    pub fn home_seeded(&self) -> bool {
        self.home_seeded
    }

    pub fn failed_reads(&self) -> u64 {
        self.failed_reads
    }

    pub fn time_string(&mut self, zone: &str, now_ms: u64) -> String {
        let time = self.get(zone, PASS_THROUGH, now_ms);
        format!("{:02}:{:02}:{:02}", time.hour, time.minute, time.second)
    }

    fn read_zone(&mut self, zone: &str) -> Result<TimeOfDay, ClockError> {
        if !self.warmed_up {
            self.warmed_up = true;
            self.clock.settle(self.warmup_ms);
        }

        self.clock.set_active_zone(zone)?;
        self.clock.settle(self.zone_settle_ms);

        let mut last_err = ClockError::NotSynchronized;
        for _ in 0..self.read_attempts {
            match self.clock.read_local_time() {
                Ok(time) => return Ok(time),
                Err(ClockError::NotSynchronized) => {
                    last_err = ClockError::NotSynchronized;
                    self.clock.settle(self.retry_backoff_ms);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err)
    }
}

pub fn format_12_hour(hour: u8, minute: u8, second: u8, show_seconds: bool) -> String {
    let suffix = if hour >= 12 { "PM" } else { "AM" };
    let display_hour = match hour % 12 {
        0 => 12,
        h => h,
    };

    if show_seconds {
        format!("{display_hour}:{minute:02}:{second:02} {suffix}")
    } else {
        format!("{display_hour}:{minute:02} {suffix}")
    }
}
