use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("runtime config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub connect_timeout_ms: u64,
    pub cache_ttl_ms: u64,
    pub sync_warmup_ms: u64,
    pub zone_settle_ms: u64,
    pub read_attempts: u8,
    pub read_retry_backoff_ms: u64,
    pub boot_char_ms: u64,
    pub boot_hold_ms: u64,
    pub progress_tick_ms: u64,
    pub progress_stage_hold_ms: u64,
    pub message_hold_ms: u64,
    pub failure_message_hold_ms: u64,
    pub clock_refresh_ms: u64,
    pub long_press_ms: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 15_000,
            cache_ttl_ms: 1_000,
            sync_warmup_ms: 2_000,
            zone_settle_ms: 100,
            read_attempts: 3,
            read_retry_backoff_ms: 500,
            boot_char_ms: 100,
            boot_hold_ms: 800,
            progress_tick_ms: 15,
            progress_stage_hold_ms: 300,
            message_hold_ms: 1_000,
            failure_message_hold_ms: 2_000,
            clock_refresh_ms: 1_000,
            long_press_ms: 800,
        }
    }
}

impl ClockConfig {
    pub fn sanitize(&mut self) {
        self.connect_timeout_ms = self.connect_timeout_ms.clamp(1_000, 120_000);
        self.cache_ttl_ms = self.cache_ttl_ms.clamp(100, 60_000);
        self.sync_warmup_ms = self.sync_warmup_ms.min(30_000);
        self.zone_settle_ms = self.zone_settle_ms.min(1_000);
        self.read_attempts = self.read_attempts.clamp(1, 10);
        self.read_retry_backoff_ms = self.read_retry_backoff_ms.min(5_000);
        self.clock_refresh_ms = self.clock_refresh_ms.clamp(100, 60_000);
        self.long_press_ms = self.long_press_ms.clamp(200, 5_000);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeZone {
    pub label: String,
    pub zone: String,
    pub abbreviation: String,
}

impl Default for HomeZone {
    fn default() -> Self {
        Self {
            label: "Kolkata".to_string(),
            zone: "Asia/Kolkata".to_string(),
            abbreviation: "IST".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub ap_ssid: String,
    pub ap_password: String,
    pub http_port: u16,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            ap_ssid: "ESPClock".to_string(),
            ap_password: "espclock".to_string(),
            http_port: 80,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub home: HomeZone,
    #[serde(default)]
    pub portal: PortalConfig,
}

impl RuntimeConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_slice(raw)?;
        config.sanitize();
        Ok(config)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ConfigError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn sanitize(&mut self) {
        self.clock.sanitize();

        if self.home.zone.parse::<Tz>().is_err() {
            self.home = HomeZone::default();
        }

        let defaults = PortalConfig::default();
        let ssid = self.portal.ap_ssid.trim();
        if ssid.is_empty() || ssid.len() > 32 {
            self.portal.ap_ssid = defaults.ap_ssid;
        }
        // WPA2 requires 8..=63 characters.
        if !(8..=63).contains(&self.portal.ap_password.len()) {
            self.portal.ap_password = defaults.ap_password;
        }
        if self.portal.http_port == 0 {
            self.portal.http_port = defaults.http_port;
        }
    }
}
