use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Startup,
    ApMode,
    Connecting,
    FetchingData,
    Ready,
}

impl DeviceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "STARTUP",
            Self::ApMode => "AP_MODE",
            Self::Connecting => "CONNECTING",
            Self::FetchingData => "FETCHING_DATA",
            Self::Ready => "READY",
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock reading in some zone. A failed read degrades to `MIDNIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl TimeOfDay {
    pub const MIDNIGHT: Self = Self {
        hour: 0,
        minute: 0,
        second: 0,
    };

    pub fn new(hour: u8, minute: u8, second: u8) -> Self {
        Self {
            hour: hour.min(23),
            minute: minute.min(59),
            second: second.min(59),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Next,
    Select,
    Hold,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub state: &'static str,
    #[serde(rename = "inMenu")]
    pub in_menu: bool,
    #[serde(rename = "selectedCount")]
    pub selected_count: usize,
    #[serde(rename = "selectionCap")]
    pub selection_cap: usize,
    #[serde(rename = "linkLost")]
    pub link_lost: bool,
    #[serde(rename = "homeZone")]
    pub home_zone: String,
}
