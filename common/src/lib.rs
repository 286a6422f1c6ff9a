pub mod buttons;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod device;
pub mod menu;
pub mod screen;
pub mod selection;
pub mod sequence;
pub mod store;
pub mod time_cache;
pub mod types;

pub use buttons::ButtonPanel;
pub use catalog::{TimezoneEntry, CATALOG, CATALOG_LEN};
pub use clock::{ClockError, SystemZoneClock, ZoneClock};
pub use config::{ClockConfig, ConfigError, HomeZone, PortalConfig, RuntimeConfig};
pub use connectivity::{ConnectError, ConnectivityMachine, LinkAction, Transition};
pub use device::{DeskClock, MenuEvent};
pub use screen::{Renderer, Screen};
pub use selection::{SelectionStore, ToggleOutcome, SELECTION_CAP};
pub use store::{KeyValueStore, MemoryStore, StoreError, RUNTIME_KEY, SELECTION_KEY};
pub use time_cache::TimeCache;
pub use types::{ButtonEvent, DeviceState, DeviceStatus, TimeOfDay};
