use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimezoneEntry {
    pub label: &'static str,
    pub zone: &'static str,
    pub abbreviation: &'static str,
}

impl TimezoneEntry {
    /// Name shown next to the abbreviation in the menu: the last path segment
    /// of long zone identifiers, cut to twelve characters.
    pub fn short_name(&self) -> String {
        const MAX: usize = 12;

        if self.zone.chars().count() <= MAX {
            return self.zone.to_string();
        }

        let tail = self.zone.rsplit('/').next().unwrap_or(self.zone);
        if tail.chars().count() <= MAX {
            return tail.to_string();
        }

        let mut cut: String = tail.chars().take(MAX - 3).collect();
        cut.push_str("...");
        cut
    }
}

pub const CATALOG: [TimezoneEntry; 10] = [
    TimezoneEntry {
        label: "New York",
        zone: "America/New_York",
        abbreviation: "NYC",
    },
    TimezoneEntry {
        label: "London",
        zone: "Europe/London",
        abbreviation: "LON",
    },
    TimezoneEntry {
        label: "Tokyo",
        zone: "Asia/Tokyo",
        abbreviation: "TYO",
    },
    TimezoneEntry {
        label: "Sydney",
        zone: "Australia/Sydney",
        abbreviation: "SYD",
    },
    TimezoneEntry {
        label: "Dubai",
        zone: "Asia/Dubai",
        abbreviation: "DXB",
    },
    TimezoneEntry {
        label: "Los Angeles",
        zone: "America/Los_Angeles",
        abbreviation: "LAX",
    },
    TimezoneEntry {
        label: "Paris",
        zone: "Europe/Paris",
        abbreviation: "PAR",
    },
    TimezoneEntry {
        label: "Singapore",
        zone: "Asia/Singapore",
        abbreviation: "SIN",
    },
    TimezoneEntry {
        label: "Sao Paulo",
        zone: "America/Sao_Paulo",
        abbreviation: "GRU",
    },
    TimezoneEntry {
        label: "Moscow",
        zone: "Europe/Moscow",
        abbreviation: "MOW",
    },
];

pub const CATALOG_LEN: usize = CATALOG.len();

pub fn entry(index: usize) -> Option<&'static TimezoneEntry> {
    CATALOG.get(index)
}
