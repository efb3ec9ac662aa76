//! Byte count formatting for the traffic readout
//!
//! Rates and burst totals share unit selection; a rate gets a `/s` suffix,
//! a total is wrapped in parentheses:
//!
//! | bytes `n`                     | shown as              |
//! |-------------------------------|-----------------------|
//! | `n > 10 MiB`                  | integer megabytes     |
//! | `1 MiB < n <= 10 MiB`         | one-decimal megabytes |
//! | `10 KiB < n <= 1 MiB`         | integer kilobytes     |
//! | `1 KiB < n <= 10 KiB`         | one-decimal kilobytes |
//! | `n <= 1 KiB`                  | integer bytes         |

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Rate (per second) or cumulative total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficUnit {
    Rate,
    Total,
}

/// Unit labels, overridable for localisation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitLabels {
    pub byte: String,
    pub kilobyte: String,
    pub megabyte: String,
    pub second: String,
}

impl Default for UnitLabels {
    fn default() -> Self {
        Self {
            byte: "B".to_string(),
            kilobyte: "KB".to_string(),
            megabyte: "MB".to_string(),
            second: "s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrafficFormatter {
    pub labels: UnitLabels,
    /// Break between number and unit to fit a narrow slot
    pub two_line: bool,
}

impl TrafficFormatter {
    pub fn new(labels: UnitLabels, two_line: bool) -> Self {
        Self { labels, two_line }
    }

    pub fn format(&self, bytes: u64, unit: TrafficUnit) -> String {
        let (number, label) = if bytes > 10 * MIB {
            ((bytes / MIB).to_string(), &self.labels.megabyte)
        } else if bytes > MIB {
            (format!("{:.1}", bytes as f32 / MIB as f32), &self.labels.megabyte)
        } else if bytes > 10 * KIB {
            ((bytes / KIB).to_string(), &self.labels.kilobyte)
        } else if bytes > KIB {
            (format!("{:.1}", bytes as f32 / KIB as f32), &self.labels.kilobyte)
        } else {
            (bytes.to_string(), &self.labels.byte)
        };

        let separator = if self.two_line { "\n" } else { "" };
        match unit {
            TrafficUnit::Rate => format!("{}{}{}/{}", number, separator, label, self.labels.second),
            TrafficUnit::Total => format!("({}{}{})", number, separator, label),
        }
    }

    pub fn rate(&self, bytes_per_sec: u64) -> String {
        self.format(bytes_per_sec, TrafficUnit::Rate)
    }

    pub fn total(&self, bytes: u64) -> String {
        self.format(bytes, TrafficUnit::Total)
    }
}
