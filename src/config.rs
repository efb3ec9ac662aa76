//! Status bar preferences
//!
//! Preferences arrive either from `statusbar_config.json` at startup or as
//! `PreferenceChange` payloads on the signal bus. Both go through the same
//! per-key parser: a value that doesn't parse is logged and the previous
//! value is kept.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Preference keys understood by the controllers
pub mod keys {
    pub const DT_MODE: &str = "dt_mode";
    pub const DT_POSITION: &str = "dt_position";
    pub const DT_SIZE: &str = "dt_size";
    pub const DT_DISPLAY_MODE: &str = "dt_display_mode";
    pub const DT_ACTIVE_MOBILE_ONLY: &str = "dt_active_mobile_only";
    pub const DT_LOCKSCREEN: &str = "dt_lockscreen";
    pub const DT_INACTIVITY_MODE: &str = "dt_inactivity_mode";
    pub const DT_INTERVAL_MS: &str = "dt_interval_ms";
    pub const DT_TWO_LINE: &str = "dt_two_line";

    pub const SB_BRIGHTNESS: &str = "sb_brightness";
    pub const BRIGHTNESS_PADDING: &str = "brightness_padding";
    pub const BRIGHTNESS_MIN: &str = "brightness_min";
    pub const BRIGHTNESS_MAX: &str = "brightness_max";
    pub const BRIGHTNESS_LONG_PRESS_MS: &str = "brightness_long_press_ms";
    pub const BRIGHTNESS_LINGER_THRESHOLD: &str = "brightness_linger_threshold";
    pub const TOUCH_SLOP: &str = "touch_slop";
    pub const STATUS_BAR_HEIGHT: &str = "status_bar_height";
    pub const PEEK_HEIGHT: &str = "peek_height";
}

/// Which traffic meter implementation is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrafficMeterMode {
    #[default]
    Off,
    Simple,
    /// Accepted for compatibility, rendered by the simple meter
    Omni,
}

impl FromStr for TrafficMeterMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OFF" => Ok(TrafficMeterMode::Off),
            "SIMPLE" => Ok(TrafficMeterMode::Simple),
            "OMNI" => Ok(TrafficMeterMode::Omni),
            _ => Err(Error::invalid(keys::DT_MODE, s)),
        }
    }
}

/// Which extra signal gates the meter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeterMode {
    #[default]
    Always,
    DownloadGated,
    ProgressGated,
}

impl FromStr for MeterMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALWAYS" => Ok(MeterMode::Always),
            "DOWNLOAD_MANAGER" | "DOWNLOAD_GATED" => Ok(MeterMode::DownloadGated),
            "PROGRESS_TRACKING" | "PROGRESS_GATED" => Ok(MeterMode::ProgressGated),
            _ => Err(Error::invalid(keys::DT_DISPLAY_MODE, s)),
        }
    }
}

/// Where the meter sits in the status bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeterPosition {
    #[default]
    Auto,
    Left,
    Right,
    RightEdge,
}

impl FromStr for MeterPosition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "auto" => Ok(MeterPosition::Auto),
            "1" | "left" => Ok(MeterPosition::Left),
            "2" | "right" => Ok(MeterPosition::Right),
            "3" | "right_edge" => Ok(MeterPosition::RightEdge),
            _ => Err(Error::invalid(keys::DT_POSITION, s)),
        }
    }
}

/// What the meter does while there is no traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InactivityPolicy {
    #[default]
    ShowZero,
    HideImmediately,
    /// Hide, but first show the finished burst's total for the given time
    HideWithSummary(Duration),
}

impl InactivityPolicy {
    pub const SUMMARY_HOLD: Duration = Duration::from_millis(3000);

    pub fn hides_on_zero(&self) -> bool {
        !matches!(self, InactivityPolicy::ShowZero)
    }

    pub fn summary_duration(&self) -> Option<Duration> {
        match self {
            InactivityPolicy::HideWithSummary(d) => Some(*d),
            _ => None,
        }
    }
}

impl FromStr for InactivityPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "show_zero" | "default" => Ok(InactivityPolicy::ShowZero),
            "1" | "hidden" | "hide" => Ok(InactivityPolicy::HideImmediately),
            "2" | "summary" => Ok(InactivityPolicy::HideWithSummary(Self::SUMMARY_HOLD)),
            _ => Err(Error::invalid(keys::DT_INACTIVITY_MODE, s)),
        }
    }
}

/// A bag of named preference values, as sent by the settings side
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreferenceChange {
    values: Map<String, Value>,
}

impl PreferenceChange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn bool(&self, key: &str) -> Option<Result<bool>> {
        self.values.get(key).map(|value| match value {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) if n.as_i64() == Some(0) => Ok(false),
            Value::Number(n) if n.as_i64() == Some(1) => Ok(true),
            Value::String(s) => match s.trim() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(Error::invalid(key, s)),
            },
            other => Err(Error::invalid(key, other)),
        })
    }

    pub fn int(&self, key: &str) -> Option<Result<i64>> {
        self.values.get(key).map(|value| match value {
            Value::Number(n) => n.as_i64().ok_or_else(|| Error::invalid(key, n)),
            Value::String(s) => s.trim().parse().map_err(|_| Error::invalid(key, s)),
            other => Err(Error::invalid(key, other)),
        })
    }

    pub fn float(&self, key: &str) -> Option<Result<f64>> {
        self.values.get(key).map(|value| match value {
            Value::Number(n) => n.as_f64().ok_or_else(|| Error::invalid(key, n)),
            Value::String(s) => s.trim().parse().map_err(|_| Error::invalid(key, s)),
            other => Err(Error::invalid(key, other)),
        })
    }

    /// Parse an enum-like value given as a string or a bare number
    pub fn parsed<T>(&self, key: &str) -> Option<Result<T>>
    where
        T: FromStr<Err = Error>,
    {
        self.values.get(key).map(|value| match value {
            Value::String(s) => s.parse(),
            Value::Number(n) => n.to_string().parse(),
            other => Err(Error::invalid(key, other)),
        })
    }
}

/// Store a parsed value into `slot`, keeping the old value on error.
/// Returns true if the slot changed.
fn apply_field<T: PartialEq>(parsed: Option<Result<T>>, slot: &mut T) -> bool {
    match parsed {
        None => false,
        Some(Ok(value)) => {
            if *slot != value {
                *slot = value;
                true
            } else {
                false
            }
        }
        Some(Err(e)) => {
            tracing::warn!(error = %e, "ignoring preference value");
            false
        }
    }
}

fn checked<T>(parsed: Option<Result<T>>, key: &str, valid: impl Fn(&T) -> bool) -> Option<Result<T>>
where
    T: fmt::Debug,
{
    parsed.map(|r| r.and_then(|v| if valid(&v) { Ok(v) } else { Err(Error::invalid(key, format!("{:?}", v))) }))
}

/// Brightness levels must fit the `i32` the display and settings take
fn brightness_level(change: &PreferenceChange, key: &str) -> Option<Result<i32>> {
    change
        .int(key)
        .map(|r| r.and_then(|v| i32::try_from(v).map_err(|_| Error::invalid(key, v))))
}

/// Traffic meter preferences
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficPreferences {
    pub mode: TrafficMeterMode,
    pub position: MeterPosition,
    /// Text size in dp
    pub size: u32,
    pub display_mode: MeterMode,
    pub mobile_data_only: bool,
    pub allow_in_lockscreen: bool,
    pub inactivity: InactivityPolicy,
    /// Sampling period
    pub interval: Duration,
    /// Put the unit on its own line
    pub two_line: bool,
}

impl Default for TrafficPreferences {
    fn default() -> Self {
        Self {
            mode: TrafficMeterMode::Off,
            position: MeterPosition::Auto,
            size: 14,
            display_mode: MeterMode::Always,
            mobile_data_only: false,
            allow_in_lockscreen: true,
            inactivity: InactivityPolicy::ShowZero,
            interval: Duration::from_millis(1000),
            two_line: false,
        }
    }
}

/// Which traffic preferences a change touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficChanges {
    pub mode: bool,
    pub position: bool,
    pub size: bool,
    pub display_mode: bool,
    pub mobile_data_only: bool,
    pub allow_in_lockscreen: bool,
    pub inactivity: bool,
    pub interval: bool,
    pub two_line: bool,
}

impl TrafficChanges {
    pub fn any(&self) -> bool {
        self.mode
            || self.position
            || self.size
            || self.display_mode
            || self.mobile_data_only
            || self.allow_in_lockscreen
            || self.inactivity
            || self.interval
            || self.two_line
    }
}

impl TrafficPreferences {
    pub fn apply(&mut self, change: &PreferenceChange) -> TrafficChanges {
        let size = checked(change.int(keys::DT_SIZE), keys::DT_SIZE, |s| (1..=64).contains(s))
            .map(|r| r.map(|s| s as u32));
        let interval = checked(change.int(keys::DT_INTERVAL_MS), keys::DT_INTERVAL_MS, |ms| {
            (100..=60_000).contains(ms)
        })
        .map(|r| r.map(|ms| Duration::from_millis(ms as u64)));

        TrafficChanges {
            mode: apply_field(change.parsed(keys::DT_MODE), &mut self.mode),
            position: apply_field(change.parsed(keys::DT_POSITION), &mut self.position),
            size: apply_field(size, &mut self.size),
            display_mode: apply_field(change.parsed(keys::DT_DISPLAY_MODE), &mut self.display_mode),
            mobile_data_only: apply_field(
                change.bool(keys::DT_ACTIVE_MOBILE_ONLY),
                &mut self.mobile_data_only,
            ),
            allow_in_lockscreen: apply_field(
                change.bool(keys::DT_LOCKSCREEN),
                &mut self.allow_in_lockscreen,
            ),
            inactivity: apply_field(change.parsed(keys::DT_INACTIVITY_MODE), &mut self.inactivity),
            interval: apply_field(interval, &mut self.interval),
            two_line: apply_field(change.bool(keys::DT_TWO_LINE), &mut self.two_line),
        }
    }
}

/// Largest accepted number of sideways moves before a drag starts
pub const MAX_LINGER_THRESHOLD: i64 = 1000;

/// Brightness gesture preferences and tunables (pixels are raw screen pixels)
#[derive(Debug, Clone, PartialEq)]
pub struct BrightnessPreferences {
    pub enabled: bool,
    /// Dead band on each screen edge, fraction of width, `0 <= p < 0.5`
    pub padding: f32,
    pub min_brightness: i32,
    pub max_brightness: i32,
    pub long_press: Duration,
    pub linger_threshold: u32,
    pub touch_slop: f32,
    /// Height of the activation band
    pub status_bar_height: f32,
    /// Moving below this cancels the gesture
    pub peek_height: f32,
}

impl Default for BrightnessPreferences {
    fn default() -> Self {
        Self {
            enabled: false,
            padding: 0.2,
            min_brightness: 0,
            max_brightness: 255,
            long_press: Duration::from_millis(750),
            linger_threshold: 20,
            touch_slop: 8.0,
            status_bar_height: 24.0,
            peek_height: 84.0,
        }
    }
}

impl BrightnessPreferences {
    /// Returns true if anything changed
    pub fn apply(&mut self, change: &PreferenceChange) -> bool {
        let padding = checked(change.float(keys::BRIGHTNESS_PADDING), keys::BRIGHTNESS_PADDING, |p| {
            (0.0..0.5).contains(p)
        })
        .map(|r| r.map(|p| p as f32));
        let long_press = checked(
            change.int(keys::BRIGHTNESS_LONG_PRESS_MS),
            keys::BRIGHTNESS_LONG_PRESS_MS,
            |ms| *ms > 0,
        )
        .map(|r| r.map(|ms| Duration::from_millis(ms as u64)));
        let linger = checked(
            change.int(keys::BRIGHTNESS_LINGER_THRESHOLD),
            keys::BRIGHTNESS_LINGER_THRESHOLD,
            |n| (0..=MAX_LINGER_THRESHOLD).contains(n),
        )
        .map(|r| {
            r.and_then(|n| {
                u32::try_from(n).map_err(|_| Error::invalid(keys::BRIGHTNESS_LINGER_THRESHOLD, n))
            })
        });
        let positive = |v: &f64| *v > 0.0;
        let slop = checked(change.float(keys::TOUCH_SLOP), keys::TOUCH_SLOP, |v| *v >= 0.0)
            .map(|r| r.map(|v| v as f32));
        let bar_height = checked(change.float(keys::STATUS_BAR_HEIGHT), keys::STATUS_BAR_HEIGHT, positive)
            .map(|r| r.map(|v| v as f32));
        let peek_height = checked(change.float(keys::PEEK_HEIGHT), keys::PEEK_HEIGHT, positive)
            .map(|r| r.map(|v| v as f32));

        let mut changed = apply_field(change.bool(keys::SB_BRIGHTNESS), &mut self.enabled);
        changed |= apply_field(padding, &mut self.padding);
        changed |= apply_field(long_press, &mut self.long_press);
        changed |= apply_field(linger, &mut self.linger_threshold);
        changed |= apply_field(slop, &mut self.touch_slop);
        changed |= apply_field(bar_height, &mut self.status_bar_height);
        changed |= apply_field(peek_height, &mut self.peek_height);

        // min/max are validated as a pair
        let mut min = self.min_brightness;
        let mut max = self.max_brightness;
        let range_touched = apply_field(brightness_level(change, keys::BRIGHTNESS_MIN), &mut min)
            | apply_field(brightness_level(change, keys::BRIGHTNESS_MAX), &mut max);
        if range_touched {
            if min >= 0 && min < max {
                self.min_brightness = min;
                self.max_brightness = max;
                changed = true;
            } else {
                tracing::warn!(min, max, "ignoring invalid brightness range");
            }
        }

        changed
    }
}

/// Everything loaded from `statusbar_config.json`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusBarConfig {
    pub traffic: TrafficPreferences,
    pub brightness: BrightnessPreferences,
}

impl StatusBarConfig {
    /// Load from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`; a missing or unreadable file yields defaults
    pub fn load_from(path: &Path) -> Self {
        let mut config = Self::default();

        match std::fs::read_to_string(path) {
            Ok(contents) => match PreferenceChange::from_json(&contents) {
                Ok(prefs) => config.apply(&prefs),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Invalid status bar config, using defaults");
                }
            },
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "No status bar config, using defaults");
            }
        }

        config
    }

    pub fn apply(&mut self, prefs: &PreferenceChange) {
        self.traffic.apply(prefs);
        self.brightness.apply(prefs);
    }

    pub fn config_path() -> PathBuf {
        state_dir().join("statusbar_config.json")
    }
}

/// Flick's state directory (`$XDG_STATE_HOME/flick`, `~/.local/state/flick`, or `/tmp/flick`)
pub fn state_dir() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".local/state")))
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join("flick")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enum_parsing() {
        assert_eq!("SIMPLE".parse::<TrafficMeterMode>().unwrap(), TrafficMeterMode::Simple);
        assert_eq!("DOWNLOAD_MANAGER".parse::<MeterMode>().unwrap(), MeterMode::DownloadGated);
        assert_eq!("3".parse::<MeterPosition>().unwrap(), MeterPosition::RightEdge);
        assert_eq!(
            "2".parse::<InactivityPolicy>().unwrap(),
            InactivityPolicy::HideWithSummary(Duration::from_millis(3000))
        );
        assert!("SIDEWAYS".parse::<MeterMode>().is_err());
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let change = PreferenceChange::new()
            .with(keys::DT_SIZE, "16")
            .with(keys::DT_INACTIVITY_MODE, 1)
            .with(keys::DT_POSITION, "2");
        let mut prefs = TrafficPreferences::default();
        let changes = prefs.apply(&change);

        assert!(changes.size && changes.inactivity && changes.position);
        assert_eq!(prefs.size, 16);
        assert_eq!(prefs.inactivity, InactivityPolicy::HideImmediately);
        assert_eq!(prefs.position, MeterPosition::Right);
    }

    #[test]
    fn test_invalid_value_keeps_previous() {
        let mut prefs = TrafficPreferences {
            display_mode: MeterMode::ProgressGated,
            size: 12,
            ..Default::default()
        };
        let change = PreferenceChange::new()
            .with(keys::DT_DISPLAY_MODE, "NOPE")
            .with(keys::DT_SIZE, "big")
            .with(keys::DT_ACTIVE_MOBILE_ONLY, true);
        let changes = prefs.apply(&change);

        assert_eq!(prefs.display_mode, MeterMode::ProgressGated);
        assert_eq!(prefs.size, 12);
        assert!(prefs.mobile_data_only);
        assert!(!changes.display_mode && !changes.size && changes.mobile_data_only);
    }

    #[test]
    fn test_brightness_padding_must_stay_below_half() {
        let mut prefs = BrightnessPreferences::default();
        assert!(!prefs.apply(&PreferenceChange::new().with(keys::BRIGHTNESS_PADDING, 0.5)));
        assert_eq!(prefs.padding, 0.2);

        assert!(prefs.apply(&PreferenceChange::new().with(keys::BRIGHTNESS_PADDING, 0.1)));
        assert!((prefs.padding - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_brightness_range_validated_as_pair() {
        let mut prefs = BrightnessPreferences::default();
        let bad = PreferenceChange::new()
            .with(keys::BRIGHTNESS_MIN, 200)
            .with(keys::BRIGHTNESS_MAX, 100);
        assert!(!prefs.apply(&bad));
        assert_eq!((prefs.min_brightness, prefs.max_brightness), (0, 255));

        let good = PreferenceChange::new().with(keys::BRIGHTNESS_MIN, 10);
        assert!(prefs.apply(&good));
        assert_eq!(prefs.min_brightness, 10);
    }

    #[test]
    fn test_brightness_levels_must_fit_i32() {
        let mut prefs = BrightnessPreferences::default();
        // 2^32 + 10 would wrap to 10 if narrowed
        assert!(!prefs.apply(&PreferenceChange::new().with(keys::BRIGHTNESS_MIN, 4_294_967_306_i64)));
        assert_eq!(prefs.min_brightness, 0);

        assert!(!prefs.apply(&PreferenceChange::new().with(keys::BRIGHTNESS_MAX, "4294967551")));
        assert_eq!(prefs.max_brightness, 255);
    }

    #[test]
    fn test_linger_threshold_is_bounded() {
        let mut prefs = BrightnessPreferences::default();
        assert!(!prefs.apply(&PreferenceChange::new().with(keys::BRIGHTNESS_LINGER_THRESHOLD, 4_294_967_295_i64)));
        assert!(!prefs.apply(&PreferenceChange::new().with(keys::BRIGHTNESS_LINGER_THRESHOLD, -1)));
        assert_eq!(prefs.linger_threshold, 20);

        assert!(prefs.apply(&PreferenceChange::new().with(keys::BRIGHTNESS_LINGER_THRESHOLD, MAX_LINGER_THRESHOLD)));
        assert_eq!(prefs.linger_threshold, 1000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statusbar_config.json");
        let json = json!({
            "dt_mode": "SIMPLE",
            "dt_display_mode": "PROGRESS_TRACKING",
            "dt_interval_ms": "500",
            "sb_brightness": true,
            "brightness_linger_threshold": "oops"
        });
        std::fs::write(&path, json.to_string()).unwrap();

        let config = StatusBarConfig::load_from(&path);
        assert_eq!(config.traffic.mode, TrafficMeterMode::Simple);
        assert_eq!(config.traffic.display_mode, MeterMode::ProgressGated);
        assert_eq!(config.traffic.interval, Duration::from_millis(500));
        assert!(config.brightness.enabled);
        assert_eq!(config.brightness.linger_threshold, 20);
    }

    #[test]
    fn test_load_missing_or_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = StatusBarConfig::load_from(&dir.path().join("nope.json"));
        assert_eq!(missing, StatusBarConfig::default());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert_eq!(StatusBarConfig::load_from(&broken), StatusBarConfig::default());
    }
}
