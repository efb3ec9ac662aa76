//! Status bar brightness control

pub mod curve;
pub mod display;
pub mod gesture;
pub mod settings;

pub use curve::{BrightnessCurveConfig, BrightnessTarget};
pub use display::{Backlight, DisplayControl, GestureHost, SysfsDisplay};
pub use gesture::{GestureBrightnessController, GesturePhase, TouchAction, TouchEvent, TouchSession};
pub use settings::{JsonSettingsStore, SettingWrite, SettingsStore, SettingsWriter};
