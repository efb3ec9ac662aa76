//! Horizontal position to brightness mapping
//!
//! The usable part of the bar is the width minus `padding` on each side.
//! Touches in the padding pin to the ends of the range.

use crate::config::BrightnessPreferences;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessCurveConfig {
    /// Fraction of width ignored at each edge, `0 <= p < 0.5`
    pub padding_fraction: f32,
    pub min_value: i32,
    pub max_value: i32,
    pub is_automatic_mode: bool,
}

/// Value to apply for a touch position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BrightnessTarget {
    /// Absolute brightness in `min_value..=max_value`
    Manual(i32),
    /// Automatic-brightness adjustment in `[-1, 1]`
    Automatic(f32),
}

impl BrightnessCurveConfig {
    pub fn from_preferences(prefs: &BrightnessPreferences, is_automatic_mode: bool) -> Self {
        Self {
            padding_fraction: prefs.padding,
            min_value: prefs.min_brightness,
            max_value: prefs.max_brightness,
            is_automatic_mode,
        }
    }

    /// Position across the usable width, `0.0..=1.0`
    pub fn normalized(&self, x: f32, screen_width: f32) -> f32 {
        let raw = if screen_width > 0.0 { x / screen_width } else { 0.0 };
        let padding = self.padding_fraction;
        let padded = raw.max(padding).min(1.0 - padding);
        ((padded - padding) / (1.0 - 2.0 * padding)).clamp(0.0, 1.0)
    }

    pub fn target(&self, x: f32, screen_width: f32) -> BrightnessTarget {
        let value = self.normalized(x, screen_width);
        if self.is_automatic_mode {
            BrightnessTarget::Automatic((value * 2.0 - 1.0).clamp(-1.0, 1.0))
        } else {
            let span = (self.max_value - self.min_value) as f32;
            let brightness = self.min_value + (value * span).round() as i32;
            BrightnessTarget::Manual(brightness.clamp(self.min_value, self.max_value))
        }
    }
}
