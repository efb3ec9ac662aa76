//! Display side of the brightness gesture
//!
//! - `DisplayControl`: screen metrics and temporary brightness writes
//! - `GestureHost`: haptics and collapsing the peeked panel
//! - `SysfsDisplay`: Linux backlight implementation

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

pub trait DisplayControl {
    /// Screen width in the same pixels touch events use
    fn screen_width(&self) -> Result<f32>;

    /// Apply a brightness immediately, without persisting it
    fn set_temporary_brightness(&mut self, value: i32) -> Result<()>;

    /// Apply an automatic-brightness adjustment in `[-1, 1]`
    fn set_temporary_auto_adjustment(&mut self, adjustment: f32) -> Result<()>;
}

/// Shell actions the gesture triggers
pub trait GestureHost {
    fn perform_haptic_feedback(&mut self);

    /// Collapse the panel peeked open by the gesture
    fn fling_panel(&mut self);
}

/// A `/sys/class/backlight` device
#[derive(Debug, Clone)]
pub struct Backlight {
    path: PathBuf,
    max_brightness: u32,
}

impl Backlight {
    pub fn find() -> Option<Self> {
        Self::find_in(Path::new("/sys/class/backlight"))
    }

    /// First device under `dir` with a readable `max_brightness`
    pub fn find_in(dir: &Path) -> Option<Self> {
        let mut entries: Vec<PathBuf> = fs::read_dir(dir).ok()?.flatten().map(|e| e.path()).collect();
        entries.sort();
        entries.into_iter().find_map(|path| {
            let max_brightness = fs::read_to_string(path.join("max_brightness"))
                .ok()?
                .trim()
                .parse()
                .ok()?;
            Some(Self { path, max_brightness })
        })
    }

    pub fn max_brightness(&self) -> u32 {
        self.max_brightness
    }

    /// Set brightness as a fraction, floored at 5% to avoid a black screen
    pub fn set(&self, fraction: f32) -> Result<()> {
        let clamped = fraction.clamp(0.05, 1.0);
        let raw = (clamped * self.max_brightness as f32) as u32;

        if let Err(e) = fs::write(self.path.join("brightness"), raw.to_string()) {
            tracing::debug!(error = %e, "direct backlight write failed, trying brightnessctl");
            let output = Command::new("brightnessctl")
                .args(["set", &format!("{}%", (clamped * 100.0) as u32)])
                .output()
                .map_err(|e| Error::Backlight(e.to_string()))?;
            if !output.status.success() {
                return Err(Error::Backlight(format!("brightnessctl exited with {}", output.status)));
            }
        }
        Ok(())
    }
}

/// Backlight-backed display control
pub struct SysfsDisplay {
    backlight: Option<Backlight>,
    fb_size_path: PathBuf,
    width_override: Option<f32>,
    /// Top of the brightness scale the gesture produces
    range_max: i32,
    dry_run: bool,
}

impl SysfsDisplay {
    pub fn new(range_max: i32, width_override: Option<f32>, dry_run: bool) -> Self {
        let backlight = Backlight::find();
        match &backlight {
            Some(b) => tracing::info!(path = %b.path.display(), max = b.max_brightness, "Backlight found"),
            None => tracing::warn!("No backlight device found"),
        }
        Self::with_backlight(
            backlight,
            PathBuf::from("/sys/class/graphics/fb0/virtual_size"),
            range_max,
            width_override,
            dry_run,
        )
    }

    pub fn with_backlight(
        backlight: Option<Backlight>,
        fb_size_path: PathBuf,
        range_max: i32,
        width_override: Option<f32>,
        dry_run: bool,
    ) -> Self {
        Self {
            backlight,
            fb_size_path,
            width_override,
            range_max: range_max.max(1),
            dry_run,
        }
    }
}

impl DisplayControl for SysfsDisplay {
    fn screen_width(&self) -> Result<f32> {
        if let Some(width) = self.width_override {
            return Ok(width);
        }
        // "1080,2340"
        let contents = fs::read_to_string(&self.fb_size_path)
            .map_err(|e| Error::DisplayMetrics(format!("{}: {}", self.fb_size_path.display(), e)))?;
        contents
            .trim()
            .split(',')
            .next()
            .and_then(|w| w.trim().parse::<f32>().ok())
            .filter(|w| *w > 0.0)
            .ok_or_else(|| Error::DisplayMetrics(format!("unexpected framebuffer size {:?}", contents.trim())))
    }

    fn set_temporary_brightness(&mut self, value: i32) -> Result<()> {
        let fraction = value as f32 / self.range_max as f32;
        if self.dry_run {
            tracing::info!(value, fraction, "dry run: brightness");
            return Ok(());
        }
        let backlight = self
            .backlight
            .as_ref()
            .ok_or_else(|| Error::Backlight("no backlight device".to_string()))?;
        backlight.set(fraction)
    }

    fn set_temporary_auto_adjustment(&mut self, adjustment: f32) -> Result<()> {
        // No ambient-light loop to feed; the settings store keeps the value
        tracing::debug!(adjustment, "auto brightness adjustment");
        Ok(())
    }
}
