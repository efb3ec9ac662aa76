//! Status bar brightness gesture
//!
//! Sliding a finger sideways along the status bar sets the screen
//! brightness from the touch's horizontal position.
//!
//! ```text
//!   Idle --down in bar--> Armed --linger past threshold--> Dragging
//!    ^                      |      or long press              |
//!    +--- up / cancel / below peek height --------------------+
//! ```
//!
//! A sideways-dominant move counts as one linger step. Moving past the
//! touch slop cancels the long press but keeps the session armed, so a
//! slow horizontal slide still turns into a drag.

use serde::{Deserialize, Serialize};

use crate::brightness::curve::{BrightnessCurveConfig, BrightnessTarget};
use crate::brightness::display::{DisplayControl, GestureHost};
use crate::brightness::settings::{SettingWrite, SettingsWriter};
use crate::config::{BrightnessPreferences, PreferenceChange};
use crate::signals::Signal;
use crate::timers::{TimerId, TimerKind, TimerQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchAction {
    Down,
    Move,
    Up,
    Cancel,
}

/// A touch sample in screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchEvent {
    pub action: TouchAction,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GesturePhase {
    #[default]
    Idle,
    Armed,
    Dragging,
}

/// State of one touch sequence that started inside the bar
#[derive(Debug, Clone, PartialEq)]
pub struct TouchSession {
    pub origin_x: f32,
    pub origin_y: f32,
    pub linger_count: u32,
    /// Cleared once the touch moves below the peek height
    pub is_armed: bool,
    long_press_timer: Option<TimerId>,
    /// A brightness adjustment happened during this session
    adjusted: bool,
}

pub struct GestureBrightnessController {
    prefs: BrightnessPreferences,
    automatic: bool,
    phase: GesturePhase,
    session: Option<TouchSession>,
    screen_width: f32,
    last_manual: Option<i32>,
    last_automatic: Option<f32>,
    display: Box<dyn DisplayControl>,
    host: Box<dyn GestureHost>,
    settings: SettingsWriter,
}

impl GestureBrightnessController {
    pub fn new(
        prefs: BrightnessPreferences,
        automatic: bool,
        display: Box<dyn DisplayControl>,
        host: Box<dyn GestureHost>,
        settings: SettingsWriter,
    ) -> Self {
        Self {
            prefs,
            automatic,
            phase: GesturePhase::Idle,
            session: None,
            screen_width: 0.0,
            last_manual: None,
            last_automatic: None,
            display,
            host,
            settings,
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn session(&self) -> Option<&TouchSession> {
        self.session.as_ref()
    }

    pub fn prefs(&self) -> &BrightnessPreferences {
        &self.prefs
    }

    pub fn is_automatic(&self) -> bool {
        self.automatic
    }

    /// Last manual brightness written
    pub fn last_manual(&self) -> Option<i32> {
        self.last_manual
    }

    /// Last automatic adjustment written
    pub fn last_automatic(&self) -> Option<f32> {
        self.last_automatic
    }

    pub fn on_signal(&mut self, signal: &Signal, timers: &mut dyn TimerQueue) {
        match signal {
            Signal::PreferencesChanged { values } => self.apply_preferences(values, timers),
            Signal::BrightnessMode { automatic } => self.set_automatic(*automatic),
            _ => {}
        }
    }

    pub fn apply_preferences(&mut self, values: &PreferenceChange, timers: &mut dyn TimerQueue) {
        if self.prefs.apply(values) {
            tracing::debug!(enabled = self.prefs.enabled, "brightness gesture preferences updated");
            if !self.prefs.enabled {
                self.end_session(timers);
            }
        }
    }

    pub fn set_automatic(&mut self, automatic: bool) {
        if self.automatic != automatic {
            tracing::info!(automatic, "Brightness mode changed");
            self.automatic = automatic;
        }
    }

    pub fn on_touch(&mut self, event: &TouchEvent, timers: &mut dyn TimerQueue) {
        if !self.prefs.enabled {
            return;
        }
        match event.action {
            TouchAction::Down => self.touch_down(event, timers),
            TouchAction::Move => self.touch_move(event, timers),
            TouchAction::Up | TouchAction::Cancel => self.touch_up(timers),
        }
    }

    pub fn on_long_press(&mut self, id: TimerId) {
        let threshold = self.prefs.linger_threshold;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.long_press_timer != Some(id) {
            return;
        }
        session.long_press_timer = None;
        if self.phase != GesturePhase::Armed || !session.is_armed {
            return;
        }

        session.linger_count = threshold.saturating_add(1);
        let origin_x = session.origin_x;
        self.phase = GesturePhase::Dragging;
        tracing::debug!("brightness long press");
        self.host.perform_haptic_feedback();
        self.adjust(origin_x);
    }

    /// Drop any live session and its long-press timer
    pub fn end_session(&mut self, timers: &mut dyn TimerQueue) {
        self.cancel_long_press(timers);
        self.session = None;
        self.phase = GesturePhase::Idle;
    }

    fn touch_down(&mut self, event: &TouchEvent, timers: &mut dyn TimerQueue) {
        self.end_session(timers);
        if event.y >= self.prefs.status_bar_height {
            return;
        }

        self.screen_width = match self.display.screen_width() {
            Ok(width) if width > 0.0 => width,
            Ok(width) => {
                tracing::warn!(width, "Ignoring brightness touch, invalid screen width");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring brightness touch, no screen width");
                return;
            }
        };

        let long_press_timer = match timers.schedule(TimerKind::LongPress, self.prefs.long_press) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to schedule brightness long press");
                None
            }
        };
        self.session = Some(TouchSession {
            origin_x: event.x,
            origin_y: event.y,
            linger_count: 0,
            is_armed: true,
            long_press_timer,
            adjusted: false,
        });
        self.phase = GesturePhase::Armed;
        tracing::debug!(x = event.x, y = event.y, t = event.timestamp_ms, "brightness gesture armed");
    }

    fn touch_move(&mut self, event: &TouchEvent, timers: &mut dyn TimerQueue) {
        let in_bar = event.y < self.prefs.status_bar_height;
        let armed = match &self.session {
            Some(session) => session.is_armed,
            None => return,
        };

        if !(in_bar && armed) {
            self.cancel_long_press(timers);
            if armed && event.y > self.prefs.peek_height {
                tracing::debug!(y = event.y, "brightness gesture left peek area");
                if let Some(session) = self.session.as_mut() {
                    session.is_armed = false;
                }
                self.phase = GesturePhase::Idle;
            }
            return;
        }

        if self.phase == GesturePhase::Dragging {
            self.adjust(event.x);
            return;
        }

        let (threshold, slop) = (self.prefs.linger_threshold, self.prefs.touch_slop);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let x_diff = (event.x - session.origin_x).abs();
        let y_diff = (event.y - session.origin_y).abs();
        if x_diff > y_diff {
            session.linger_count = session.linger_count.saturating_add(1);
        }
        let lingered = session.linger_count > threshold;

        if lingered || x_diff > slop || y_diff > slop {
            self.cancel_long_press(timers);
        }
        if lingered {
            self.phase = GesturePhase::Dragging;
            tracing::debug!("brightness drag started");
            self.adjust(event.x);
        }
    }

    fn touch_up(&mut self, timers: &mut dyn TimerQueue) {
        let fling = self
            .session
            .as_ref()
            .map(|s| s.adjusted && s.is_armed)
            .unwrap_or(false);
        self.end_session(timers);
        if fling {
            self.host.fling_panel();
        }
    }

    fn cancel_long_press(&mut self, timers: &mut dyn TimerQueue) {
        if let Some(id) = self.session.as_mut().and_then(|s| s.long_press_timer.take()) {
            timers.cancel(id);
        }
    }

    fn adjust(&mut self, x: f32) {
        if let Some(session) = self.session.as_mut() {
            session.adjusted = true;
        }

        let curve = BrightnessCurveConfig::from_preferences(&self.prefs, self.automatic);
        match curve.target(x, self.screen_width) {
            BrightnessTarget::Automatic(adjustment) => {
                if self.last_automatic == Some(adjustment) {
                    return;
                }
                self.last_automatic = Some(adjustment);
                if let Err(e) = self.display.set_temporary_auto_adjustment(adjustment) {
                    tracing::warn!(adjustment, error = %e, "Failed to apply brightness adjustment");
                }
                self.settings.dispatch(SettingWrite::AutoBrightnessAdjustment(adjustment));
            }
            BrightnessTarget::Manual(value) => {
                if self.last_manual == Some(value) {
                    return;
                }
                self.last_manual = Some(value);
                if let Err(e) = self.display.set_temporary_brightness(value) {
                    tracing::warn!(value, error = %e, "Failed to apply brightness");
                }
                self.settings.dispatch(SettingWrite::Brightness(value));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::keys;
    use crate::test_utils::{DisplayCall, ManualTimers, MemoryStore, RecordingDisplay, RecordingHost};
    use std::sync::Arc;
    use std::time::Duration;

    const WIDTH: f32 = 1000.0;

    struct Harness {
        controller: GestureBrightnessController,
        display: RecordingDisplay,
        host: RecordingHost,
        store: Arc<MemoryStore>,
        timers: ManualTimers,
    }

    impl Harness {
        fn new(automatic: bool) -> Self {
            let prefs = BrightnessPreferences {
                enabled: true,
                ..Default::default()
            };
            Self::with_prefs(prefs, automatic)
        }

        fn with_prefs(prefs: BrightnessPreferences, automatic: bool) -> Self {
            let display = RecordingDisplay::new(WIDTH);
            let host = RecordingHost::default();
            let store = Arc::new(MemoryStore::default());
            let controller = GestureBrightnessController::new(
                prefs,
                automatic,
                Box::new(display.clone()),
                Box::new(host.clone()),
                SettingsWriter::inline(store.clone()),
            );
            Self {
                controller,
                display,
                host,
                store,
                timers: ManualTimers::default(),
            }
        }

        fn touch(&mut self, action: TouchAction, x: f32, y: f32) {
            let event = TouchEvent { action, x, y, timestamp_ms: 0 };
            self.controller.on_touch(&event, &mut self.timers);
        }

        fn fire_long_press(&mut self) {
            let id = self.timers.take(TimerKind::LongPress).expect("long press pending");
            self.controller.on_long_press(id);
        }
    }

    #[test]
    fn test_down_in_bar_arms_with_long_press() {
        let mut h = Harness::new(false);
        h.touch(TouchAction::Down, 500.0, 10.0);

        assert_eq!(h.controller.phase(), GesturePhase::Armed);
        assert_eq!(h.timers.count(TimerKind::LongPress), 1);
        assert_eq!(h.timers.last_delay(TimerKind::LongPress), Some(Duration::from_millis(750)));
    }

    #[test]
    fn test_down_outside_bar_is_ignored() {
        let mut h = Harness::new(false);
        h.touch(TouchAction::Down, 500.0, 30.0);
        assert_eq!(h.controller.phase(), GesturePhase::Idle);
        assert_eq!(h.timers.total(), 0);
    }

    #[test]
    fn test_horizontal_slide_becomes_drag_after_linger() {
        let mut h = Harness::new(false);
        h.touch(TouchAction::Down, 500.0, 10.0);

        for i in 1..=20 {
            h.touch(TouchAction::Move, 500.0 + i as f32, 10.0);
            assert_eq!(h.controller.phase(), GesturePhase::Armed);
        }
        assert!(h.display.calls().is_empty());

        h.touch(TouchAction::Move, 500.0 + 21.0, 10.0);
        assert_eq!(h.controller.phase(), GesturePhase::Dragging);
        assert_eq!(h.display.calls().len(), 1);
        assert_eq!(h.controller.session().unwrap().linger_count, 21);
    }

    #[test]
    fn test_slop_cancels_long_press_but_stays_armed() {
        let mut h = Harness::new(false);
        h.touch(TouchAction::Down, 500.0, 10.0);
        h.touch(TouchAction::Move, 540.0, 12.0);

        assert_eq!(h.timers.count(TimerKind::LongPress), 0);
        assert_eq!(h.controller.phase(), GesturePhase::Armed);
        assert_eq!(h.controller.session().unwrap().linger_count, 1);
    }

    #[test]
    fn test_long_press_starts_drag_at_origin() {
        let mut h = Harness::new(false);
        h.touch(TouchAction::Down, 500.0, 10.0);
        h.fire_long_press();

        assert_eq!(h.controller.phase(), GesturePhase::Dragging);
        assert_eq!(h.host.haptics(), 1);
        assert_eq!(h.display.calls(), vec![DisplayCall::Brightness(128)]);
        assert_eq!(h.store.writes(), vec![SettingWrite::Brightness(128)]);
        assert_eq!(h.controller.session().unwrap().linger_count, 21);
    }

    #[test]
    fn test_long_press_with_largest_linger_threshold() {
        let prefs = BrightnessPreferences {
            enabled: true,
            linger_threshold: u32::MAX,
            ..Default::default()
        };
        let mut h = Harness::with_prefs(prefs, false);
        h.touch(TouchAction::Down, 500.0, 10.0);
        h.fire_long_press();

        assert_eq!(h.controller.phase(), GesturePhase::Dragging);
        assert_eq!(h.controller.session().unwrap().linger_count, u32::MAX);
        assert_eq!(h.display.calls(), vec![DisplayCall::Brightness(128)]);

        h.touch(TouchAction::Move, 100.0, 10.0);
        assert_eq!(h.controller.last_manual(), Some(0));
    }

    #[test]
    fn test_drag_writes_only_changed_values() {
        let mut h = Harness::new(false);
        h.touch(TouchAction::Down, 500.0, 10.0);
        h.fire_long_press();

        h.touch(TouchAction::Move, 500.0, 10.0);
        h.touch(TouchAction::Move, 100.0, 10.0);
        h.touch(TouchAction::Move, 150.0, 10.0);

        // 100 and 150 both sit in the left padding
        assert_eq!(
            h.display.calls(),
            vec![DisplayCall::Brightness(128), DisplayCall::Brightness(0)]
        );
        assert_eq!(h.controller.last_manual(), Some(0));
    }

    #[test]
    fn test_automatic_mode_writes_adjustment() {
        let mut h = Harness::new(true);
        h.touch(TouchAction::Down, 1000.0, 10.0);
        h.fire_long_press();

        let calls = h.display.calls();
        assert_eq!(calls.len(), 1);
        match calls[0] {
            DisplayCall::AutoAdjustment(adj) => assert!((adj - 1.0).abs() < 1e-5),
            ref other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(h.store.writes()[0], SettingWrite::AutoBrightnessAdjustment(_)));
    }

    #[test]
    fn test_up_after_drag_flings_panel() {
        let mut h = Harness::new(false);
        h.touch(TouchAction::Down, 500.0, 10.0);
        h.fire_long_press();
        h.touch(TouchAction::Up, 500.0, 10.0);

        assert_eq!(h.host.flings(), 1);
        assert_eq!(h.controller.phase(), GesturePhase::Idle);
        assert!(h.controller.session().is_none());
    }

    #[test]
    fn test_up_without_adjustment_does_not_fling() {
        let mut h = Harness::new(false);
        h.touch(TouchAction::Down, 500.0, 10.0);
        h.touch(TouchAction::Up, 500.0, 10.0);

        assert_eq!(h.host.flings(), 0);
        assert_eq!(h.timers.total(), 0);
    }

    #[test]
    fn test_leaving_peek_area_disarms() {
        let mut h = Harness::new(false);
        h.touch(TouchAction::Down, 500.0, 10.0);
        h.fire_long_press();

        // Below the bar but above the peek height: paused, still dragging
        h.touch(TouchAction::Move, 300.0, 50.0);
        assert_eq!(h.controller.phase(), GesturePhase::Dragging);
        assert_eq!(h.display.calls().len(), 1);

        h.touch(TouchAction::Move, 300.0, 200.0);
        assert_eq!(h.controller.phase(), GesturePhase::Idle);

        // Back in the bar, nothing happens until a new down
        h.touch(TouchAction::Move, 900.0, 10.0);
        assert_eq!(h.display.calls().len(), 1);

        h.touch(TouchAction::Up, 900.0, 10.0);
        assert_eq!(h.host.flings(), 0);
    }

    #[test]
    fn test_leaving_bar_cancels_long_press() {
        let mut h = Harness::new(false);
        h.touch(TouchAction::Down, 500.0, 10.0);
        h.touch(TouchAction::Move, 500.0, 40.0);

        assert_eq!(h.timers.count(TimerKind::LongPress), 0);
        assert_eq!(h.controller.phase(), GesturePhase::Armed);
    }

    #[test]
    fn test_stale_long_press_is_ignored() {
        let mut h = Harness::new(false);
        h.touch(TouchAction::Down, 500.0, 10.0);
        let stale = h.timers.take(TimerKind::LongPress).unwrap();
        h.touch(TouchAction::Up, 500.0, 10.0);
        h.touch(TouchAction::Down, 700.0, 10.0);

        h.controller.on_long_press(stale);
        assert_eq!(h.controller.phase(), GesturePhase::Armed);
        assert_eq!(h.host.haptics(), 0);
    }

    #[test]
    fn test_disabling_ends_session_and_ignores_touches() {
        let mut h = Harness::new(false);
        h.touch(TouchAction::Down, 500.0, 10.0);

        let change = PreferenceChange::new().with(keys::SB_BRIGHTNESS, false);
        h.controller
            .on_signal(&Signal::PreferencesChanged { values: change }, &mut h.timers);
        assert_eq!(h.controller.phase(), GesturePhase::Idle);
        assert_eq!(h.timers.total(), 0);

        h.touch(TouchAction::Down, 500.0, 10.0);
        assert_eq!(h.controller.phase(), GesturePhase::Idle);
    }

    #[test]
    fn test_brightness_mode_signal() {
        let mut h = Harness::new(false);
        h.controller
            .on_signal(&Signal::BrightnessMode { automatic: true }, &mut h.timers);
        assert!(h.controller.is_automatic());
    }

    #[test]
    fn test_missing_screen_width_ignores_touch() {
        let mut h = Harness::new(false);
        h.display.set_width(None);
        h.touch(TouchAction::Down, 500.0, 10.0);
        assert_eq!(h.controller.phase(), GesturePhase::Idle);
    }

    #[test]
    fn test_touch_json() {
        let event: TouchEvent = serde_json::from_str(r#"{"action":"move","x":12.5,"y":3}"#).unwrap();
        assert_eq!(
            event,
            TouchEvent { action: TouchAction::Move, x: 12.5, y: 3.0, timestamp_ms: 0 }
        );
    }
}
