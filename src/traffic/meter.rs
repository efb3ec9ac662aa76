//! Traffic meter controller
//!
//! Glues the host signals, the visibility decision and the sampling engine
//! together and pushes readout changes to a `MeterView`.

use crate::config::{MeterPosition, PreferenceChange, TrafficMeterMode, TrafficPreferences};
use crate::signals::{BarState, Signal};
use crate::timers::{TimerId, TimerQueue};
use crate::traffic::engine::{RateSamplingEngine, Readout};
use crate::traffic::format::{TrafficFormatter, UnitLabels};
use crate::traffic::sampler::SampleSource;
use crate::traffic::visibility::{MeterVisibilitySignals, Transition, VisibilityStateMachine};

/// Where the readout is drawn
pub trait MeterView {
    fn set_text(&mut self, text: &str);
    fn set_visible(&mut self, visible: bool);
    fn set_text_size(&mut self, _size_dp: u32) {}
}

/// Status bar slot the meter is placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterSlot {
    Left,
    Center,
    Right,
    RightEdge,
    KeyguardCenter,
}

/// Resolve the slot for the current bar state; `None` means not placed.
/// Every state other than the open shade uses the keyguard slot.
pub fn resolve_placement(
    position: MeterPosition,
    bar_state: BarState,
    allow_in_lockscreen: bool,
    clock_centered: bool,
) -> Option<MeterSlot> {
    if bar_state != BarState::Shade {
        return allow_in_lockscreen.then_some(MeterSlot::KeyguardCenter);
    }

    Some(match position {
        MeterPosition::Auto if clock_centered => MeterSlot::Left,
        MeterPosition::Auto => MeterSlot::Center,
        MeterPosition::Left => MeterSlot::Left,
        MeterPosition::Right => MeterSlot::Right,
        MeterPosition::RightEdge => MeterSlot::RightEdge,
    })
}

pub struct TrafficMeter {
    prefs: TrafficPreferences,
    signals: MeterVisibilitySignals,
    visibility: VisibilityStateMachine,
    engine: RateSamplingEngine,
    source: SampleSource,
    view: Box<dyn MeterView>,
    host_attached: bool,
    bar_state: BarState,
    icons_hidden: bool,
    heads_up_visible: bool,
    /// Last readout pushed to the view
    shown: Option<Readout>,
}

impl TrafficMeter {
    pub fn new(prefs: TrafficPreferences, source: SampleSource, mut view: Box<dyn MeterView>) -> Self {
        view.set_text_size(prefs.size);
        if prefs.mode == TrafficMeterMode::Omni {
            tracing::warn!("Omni traffic meter not available, using simple meter");
        }
        let engine = RateSamplingEngine::new(prefs.interval, prefs.inactivity, formatter_for(&prefs));
        Self {
            prefs,
            signals: MeterVisibilitySignals::default(),
            visibility: VisibilityStateMachine::new(),
            engine,
            source,
            view,
            host_attached: false,
            bar_state: BarState::default(),
            icons_hidden: false,
            heads_up_visible: false,
            shown: None,
        }
    }

    pub fn prefs(&self) -> &TrafficPreferences {
        &self.prefs
    }

    pub fn signals(&self) -> &MeterVisibilitySignals {
        &self.signals
    }

    pub fn is_running(&self) -> bool {
        self.visibility.is_running()
    }

    pub fn readout(&self) -> &Readout {
        self.engine.readout()
    }

    pub fn engine(&self) -> &RateSamplingEngine {
        &self.engine
    }

    pub fn placement(&self, clock_centered: bool) -> Option<MeterSlot> {
        resolve_placement(
            self.prefs.position,
            self.bar_state,
            self.prefs.allow_in_lockscreen,
            clock_centered,
        )
    }

    pub fn attach(&mut self, now_ms: u64, timers: &mut dyn TimerQueue) {
        self.host_attached = true;
        self.update_state(now_ms, timers);
    }

    pub fn detach(&mut self, now_ms: u64, timers: &mut dyn TimerQueue) {
        self.host_attached = false;
        self.update_state(now_ms, timers);
    }

    pub fn on_signal(&mut self, signal: &Signal, now_ms: u64, timers: &mut dyn TimerQueue) {
        match signal {
            Signal::PreferencesChanged { values } => self.apply_preferences(values, timers),
            Signal::ScreenOn => self.signals.screen_on = true,
            Signal::ScreenOff => self.signals.screen_on = false,
            Signal::ConnectivityChanged => {
                let was_running = self.visibility.is_running();
                self.update_state(now_ms, timers);
                if was_running && self.visibility.is_running() {
                    // counters of the old network are meaningless for the new one
                    tracing::debug!("connectivity changed, taking a fresh traffic baseline");
                    self.engine.start(now_ms, &mut self.source, timers);
                    self.flush();
                }
                return;
            }
            Signal::MobileData { connected } => self.signals.mobile_data_connected = *connected,
            Signal::DownloadState { active } => self.signals.download_active = *active,
            Signal::ProgressTracking { active } => self.signals.progress_tracking = *active,
            Signal::BarStateChanged { state } => self.bar_state = *state,
            Signal::SystemIconsHidden { hidden } => self.icons_hidden = *hidden,
            Signal::HeadsUp { visible } => self.heads_up_visible = *visible,
            Signal::BrightnessMode { .. } => return,
        }
        self.update_state(now_ms, timers);
    }

    pub fn on_tick(&mut self, id: TimerId, now_ms: u64, timers: &mut dyn TimerQueue) {
        self.engine.on_tick(id, now_ms, &mut self.source, timers);
        self.flush();
    }

    pub fn on_hold_expired(&mut self, id: TimerId) {
        self.engine.on_hold_expired(id);
        self.flush();
    }

    fn apply_preferences(&mut self, values: &PreferenceChange, timers: &mut dyn TimerQueue) {
        let changes = self.prefs.apply(values);
        if !changes.any() {
            return;
        }

        if changes.mode {
            tracing::info!(mode = ?self.prefs.mode, "Traffic meter mode changed");
            if self.prefs.mode == TrafficMeterMode::Omni {
                tracing::warn!("Omni traffic meter not available, using simple meter");
            }
        }
        if changes.size {
            self.view.set_text_size(self.prefs.size);
        }
        if changes.inactivity {
            self.engine.set_policy(self.prefs.inactivity, timers);
        }
        if changes.interval {
            // takes effect from the next scheduled tick
            self.engine.set_interval(self.prefs.interval);
        }
        if changes.two_line {
            self.engine.set_formatter(formatter_for(&self.prefs));
        }
    }

    fn update_state(&mut self, now_ms: u64, timers: &mut dyn TimerQueue) {
        // clock centering only picks between shade slots, never whether one exists
        self.signals.attached = self.host_attached
            && self.prefs.mode != TrafficMeterMode::Off
            && self.placement(false).is_some();
        self.signals.hidden_by_policy = self.icons_hidden && self.bar_state == BarState::Shade;
        self.signals.hidden_by_transient_overlay =
            self.heads_up_visible && self.prefs.position != MeterPosition::Right;

        match self
            .visibility
            .evaluate(&self.signals, self.prefs.display_mode, self.prefs.mobile_data_only)
        {
            Some(Transition::Start) => {
                tracing::info!(provider = ?self.source.selected_name(), "Traffic meter started");
                self.engine.start(now_ms, &mut self.source, timers);
            }
            Some(Transition::Stop) => {
                self.engine.stop(timers);
                tracing::info!("Traffic meter stopped");
            }
            None => {}
        }

        self.flush();
    }

    fn flush(&mut self) {
        let readout = self.engine.readout();
        let (text_changed, visible_changed) = match &self.shown {
            Some(shown) => (shown.text != readout.text, shown.visible != readout.visible),
            None => (true, true),
        };
        if text_changed {
            self.view.set_text(&readout.text);
        }
        if visible_changed {
            self.view.set_visible(readout.visible);
        }
        self.shown = Some(readout.clone());
    }
}

fn formatter_for(prefs: &TrafficPreferences) -> TrafficFormatter {
    TrafficFormatter::new(UnitLabels::default(), prefs.two_line)
}
