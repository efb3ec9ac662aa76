//! Test fakes shared across modules

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Mutex;
use std::time::Duration;

use crate::brightness::display::{DisplayControl, GestureHost};
use crate::brightness::settings::{SettingWrite, SettingsStore};
use crate::error::{Error, Result};
use crate::timers::{TimerId, TimerKind, TimerQueue};
use crate::traffic::meter::MeterView;
use crate::traffic::sampler::{ByteCounters, CounterProvider};

/// Timer queue that only records; tests fire timers by hand
#[derive(Default)]
pub struct ManualTimers {
    next_id: u64,
    pending: Vec<(TimerId, TimerKind, Duration)>,
}

impl ManualTimers {
    pub fn count(&self, kind: TimerKind) -> usize {
        self.pending.iter().filter(|(_, k, _)| *k == kind).count()
    }

    pub fn total(&self) -> usize {
        self.pending.len()
    }

    pub fn last_delay(&self, kind: TimerKind) -> Option<Duration> {
        self.pending
            .iter()
            .rev()
            .find(|(_, k, _)| *k == kind)
            .map(|(_, _, d)| *d)
    }

    /// Remove the oldest pending timer of `kind`, as if it just fired
    pub fn take(&mut self, kind: TimerKind) -> Option<TimerId> {
        let index = self.pending.iter().position(|(_, k, _)| *k == kind)?;
        Some(self.pending.remove(index).0)
    }
}

impl TimerQueue for ManualTimers {
    fn schedule(&mut self, kind: TimerKind, after: Duration) -> Result<TimerId> {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.pending.push((id, kind, after));
        Ok(id)
    }

    fn cancel(&mut self, id: TimerId) {
        self.pending.retain(|(pending, _, _)| *pending != id);
    }
}

#[derive(Default)]
struct ScriptState {
    queue: VecDeque<u64>,
    current: u64,
    failures: u32,
}

/// Handle for steering a `ScriptedCounters` from the test body
#[derive(Clone, Default)]
pub struct CounterScript(Rc<RefCell<ScriptState>>);

impl CounterScript {
    pub fn set(&self, rx: u64) {
        let mut state = self.0.borrow_mut();
        state.queue.clear();
        state.current = rx;
    }

    pub fn fail_next(&self, reads: u32) {
        self.0.borrow_mut().failures = reads;
    }
}

/// Counter provider returning scripted received-byte values
pub struct ScriptedCounters {
    name: &'static str,
    available: bool,
    always_fail: bool,
    script: CounterScript,
}

impl ScriptedCounters {
    /// Returns `values` in order, then repeats the last one
    pub fn new(name: &'static str, values: &[u64]) -> Self {
        let script = CounterScript::default();
        script.0.borrow_mut().queue = values.iter().copied().collect();
        Self { name, available: true, always_fail: false, script }
    }

    pub fn scripted(name: &'static str) -> (Self, CounterScript) {
        let counters = Self::new(name, &[]);
        let script = counters.script.clone();
        (counters, script)
    }

    /// Fails its probe
    pub fn unavailable(name: &'static str) -> Self {
        Self { available: false, ..Self::new(name, &[]) }
    }

    /// Probes fine, every read fails
    pub fn failing_reads(name: &'static str) -> Self {
        Self { always_fail: true, ..Self::new(name, &[]) }
    }
}

impl CounterProvider for ScriptedCounters {
    fn name(&self) -> &'static str {
        self.name
    }

    fn probe(&mut self) -> bool {
        self.available
    }

    fn read(&mut self) -> Result<ByteCounters> {
        let mut state = self.script.0.borrow_mut();
        if self.always_fail || state.failures > 0 {
            state.failures = state.failures.saturating_sub(1);
            return Err(Error::Counters(format!("{}: scripted failure", self.name)));
        }
        if let Some(next) = state.queue.pop_front() {
            state.current = next;
        }
        Ok(ByteCounters { rx: state.current, tx: 0 })
    }
}

#[derive(Default)]
struct ViewState {
    text: String,
    visible: bool,
    text_size: Option<u32>,
    text_updates: usize,
}

/// Meter view that remembers what it was told
#[derive(Clone, Default)]
pub struct RecordingView(Rc<RefCell<ViewState>>);

impl RecordingView {
    pub fn text(&self) -> String {
        self.0.borrow().text.clone()
    }

    pub fn visible(&self) -> bool {
        self.0.borrow().visible
    }

    pub fn text_size(&self) -> Option<u32> {
        self.0.borrow().text_size
    }

    pub fn text_updates(&self) -> usize {
        self.0.borrow().text_updates
    }
}

impl MeterView for RecordingView {
    fn set_text(&mut self, text: &str) {
        let mut state = self.0.borrow_mut();
        state.text = text.to_string();
        state.text_updates += 1;
    }

    fn set_visible(&mut self, visible: bool) {
        self.0.borrow_mut().visible = visible;
    }

    fn set_text_size(&mut self, size_dp: u32) {
        self.0.borrow_mut().text_size = Some(size_dp);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayCall {
    Brightness(i32),
    AutoAdjustment(f32),
}

#[derive(Default)]
struct DisplayState {
    width: Option<f32>,
    calls: Vec<DisplayCall>,
}

#[derive(Clone, Default)]
pub struct RecordingDisplay(Rc<RefCell<DisplayState>>);

impl RecordingDisplay {
    pub fn new(width: f32) -> Self {
        let display = Self::default();
        display.set_width(Some(width));
        display
    }

    pub fn set_width(&self, width: Option<f32>) {
        self.0.borrow_mut().width = width;
    }

    pub fn calls(&self) -> Vec<DisplayCall> {
        self.0.borrow().calls.clone()
    }
}

impl DisplayControl for RecordingDisplay {
    fn screen_width(&self) -> Result<f32> {
        self.0
            .borrow()
            .width
            .ok_or_else(|| Error::DisplayMetrics("no width".to_string()))
    }

    fn set_temporary_brightness(&mut self, value: i32) -> Result<()> {
        self.0.borrow_mut().calls.push(DisplayCall::Brightness(value));
        Ok(())
    }

    fn set_temporary_auto_adjustment(&mut self, adjustment: f32) -> Result<()> {
        self.0.borrow_mut().calls.push(DisplayCall::AutoAdjustment(adjustment));
        Ok(())
    }
}

#[derive(Default)]
struct HostState {
    haptics: usize,
    flings: usize,
}

#[derive(Clone, Default)]
pub struct RecordingHost(Rc<RefCell<HostState>>);

impl RecordingHost {
    pub fn haptics(&self) -> usize {
        self.0.borrow().haptics
    }

    pub fn flings(&self) -> usize {
        self.0.borrow().flings
    }
}

impl GestureHost for RecordingHost {
    fn perform_haptic_feedback(&mut self) {
        self.0.borrow_mut().haptics += 1;
    }

    fn fling_panel(&mut self) {
        self.0.borrow_mut().flings += 1;
    }
}

/// Settings store kept in memory
#[derive(Default)]
pub struct MemoryStore {
    writes: Mutex<Vec<SettingWrite>>,
    first_write_delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    /// The first write sleeps before it is recorded
    pub fn with_first_write_delay(delay: Duration) -> Self {
        Self {
            first_write_delay: Mutex::new(Some(delay)),
            ..Self::default()
        }
    }

    pub fn writes(&self) -> Vec<SettingWrite> {
        self.writes.lock().unwrap().clone()
    }
}

impl SettingsStore for MemoryStore {
    fn write(&self, write: SettingWrite) -> Result<()> {
        let delay = self.first_write_delay.lock().unwrap().take();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.writes.lock().unwrap().push(write);
        Ok(())
    }

    fn read_int(&self, _key: &str) -> Result<Option<i64>> {
        Ok(None)
    }
}
