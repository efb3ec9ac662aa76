//! Meter visibility decision
//!
//! `should_run` is a pure AND over the current signal bundle. The state
//! machine only remembers the last decision so callers can act on edges.

use crate::config::MeterMode;

/// Independent inputs that decide whether the meter runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterVisibilitySignals {
    pub attached: bool,
    pub screen_on: bool,
    pub hidden_by_policy: bool,
    pub hidden_by_transient_overlay: bool,
    pub download_active: bool,
    pub progress_tracking: bool,
    pub mobile_data_connected: bool,
}

impl Default for MeterVisibilitySignals {
    fn default() -> Self {
        Self {
            attached: false,
            screen_on: true,
            hidden_by_policy: false,
            hidden_by_transient_overlay: false,
            download_active: false,
            progress_tracking: false,
            mobile_data_connected: false,
        }
    }
}

pub fn should_run(signals: &MeterVisibilitySignals, mode: MeterMode, mobile_data_only: bool) -> bool {
    let mut run = signals.attached
        && signals.screen_on
        && !signals.hidden_by_policy
        && !signals.hidden_by_transient_overlay;

    match mode {
        MeterMode::Always => {}
        MeterMode::DownloadGated => run &= signals.download_active,
        MeterMode::ProgressGated => run &= signals.progress_tracking,
    }

    if mobile_data_only {
        run &= signals.mobile_data_connected;
    }

    run
}

/// Edge produced by a re-evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Stop,
}

#[derive(Debug, Default)]
pub struct VisibilityStateMachine {
    running: bool,
}

impl VisibilityStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Recompute from the full bundle; returns the edge, if any
    pub fn evaluate(
        &mut self,
        signals: &MeterVisibilitySignals,
        mode: MeterMode,
        mobile_data_only: bool,
    ) -> Option<Transition> {
        let run = should_run(signals, mode, mobile_data_only);
        let transition = match (self.running, run) {
            (false, true) => Some(Transition::Start),
            (true, false) => Some(Transition::Stop),
            _ => None,
        };
        self.running = run;
        transition
    }
}
