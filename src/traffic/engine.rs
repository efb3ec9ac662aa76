//! Periodic rate sampling
//!
//! ```text
//!   Stopped --start--> Sampling --idle after burst--> SummaryHold
//!      ^                  |  ^                            |
//!      +------stop--------+  +----hold lapsed/traffic-----+
//! ```
//!
//! Each tick takes a sample, turns the byte delta into a rate using the
//! real elapsed time, and updates the readout. With an inactivity policy
//! that hides on zero traffic, the first idle tick after a burst can show
//! the burst's total for a while before the meter hides.

use std::time::Duration;

use crate::config::InactivityPolicy;
use crate::timers::{TimerId, TimerKind, TimerQueue};
use crate::traffic::format::TrafficFormatter;
use crate::traffic::sampler::{SampleSource, ThroughputSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Sampling,
    /// Sampling, with a burst summary on screen
    SummaryHold,
}

/// What the meter view should show
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Readout {
    pub text: String,
    pub visible: bool,
}

/// Start of the traffic burst currently being accumulated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstWindow {
    pub start_timestamp_ms: u64,
    pub start_cumulative_bytes: u64,
}

pub struct RateSamplingEngine {
    interval: Duration,
    policy: InactivityPolicy,
    formatter: TrafficFormatter,
    sampling: bool,
    /// Baseline for the next delta
    last: Option<ThroughputSample>,
    burst: Option<BurstWindow>,
    /// Last tick saw no traffic under a hiding policy
    idle: bool,
    tick_timer: Option<TimerId>,
    hold_timer: Option<TimerId>,
    last_rate: Option<u64>,
    readout: Readout,
}

impl RateSamplingEngine {
    pub fn new(interval: Duration, policy: InactivityPolicy, formatter: TrafficFormatter) -> Self {
        Self {
            interval,
            policy,
            formatter,
            sampling: false,
            last: None,
            burst: None,
            idle: false,
            tick_timer: None,
            hold_timer: None,
            last_rate: None,
            readout: Readout::default(),
        }
    }

    pub fn state(&self) -> EngineState {
        match (self.sampling, self.hold_timer) {
            (false, _) => EngineState::Stopped,
            (true, Some(_)) => EngineState::SummaryHold,
            (true, None) => EngineState::Sampling,
        }
    }

    pub fn readout(&self) -> &Readout {
        &self.readout
    }

    pub fn burst(&self) -> Option<BurstWindow> {
        self.burst
    }

    pub fn baseline(&self) -> Option<ThroughputSample> {
        self.last
    }

    /// Bytes per second computed on the last active tick
    pub fn last_rate(&self) -> Option<u64> {
        self.last_rate
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn set_formatter(&mut self, formatter: TrafficFormatter) {
        self.formatter = formatter;
    }

    pub fn set_policy(&mut self, policy: InactivityPolicy, timers: &mut dyn TimerQueue) {
        if self.policy == policy {
            return;
        }
        self.policy = policy;
        if policy.summary_duration().is_none() {
            self.burst = None;
            self.cancel_hold(timers);
        }
    }

    /// Take a fresh baseline and schedule the first tick. Calling this while
    /// already sampling replaces the pending tick.
    pub fn start(&mut self, now_ms: u64, source: &mut SampleSource, timers: &mut dyn TimerQueue) {
        self.cancel_tick(timers);
        self.cancel_hold(timers);

        self.last = match source.sample(now_ms) {
            Ok(sample) => Some(sample),
            Err(e) => {
                tracing::warn!(error = %e, "Initial traffic sample failed");
                None
            }
        };
        self.burst = None;
        self.idle = false;
        self.sampling = true;
        self.readout.visible = true;
        self.schedule_tick(timers);
        tracing::debug!(interval_ms = self.interval.as_millis() as u64, "traffic updates started");
    }

    /// Cancel all timers and clear the readout
    pub fn stop(&mut self, timers: &mut dyn TimerQueue) {
        self.cancel_tick(timers);
        self.cancel_hold(timers);
        self.sampling = false;
        self.burst = None;
        self.idle = false;
        self.readout = Readout::default();
        tracing::debug!("traffic updates stopped");
    }

    pub fn on_tick(
        &mut self,
        id: TimerId,
        now_ms: u64,
        source: &mut SampleSource,
        timers: &mut dyn TimerQueue,
    ) {
        if self.tick_timer != Some(id) {
            tracing::trace!("stale meter tick ignored");
            return;
        }
        self.tick_timer = None;
        if !self.sampling {
            return;
        }

        match source.sample(now_ms) {
            Ok(sample) => self.process(sample, timers),
            Err(e) => tracing::warn!(error = %e, "Traffic sample failed, skipping tick"),
        }

        self.schedule_tick(timers);
    }

    pub fn on_hold_expired(&mut self, id: TimerId) {
        if self.hold_timer != Some(id) {
            return;
        }
        self.hold_timer = None;
        if self.sampling && self.idle {
            self.readout.text.clear();
            self.readout.visible = false;
        }
    }

    fn process(&mut self, sample: ThroughputSample, timers: &mut dyn TimerQueue) {
        let Some(last) = self.last else {
            // Initial sample failed; this one becomes the baseline
            self.last = Some(sample);
            return;
        };

        let elapsed_ms = sample.timestamp_ms.saturating_sub(last.timestamp_ms);
        // A counter going backwards means the interface was reset
        let (delta, disconnected) = match sample.cumulative_bytes.checked_sub(last.cumulative_bytes) {
            Some(delta) => (delta, false),
            None => (0, true),
        };
        if disconnected {
            tracing::debug!(
                previous = last.cumulative_bytes,
                current = sample.cumulative_bytes,
                "traffic counter went backwards"
            );
        }

        let hides = self.policy.hides_on_zero();
        self.idle = hides && delta == 0;

        if self.idle {
            if let (Some(burst), Some(hold)) = (self.burst, self.policy.summary_duration()) {
                let end = if disconnected { last.cumulative_bytes } else { sample.cumulative_bytes };
                let total = end.saturating_sub(burst.start_cumulative_bytes);
                self.burst = None;
                if total > 0 {
                    tracing::debug!(
                        bytes = total,
                        secs = sample.timestamp_ms.saturating_sub(burst.start_timestamp_ms) / 1000,
                        "traffic burst ended"
                    );
                    self.readout.text = self.formatter.total(total);
                    self.readout.visible = true;
                    self.arm_hold(hold, timers);
                }
            }
        } else {
            if delta > 0 {
                if self.policy.summary_duration().is_some() && self.burst.is_none() {
                    // Opens at the previous sample, so the burst's first interval is included
                    self.burst = Some(BurstWindow {
                        start_timestamp_ms: last.timestamp_ms,
                        start_cumulative_bytes: last.cumulative_bytes,
                    });
                }
                self.cancel_hold(timers);
            }
            // with no time elapsed the previous rate stays on screen
            if elapsed_ms > 0 {
                let rate = delta.saturating_mul(1000) / elapsed_ms;
                self.last_rate = Some(rate);
                self.readout.text = self.formatter.rate(rate);
            }
        }

        if self.idle {
            if self.hold_timer.is_none() {
                self.readout.text.clear();
                self.readout.visible = false;
            }
        } else {
            self.readout.visible = true;
        }

        self.last = Some(ThroughputSample {
            cumulative_bytes: if disconnected { last.cumulative_bytes } else { sample.cumulative_bytes },
            timestamp_ms: sample.timestamp_ms,
        });
    }

    fn schedule_tick(&mut self, timers: &mut dyn TimerQueue) {
        self.tick_timer = match timers.schedule(TimerKind::MeterTick, self.interval) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(error = %e, "Failed to schedule traffic meter tick");
                None
            }
        };
    }

    fn arm_hold(&mut self, hold: Duration, timers: &mut dyn TimerQueue) {
        self.cancel_hold(timers);
        self.hold_timer = match timers.schedule(TimerKind::SummaryHold, hold) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to schedule burst summary hold");
                None
            }
        };
    }

    fn cancel_tick(&mut self, timers: &mut dyn TimerQueue) {
        if let Some(id) = self.tick_timer.take() {
            timers.cancel(id);
        }
    }

    fn cancel_hold(&mut self, timers: &mut dyn TimerQueue) {
        if let Some(id) = self.hold_timer.take() {
            timers.cancel(id);
        }
    }
}
