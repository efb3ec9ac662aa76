//! Timer scheduling on the host event loop
//!
//! Every delayed action in the controllers is a one-shot timer:
//! - the traffic meter's sampling tick
//! - the burst summary hold
//! - the brightness long-press arm
//!
//! Controllers remember the `TimerId` they are waiting for and drop firings
//! for any other id, so a timer replaced by `start()` can never be acted on.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use calloop::timer::{TimeoutAction, Timer};
use calloop::{LoopHandle, RegistrationToken};

use crate::error::{Error, Result};

/// What a timer is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    MeterTick,
    SummaryHold,
    LongPress,
}

/// Handle for a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) u64);

/// Single-shot, cancelable delayed callbacks on the controllers' loop
pub trait TimerQueue {
    fn schedule(&mut self, kind: TimerKind, after: Duration) -> Result<TimerId>;

    /// Cancel a pending timer. Unknown or already fired ids are ignored.
    fn cancel(&mut self, id: TimerId);
}

/// Receiver of timer firings (the loop's shared state)
pub trait TimerTarget {
    fn fire_timer(&mut self, id: TimerId, kind: TimerKind);
}

/// calloop-backed timer queue
pub struct LoopTimers<D: 'static> {
    handle: LoopHandle<'static, D>,
    next_id: u64,
    pending: HashMap<TimerId, RegistrationToken>,
}

impl<D: TimerTarget + 'static> LoopTimers<D> {
    pub fn new(handle: LoopHandle<'static, D>) -> Self {
        Self {
            handle,
            next_id: 0,
            pending: HashMap::new(),
        }
    }

    /// Drop bookkeeping for a timer that just fired.
    pub fn forget(&mut self, id: TimerId) {
        self.pending.remove(&id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Cancel everything still pending.
    pub fn cancel_all(&mut self) {
        for (_, token) in self.pending.drain() {
            self.handle.remove(token);
        }
    }
}

impl<D: TimerTarget + 'static> TimerQueue for LoopTimers<D> {
    fn schedule(&mut self, kind: TimerKind, after: Duration) -> Result<TimerId> {
        self.next_id += 1;
        let id = TimerId(self.next_id);

        let token = self
            .handle
            .insert_source(Timer::from_duration(after), move |_deadline, _, data: &mut D| {
                data.fire_timer(id, kind);
                TimeoutAction::Drop
            })
            .map_err(|e| Error::EventLoop(e.error.to_string()))?;

        self.pending.insert(id, token);
        tracing::trace!(?kind, id = id.0, after_ms = after.as_millis() as u64, "timer scheduled");
        Ok(id)
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(token) = self.pending.remove(&id) {
            self.handle.remove(token);
            tracing::trace!(id = id.0, "timer cancelled");
        }
    }
}

/// Millisecond timestamps relative to process start
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calloop::EventLoop;

    #[derive(Default)]
    struct Recorder {
        fired: Vec<(TimerId, TimerKind)>,
    }

    impl TimerTarget for Recorder {
        fn fire_timer(&mut self, id: TimerId, kind: TimerKind) {
            self.fired.push((id, kind));
        }
    }

    #[test]
    fn test_timer_fires_once() {
        let mut event_loop: EventLoop<'static, Recorder> = EventLoop::try_new().unwrap();
        let mut timers = LoopTimers::new(event_loop.handle());
        let id = timers.schedule(TimerKind::MeterTick, Duration::ZERO).unwrap();

        let mut recorder = Recorder::default();
        event_loop
            .dispatch(Some(Duration::from_millis(50)), &mut recorder)
            .unwrap();
        event_loop
            .dispatch(Some(Duration::from_millis(10)), &mut recorder)
            .unwrap();

        assert_eq!(recorder.fired, vec![(id, TimerKind::MeterTick)]);
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let mut event_loop: EventLoop<'static, Recorder> = EventLoop::try_new().unwrap();
        let mut timers = LoopTimers::new(event_loop.handle());
        let kept = timers.schedule(TimerKind::MeterTick, Duration::ZERO).unwrap();
        let dropped = timers.schedule(TimerKind::LongPress, Duration::ZERO).unwrap();
        timers.cancel(dropped);
        assert_eq!(timers.pending_count(), 1);

        let mut recorder = Recorder::default();
        event_loop
            .dispatch(Some(Duration::from_millis(50)), &mut recorder)
            .unwrap();

        assert_eq!(recorder.fired, vec![(kept, TimerKind::MeterTick)]);
    }

    #[test]
    fn test_cancel_all() {
        let mut event_loop: EventLoop<'static, Recorder> = EventLoop::try_new().unwrap();
        let mut timers = LoopTimers::new(event_loop.handle());
        timers.schedule(TimerKind::MeterTick, Duration::ZERO).unwrap();
        timers.schedule(TimerKind::SummaryHold, Duration::ZERO).unwrap();
        timers.cancel_all();

        let mut recorder = Recorder::default();
        event_loop
            .dispatch(Some(Duration::from_millis(20)), &mut recorder)
            .unwrap();

        assert!(recorder.fired.is_empty());
        assert_eq!(timers.pending_count(), 0);
    }
}
