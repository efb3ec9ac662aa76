//! Status bar runtime
//!
//! `StatusBar` is the event loop's shared state. It owns both controllers,
//! the timer queue and the signal bus subscription, and routes timer
//! firings, signals and touches to the right controller.

use calloop::channel;
use calloop::{LoopHandle, RegistrationToken};
use serde::{Deserialize, Serialize};

use crate::brightness::gesture::{GestureBrightnessController, TouchEvent};
use crate::error::{Error, Result};
use crate::signals::{Signal, SignalBus, SubscriptionId};
use crate::timers::{LoopTimers, MonotonicClock, TimerId, TimerKind, TimerTarget};
use crate::traffic::meter::TrafficMeter;

/// One line of host input: a touch sample or a signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostInput {
    Touch(TouchEvent),
    Signal(Signal),
}

pub struct StatusBar {
    traffic: TrafficMeter,
    brightness: GestureBrightnessController,
    timers: LoopTimers<StatusBar>,
    handle: LoopHandle<'static, StatusBar>,
    bus: SignalBus,
    subscription: Option<(SubscriptionId, RegistrationToken)>,
    clock: MonotonicClock,
}

impl StatusBar {
    pub fn new(
        handle: LoopHandle<'static, StatusBar>,
        bus: SignalBus,
        traffic: TrafficMeter,
        brightness: GestureBrightnessController,
    ) -> Self {
        Self {
            traffic,
            brightness,
            timers: LoopTimers::new(handle.clone()),
            handle,
            bus,
            subscription: None,
            clock: MonotonicClock::new(),
        }
    }

    pub fn traffic(&self) -> &TrafficMeter {
        &self.traffic
    }

    pub fn brightness(&self) -> &GestureBrightnessController {
        &self.brightness
    }

    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.pending_count()
    }

    /// Subscribe to the bus and start the controllers
    pub fn attach(&mut self) -> Result<()> {
        if self.subscription.is_some() {
            return Ok(());
        }

        let subscription = self.bus.subscribe();
        let id = subscription.id;
        let token = match self
            .handle
            .insert_source(subscription.channel, |event, _, state: &mut StatusBar| {
                if let channel::Event::Msg(signal) = event {
                    state.handle_signal(&signal);
                }
            }) {
            Ok(token) => token,
            Err(e) => {
                self.bus.unsubscribe(id);
                return Err(Error::EventLoop(e.error.to_string()));
            }
        };
        self.subscription = Some((id, token));

        let now = self.clock.now_ms();
        self.traffic.attach(now, &mut self.timers);
        tracing::info!("Status bar controllers attached");
        Ok(())
    }

    /// Unsubscribe and cancel everything pending
    pub fn detach(&mut self) {
        if let Some((id, token)) = self.subscription.take() {
            self.handle.remove(token);
            self.bus.unsubscribe(id);
        }

        let now = self.clock.now_ms();
        self.traffic.detach(now, &mut self.timers);
        self.brightness.end_session(&mut self.timers);
        self.timers.cancel_all();
        tracing::info!("Status bar controllers detached");
    }

    pub fn handle_signal(&mut self, signal: &Signal) {
        tracing::debug!(?signal, "signal");
        let now = self.clock.now_ms();
        self.traffic.on_signal(signal, now, &mut self.timers);
        self.brightness.on_signal(signal, &mut self.timers);
    }

    pub fn on_touch(&mut self, event: &TouchEvent) {
        self.brightness.on_touch(event, &mut self.timers);
    }

    pub fn handle_input(&mut self, input: HostInput) {
        match input {
            HostInput::Touch(event) => self.on_touch(&event),
            HostInput::Signal(signal) => {
                self.bus.publish(signal);
            }
        }
    }
}

impl TimerTarget for StatusBar {
    fn fire_timer(&mut self, id: TimerId, kind: TimerKind) {
        self.timers.forget(id);
        let now = self.clock.now_ms();
        match kind {
            TimerKind::MeterTick => self.traffic.on_tick(id, now, &mut self.timers),
            TimerKind::SummaryHold => self.traffic.on_hold_expired(id),
            TimerKind::LongPress => self.brightness.on_long_press(id),
        }
    }
}
