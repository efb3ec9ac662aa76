//! Signal bus
//!
//! Discrete host events (preference changes, screen power, connectivity,
//! download and progress state) fan out to subscribers over calloop channels.
//! A subscriber's channel is inserted into the event loop while it is
//! attached; unsubscribing drops the sender so nothing is delivered after
//! teardown.

use std::sync::{Arc, Mutex};

use calloop::channel::{self, Channel, Sender};
use serde::{Deserialize, Serialize};

use crate::config::PreferenceChange;

/// Status bar presentation state reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarState {
    #[default]
    Shade,
    Keyguard,
    ShadeLocked,
}

/// A host event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    PreferencesChanged { values: PreferenceChange },
    ScreenOn,
    ScreenOff,
    ConnectivityChanged,
    MobileData { connected: bool },
    DownloadState { active: bool },
    ProgressTracking { active: bool },
    BarStateChanged { state: BarState },
    SystemIconsHidden { hidden: bool },
    HeadsUp { visible: bool },
    BrightnessMode { automatic: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A live subscription. Insert `channel` into the event loop to receive.
pub struct Subscription {
    pub id: SubscriptionId,
    pub channel: Channel<Signal>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Sender<Signal>)>,
}

/// Publish/subscribe mediator. Clones share the same subscriber list, so a
/// publisher on another thread can hold its own handle.
#[derive(Clone, Default)]
pub struct SignalBus {
    inner: Arc<Mutex<BusInner>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (sender, channel) = channel::channel();
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.subscribers.push((id, sender));
        tracing::debug!(id = id.0, "signal bus subscription added");
        Subscription { id, channel }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.lock();
        inner.subscribers.retain(|(sub, _)| *sub != id);
        tracing::debug!(id = id.0, "signal bus subscription removed");
    }

    /// Deliver to every subscriber; returns how many accepted it.
    /// Subscribers whose channel has been dropped are pruned.
    pub fn publish(&self, signal: Signal) -> usize {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner
            .subscribers
            .retain(|(_, sender)| sender.send(signal.clone()).is_ok());
        let delivered = inner.subscribers.len();
        if delivered < before {
            tracing::debug!(pruned = before - delivered, "dropped closed signal subscribers");
        }
        tracing::trace!(?signal, delivered, "signal published");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        // A panic while holding the lock leaves the list intact
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
