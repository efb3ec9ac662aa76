//! Flick status bar controllers
//!
//! Two controllers that live in the status bar:
//! - a brightness gesture: slide along the bar to set screen brightness
//! - a network traffic meter showing the current download rate
//!
//! Both run on a single calloop event loop owned by [`host::StatusBar`].
//! Host events reach them through the [`signals::SignalBus`].

pub mod brightness;
pub mod config;
pub mod error;
pub mod host;
pub mod signals;
pub mod timers;
pub mod traffic;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{Error, Result};
pub use host::{HostInput, StatusBar};
