//! Cumulative byte counters
//!
//! Providers are ranked. They are probed once, in order, and the first that
//! works is cached for the session. If the cached provider fails a read, the
//! lower-ranked ones are asked for that read only.
//!
//! - `InterfaceCounters`: per-interface sysfs statistics for interfaces that
//!   are up, carry a default route, and aren't loopback or VPN
//! - `GlobalCounters`: everything in `/proc/net/dev` except loopback

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Snapshot of the received byte counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputSample {
    pub cumulative_bytes: u64,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCounters {
    pub rx: u64,
    pub tx: u64,
}

impl ByteCounters {
    fn add(&mut self, other: ByteCounters) {
        self.rx = self.rx.saturating_add(other.rx);
        self.tx = self.tx.saturating_add(other.tx);
    }
}

/// Rough interface classification by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    Loopback,
    Vpn,
    Mobile,
    Wireless,
    Other,
}

pub fn classify_interface(name: &str) -> InterfaceKind {
    const VPN: &[&str] = &["tun", "tap", "wg", "ipsec"];
    const MOBILE: &[&str] = &["rmnet", "ccmni", "wwan", "rev_rmnet"];
    const WIRELESS: &[&str] = &["wlan", "wlp", "wl"];

    if name == "lo" {
        InterfaceKind::Loopback
    } else if VPN.iter().any(|p| name.starts_with(p)) {
        InterfaceKind::Vpn
    } else if MOBILE.iter().any(|p| name.starts_with(p)) {
        InterfaceKind::Mobile
    } else if WIRELESS.iter().any(|p| name.starts_with(p)) {
        InterfaceKind::Wireless
    } else {
        InterfaceKind::Other
    }
}

/// A way of reading cumulative counters
pub trait CounterProvider {
    fn name(&self) -> &'static str;

    /// Can this provider be used on this system?
    fn probe(&mut self) -> bool;

    fn read(&mut self) -> Result<ByteCounters>;
}

/// Per-interface counters from `/sys/class/net`
pub struct InterfaceCounters {
    net_root: PathBuf,
    route_table: PathBuf,
}

impl Default for InterfaceCounters {
    fn default() -> Self {
        Self::with_paths("/sys/class/net", "/proc/net/route")
    }
}

impl InterfaceCounters {
    pub fn with_paths(net_root: impl Into<PathBuf>, route_table: impl Into<PathBuf>) -> Self {
        Self {
            net_root: net_root.into(),
            route_table: route_table.into(),
        }
    }

    /// Interfaces holding a default route, or None if the table can't be read
    fn default_route_interfaces(&self) -> Option<HashSet<String>> {
        let table = fs::read_to_string(&self.route_table).ok()?;
        Some(
            table
                .lines()
                .skip(1)
                .filter_map(|line| {
                    let fields: Vec<&str> = line.split_whitespace().collect();
                    // Iface Destination Gateway Flags RefCnt Use Metric Mask ...
                    match (fields.first(), fields.get(1), fields.get(7)) {
                        (Some(iface), Some(&"00000000"), Some(&"00000000")) => Some(iface.to_string()),
                        _ => None,
                    }
                })
                .collect(),
        )
    }

    fn is_up(&self, iface: &str) -> bool {
        // Mobile data interfaces often report "unknown"
        fs::read_to_string(self.net_root.join(iface).join("operstate"))
            .map(|s| matches!(s.trim(), "up" | "unknown"))
            .unwrap_or(false)
    }

    /// Interfaces whose traffic is counted
    pub fn counted_interfaces(&self) -> Result<Vec<String>> {
        let defaults = self.default_route_interfaces();
        let mut counted: Vec<String> = fs::read_dir(&self.net_root)?
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| {
                !matches!(classify_interface(name), InterfaceKind::Loopback | InterfaceKind::Vpn)
            })
            .filter(|name| defaults.as_ref().map(|d| d.contains(name)).unwrap_or(true))
            .filter(|name| self.is_up(name))
            .collect();
        counted.sort();
        Ok(counted)
    }

    fn read_stat(&self, iface: &str, stat: &str) -> Result<u64> {
        let path = self.net_root.join(iface).join("statistics").join(stat);
        let raw = fs::read_to_string(&path)?;
        raw.trim()
            .parse()
            .map_err(|_| Error::Counters(format!("{}: unparseable {:?}", path.display(), raw.trim())))
    }
}

impl CounterProvider for InterfaceCounters {
    fn name(&self) -> &'static str {
        "interface"
    }

    fn probe(&mut self) -> bool {
        self.net_root.is_dir()
    }

    fn read(&mut self) -> Result<ByteCounters> {
        let mut total = ByteCounters::default();
        for iface in self.counted_interfaces()? {
            match (self.read_stat(&iface, "rx_bytes"), self.read_stat(&iface, "tx_bytes")) {
                (Ok(rx), Ok(tx)) => {
                    tracing::trace!(%iface, rx, tx, "interface counters");
                    total.add(ByteCounters { rx, tx });
                }
                // The interface can disappear between listing and reading
                (Err(e), _) | (_, Err(e)) => {
                    tracing::debug!(%iface, error = %e, "skipping interface");
                }
            }
        }
        Ok(total)
    }
}

/// OS-wide counters from `/proc/net/dev`
pub struct GlobalCounters {
    path: PathBuf,
}

impl Default for GlobalCounters {
    fn default() -> Self {
        Self::with_path("/proc/net/dev")
    }
}

impl GlobalCounters {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parse(path: &Path, contents: &str) -> Result<ByteCounters> {
        let mut total = ByteCounters::default();
        // Two header lines, then "iface: rx_bytes rx_packets ... tx_bytes ..."
        for line in contents.lines().skip(2) {
            let Some((iface, stats)) = line.split_once(':') else {
                continue;
            };
            if classify_interface(iface.trim()) == InterfaceKind::Loopback {
                continue;
            }
            let fields: Vec<&str> = stats.split_whitespace().collect();
            let rx = fields.first().and_then(|s| s.parse::<u64>().ok());
            let tx = fields.get(8).and_then(|s| s.parse::<u64>().ok());
            match (rx, tx) {
                (Some(rx), Some(tx)) => total.add(ByteCounters { rx, tx }),
                _ => {
                    return Err(Error::Counters(format!(
                        "{}: malformed row for {}",
                        path.display(),
                        iface.trim()
                    )))
                }
            }
        }
        Ok(total)
    }
}

impl CounterProvider for GlobalCounters {
    fn name(&self) -> &'static str {
        "global"
    }

    fn probe(&mut self) -> bool {
        self.read().is_ok()
    }

    fn read(&mut self) -> Result<ByteCounters> {
        let contents = fs::read_to_string(&self.path)?;
        Self::parse(&self.path, &contents)
    }
}

/// Ranked provider list with the probed choice cached
pub struct SampleSource {
    providers: Vec<Box<dyn CounterProvider>>,
    selected: Option<usize>,
}

impl SampleSource {
    pub fn new(mut providers: Vec<Box<dyn CounterProvider>>) -> Self {
        let selected = providers.iter_mut().position(|p| p.probe());
        match selected {
            Some(index) => {
                tracing::info!(provider = providers[index].name(), "Traffic counter provider selected");
            }
            None => tracing::warn!("No traffic counter provider available"),
        }
        Self { providers, selected }
    }

    /// Interface statistics first, `/proc/net/dev` as the fallback
    pub fn system() -> Self {
        Self::new(vec![
            Box::new(InterfaceCounters::default()),
            Box::new(GlobalCounters::default()),
        ])
    }

    pub fn selected_name(&self) -> Option<&'static str> {
        self.selected.map(|i| self.providers[i].name())
    }

    pub fn read(&mut self) -> Result<ByteCounters> {
        let start = self.selected.ok_or(Error::NoCounterProvider)?;
        let mut last_error = None;
        for provider in self.providers[start..].iter_mut() {
            match provider.read() {
                Ok(counters) => return Ok(counters),
                Err(e) => {
                    tracing::debug!(provider = provider.name(), error = %e, "counter read failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(Error::NoCounterProvider))
    }

    /// Received-bytes sample stamped with `now_ms`
    pub fn sample(&mut self, now_ms: u64) -> Result<ThroughputSample> {
        let counters = self.read()?;
        Ok(ThroughputSample {
            cumulative_bytes: counters.rx,
            timestamp_ms: now_ms,
        })
    }
}
