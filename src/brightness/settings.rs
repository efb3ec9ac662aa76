//! Persisted display settings
//!
//! The gesture applies brightness immediately through `DisplayControl` and
//! persists it here off the event loop, on a single writer thread so the
//! last value dispatched is the last one saved. Values live in
//! `display_settings.json` next to Flick's other state files, which the
//! Settings app reads as well.

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};

use serde_json::{Map, Value};

use crate::config::state_dir;
use crate::error::{Error, Result};

pub mod setting_keys {
    pub const SCREEN_BRIGHTNESS: &str = "screen_brightness";
    pub const SCREEN_AUTO_BRIGHTNESS_ADJ: &str = "screen_auto_brightness_adj";
    pub const SCREEN_BRIGHTNESS_MODE: &str = "screen_brightness_mode";
}

/// `screen_brightness_mode` value for automatic brightness
pub const BRIGHTNESS_MODE_AUTOMATIC: i64 = 1;

/// One value to persist
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingWrite {
    Brightness(i32),
    AutoBrightnessAdjustment(f32),
}

impl SettingWrite {
    pub fn key(&self) -> &'static str {
        match self {
            SettingWrite::Brightness(_) => setting_keys::SCREEN_BRIGHTNESS,
            SettingWrite::AutoBrightnessAdjustment(_) => setting_keys::SCREEN_AUTO_BRIGHTNESS_ADJ,
        }
    }

    fn value(&self) -> Value {
        match self {
            SettingWrite::Brightness(v) => Value::from(*v),
            SettingWrite::AutoBrightnessAdjustment(v) => Value::from(*v as f64),
        }
    }
}

pub trait SettingsStore: Send + Sync {
    fn write(&self, write: SettingWrite) -> Result<()>;

    fn read_int(&self, key: &str) -> Result<Option<i64>>;
}

/// JSON object file, merge-written one key at a time
pub struct JsonSettingsStore {
    path: PathBuf,
    // Serializes read-modify-write between writer threads
    lock: Mutex<()>,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn default_path() -> PathBuf {
        state_dir().join("display_settings.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the persisted brightness mode is automatic
    pub fn is_automatic_mode(&self) -> bool {
        match self.read_int(setting_keys::SCREEN_BRIGHTNESS_MODE) {
            Ok(mode) => mode == Some(BRIGHTNESS_MODE_AUTOMATIC),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read brightness mode, assuming manual");
                false
            }
        }
    }

    fn load_object(&self) -> Result<Map<String, Value>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Value>(&contents)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::Settings(format!(
                "{} is not a JSON object: {}",
                self.path.display(),
                other
            ))),
        }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn write(&self, write: SettingWrite) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut settings = self.load_object().unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "Replacing unreadable display settings");
            Map::new()
        });
        settings.insert(write.key().to_string(), write.value());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&Value::Object(settings))?;
        std::fs::write(&self.path, contents)?;
        tracing::debug!(key = write.key(), "display setting saved");
        Ok(())
    }

    fn read_int(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.load_object()?.get(key).and_then(Value::as_i64))
    }
}

/// Hands writes to the store without blocking the caller
#[derive(Clone)]
pub struct SettingsWriter {
    target: WriteTarget,
}

#[derive(Clone)]
enum WriteTarget {
    Inline(Arc<dyn SettingsStore>),
    Queue(mpsc::Sender<SettingWrite>),
}

impl SettingsWriter {
    /// Writes are queued to one `settings-write` thread and persisted in order
    pub fn background(store: Arc<dyn SettingsStore>) -> Self {
        let (tx, rx) = mpsc::channel();
        let worker_store = Arc::clone(&store);
        let spawned = std::thread::Builder::new()
            .name("settings-write".to_string())
            .spawn(move || run_writer(worker_store.as_ref(), rx));
        match spawned {
            Ok(_) => Self { target: WriteTarget::Queue(tx) },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to spawn settings writer, writing inline");
                Self::inline(store)
            }
        }
    }

    /// Writes run on the calling thread
    pub fn inline(store: Arc<dyn SettingsStore>) -> Self {
        Self { target: WriteTarget::Inline(store) }
    }

    pub fn dispatch(&self, write: SettingWrite) {
        match &self.target {
            WriteTarget::Inline(store) => persist(store.as_ref(), write),
            WriteTarget::Queue(tx) => {
                if tx.send(write).is_err() {
                    tracing::warn!(?write, "Settings writer has stopped, dropping write");
                }
            }
        }
    }
}

/// Runs until every `SettingsWriter` is dropped
fn run_writer(store: &dyn SettingsStore, rx: mpsc::Receiver<SettingWrite>) {
    while let Ok(first) = rx.recv() {
        let mut batch = vec![first];
        batch.extend(rx.try_iter());
        for write in coalesce(batch) {
            persist(store, write);
        }
    }
    tracing::debug!("settings writer finished");
}

/// Keep only the newest write per key, in the order the survivors were queued
fn coalesce(batch: Vec<SettingWrite>) -> Vec<SettingWrite> {
    let mut latest: Vec<SettingWrite> = Vec::with_capacity(batch.len());
    for write in batch {
        latest.retain(|queued| queued.key() != write.key());
        latest.push(write);
    }
    latest
}

fn persist(store: &dyn SettingsStore, write: SettingWrite) {
    if let Err(e) = store.write(write) {
        tracing::warn!(?write, error = %e, "Failed to persist display setting");
    }
}
