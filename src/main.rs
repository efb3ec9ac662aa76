//! Flick status bar - brightness gesture and traffic meter
//!
//! Reads host input as newline-delimited JSON on stdin, one touch event or
//! signal per line, and prints the traffic readout to stdout when it changes.
//!
//! ```text
//! {"signal":"preferences_changed","values":{"dt_mode":"SIMPLE"}}
//! {"action":"down","x":540,"y":12}
//! ```

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use calloop::channel::{self, Event};
use calloop::EventLoop;
use clap::Parser;
use tracing::info;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flick_statusbar::brightness::{
    GestureBrightnessController, GestureHost, JsonSettingsStore, SettingsWriter, SysfsDisplay,
};
use flick_statusbar::config::{state_dir, StatusBarConfig};
use flick_statusbar::signals::SignalBus;
use flick_statusbar::traffic::{MeterView, SampleSource, TrafficMeter};
use flick_statusbar::{HostInput, StatusBar};

#[derive(Parser, Debug)]
#[command(name = "flick-statusbar")]
#[command(about = "Flick status bar brightness gesture and traffic meter", long_about = None)]
struct Args {
    /// Enable verbose debug output
    #[arg(short, long)]
    debug: bool,

    /// Preferences file (default: ~/.local/state/flick/statusbar_config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log brightness changes instead of writing the backlight
    #[arg(long)]
    dry_run: bool,

    /// Screen width in pixels, instead of reading the framebuffer
    #[arg(long)]
    screen_width: Option<f32>,
}

/// Prints the readout on its own line
struct ConsoleView {
    text: String,
    visible: bool,
}

impl ConsoleView {
    fn print(&self) {
        let line = if self.visible { self.text.replace('\n', " ") } else { String::new() };
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", line);
        let _ = stdout.flush();
    }
}

impl MeterView for ConsoleView {
    fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
        self.print();
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.print();
    }

    fn set_text_size(&mut self, size_dp: u32) {
        tracing::debug!(size_dp, "meter text size");
    }
}

/// No haptics or panel here; just log
struct LoggingHost;

impl GestureHost for LoggingHost {
    fn perform_haptic_feedback(&mut self) {
        tracing::debug!("haptic feedback");
    }

    fn fling_panel(&mut self) {
        info!("Collapsing status bar panel");
    }
}

fn main() -> Result<()> {
    // Set up panic hook to log panics before crashing
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC: {}", panic_info);
        let crash_log = state_dir().join("crash.log");
        if let Ok(mut f) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&crash_log)
        {
            let _ = writeln!(f, "[{}] PANIC: {}", chrono::Local::now(), panic_info);
        }
    }));

    let log_dir = state_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let args = Args::parse();

    let file_appender = rolling::daily(&log_dir, "statusbar.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let default_filter = if args.debug {
        "debug"
    } else {
        "warn,flick_statusbar=info"
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    info!(log_path = %log_dir.display(), "Flick status bar starting");

    let config = match &args.config {
        Some(path) => StatusBarConfig::load_from(path),
        None => StatusBarConfig::load(),
    };

    let mut event_loop: EventLoop<'static, StatusBar> =
        EventLoop::try_new().context("Failed to create event loop")?;

    let settings = Arc::new(JsonSettingsStore::new(JsonSettingsStore::default_path()));
    let automatic = settings.is_automatic_mode();
    let display = SysfsDisplay::new(config.brightness.max_brightness, args.screen_width, args.dry_run);
    let brightness = GestureBrightnessController::new(
        config.brightness.clone(),
        automatic,
        Box::new(display),
        Box::new(LoggingHost),
        SettingsWriter::background(settings),
    );

    let view = ConsoleView {
        text: String::new(),
        visible: false,
    };
    let traffic = TrafficMeter::new(config.traffic.clone(), SampleSource::system(), Box::new(view));

    let bus = SignalBus::new();
    let mut status_bar = StatusBar::new(event_loop.handle(), bus, traffic, brightness);
    status_bar.attach()?;

    // Host input arrives on a reader thread and is handed to the loop
    let (input_tx, input_rx) = channel::channel::<HostInput>();
    std::thread::Builder::new()
        .name("host-input".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read host input");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<HostInput>(&line) {
                    Ok(input) => {
                        if input_tx.send(input).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, line = %line, "Ignoring malformed host input"),
                }
            }
        })
        .context("Failed to spawn host input reader")?;

    event_loop
        .handle()
        .insert_source(input_rx, |event, _, state: &mut StatusBar| match event {
            Event::Msg(input) => state.handle_input(input),
            Event::Closed => info!("Host input closed"),
        })
        .map_err(|e| anyhow::anyhow!("Failed to register host input: {}", e.error))?;

    loop {
        if let Err(e) = event_loop.dispatch(Some(Duration::from_millis(500)), &mut status_bar) {
            tracing::error!("Event loop error: {:?}", e);
            break;
        }
    }

    status_bar.detach();
    Ok(())
}
