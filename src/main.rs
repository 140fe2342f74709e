//! Process sentinel entry point: wires the shared state together, starts
//! the scheduler thread, and blocks until a shutdown signal arrives.

mod constants;
mod logic;
mod platform;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use logic::config::ConfigManager;
use logic::cooldown::CooldownTable;
use logic::history::HistoryStore;
use logic::logwriter::LogWriter;
use logic::monitor::{Monitor, RuntimeFlags, SysinfoView};
use logic::notifier::{LogNotifier, Notifier};
use logic::shutdown::Shutdown;
use logic::terminate::{NativeKiller, Terminator};

use constants::{SUSPICIOUS_ALERT_COOLDOWN, VERSION};

/// Config and log live next to the executable; fall back to the working
/// directory when the executable path is not resolvable.
fn working_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting process sentinel v{}...", VERSION);

    let dir = working_dir();
    let shutdown = Arc::new(Shutdown::new());
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let log = Arc::new(LogWriter::new(&dir, notifier.clone(), shutdown.clone()));
    let config = Arc::new(ConfigManager::new(&dir, log.clone(), notifier.clone()));
    let history = Arc::new(HistoryStore::new());
    let cooldowns = Arc::new(CooldownTable::new(SUSPICIOUS_ALERT_COOLDOWN));

    let flags = Arc::new(RuntimeFlags::new(
        config.snapshot().start_monitoring_on_launch,
    ));
    log.line(&format!(
        "Process Monitor started. Monitoring is {}.",
        if flags.monitoring() { "ON" } else { "OFF" }
    ));

    let terminator = Terminator::new(
        Box::new(NativeKiller),
        notifier.clone(),
        log.clone(),
        history.clone(),
    );
    let mut monitor = Monitor::new(
        Box::new(SysinfoView::new()),
        Box::new(platform::NativeWindowProbe),
        terminator,
        config,
        history,
        log.clone(),
        cooldowns,
        notifier,
        shutdown.clone(),
        flags,
    );

    let scheduler = std::thread::Builder::new()
        .name("scheduler".to_string())
        .spawn(move || monitor.run());
    let scheduler = match scheduler {
        Ok(handle) => handle,
        Err(e) => {
            log::error!("failed to start scheduler thread: {e}");
            log.line("ERROR: Failed to start monitor thread. Exiting.");
            std::process::exit(1);
        }
    };

    let ctrlc_shutdown = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || ctrlc_shutdown.trigger()) {
        log::warn!("signal handler not installed: {e}");
    }

    shutdown.wait();
    log.line("Shutdown requested, stopping monitor.");

    // The scheduler wakes within one wait; give it a bounded grace period
    // rather than blocking exit forever on a stuck probe.
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while !scheduler.is_finished() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    if scheduler.is_finished() {
        let _ = scheduler.join();
        log.line("Process Monitor stopped.");
    } else {
        log::warn!("scheduler did not stop within the grace period");
    }
}
