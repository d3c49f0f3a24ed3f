//! Strand frame simulator - drives a scheduler runtime the way a host process would.
//!
//! # Frame loop
//!
//! ```text
//! main() -> init_tracing() -> load config -> SchedulerRuntime::new -> register demo extensions
//!                                                   |
//!                                                   v
//!            every interval: host.advance() -> on_frame() -> drain notifications
//!                                                   |
//!                                                   v
//!                  ExitRequested | frame limit | Ctrl-C -> unload()
//! ```
//!
//! The simulated host alternates its primary script thread (running) with an
//! idle ambient thread, so both task groups get driven.

mod demo;
mod sim;

use anyhow::{Context, Result};
use std::{
    env,
    fs::{self, OpenOptions},
    path::PathBuf,
    rc::Rc,
    sync::{Arc, Mutex},
    thread,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use strand_config::StrandConfig;
use strand_engine::{RuntimeParts, SchedulerRuntime, SystemClock};
use strand_types::HookState;
use strand_utils::FaultLog;

use sim::{LoggedInterception, SimulatedHost, SimulatedLoader};

const FRAME_LIMIT_ENV: &str = "STRAND_FRAMES";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_strand_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_strand_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in strand_log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn strand_log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.strand/logs/strand.log
    if let Some(config_path) = StrandConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("strand.log"));
    }

    // Fallback: ./.strand/logs/strand.log
    candidates.push(PathBuf::from(".strand").join("logs").join("strand.log"));

    candidates
}

fn frame_limit() -> Option<u64> {
    let raw = env::var(FRAME_LIMIT_ENV).ok()?;
    match raw.trim().parse() {
        Ok(limit) => Some(limit),
        Err(e) => {
            tracing::warn!(value = %raw, "Ignoring {FRAME_LIMIT_ENV}: {e}");
            None
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let config = match StrandConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Using default configuration: {e}");
            StrandConfig::default()
        }
    };
    let settings = config
        .scheduler_settings()
        .context("invalid [scheduler] configuration")?;
    let hotkeys = config.hotkey_bindings();

    let host = Rc::new(SimulatedHost::new(settings.primary_identity));
    let loader = Rc::new(SimulatedLoader::new(&demo::MODULES));
    let natives = demo::natives(SystemClock::new()).context("failed to build native table")?;

    let mut parts = RuntimeParts::new(host.clone())
        .loader(loader.clone())
        .interception(Arc::new(LoggedInterception))
        .natives(Box::new(natives));
    if let Some(path) = config.fault_log_path() {
        tracing::info!(path = %path.display(), "Fault log");
        parts = parts.fault_sink(Rc::new(FaultLog::new(path)));
    }

    let runtime = SchedulerRuntime::new(&settings, &hotkeys, parts);
    demo::register_all(&runtime);

    let heartbeat = runtime.deferred_sender();
    thread::Builder::new()
        .name("strand-heartbeat".to_string())
        .spawn(move || {
            let _ = heartbeat.defer(|| tracing::info!("Heartbeat job ran on the frame thread"));
        })
        .context("failed to start heartbeat thread")?;

    let limit = frame_limit();
    let mut interval = tokio::time::interval(config.frame_interval());
    let mut frames: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }

        host.advance();
        match runtime.on_frame() {
            Ok(report) => {
                if !report.faulted.is_empty() || !report.commands.is_empty() {
                    tracing::info!(
                        faulted = report.faulted.len(),
                        commands = ?report.commands,
                        "Frame {frames}"
                    );
                }
            }
            Err(e) => {
                tracing::warn!("Frame {frames} skipped: {e}");
                break;
            }
        }
        for notification in runtime.take_notifications() {
            tracing::info!("{}", notification.format());
        }
        if loader.take_reload() {
            demo::register_all(&runtime);
        }

        frames += 1;
        if runtime.hook_state() == HookState::ExitRequested {
            tracing::info!("Unload requested");
            break;
        }
        if limit.is_some_and(|limit| frames >= limit) {
            break;
        }
    }

    runtime.unload();
    for notification in runtime.take_notifications() {
        tracing::info!("{}", notification.format());
    }
    if !runtime.join_unload_worker() {
        tracing::warn!("Unload worker did not finish cleanly");
    }
    tracing::info!(frames, swaps = host.swaps(), "Simulator stopped");

    Ok(())
}
