//! Configuration for Strand.
//!
//! The file lives at `~/.strand/config.toml` (or wherever `STRAND_CONFIG`
//! points). Every section is optional; a missing file means defaults.
//!
//! ```toml
//! [scheduler]
//! primary_identity = "main_persistent"   # script name, or a 0x-prefixed hash
//! task_stack_kib = 512
//! completion = "restart"                 # or "one_shot"
//!
//! [hotkeys]
//! remove_all = 0x22   # Page Down
//! reload = 0x21       # Page Up
//! unload = 0x23       # End
//!
//! [logging]
//! directory = "${LOCALAPPDATA}/strand"
//! stack_trace_file = "StackTrace.txt"
//!
//! [frame]
//! interval_ms = 16
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use strand_types::{CompletionPolicy, ExecutionIdentity, VirtualKey, parse_identity};

pub const CONFIG_ENV_VAR: &str = "STRAND_CONFIG";
pub const DEFAULT_PRIMARY_SCRIPT: &str = "main_persistent";
pub const DEFAULT_TASK_STACK_KIB: u32 = 512;
pub const MIN_TASK_STACK_KIB: u32 = 64;
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;
const DEFAULT_STACK_TRACE_FILE: &str = "StackTrace.txt";

#[derive(Debug, Default, Deserialize)]
pub struct StrandConfig {
    pub scheduler: Option<SchedulerConfig>,
    pub hotkeys: Option<HotkeyConfig>,
    pub logging: Option<LoggingConfig>,
    /// Only read by the frame simulator binary.
    pub frame: Option<FrameConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SchedulerConfig {
    /// Host script identity whose frames drive the primary group.
    pub primary_identity: Option<String>,
    /// Stack size of each task coroutine, in KiB.
    pub task_stack_kib: Option<u32>,
    /// What happens when a task's entry returns.
    #[serde(default)]
    pub completion: CompletionPolicy,
}

#[derive(Debug, Default, Deserialize)]
pub struct HotkeyConfig {
    pub remove_all: Option<u32>,
    pub reload: Option<u32>,
    pub unload: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the fault log. `${VAR}` references are expanded.
    pub directory: Option<String>,
    pub stack_trace_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FrameConfig {
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid scheduler.primary_identity: {0}")]
    Identity(#[from] strand_types::EmptyIdentityError),
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Identity(_) => None,
        }
    }
}

/// Scheduler settings with defaults applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub primary_identity: ExecutionIdentity,
    pub task_stack_bytes: usize,
    pub completion: CompletionPolicy,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            primary_identity: ExecutionIdentity::from_name(DEFAULT_PRIMARY_SCRIPT),
            task_stack_bytes: kib_to_bytes(DEFAULT_TASK_STACK_KIB),
            completion: CompletionPolicy::default(),
        }
    }
}

/// Hotkey bindings with defaults applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyBindings {
    pub remove_all: VirtualKey,
    pub reload: VirtualKey,
    pub unload: VirtualKey,
}

impl Default for HotkeyBindings {
    fn default() -> Self {
        Self {
            remove_all: VirtualKey::PAGE_DOWN,
            reload: VirtualKey::PAGE_UP,
            unload: VirtualKey::END,
        }
    }
}

fn kib_to_bytes(kib: u32) -> usize {
    usize::try_from(kib).unwrap_or(usize::MAX / 1024) * 1024
}

impl StrandConfig {
    /// Load from the default location. `Ok(None)` when no file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    pub fn scheduler_settings(&self) -> Result<SchedulerSettings, ConfigError> {
        let mut settings = SchedulerSettings::default();
        let Some(scheduler) = self.scheduler.as_ref() else {
            return Ok(settings);
        };

        if let Some(raw) = scheduler.primary_identity.as_deref() {
            settings.primary_identity = parse_identity(raw)?;
        }
        if let Some(kib) = scheduler.task_stack_kib {
            if kib < MIN_TASK_STACK_KIB {
                tracing::warn!(
                    requested = kib,
                    minimum = MIN_TASK_STACK_KIB,
                    "task_stack_kib below minimum, clamping"
                );
            }
            settings.task_stack_bytes = kib_to_bytes(kib.max(MIN_TASK_STACK_KIB));
        }
        settings.completion = scheduler.completion;
        Ok(settings)
    }

    #[must_use]
    pub fn hotkey_bindings(&self) -> HotkeyBindings {
        let defaults = HotkeyBindings::default();
        let Some(keys) = self.hotkeys.as_ref() else {
            return defaults;
        };
        HotkeyBindings {
            remove_all: keys.remove_all.map_or(defaults.remove_all, VirtualKey::new),
            reload: keys.reload.map_or(defaults.reload, VirtualKey::new),
            unload: keys.unload.map_or(defaults.unload, VirtualKey::new),
        }
    }

    /// Where contained task faults are appended. `None` when no directory can be determined.
    #[must_use]
    pub fn fault_log_path(&self) -> Option<PathBuf> {
        let logging = self.logging.as_ref();
        let dir = match logging.and_then(|l| l.directory.as_deref()) {
            Some(raw) => PathBuf::from(expand_env_vars(raw)),
            None => config_dir()?.join("logs"),
        };
        let file = logging
            .and_then(|l| l.stack_trace_file.as_deref())
            .unwrap_or(DEFAULT_STACK_TRACE_FILE);
        Some(dir.join(file))
    }

    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        let ms = self
            .frame
            .as_ref()
            .and_then(|f| f.interval_ms)
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_FRAME_INTERVAL_MS);
        Duration::from_millis(ms)
    }
}

/// Replace `${VAR}` references with environment values; unknown variables become empty.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + len];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + len + 1..];
    }

    out.push_str(rest);
    out
}

#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".strand"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Ok(raw) = env::var(CONFIG_ENV_VAR)
        && !raw.trim().is_empty()
    {
        return Some(PathBuf::from(raw));
    }
    config_dir().map(|dir| dir.join("config.toml"))
}
