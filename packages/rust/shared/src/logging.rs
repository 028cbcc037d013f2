//! Tracing setup and runtime console-level control.
//!
//! The console layer's level sits behind a `reload` handle so debug mode
//! can be toggled while the process runs. When a log directory is given,
//! every DEBUG-and-above record is also written to a per-session file under
//! `<dir_logs>/<YYYY_MM>/<user>_<DD>_<HH>h<MM>m<SS>s.log`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, Local};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, reload};

use crate::error::{NamespaceError, Result};

/// Installed once by [`setup_logging`].
static CONSOLE: OnceLock<ConsoleControl> = OnceLock::new();

/// Console output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = NamespaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(NamespaceError::config(format!(
                "unknown log format '{other}': expected 'text' or 'json'"
            ))),
        }
    }
}

/// Options for [`setup_logging`], merged from config and CLI flags.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Root directory for debug log files. No log file when `None`.
    pub dir_logs: Option<PathBuf>,
    /// Initial console level.
    pub console_level: LevelFilter,
    /// Console format.
    pub format: LogFormat,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            dir_logs: None,
            console_level: LevelFilter::INFO,
            format: LogFormat::Text,
        }
    }
}

/// Parse a level name such as `"info"` or `"DEBUG"`.
pub fn parse_level(level: &str) -> Result<LevelFilter> {
    LevelFilter::from_str(level)
        .map_err(|_| NamespaceError::config(format!("unknown log level '{level}'")))
}

/// Install the global tracing subscriber.
///
/// Returns the path of the debug log file when `dir_logs` is set.
pub fn setup_logging(opts: &LogOptions) -> Result<Option<PathBuf>> {
    let (console_filter, handle) = reload::Layer::new(opts.console_level);

    let console: Box<dyn Layer<Registry> + Send + Sync> = match opts.format {
        LogFormat::Text => fmt::layer().with_target(false).boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    };

    let log_file = match &opts.dir_logs {
        Some(dir) => Some(prepare_log_file(dir, Local::now(), &current_user())?),
        None => None,
    };

    let file_layer = match &log_file {
        Some(path) => {
            let file = File::options()
                .append(true)
                .open(path)
                .map_err(|e| NamespaceError::io(path, e))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file_layer)
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace")))
        .try_init()
        .map_err(|e| NamespaceError::Logging(e.to_string()))?;

    CONSOLE
        .set(ConsoleControl { handle })
        .map_err(|_| NamespaceError::Logging("logging already set up".into()))?;

    if let Some(path) = &log_file {
        tracing::debug!(path = %path.display(), "writing debug log file");
    }

    Ok(log_file)
}

/// Create `<dir_logs>/<YYYY_MM>/` and an empty log file for this session.
///
/// Newly created directories are opened up to all users so a shared log
/// tree stays writable by every operator.
pub fn prepare_log_file(dir_logs: &Path, now: DateTime<Local>, user: &str) -> Result<PathBuf> {
    let dir_month = dir_logs.join(now.format("%Y_%m").to_string());

    for dir in [dir_logs, dir_month.as_path()] {
        if !dir.exists() {
            std::fs::create_dir(dir).map_err(|e| NamespaceError::io(dir, e))?;
            open_permissions(dir)?;
        }
    }

    let file_name = format!("{user}_{}.log", now.format("%d_%Hh%Mm%Ss"));
    let path = dir_month.join(file_name);
    File::create(&path).map_err(|e| NamespaceError::io(&path, e))?;
    Ok(path)
}

#[cfg(unix)]
fn open_permissions(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o777))
        .map_err(|e| NamespaceError::io(dir, e))
}

#[cfg(not(unix))]
fn open_permissions(_dir: &Path) -> Result<()> {
    Ok(())
}

fn current_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".into())
}

// ---------------------------------------------------------------------------
// Console level control
// ---------------------------------------------------------------------------

/// Handle to the console layer's level.
#[derive(Clone)]
pub struct ConsoleControl {
    handle: reload::Handle<LevelFilter, Registry>,
}

impl ConsoleControl {
    /// Wrap an existing reload handle.
    pub fn new(handle: reload::Handle<LevelFilter, Registry>) -> Self {
        Self { handle }
    }

    /// Current console level.
    pub fn level(&self) -> Result<LevelFilter> {
        self.handle
            .clone_current()
            .ok_or_else(|| NamespaceError::Logging("no console handler".into()))
    }

    /// Replace the console level.
    pub fn set_level(&self, level: LevelFilter) -> Result<()> {
        self.handle
            .reload(level)
            .map_err(|e| NamespaceError::Logging(e.to_string()))
    }

    /// Query (`None`) or toggle (`Some`) debug mode.
    ///
    /// Debug mode means the console shows DEBUG records. Returns the current
    /// state only when called as a query.
    pub fn debug_mode(&self, debug: Option<bool>) -> Result<Option<bool>> {
        match debug {
            None => Ok(Some(self.level()? >= LevelFilter::DEBUG)),
            Some(true) => self.set_level(LevelFilter::DEBUG).map(|_| None),
            Some(false) => self.set_level(LevelFilter::INFO).map(|_| None),
        }
    }

    /// Enable debug mode until the returned guard is dropped.
    pub fn debug_context(&self) -> Result<DebugGuard> {
        let previous = self.level()?;
        self.set_level(LevelFilter::DEBUG)?;
        Ok(DebugGuard {
            control: self.clone(),
            previous,
        })
    }
}

/// Restores the previous console level on drop.
pub struct DebugGuard {
    control: ConsoleControl,
    previous: LevelFilter,
}

impl Drop for DebugGuard {
    fn drop(&mut self) {
        if let Err(e) = self.control.set_level(self.previous) {
            tracing::warn!(error = %e, "failed to restore console level");
        }
    }
}

fn console() -> Result<&'static ConsoleControl> {
    CONSOLE
        .get()
        .ok_or_else(|| NamespaceError::Logging("no console handler".into()))
}

/// Current console level of the installed subscriber.
pub fn console_level() -> Result<LevelFilter> {
    console()?.level()
}

/// Set the console level of the installed subscriber.
pub fn set_console_level(level: LevelFilter) -> Result<()> {
    console()?.set_level(level)
}

/// Query or toggle debug mode on the installed subscriber.
pub fn debug_mode(debug: Option<bool>) -> Result<Option<bool>> {
    console()?.debug_mode(debug)
}

/// Enable debug mode on the installed subscriber until the guard drops.
pub fn debug_context() -> Result<DebugGuard> {
    console()?.debug_context()
}

/// Run `f` with debug mode enabled.
pub fn debug_wrapper<T>(f: impl FnOnce() -> T) -> Result<T> {
    let _guard = debug_context()?;
    Ok(f())
}
