use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::get_create_lexicon_dir;

/// Log levels in increasing verbosity. A level enables itself and every
/// level below it.
///
/// The level is read from the `LOG_LEVEL` environment variable, default Info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Silent = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl Level {
    /// Parse a log level from a string (case insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "silent" => Some(Level::Silent),
            "error" => Some(Level::Error),
            "warn" => Some(Level::Warn),
            "info" => Some(Level::Info),
            "debug" => Some(Level::Debug),
            _ => None,
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Level::Silent => "",
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false)
}

pub struct Logger {
    log_file: PathBuf,
    disable_log: bool,
    enable_print_log: bool,
    level: Level,
}

impl Logger {
    /// A logger writing to `<log_dir>/log.txt`, configured from `DISABLE_LOG`,
    /// `ENABLE_PRINT_LOG` and `LOG_LEVEL`.
    pub fn new(log_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Can't create log dir: {}", log_dir.display()))?;

        let level = std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|v| Level::from_str(&v))
            .unwrap_or(Level::Info);

        Ok(Logger {
            log_file: log_dir.join("log.txt"),
            disable_log: env_flag("DISABLE_LOG"),
            enable_print_log: env_flag("ENABLE_PRINT_LOG"),
            level,
        })
    }

    fn disabled() -> Self {
        Logger {
            log_file: PathBuf::new(),
            disable_log: true,
            enable_print_log: false,
            level: Level::Info,
        }
    }

    /// Sends `tracing` events to stderr, and to `log.txt` unless logging is
    /// disabled. Filtered by `RUST_LOG`, default `info`.
    pub fn tracing_subscriber(&self) -> Result<impl tracing::Subscriber + Send + Sync + use<>> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let stderr_layer = fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_writer(std::io::stderr);

        let file_layer = if self.disable_log {
            None
        } else {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_file)
                .with_context(|| format!("Can't open log file: {}", self.log_file.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        };

        Ok(tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer))
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    fn write_to_file(&self, message: &str) -> Result<()> {
        if self.disable_log {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)?;

        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3fZ");
        file.write_all(format!("[{}] {}\n", timestamp, message).as_bytes())?;
        Ok(())
    }

    pub fn log(&self, level: Level, msg: &str) {
        if level == Level::Silent || self.level < level {
            return;
        }

        if self.enable_print_log {
            eprintln!("{}: {}", level.prefix(), msg);
        }

        if let Err(e) = self.write_to_file(&format!("{}: {}", level.prefix(), msg)) {
            eprintln!("Failed to write to log file: {}", e);
        }
    }
}

pub static LOGGER: OnceLock<Logger> = OnceLock::new();
static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Sets up the global logger and the `tracing` subscriber in `log_dir`.
/// Later calls have no effect.
pub fn init_logger(log_dir: &Path) -> Result<()> {
    let logger = Logger::new(log_dir)?;

    TRACING_INITIALIZED.get_or_init(|| {
        let installed = logger
            .tracing_subscriber()
            .and_then(|subscriber| Ok(tracing::subscriber::set_global_default(subscriber)?));
        if let Err(e) = installed {
            eprintln!("Failed to initialize tracing: {}", e);
        }
    });

    let _ = LOGGER.set(logger);
    Ok(())
}

fn with_logger<F, R>(f: F) -> R
where
    F: FnOnce(&Logger) -> R,
{
    let logger = LOGGER.get_or_init(|| {
        let dir = match get_create_lexicon_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("Failed to get lexicon dir: {}", e);
                return Logger::disabled();
            }
        };
        Logger::new(&dir).unwrap_or_else(|e| {
            eprintln!("Failed to create logger: {}", e);
            Logger::disabled()
        })
    });
    f(logger)
}

pub fn info(msg: &str) {
    with_logger(|logger| logger.log(Level::Info, msg));
}

pub fn warn(msg: &str) {
    with_logger(|logger| logger.log(Level::Warn, msg));
}

pub fn error(msg: &str) {
    with_logger(|logger| logger.log(Level::Error, msg));
}

/// Formats as `HH:MM:SS`.
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_level_parsing() {
        assert_eq!(Level::from_str("DEBUG"), Some(Level::Debug));
        assert_eq!(Level::from_str(" warn "), Some(Level::Warn));
        assert_eq!(Level::from_str("verbose"), None);
        assert!(Level::Error < Level::Info);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(3725)), "01:02:05");
    }

    #[test]
    #[serial]
    fn test_logger_writes_enabled_levels_only() {
        let dir = tempfile::tempdir().unwrap();
        unsafe {
            std::env::remove_var("DISABLE_LOG");
            std::env::set_var("LOG_LEVEL", "warn");
        }
        let logger = Logger::new(dir.path()).unwrap();
        unsafe {
            std::env::remove_var("LOG_LEVEL");
        }

        logger.log(Level::Info, "hidden");
        logger.log(Level::Debug, "also hidden");
        logger.log(Level::Warn, "shown");
        logger.log(Level::Error, "also shown");

        let text = std::fs::read_to_string(logger.log_file()).unwrap();
        assert!(!text.contains("hidden"));
        assert!(text.contains("WARN: shown"));
        assert!(text.contains("ERROR: also shown"));
    }

    #[test]
    #[serial]
    fn test_tracing_events_reach_log_file() {
        let dir = tempfile::tempdir().unwrap();
        unsafe {
            std::env::remove_var("DISABLE_LOG");
            std::env::remove_var("RUST_LOG");
        }
        let logger = Logger::new(dir.path()).unwrap();
        let subscriber = logger.tracing_subscriber().unwrap();

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("Skipping trait: empty trait name");
            tracing::debug!("below the default filter");
        });

        let text = std::fs::read_to_string(logger.log_file()).unwrap();
        assert!(text.contains("WARN"));
        assert!(text.contains("Skipping trait: empty trait name"));
        assert!(!text.contains("below the default filter"));
    }

    #[test]
    #[serial]
    fn test_disable_log() {
        let dir = tempfile::tempdir().unwrap();
        unsafe {
            std::env::set_var("DISABLE_LOG", "true");
        }
        let logger = Logger::new(dir.path()).unwrap();
        unsafe {
            std::env::remove_var("DISABLE_LOG");
        }

        logger.log(Level::Error, "nothing");
        let subscriber = logger.tracing_subscriber().unwrap();
        tracing::subscriber::with_default(subscriber, || tracing::error!("nothing either"));
        assert!(!logger.log_file().exists());
    }
}
