use std::fs::File;
use std::path::{
    Path,
    PathBuf,
};

use thiserror::Error;
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

use crate::util::CHAT_BINARY_NAME;

/// Size past which the log file is rotated on startup.
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_FILTER: LevelFilter = LevelFilter::ERROR;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Every place a log filter can come from, in order of precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogLevelSources {
    /// Number of `-v` flags.
    pub verbosity: u8,
    /// Value of `GRACII_LOG_LEVEL`.
    pub env: Option<String>,
    /// Value of the `log.level` setting.
    pub setting: Option<String>,
}

impl LogLevelSources {
    pub fn verbosity_level(verbosity: u8) -> Option<Level> {
        match verbosity {
            0 => None,
            1 => Some(Level::WARN),
            2 => Some(Level::INFO),
            3 => Some(Level::DEBUG),
            _ => Some(Level::TRACE),
        }
    }

    /// Filter directives in [EnvFilter] syntax.
    ///
    /// `-v` only raises the level of this client's own targets. The env var and the setting are
    /// taken verbatim, so they can also name other targets.
    pub fn directives(&self) -> String {
        match Self::verbosity_level(self.verbosity) {
            Some(level) => format!("{DEFAULT_FILTER},{CHAT_BINARY_NAME}={}", LevelFilter::from_level(level)),
            None => self
                .env
                .clone()
                .or_else(|| self.setting.clone())
                .filter(|directives| !directives.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FILTER.to_string()),
        }
    }

    pub fn filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(DEFAULT_FILTER.into())
            .parse_lossy(self.directives())
    }
}

#[derive(Debug)]
pub struct LogArgs<T: AsRef<Path>> {
    pub levels: LogLevelSources,
    /// Mirror every record to stdout.
    pub log_to_stdout: bool,
    /// File the records are appended to. Nothing is written to disk when unset.
    pub log_file_path: Option<T>,
}

/// Keeps the background writers alive. Dropping it flushes pending records.
#[must_use]
#[derive(Debug)]
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
    _stdout_guard: Option<WorkerGuard>,
}

/// Installs the global subscriber.
pub fn initialize_logging<T: AsRef<Path>>(args: LogArgs<T>) -> Result<LogGuard, Error> {
    let (file_layer, _file_guard) = match args.log_file_path {
        Some(path) => {
            let file = open_log_file(path.as_ref(), MAX_FILE_SIZE)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_line_number(true)
                .with_writer(non_blocking);
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    let (stdout_layer, _stdout_guard) = if args.log_to_stdout {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
        let layer = fmt::layer().with_line_number(true).with_writer(non_blocking);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(args.levels.filter())
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;

    Ok(LogGuard {
        _file_guard,
        _stdout_guard,
    })
}

/// Opens `path` for appending, readable by the owner only.
///
/// A file larger than `max_size` is moved aside to `<path>.old` first, replacing an earlier one.
fn open_log_file(path: &Path, max_size: u64) -> Result<File, Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if std::fs::metadata(path).is_ok_and(|metadata| metadata.len() > max_size) {
        std::fs::rename(path, rotated_path(path))?;
    }

    let mut options = File::options();
    options.append(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    Ok(options.open(path)?)
}

fn rotated_path(path: &Path) -> PathBuf {
    let mut rotated = path.as_os_str().to_owned();
    rotated.push(".old");
    PathBuf::from(rotated)
}
