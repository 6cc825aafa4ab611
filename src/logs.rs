use std::{
    fs,
    path::{Path, PathBuf},
    sync::{LazyLock, Mutex},
};

use anyhow::Result;
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    {ContentLimit, FileRotate},
};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

/// Log file of the first `init` call; later calls are no-ops.
static LOG_FILE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

pub fn log_file_path(dir: &Path) -> PathBuf {
    dir.join("logs/legend_check.log")
}

/// Installs the process-wide logger writing under `dir`. Only the first call
/// picks the directory, so it must outlive the process; later calls return
/// the path already in use.
pub fn init(dir: &Path, level: LevelFilter) -> Result<PathBuf> {
    let mut guard = LOG_FILE
        .lock()
        .map_err(|_| anyhow!("log state poisoned"))?;
    if let Some(path) = guard.as_ref() {
        return Ok(path.clone());
    }

    let path = log_file_path(dir);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log = FileRotate::new(
        &path,
        AppendTimestamp::default(FileLimit::MaxFiles(3)),
        ContentLimit::Lines(1000),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    let config = ConfigBuilder::new().set_time_format_rfc3339().build();
    let loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(
            level,
            config.clone(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ),
        WriteLogger::new(level, config, log),
    ];
    // another logger (eg. env_logger in a test binary) may already own the
    // facade, that is fine
    if CombinedLogger::init(loggers).is_err() {
        warn!("a logger is already installed, not writing {}", path.display());
    }

    *guard = Some(path.clone());
    Ok(path)
}
