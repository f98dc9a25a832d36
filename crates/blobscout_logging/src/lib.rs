//! Logging setup for blobscout binaries.
//!
//! Every run appends to `$BLOBSCOUT_HOME/logs/<app>.log`, which is rotated by
//! size into `<app>.log.1 .. <app>.log.N`. Console output goes to stderr so
//! stdout stays clean for JSON command output.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const HOME_ENV: &str = "BLOBSCOUT_HOME";
const KEEP_FILES: usize = 5;
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;

pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Debug level for blobscout crates.
    pub verbose: bool,
    /// Warnings only on stderr. The log file keeps the normal level.
    pub quiet: bool,
}

impl LogConfig<'_> {
    fn directives(&self) -> &'static str {
        if self.verbose {
            "blobscout=debug,blobscout_catalog=debug,warn"
        } else {
            "blobscout=info,blobscout_catalog=info,warn"
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives()))
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let dir = ensure_logs_dir()?;
    let log = RotatingLog::open(&dir, config.app_name, KEEP_FILES, ROTATE_AT_BYTES)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))?;

    let console_filter = if config.quiet {
        EnvFilter::new("warn")
    } else {
        config.filter()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(log)
                .with_filter(config.filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Tracing subscriber already installed")
}

/// `$BLOBSCOUT_HOME`, else `~/.blobscout`, else `./.blobscout`.
pub fn blobscout_home() -> PathBuf {
    match std::env::var_os(HOME_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".blobscout"),
    }
}

pub fn ensure_logs_dir() -> Result<PathBuf> {
    let dir = blobscout_home().join("logs");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}

/// Size-rotated log file shared by every writer the subscriber hands out.
#[derive(Clone)]
struct RotatingLog {
    state: Arc<Mutex<LogFile>>,
}

struct LogFile {
    active: PathBuf,
    keep: usize,
    limit: u64,
    file: File,
    written: u64,
}

impl RotatingLog {
    fn open(dir: &Path, app_name: &str, keep: usize, limit: u64) -> io::Result<Self> {
        let stem: String = app_name
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
                _ => '_',
            })
            .collect();
        let active = dir.join(format!("{stem}.log"));
        let (file, written) = append_to(&active)?;
        let mut log = LogFile {
            active,
            keep: keep.max(1),
            limit,
            file,
            written,
        };
        if log.written >= log.limit {
            log.roll()?;
        }
        Ok(Self {
            state: Arc::new(Mutex::new(log)),
        })
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, LogFile>> {
        self.state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))
    }
}

impl LogFile {
    fn generation(&self, n: usize) -> PathBuf {
        let mut name = self.active.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    /// Shift `<app>.log.{n}` up one slot, dropping the oldest, then reopen.
    fn roll(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let mut chain: Vec<PathBuf> = (1..self.keep).map(|n| self.generation(n)).collect();
        chain.insert(0, self.active.clone());

        if let Some(oldest) = chain.last() {
            remove_if_present(oldest)?;
        }
        for pair in chain.windows(2).rev() {
            if pair[0].exists() {
                fs::rename(&pair[0], &pair[1])?;
            }
        }

        let (file, written) = append_to(&self.active)?;
        self.file = file;
        self.written = written;
        Ok(())
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.limit {
            self.roll()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Write for RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingLog {
    type Writer = RotatingLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn append_to(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let len = file.metadata()?.len();
    Ok((file, len))
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
