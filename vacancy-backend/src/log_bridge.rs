/// Process logger: env_logger filtering, teed into an in-memory ring (served at
/// `GET /logs`), a broadcast channel, and an append-only file under the data dir.
use env_logger::{Logger, Target};
use log::{Log, Metadata, Record, SetLoggerError};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, OnceLock};
use tokio::sync::broadcast;

const MAX_LOG_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp_ms: i64,
    pub level: String,
    pub target: String,
    pub message: String,
}

impl LogEntry {
    fn now(level: &str, target: &str, message: String) -> Self {
        Self {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            level: level.to_string(),
            target: target.to_string(),
            message,
        }
    }

    fn to_line(&self) -> String {
        format!(
            "{} [{}] [{}] {}",
            self.timestamp_ms,
            self.level.to_uppercase(),
            self.target,
            self.message.replace('\n', "\\n")
        )
    }
}

struct LogRing {
    entries: Mutex<VecDeque<LogEntry>>,
    tx: broadcast::Sender<LogEntry>,
}

impl LogRing {
    fn push(&self, entry: LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() == MAX_LOG_ENTRIES {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }
        let _ = self.tx.send(entry);
    }

    fn snapshot(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }
}

static LOG_RING: LazyLock<LogRing> = LazyLock::new(|| {
    let (tx, _) = broadcast::channel(256);
    LogRing {
        entries: Mutex::new(VecDeque::with_capacity(MAX_LOG_ENTRIES)),
        tx,
    }
});

struct LogFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl LogFile {
    fn at(path: PathBuf) -> Self {
        let file = Self::open(&path).ok();
        Self {
            path,
            file: Mutex::new(file),
        }
    }

    fn open(path: &Path) -> io::Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn append(&self, entry: &LogEntry) {
        let Ok(mut guard) = self.file.lock() else {
            return;
        };
        if guard.is_none() {
            match Self::open(&self.path) {
                Ok(file) => *guard = Some(file),
                Err(_) => return,
            }
        }
        if let Some(file) = guard.as_mut() {
            let _ = writeln!(file, "{}", entry.to_line());
            let _ = file.flush();
        }
    }
}

static LOG_FILE: OnceLock<LogFile> = OnceLock::new();

fn capture(entry: LogEntry) {
    if let Some(file) = LOG_FILE.get() {
        file.append(&entry);
    }
    LOG_RING.push(entry);
}

struct TeeLogger {
    inner: Logger,
}

impl Log for TeeLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        capture(LogEntry::now(
            &record.level().to_string().to_lowercase(),
            record.target(),
            record.args().to_string(),
        ));
        self.inner.log(record);
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the logger. `RUST_LOG` filters as usual (default `info`); entries also go to
/// `<log_dir>/backend.log`.
pub fn init(log_dir: &Path) -> Result<(), SetLoggerError> {
    let _ = LOG_FILE.set(LogFile::at(log_dir.join("backend.log")));
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.target(Target::Stderr);
    let logger = Box::leak(Box::new(TeeLogger {
        inner: builder.build(),
    }));
    log::set_logger(logger)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

pub fn recent_entries() -> Vec<LogEntry> {
    LOG_RING.snapshot()
}

pub fn subscribe() -> broadcast::Receiver<LogEntry> {
    LOG_RING.tx.subscribe()
}

pub fn log_file_path() -> Option<String> {
    LOG_FILE.get().map(|f| f.path.display().to_string())
}

/// Last resort when the logger itself could not be installed.
pub fn write_fallback_line(message: &str) {
    capture(LogEntry::now("error", "vacancy.log_bridge", message.to_string()));
}
