use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, warn};

use super::LogRecord;
use crate::config::yaml_loader::LoggingYaml;

const MAX_WRITE_ATTEMPTS: u32 = 3;

/// A live logging sink: enqueue is non-blocking from the caller's
/// perspective (a bounded `try_send`), draining happens on a dedicated
/// background thread so a slow or stuck disk never stalls the async
/// runtime (spec.md §4.B).
pub struct LoggingSink {
    tx: Option<SyncSender<LogRecord>>,
    handle: Option<JoinHandle<()>>,
    dropped: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl LoggingSink {
    pub fn start(config: LoggingYaml, base_dir: impl Into<PathBuf>) -> Self {
        let capacity = (config.batch_size * 4).max(8);
        let (tx, rx) = mpsc::sync_channel(capacity);
        let base_dir = base_dir.into();
        let dropped = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));

        let handle = std::thread::Builder::new()
            .name("oxicrab-logging".to_string())
            .spawn(move || worker_loop(rx, config, base_dir))
            .expect("failed to spawn logging worker thread");

        Self {
            tx: Some(tx),
            handle: Some(handle),
            dropped,
        }
    }

    /// Enqueue a record. Never blocks: if the channel is full the record is
    /// dropped and counted, matching the Python original's "log delivery
    /// is best-effort, never backpressures the caller" behavior.
    pub fn log(&self, record: LogRecord) {
        if let Some(tx) = &self.tx {
            if tx.try_send(record).is_err() {
                self.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                warn!("logging sink queue full, dropping record");
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl Drop for LoggingSink {
    fn drop(&mut self) {
        // Dropping the sender closes the channel; the worker drains whatever
        // is left, then exits its recv loop.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(rx: mpsc::Receiver<LogRecord>, config: LoggingYaml, base_dir: PathBuf) {
    let flush_interval = Duration::from_millis(config.flush_interval_ms.max(1));
    'outer: loop {
        let first = match rx.recv_timeout(flush_interval) {
            Ok(record) => record,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let mut batch = vec![first];
        let mut disconnected = false;
        while batch.len() < config.batch_size.max(1) {
            match rx.try_recv() {
                Ok(record) => batch.push(record),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        flush_batch(&batch, &config, &base_dir);
        if disconnected {
            break 'outer;
        }
    }

    // Final drain: the sender side is gone, but records may still be
    // sitting in the channel buffer.
    let mut tail = Vec::new();
    while let Ok(record) = rx.try_recv() {
        tail.push(record);
    }
    if !tail.is_empty() {
        flush_batch(&tail, &config, &base_dir);
    }
}

fn flush_batch(batch: &[LogRecord], config: &LoggingYaml, base_dir: &Path) {
    let mut buckets: HashMap<(String, String, super::LogLevel), Vec<&LogRecord>> = HashMap::new();
    for record in batch {
        buckets.entry(record.bucket_key()).or_default().push(record);
        print_console(record, config);
    }

    for ((server, day, level), records) in buckets {
        let dir = base_dir.join(&server).join(&day);
        let file_name = format!("bot_log_{level}.jsonl");
        let path = dir.join(file_name);
        if let Err(e) = write_records(&path, &records, config.fsync_on_flush) {
            error!(path = %path.display(), error = %e, "logging sink: write failed after retries, stashing to emergency log");
            emergency_stash(base_dir, &server, &records);
        }
    }
}

fn write_records(path: &Path, records: &[&LogRecord], fsync: bool) -> std::io::Result<()> {
    let mut last_err = None;
    for attempt in 0..MAX_WRITE_ATTEMPTS {
        match try_write_once(path, records, fsync) {
            Ok(()) => return Ok(()),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < MAX_WRITE_ATTEMPTS {
                    std::thread::sleep(Duration::from_millis(50 * u64::from(attempt + 1)));
                }
            }
        }
    }
    Err(last_err.unwrap())
}

fn try_write_once(path: &Path, records: &[&LogRecord], fsync: bool) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for record in records {
        let line = serde_json::to_string(record)
            .unwrap_or_else(|_| "{\"error\":\"serialization failed\"}".to_string());
        writeln!(file, "{line}")?;
    }
    if fsync {
        file.sync_data()?;
    }
    Ok(())
}

/// Last-resort stash when the normal per-server/day/level file can't be
/// written after retries. One file per emergency flush, never appended to,
/// so a persistently broken directory can't cause an unbounded write loop.
fn emergency_stash(base_dir: &Path, server: &str, records: &[&LogRecord]) {
    let dir = base_dir.join("emergency");
    if std::fs::create_dir_all(&dir).is_err() {
        error!("logging sink: emergency directory unwritable, dropping {} records", records.len());
        return;
    }
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.fZ");
    let path = dir.join(format!("emergency_{server}_{stamp}.jsonl"));
    if let Ok(mut file) = OpenOptions::new().create(true).truncate(true).write(true).open(&path) {
        for record in records {
            if let Ok(line) = serde_json::to_string(record) {
                let _ = writeln!(file, "{line}");
            }
        }
    } else {
        error!("logging sink: failed to write emergency stash, dropping {} records", records.len());
    }
}

fn print_console(record: &LogRecord, config: &LoggingYaml) {
    let line = record.console_line();
    if let Some(color) = config.color_map.get(&record.level.to_string()) {
        let code = ansi_code(color);
        println!("\x1b[{code}m{line}\x1b[0m");
    } else {
        println!("{line}");
    }
}

fn ansi_code(name: &str) -> &'static str {
    match name.to_lowercase().as_str() {
        "red" => "31",
        "green" => "32",
        "yellow" => "33",
        "blue" => "34",
        "magenta" => "35",
        "cyan" => "36",
        "white" => "37",
        _ => "0",
    }
}
