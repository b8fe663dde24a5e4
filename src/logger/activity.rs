//! Activity logger: a dedicated thread owns the [`JsonlWriter`].
//!
//! Workers send [`ActivityEvent`]s over a bounded crossbeam channel through a
//! cloneable [`ActivityLoggerHandle`]. `send()` uses `try_send()`, so a slow
//! disk never stalls page processing; overflow is counted and reported.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{RedactError, Result};
use crate::logger::jsonl::{
    EventType, JsonlConfig, JsonlWriter, LogEntry, ScoreFactorsRecord, Severity,
};

// ──────────────────── channel capacity ────────────────────

const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── public event type ────────────────────

/// Everything the redactor reports to the activity log.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    /// A batch is about to open its first file.
    BatchStarted {
        /// Input files queued.
        files: usize,
        /// Worker threads.
        workers: usize,
        /// Nothing will be applied.
        dry_run: bool,
        /// `Config::stable_hash` of the effective config.
        config_hash: String,
    },
    /// A logo template failed to load and was left out.
    TemplateRejected {
        /// Template name.
        template: String,
        /// `PDFR-NNNN` code.
        error_code: String,
        /// Rendered error.
        error_message: String,
    },
    /// A page was skipped on a detection error.
    PageSkipped {
        /// Document path.
        path: String,
        /// Zero-based page index.
        page: usize,
        /// `PDFR-NNNN` code.
        error_code: String,
        /// Rendered error.
        error_message: String,
    },
    /// One redaction unit; `applied == false` in preview mode.
    RedactionApplied {
        /// Document path.
        path: String,
        /// Zero-based page index.
        page: usize,
        /// `text` or `logo`.
        kind: String,
        /// Pattern id or template name.
        label: String,
        /// Fused score or correlation.
        confidence: f64,
        /// Signal breakdown, for text units.
        factors: Option<ScoreFactorsRecord>,
        /// Whether the backend was touched.
        applied: bool,
    },
    /// A document finished without error.
    FileCompleted {
        /// Document path.
        path: String,
        /// Units found.
        units: usize,
        /// Pages skipped on detection errors.
        skipped_pages: usize,
        /// Wall time for the file.
        duration_ms: u64,
    },
    /// A document failed; the batch continues.
    FileFailed {
        /// Document path.
        path: String,
        /// `PDFR-NNNN` code.
        error_code: String,
        /// Rendered error.
        error_message: String,
    },
    /// Every file has been handled.
    BatchCompleted {
        /// Files that succeeded.
        succeeded: usize,
        /// Files that failed.
        failed: usize,
        /// Units across the batch.
        units: usize,
        /// Wall time for the batch.
        duration_ms: u64,
    },
    /// An error outside any single file.
    Error {
        /// `PDFR-NNNN` code.
        code: String,
        /// Rendered error.
        message: String,
    },
    /// Stops the logger thread after flushing.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Cheaply cloneable, non-blocking sender of activity events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Sends without blocking; a full channel drops the event and counts it.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Events lost to a full channel so far.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Asks the logger thread to flush and exit. Join the thread to wait for it.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

impl std::fmt::Debug for ActivityLoggerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLoggerHandle")
            .field("dropped_events", &self.dropped_events())
            .finish_non_exhaustive()
    }
}

// ──────────────────── spawn ────────────────────

/// Spawns the logger thread.
///
/// The thread runs until `shutdown()` is called or every handle is dropped.
pub fn spawn_logger(
    config: JsonlConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    spawn_logger_with_capacity(config, CHANNEL_CAPACITY)
}

/// [`spawn_logger`] with an explicit channel bound.
pub fn spawn_logger_with_capacity(
    config: JsonlConfig,
    capacity: usize,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("pdfr-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config, &dropped_clone))
        .map_err(|e| RedactError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

// ──────────────────── logger thread ────────────────────

fn logger_thread_main(rx: &Receiver<ActivityEvent>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(config);

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }
        jsonl.write_entry(&event_to_log_entry(&event));
    }

    jsonl.flush();
    jsonl.fsync();
}

// ──────────────────── event conversion ────────────────────

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::BatchStarted {
            files,
            workers,
            dry_run,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::BatchStart, Severity::Info);
            e.details = Some(format!(
                "files={files} workers={workers} dry_run={dry_run} config_hash={config_hash}"
            ));
            e
        }
        ActivityEvent::TemplateRejected {
            template,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::TemplateRejected, Severity::Warning);
            e.label = Some(template.clone());
            e.ok = Some(false);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e
        }
        ActivityEvent::PageSkipped {
            path,
            page,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::PageSkipped, Severity::Warning);
            e.path = Some(path.clone());
            e.page = Some(*page);
            e.ok = Some(false);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e
        }
        ActivityEvent::RedactionApplied {
            path,
            page,
            kind,
            label,
            confidence,
            factors,
            applied,
        } => {
            let event = if *applied {
                EventType::RedactionApplied
            } else {
                EventType::RedactionPlanned
            };
            let mut e = LogEntry::new(event, Severity::Info);
            e.path = Some(path.clone());
            e.page = Some(*page);
            e.kind = Some(kind.clone());
            e.label = Some(label.clone());
            e.confidence = Some(*confidence);
            e.factors.clone_from(factors);
            e.ok = Some(true);
            e
        }
        ActivityEvent::FileCompleted {
            path,
            units,
            skipped_pages,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::FileComplete, Severity::Info);
            e.path = Some(path.clone());
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!("units={units} skipped_pages={skipped_pages}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::FileFailed {
            path,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::FileFailed, Severity::Warning);
            e.path = Some(path.clone());
            e.ok = Some(false);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e
        }
        ActivityEvent::BatchCompleted {
            succeeded,
            failed,
            units,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::BatchComplete, Severity::Info);
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!("succeeded={succeeded} failed={failed} units={units}"));
            e.ok = Some(*failed == 0);
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::BatchComplete, Severity::Info),
    }
}
