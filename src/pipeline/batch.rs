//! Bounded worker pool over input files.
//!
//! Each worker owns one document at a time from open to save. A failing or
//! panicking file becomes a failed [`FileOutcome`]; the batch carries on.
//! Outcomes are appended under a mutex and reported in file-name order.
//! Two inputs whose outputs would land on the same file are caught before
//! any worker starts; every input after the first fails.

use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use serde::Serialize;

use super::redaction::RedactionUnit;
use super::{DocumentReport, Pipeline, elapsed_ms};
use crate::core::errors::{RedactError, Result};
use crate::document::{DocumentOpener, fingerprint};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};

// ──────────────────── configuration ────────────────────

/// How a batch runs.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker threads, clamped to `1..=inputs`.
    pub workers: usize,
    /// Redacted copies are written here under the input's file name.
    pub output_dir: Option<PathBuf>,
    /// Report units without touching any document.
    pub preview: bool,
    /// Recorded in the batch-start event.
    pub config_hash: String,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            output_dir: None,
            preview: false,
            config_hash: String::new(),
        }
    }
}

// ──────────────────── outcomes ────────────────────

/// Final state of one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Processed, and saved when an output was requested.
    Succeeded,
    /// Stopped by a backend, runtime or collision error.
    Failed,
}

/// Error recorded against a failed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    /// `PDFR-NNNN` code.
    pub code: String,
    /// Rendered error, code included.
    pub message: String,
}

impl From<&RedactError> for FileFailure {
    fn from(error: &RedactError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// What happened to one input.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    /// Input path as given to the batch.
    pub source: PathBuf,
    /// SHA-256 of the input, when it is a readable file.
    pub fingerprint: Option<String>,
    /// Succeeded or failed.
    pub status: FileStatus,
    /// Present on success.
    pub report: Option<DocumentReport>,
    /// Present on failure.
    pub error: Option<FileFailure>,
    /// Wall time from open to save.
    pub duration_ms: u64,
}

impl FileOutcome {
    /// Whether the file succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == FileStatus::Succeeded
    }

    /// Units planned for this file; empty on failure.
    #[must_use]
    pub fn units(&self) -> &[RedactionUnit] {
        self.report.as_ref().map_or(&[], |r| r.units.as_slice())
    }
}

/// Aggregate result of [`BatchRunner::run`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Ordered by source file name.
    pub files: Vec<FileOutcome>,
    /// Files that succeeded.
    pub succeeded: usize,
    /// Files that failed.
    pub failed: usize,
    /// Redaction units across all succeeded files.
    pub units: usize,
    /// Pages skipped after a detection error.
    pub skipped_pages: usize,
    /// Whether the batch ran without applying anything.
    pub preview: bool,
    /// Wall time of the whole batch.
    pub duration_ms: u64,
}

impl BatchSummary {
    /// Outcome for `source`, if it was in the batch.
    #[must_use]
    pub fn outcome(&self, source: &Path) -> Option<&FileOutcome> {
        self.files.iter().find(|f| f.source == source)
    }
}

// ──────────────────── runner ────────────────────

/// Runs one [`Pipeline`] over many files.
pub struct BatchRunner<'a> {
    pipeline: &'a Pipeline,
    opener: &'a dyn DocumentOpener,
    options: BatchOptions,
    logger: Option<ActivityLoggerHandle>,
}

impl<'a> BatchRunner<'a> {
    /// Runner opening inputs through `opener`.
    #[must_use]
    pub fn new(
        pipeline: &'a Pipeline,
        opener: &'a dyn DocumentOpener,
        options: BatchOptions,
        logger: Option<ActivityLoggerHandle>,
    ) -> Self {
        Self {
            pipeline,
            opener,
            options,
            logger,
        }
    }

    /// Processes every input. Only an unusable output directory fails the call.
    pub fn run(&self, inputs: &[PathBuf]) -> Result<BatchSummary> {
        let start = Instant::now();
        let preview = self.options.preview || self.pipeline.is_dry_run();
        if !preview && let Some(dir) = &self.options.output_dir {
            fs::create_dir_all(dir).map_err(|source| RedactError::io(dir, source))?;
        }

        let workers = self.options.workers.clamp(1, inputs.len().max(1));
        self.log_event(ActivityEvent::BatchStarted {
            files: inputs.len(),
            workers,
            dry_run: preview,
            config_hash: self.options.config_hash.clone(),
        });

        let conflicts = if preview {
            vec![None; inputs.len()]
        } else {
            self.output_conflicts(inputs)
        };
        let jobs: Vec<Job<'_>> = inputs
            .iter()
            .zip(&conflicts)
            .map(|(path, conflict)| Job {
                path,
                claimed_by: conflict.as_deref(),
            })
            .collect();

        let results = Mutex::new(Vec::with_capacity(inputs.len()));
        let (tx, rx) = bounded::<Job<'_>>(workers * 2);
        thread::scope(|scope| {
            let mut spawned = 0_usize;
            for index in 0..workers {
                let rx = rx.clone();
                let results = &results;
                let worker = thread::Builder::new()
                    .name(format!("pdfr-worker-{index}"))
                    .spawn_scoped(scope, move || {
                        for job in rx {
                            let outcome = self.run_file(job, preview);
                            results.lock().push(outcome);
                        }
                    });
                if worker.is_ok() {
                    spawned += 1;
                }
            }
            drop(rx);

            if spawned == 0 {
                for job in &jobs {
                    let outcome = self.run_file(*job, preview);
                    results.lock().push(outcome);
                }
                return;
            }
            for job in &jobs {
                if tx.send(*job).is_err() {
                    break;
                }
            }
            drop(tx);
        });

        let mut files = results.into_inner();
        files.sort_by(|a, b| {
            a.source
                .file_name()
                .cmp(&b.source.file_name())
                .then_with(|| a.source.cmp(&b.source))
        });

        let succeeded = files.iter().filter(|f| f.is_success()).count();
        let summary = BatchSummary {
            succeeded,
            failed: files.len() - succeeded,
            units: files.iter().map(|f| f.units().len()).sum(),
            skipped_pages: files
                .iter()
                .filter_map(|f| f.report.as_ref())
                .map(|r| r.diagnostics.len())
                .sum(),
            preview,
            duration_ms: elapsed_ms(start),
            files,
        };
        self.log_event(ActivityEvent::BatchCompleted {
            succeeded: summary.succeeded,
            failed: summary.failed,
            units: summary.units,
            duration_ms: summary.duration_ms,
        });
        Ok(summary)
    }

    fn run_file(&self, job: Job<'_>, preview: bool) -> FileOutcome {
        let path = job.path;
        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.process_file(job, preview)))
            .unwrap_or_else(|payload| {
                Err(RedactError::Runtime {
                    details: format!("worker panicked: {}", panic_message(payload.as_ref())),
                })
            });
        let fingerprint = path.is_file().then(|| fingerprint(path).ok()).flatten();
        let duration_ms = elapsed_ms(start);
        let source = path.display().to_string();

        match result {
            Ok(report) => {
                self.log_event(ActivityEvent::FileCompleted {
                    path: source,
                    units: report.units.len(),
                    skipped_pages: report.diagnostics.len(),
                    duration_ms,
                });
                FileOutcome {
                    source: path.to_path_buf(),
                    fingerprint,
                    status: FileStatus::Succeeded,
                    report: Some(report),
                    error: None,
                    duration_ms,
                }
            }
            Err(error) => {
                self.log_event(ActivityEvent::FileFailed {
                    path: source,
                    error_code: error.code().to_string(),
                    error_message: error.to_string(),
                });
                FileOutcome {
                    source: path.to_path_buf(),
                    fingerprint,
                    status: FileStatus::Failed,
                    report: None,
                    error: Some(FileFailure::from(&error)),
                    duration_ms,
                }
            }
        }
    }

    fn process_file(&self, job: Job<'_>, preview: bool) -> Result<DocumentReport> {
        let path = job.path;
        if preview {
            let doc = self.opener.open(path)?;
            return self.pipeline.preview(doc.as_ref());
        }
        let output = self.output_path(path)?;
        if let (Some(output), Some(first)) = (&output, job.claimed_by) {
            return Err(RedactError::backend(
                "save",
                format!(
                    "output {} is already claimed by {}; rename one of the inputs",
                    output.display(),
                    first.display()
                ),
            ));
        }
        let mut doc = self.opener.open(path)?;
        self.pipeline.process(doc.as_mut(), output.as_deref())
    }

    /// For each input, the earlier input whose output it would overwrite.
    fn output_conflicts(&self, inputs: &[PathBuf]) -> Vec<Option<PathBuf>> {
        let Some(dir) = &self.options.output_dir else {
            return vec![None; inputs.len()];
        };
        let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
        inputs
            .iter()
            .map(|input| {
                let name = input.file_name()?;
                match claimed.get(&dir.join(name)) {
                    Some(first) => Some(first.to_path_buf()),
                    None => {
                        claimed.insert(dir.join(name), input);
                        None
                    }
                }
            })
            .collect()
    }

    fn output_path(&self, input: &Path) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.options.output_dir else {
            return Ok(None);
        };
        let name = input.file_name().ok_or_else(|| {
            RedactError::backend("save", format!("input {} has no file name", input.display()))
        })?;
        let output = dir.join(name);
        if same_file(&output, input) {
            return Err(RedactError::backend(
                "save",
                format!("output {} would overwrite its input", output.display()),
            ));
        }
        Ok(Some(output))
    }

    fn log_event(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

/// One input plus the earlier input that already owns its output, if any.
#[derive(Debug, Clone, Copy)]
struct Job<'p> {
    path: &'p Path,
    claimed_by: Option<&'p Path>,
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Files directly under `dir` with the given extension, sorted by name.
pub fn discover_inputs(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| RedactError::io(dir, source))?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| RedactError::io(dir, source))?;
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if matches && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::geometry::Rect;
    use crate::document::memory::{MemoryDocument, MemoryOpener, MemoryPage};
    use crate::document::{DocumentBackend, PageRaster, PageSize, TextRun};

    fn pipeline() -> Pipeline {
        let mut config = Config::default();
        config.text.pii.redact_emails = true;
        config.processing.render_dpi = 72;
        Pipeline::from_config(&config).unwrap().0
    }

    fn email_doc(name: &str) -> MemoryDocument {
        let run = TextRun::new(
            "mail ops@example.com",
            Rect::new(50.0, 20.0, 250.0, 32.0),
            "Arial",
            11.0,
        );
        MemoryDocument::new(name, vec![MemoryPage::new(PageSize::new(300.0, 300.0)).with_runs(vec![run])])
    }

    #[test]
    fn outcomes_are_sorted_by_file_name() {
        let mut opener = MemoryOpener::new();
        let names = ["c.json", "a.json", "b.json"];
        for name in names {
            opener.insert(email_doc(name));
        }
        let inputs: Vec<PathBuf> = names.iter().map(PathBuf::from).collect();
        let pipeline = pipeline();
        let summary = BatchRunner::new(&pipeline, &opener, BatchOptions::default(), None)
            .run(&inputs)
            .unwrap();
        let order: Vec<_> = summary.files.iter().map(|f| f.source.clone()).collect();
        assert_eq!(
            order,
            vec![PathBuf::from("a.json"), PathBuf::from("b.json"), PathBuf::from("c.json")]
        );
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.units, 3);
    }

    struct Panicking;

    impl DocumentBackend for Panicking {
        fn source(&self) -> &Path {
            Path::new("panic.json")
        }

        fn page_count(&self) -> usize {
            1
        }

        fn page_size(&self, _: usize) -> Result<PageSize> {
            panic!("backend bug")
        }

        fn extract_text_runs(&self, _: usize) -> Result<Vec<TextRun>> {
            Ok(Vec::new())
        }

        fn rasterize(&self, _: usize, _: u32) -> Result<PageRaster> {
            Err(RedactError::backend("rasterize", "unused"))
        }

        fn apply_redaction(&mut self, _: usize, _: Rect) -> Result<()> {
            Ok(())
        }

        fn save(&mut self, _: &Path) -> Result<()> {
            Ok(())
        }
    }

    struct PanicOpener(MemoryOpener);

    impl DocumentOpener for PanicOpener {
        fn open(&self, path: &Path) -> Result<Box<dyn DocumentBackend>> {
            if path == Path::new("panic.json") {
                return Ok(Box::new(Panicking));
            }
            self.0.open(path)
        }
    }

    #[test]
    fn panicking_file_is_reported_and_batch_continues() {
        let mut inner = MemoryOpener::new();
        inner.insert(email_doc("ok.json"));
        let opener = PanicOpener(inner);
        let pipeline = pipeline();
        let options = BatchOptions {
            workers: 2,
            ..BatchOptions::default()
        };
        let summary = BatchRunner::new(&pipeline, &opener, options, None)
            .run(&[PathBuf::from("panic.json"), PathBuf::from("ok.json")])
            .unwrap();
        assert_eq!(summary.failed, 1);
        let failed = summary.outcome(Path::new("panic.json")).unwrap();
        assert_eq!(failed.error.as_ref().unwrap().code, "PDFR-3900");
        assert!(failed.error.as_ref().unwrap().message.contains("backend bug"));
        assert!(summary.outcome(Path::new("ok.json")).unwrap().is_success());
    }

    #[test]
    fn preview_batch_applies_nothing() {
        let mut opener = MemoryOpener::new();
        let log = opener.insert(email_doc("a.json"));
        let pipeline = pipeline();
        let options = BatchOptions {
            preview: true,
            ..BatchOptions::default()
        };
        let summary = BatchRunner::new(&pipeline, &opener, options, None)
            .run(&[PathBuf::from("a.json")])
            .unwrap();
        assert!(summary.preview);
        assert_eq!(summary.units, 1);
        assert_eq!(log.apply_calls(), 0);
    }

    #[test]
    fn output_dir_receives_input_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("redacted");
        let mut opener = MemoryOpener::new();
        let log = opener.insert(email_doc("in/a.json"));
        let pipeline = pipeline();
        let options = BatchOptions {
            output_dir: Some(out.clone()),
            ..BatchOptions::default()
        };
        let summary = BatchRunner::new(&pipeline, &opener, options, None)
            .run(&[PathBuf::from("in/a.json")])
            .unwrap();
        assert!(out.is_dir());
        assert_eq!(summary.files[0].report.as_ref().unwrap().output, Some(out.join("a.json")));
        assert_eq!(log.saved_to(), vec![out.join("a.json")]);
    }

    #[test]
    fn inputs_sharing_a_file_name_do_not_overwrite_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("redacted");
        let mut opener = MemoryOpener::new();
        let first = opener.insert(email_doc("north/plan.json"));
        let second = opener.insert(email_doc("south/plan.json"));
        opener.insert(email_doc("east/other.json"));
        let pipeline = pipeline();
        let options = BatchOptions {
            workers: 3,
            output_dir: Some(out.clone()),
            ..BatchOptions::default()
        };
        let inputs = [
            PathBuf::from("north/plan.json"),
            PathBuf::from("south/plan.json"),
            PathBuf::from("east/other.json"),
        ];

        let summary = BatchRunner::new(&pipeline, &opener, options, None)
            .run(&inputs)
            .unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(summary.outcome(Path::new("north/plan.json")).unwrap().is_success());
        let clash = summary.outcome(Path::new("south/plan.json")).unwrap();
        let error = clash.error.as_ref().unwrap();
        assert_eq!(error.code, "PDFR-3001");
        assert!(error.message.contains("already claimed by north/plan.json"), "{}", error.message);
        assert_eq!(first.saved_to(), vec![out.join("plan.json")]);
        assert!(second.saved_to().is_empty());
        assert_eq!(second.apply_calls(), 0);
    }

    #[test]
    fn preview_ignores_output_name_clashes() {
        let mut opener = MemoryOpener::new();
        opener.insert(email_doc("north/plan.json"));
        opener.insert(email_doc("south/plan.json"));
        let pipeline = pipeline();
        let options = BatchOptions {
            preview: true,
            output_dir: Some(PathBuf::from("unused")),
            ..BatchOptions::default()
        };
        let summary = BatchRunner::new(&pipeline, &opener, options, None)
            .run(&[PathBuf::from("north/plan.json"), PathBuf::from("south/plan.json")])
            .unwrap();
        assert_eq!(summary.succeeded, 2);
    }

    #[test]
    fn discover_inputs_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.json", "a.JSON", "notes.txt"] {
            fs::write(dir.path().join(name), b"{}").unwrap();
        }
        fs::create_dir(dir.path().join("sub.json")).unwrap();
        let found = discover_inputs(dir.path(), "json").unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.JSON", "b.json"]);
    }
}
