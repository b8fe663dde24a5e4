//! Document-level orchestration: page detection, redaction, batches.
//!
//! A [`Pipeline`] is built once per run from the validated config and shared
//! read-only by every batch worker.

/// Multi-file runs over a worker pool.
pub mod batch;
/// Per-page detection.
pub mod page;
/// Redaction units, planning and application.
pub mod redaction;

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::{ErrorKind, RedactError, Result};
use crate::detect::fusion::DecisionFusion;
use crate::detect::logo::LogoLocator;
use crate::detect::patterns::PatternRegistry;
use crate::detect::schematic::SchematicDetector;
use crate::document::DocumentBackend;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use page::{PageAnalysis, PageDetector, PageDiagnostic};
use redaction::{RedactionConfig, RedactionExecutor, RedactionUnit};

/// What happened to one document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    /// Input path.
    pub source: PathBuf,
    /// Pages in the document.
    pub page_count: usize,
    /// In page order; text units precede logo units within a page.
    pub units: Vec<RedactionUnit>,
    /// Pages skipped on detection errors.
    pub diagnostics: Vec<PageDiagnostic>,
    /// Candidates considered and kept.
    pub candidates_kept: usize,
    /// Rectangles handed to the backend.
    pub rects_applied: usize,
    /// Transient backend failures retried successfully.
    pub retries: usize,
    /// Nothing was applied.
    pub preview: bool,
    /// Where the redacted copy was saved.
    pub output: Option<PathBuf>,
}

/// Detection plus redaction for single documents.
pub struct Pipeline {
    detector: PageDetector,
    redaction: RedactionConfig,
    logger: Option<ActivityLoggerHandle>,
}

impl Pipeline {
    /// Builds the batch-wide state from a validated config.
    ///
    /// Template load failures come back as the second element unless
    /// `logos.strict` is set, in which case the first one is returned.
    pub fn from_config(config: &Config) -> Result<(Self, Vec<RedactError>)> {
        let registry = PatternRegistry::from_config(&config.text)?;
        let (locator, rejected) = LogoLocator::from_config(&config.logos)?;
        let detector = PageDetector::new(
            registry,
            DecisionFusion::from_config(config),
            SchematicDetector::new(config.schematic.clone()),
            locator,
            config.processing.render_dpi,
        );
        let redaction = RedactionConfig {
            dry_run: config.processing.dry_run,
            merge_distance: config.processing.merge_distance,
        };
        Ok((Self::new(detector, redaction), rejected))
    }

    /// Pipeline without an activity logger.
    #[must_use]
    pub fn new(detector: PageDetector, redaction: RedactionConfig) -> Self {
        Self {
            detector,
            redaction,
            logger: None,
        }
    }

    /// Sends activity events to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: Option<ActivityLoggerHandle>) -> Self {
        self.logger = logger;
        self
    }

    /// Shared detection state.
    #[must_use]
    pub fn detector(&self) -> &PageDetector {
        &self.detector
    }

    /// `process` only previews.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.redaction.dry_run
    }

    /// Runs detection over every page.
    ///
    /// Pages failing with a detection error are reported and skipped; any
    /// other failure aborts the document.
    pub fn analyze(&self, doc: &dyn DocumentBackend) -> Result<(Vec<PageAnalysis>, Vec<PageDiagnostic>)> {
        let mut pages = Vec::with_capacity(doc.page_count());
        let mut diagnostics = Vec::new();
        for page in 0..doc.page_count() {
            match self.detector.analyze(doc, page) {
                Ok(analysis) => pages.push(analysis),
                Err(error) if error.kind() == ErrorKind::Detection => {
                    self.log_page_skipped(doc.source(), page, &error);
                    diagnostics.push(PageDiagnostic::from_error(page, &error));
                }
                Err(error) => return Err(error),
            }
        }
        Ok((pages, diagnostics))
    }

    /// Read-only run: the full unit list, no backend mutation.
    pub fn preview(&self, doc: &dyn DocumentBackend) -> Result<DocumentReport> {
        let (pages, diagnostics) = self.analyze(doc)?;
        let report = build_report(doc, &pages, diagnostics, true);
        self.executor()
            .log_preview(&doc.source().display().to_string(), &report.units);
        Ok(report)
    }

    /// Detects, applies every accepted unit, then saves to `output` if given.
    ///
    /// With `dry_run` configured this behaves like [`Pipeline::preview`].
    /// Nothing is applied when no unit was accepted, and nothing is saved then
    /// either unless an output path was requested.
    pub fn process(
        &self,
        doc: &mut dyn DocumentBackend,
        output: Option<&Path>,
    ) -> Result<DocumentReport> {
        if self.redaction.dry_run {
            return self.preview(doc);
        }
        let (pages, diagnostics) = self.analyze(doc)?;
        let mut report = build_report(doc, &pages, diagnostics, false);

        let executor = self.executor();
        let plan = executor.plan(report.units.clone());
        let applied = executor.execute(doc, &plan)?;
        report.rects_applied = applied.rects_applied;
        report.retries = applied.retries;
        report.units = plan.units;

        if let Some(path) = output {
            save_with_retry(doc, path)?;
            report.output = Some(path.to_path_buf());
        }
        Ok(report)
    }

    fn executor(&self) -> RedactionExecutor {
        RedactionExecutor::new(self.redaction.clone(), self.logger.clone())
    }

    fn log_page_skipped(&self, source: &Path, page: usize, error: &RedactError) {
        if let Some(logger) = &self.logger {
            logger.send(ActivityEvent::PageSkipped {
                path: source.display().to_string(),
                page,
                error_code: error.code().to_string(),
                error_message: error.to_string(),
            });
        }
    }
}

fn build_report(
    doc: &dyn DocumentBackend,
    pages: &[PageAnalysis],
    diagnostics: Vec<PageDiagnostic>,
    preview: bool,
) -> DocumentReport {
    let units: Vec<RedactionUnit> = pages.iter().flat_map(PageAnalysis::units).collect();
    let candidates_kept = pages
        .iter()
        .map(|p| p.scored.iter().filter(|s| !s.verdict).count())
        .sum();
    DocumentReport {
        source: doc.source().to_path_buf(),
        page_count: doc.page_count(),
        units,
        diagnostics,
        candidates_kept,
        rects_applied: 0,
        retries: 0,
        preview,
        output: None,
    }
}

fn save_with_retry(doc: &mut dyn DocumentBackend, path: &Path) -> Result<()> {
    match doc.save(path) {
        Err(error) if error.is_retryable() => doc.save(path),
        other => other,
    }
}

/// Elapsed milliseconds, saturating.
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
