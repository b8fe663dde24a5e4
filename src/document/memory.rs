//! In-memory document backend.
//!
//! Pages, text runs and rasters are supplied by the caller. Applying a
//! redaction rewrites them in place, and every accepted rectangle also lands
//! in a shared [`RedactionLog`] that outlives the backend, so callers can
//! inspect what the pipeline did after it consumed the document. Failures can
//! be injected per operation.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::GrayImage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{
    DocumentBackend, DocumentOpener, OutputOptions, PageRaster, PageSize, TextRun,
    page_out_of_range, paint_page_rect, redact_runs,
};
use crate::core::errors::{RedactError, Result};
use crate::core::geometry::Rect;

/// One redaction a backend accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedRedaction {
    /// Zero-based page index.
    pub page: usize,
    /// Redacted region in page points.
    pub bbox: Rect,
}

/// Shared record of applied redactions and saves.
#[derive(Debug, Clone, Default)]
pub struct RedactionLog {
    inner: Arc<Mutex<LogState>>,
}

#[derive(Debug, Default)]
struct LogState {
    applied: Vec<AppliedRedaction>,
    apply_calls: usize,
    saved_to: Vec<PathBuf>,
}

impl RedactionLog {
    /// Accepted redactions in application order.
    #[must_use]
    pub fn applied(&self) -> Vec<AppliedRedaction> {
        self.inner.lock().applied.clone()
    }

    /// Every `apply_redaction` call, including failed ones.
    #[must_use]
    pub fn apply_calls(&self) -> usize {
        self.inner.lock().apply_calls
    }

    /// Output paths of successful saves.
    #[must_use]
    pub fn saved_to(&self) -> Vec<PathBuf> {
        self.inner.lock().saved_to.clone()
    }
}

/// One page of a [`MemoryDocument`].
#[derive(Debug, Clone)]
pub struct MemoryPage {
    /// Page dimensions in points.
    pub size: PageSize,
    /// What `extract_text_runs` returns for this page.
    pub runs: Vec<TextRun>,
    /// Native rendering; `None` rasterizes to a blank page.
    pub raster: Option<GrayImage>,
    /// Resolution of `raster`.
    pub raster_dpi: u32,
}

impl MemoryPage {
    /// Empty page without a raster.
    #[must_use]
    pub fn new(size: PageSize) -> Self {
        Self {
            size,
            runs: Vec::new(),
            raster: None,
            raster_dpi: 72,
        }
    }

    /// Same page with `runs`.
    #[must_use]
    pub fn with_runs(mut self, runs: Vec<TextRun>) -> Self {
        self.runs = runs;
        self
    }

    /// Same page with a native rendering at `dpi`.
    #[must_use]
    pub fn with_raster(mut self, raster: GrayImage, dpi: u32) -> Self {
        self.raster = Some(raster);
        self.raster_dpi = dpi;
        self
    }
}

/// Failure injection knobs.
#[derive(Debug, Clone, Default)]
pub struct FailurePlan {
    /// Pages whose rasterization fails.
    pub rasterize_pages: HashSet<usize>,
    /// Pages whose text extraction fails.
    pub extract_pages: HashSet<usize>,
    /// Number of leading `apply_redaction` calls that fail transiently.
    pub transient_apply_failures: usize,
    /// Every `apply_redaction` call fails permanently.
    pub apply_always_fails: bool,
    /// Every `save` call fails.
    pub save_fails: bool,
}

/// Document held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    source: PathBuf,
    pages: Vec<MemoryPage>,
    failures: FailurePlan,
    output: OutputOptions,
    log: RedactionLog,
}

impl MemoryDocument {
    /// Document named `source` with the given pages.
    #[must_use]
    pub fn new(source: impl Into<PathBuf>, pages: Vec<MemoryPage>) -> Self {
        Self {
            source: source.into(),
            pages,
            failures: FailurePlan::default(),
            output: OutputOptions::default(),
            log: RedactionLog::default(),
        }
    }

    /// Same document with injected failures.
    #[must_use]
    pub fn with_failures(mut self, failures: FailurePlan) -> Self {
        self.failures = failures;
        self
    }

    /// Same document painting redactions as `output` says.
    #[must_use]
    pub fn with_output(mut self, output: OutputOptions) -> Self {
        self.output = output;
        self
    }

    /// Handle onto the redactions this document (and its clones) receive.
    #[must_use]
    pub fn log(&self) -> RedactionLog {
        self.log.clone()
    }

    fn page(&self, page: usize) -> Result<&MemoryPage> {
        self.pages
            .get(page)
            .ok_or_else(|| page_out_of_range(page, self.pages.len()))
    }
}

impl DocumentBackend for MemoryDocument {
    fn source(&self) -> &Path {
        &self.source
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self, page: usize) -> Result<PageSize> {
        Ok(self.page(page)?.size)
    }

    fn extract_text_runs(&self, page: usize) -> Result<Vec<TextRun>> {
        if self.failures.extract_pages.contains(&page) {
            return Err(RedactError::backend(
                "extract_text_runs",
                format!("injected text extraction failure on page {page}"),
            ));
        }
        Ok(self.page(page)?.runs.clone())
    }

    fn rasterize(&self, page: usize, dpi: u32) -> Result<PageRaster> {
        if self.failures.rasterize_pages.contains(&page) {
            return Err(RedactError::backend(
                "rasterize",
                format!("injected rasterization failure on page {page}"),
            ));
        }
        let p = self.page(page)?;
        Ok(match &p.raster {
            Some(image) => PageRaster::new(image.clone(), p.raster_dpi).resampled(p.size, dpi),
            None => PageRaster::blank(p.size, dpi),
        })
    }

    fn apply_redaction(&mut self, page: usize, rect: Rect) -> Result<()> {
        let mut state = self.log.inner.lock();
        state.apply_calls += 1;
        if self.failures.apply_always_fails {
            return Err(RedactError::backend(
                "apply_redaction",
                "injected permanent apply failure",
            ));
        }
        if self.failures.transient_apply_failures > 0 {
            self.failures.transient_apply_failures -= 1;
            return Err(RedactError::Backend {
                operation: "apply_redaction",
                details: "injected transient apply failure".to_string(),
                transient: true,
            });
        }
        let count = self.pages.len();
        let fill = self.output.fill_luma();
        let p = self
            .pages
            .get_mut(page)
            .ok_or_else(|| page_out_of_range(page, count))?;
        redact_runs(&mut p.runs, &rect);
        if let Some(raster) = p.raster.as_mut() {
            paint_page_rect(raster, &rect, p.size, fill);
        }
        state.applied.push(AppliedRedaction { page, bbox: rect });
        Ok(())
    }

    fn save(&mut self, output: &Path) -> Result<()> {
        if self.failures.save_fails {
            return Err(RedactError::backend("save", "injected save failure"));
        }
        self.log.inner.lock().saved_to.push(output.to_path_buf());
        Ok(())
    }
}

/// Opens registered in-memory documents by path.
#[derive(Debug, Default)]
pub struct MemoryOpener {
    documents: HashMap<PathBuf, MemoryDocument>,
    unopenable: HashMap<PathBuf, String>,
}

impl MemoryOpener {
    /// Opener with nothing registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `doc` under its own source path and returns its log.
    pub fn insert(&mut self, doc: MemoryDocument) -> RedactionLog {
        let log = doc.log();
        self.documents.insert(doc.source.clone(), doc);
        log
    }

    /// Makes `open(path)` fail with a backend error.
    pub fn insert_unopenable(&mut self, path: impl Into<PathBuf>, reason: impl Into<String>) {
        self.unopenable.insert(path.into(), reason.into());
    }
}

impl DocumentOpener for MemoryOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn DocumentBackend>> {
        if let Some(reason) = self.unopenable.get(path) {
            return Err(RedactError::backend("open", reason.clone()));
        }
        self.documents
            .get(path)
            .cloned()
            .map(|doc| Box::new(doc) as Box<dyn DocumentBackend>)
            .ok_or_else(|| {
                RedactError::backend("open", format!("no document registered for {}", path.display()))
            })
    }
}
