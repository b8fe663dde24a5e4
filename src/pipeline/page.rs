//! Per-page detection.
//!
//! Text: runs → pattern candidates → scorers → fusion verdicts.
//! Images: one raster per page, shared by schematic analysis and every logo
//! template, owned by a [`PageScope`] that is dropped before the next page.

use serde::{Deserialize, Serialize};

use super::redaction::RedactionUnit;
use crate::core::errors::{ErrorKind, RedactError, Result};
use crate::detect::PageContext;
use crate::detect::fusion::{DecisionFusion, ScoredCandidate};
use crate::detect::logo::{LogoLocator, LogoMatch};
use crate::detect::patterns::PatternRegistry;
use crate::detect::schematic::{DensityGrid, SchematicDetector};
use crate::document::{DocumentBackend, PageRaster, PageSize};

/// Why a page was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDiagnostic {
    /// Zero-based page index.
    pub page: usize,
    /// Error code, e.g. `PDFR-2001`.
    pub code: String,
    /// Rendered error.
    pub message: String,
}

impl PageDiagnostic {
    /// Diagnostic for `page` from the error that skipped it.
    #[must_use]
    pub fn from_error(page: usize, error: &RedactError) -> Self {
        Self {
            page,
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Detection result for one page.
#[derive(Debug, Clone, Default)]
pub struct PageAnalysis {
    /// Zero-based page index.
    pub page: usize,
    /// Every candidate with its verdict, redacted or not.
    pub scored: Vec<ScoredCandidate>,
    /// Logo matches, one per template at most.
    pub logos: Vec<LogoMatch>,
    /// Densest grid cell, when the schematic detector ran.
    pub max_density: Option<f64>,
    /// Whether the page was rendered at all.
    pub rasterized: bool,
}

impl PageAnalysis {
    fn empty(page: usize) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }

    /// Accepted text candidates first, then logo matches.
    #[must_use]
    pub fn units(&self) -> Vec<RedactionUnit> {
        self.scored
            .iter()
            .filter_map(RedactionUnit::from_scored)
            .chain(self.logos.iter().map(RedactionUnit::from_logo))
            .collect()
    }
}

/// Raster and density of the page being processed.
struct PageScope {
    raster: PageRaster,
    density: Option<DensityGrid>,
}

/// Batch-wide, read-only detection state.
#[derive(Debug)]
pub struct PageDetector {
    registry: PatternRegistry,
    fusion: DecisionFusion,
    schematic: SchematicDetector,
    locator: LogoLocator,
    render_dpi: u32,
}

impl PageDetector {
    /// Detector from prebuilt parts.
    #[must_use]
    pub fn new(
        registry: PatternRegistry,
        fusion: DecisionFusion,
        schematic: SchematicDetector,
        locator: LogoLocator,
        render_dpi: u32,
    ) -> Self {
        Self {
            registry,
            fusion,
            schematic,
            locator,
            render_dpi,
        }
    }

    /// Compiled pattern rules.
    #[must_use]
    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// Active logo templates.
    #[must_use]
    pub fn locator(&self) -> &LogoLocator {
        &self.locator
    }

    /// Resolution pages are rasterized at.
    #[must_use]
    pub const fn render_dpi(&self) -> u32 {
        self.render_dpi
    }

    /// Analyzes one page.
    ///
    /// Detection errors mean "skip this page"; any other error fails the file.
    /// Pages with neither candidates nor templates are never rasterized.
    pub fn analyze(&self, doc: &dyn DocumentBackend, page: usize) -> Result<PageAnalysis> {
        let size = doc.page_size(page)?;
        if !(size.width > 0.0 && size.height > 0.0) {
            return Err(RedactError::detection(
                page,
                format!("degenerate page geometry {}x{}", size.width, size.height),
            ));
        }
        let runs = doc.extract_text_runs(page)?;
        let candidates = self.registry.find_candidates(page, &runs);
        if candidates.is_empty() && self.locator.is_empty() {
            return Ok(PageAnalysis::empty(page));
        }

        let scope = self.open_scope(doc, page, size, !candidates.is_empty())?;
        let context = PageContext {
            page,
            size,
            runs: &runs,
            density: scope.density.as_ref(),
            registry: &self.registry,
        };
        let scored = candidates
            .into_iter()
            .map(|candidate| self.fusion.evaluate(candidate, &context))
            .collect();
        let logos = self.locator.locate(page, &scope.raster);

        Ok(PageAnalysis {
            page,
            scored,
            logos,
            max_density: scope.density.as_ref().map(DensityGrid::max_density),
            rasterized: true,
        })
    }

    fn open_scope(
        &self,
        doc: &dyn DocumentBackend,
        page: usize,
        size: PageSize,
        needs_density: bool,
    ) -> Result<PageScope> {
        let raster = doc
            .rasterize(page, self.render_dpi)
            .map_err(|e| as_detection(page, e))?;
        if raster.width() == 0 || raster.height() == 0 {
            return Err(RedactError::detection(page, "backend returned an empty raster"));
        }
        // Geometry must agree with the page box, or boxes would land off target.
        let expected = size.pixel_dimensions(raster.dpi);
        let raster = if raster.image.dimensions() == expected {
            raster
        } else {
            raster.resampled(size, raster.dpi)
        };
        let density = if needs_density {
            Some(self.schematic.analyze(page, &raster)?)
        } else {
            None
        };
        Ok(PageScope { raster, density })
    }
}

fn as_detection(page: usize, error: RedactError) -> RedactError {
    match error.kind() {
        ErrorKind::Detection => error,
        _ => RedactError::detection(page, format!("rasterization failed: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{Config, TextPattern};
    use crate::core::geometry::Rect;
    use crate::document::TextRun;
    use crate::document::memory::{FailurePlan, MemoryDocument, MemoryPage};

    fn detector(rules: Vec<TextPattern>) -> PageDetector {
        let config = Config::default();
        PageDetector::new(
            PatternRegistry::from_rules(rules).unwrap(),
            DecisionFusion::from_config(&config),
            SchematicDetector::new(config.schematic.clone()),
            LogoLocator::default(),
            72,
        )
    }

    fn literal(id: &str, pattern: &str) -> TextPattern {
        TextPattern {
            id: id.to_string(),
            pattern: pattern.to_string(),
            literal: true,
            ..TextPattern::default()
        }
    }

    fn page_with(text: &str) -> MemoryPage {
        MemoryPage::new(PageSize::new(400.0, 400.0)).with_runs(vec![TextRun::new(
            text,
            Rect::new(100.0, 20.0, 200.0, 32.0),
            "Arial",
            11.0,
        )])
    }

    #[test]
    fn page_without_candidates_or_templates_is_not_rasterized() {
        let doc = MemoryDocument::new("a", vec![page_with("nothing here")]).with_failures(
            FailurePlan {
                rasterize_pages: [0].into_iter().collect(),
                ..FailurePlan::default()
            },
        );
        let analysis = detector(vec![literal("acme", "ACME")]).analyze(&doc, 0).unwrap();
        assert!(!analysis.rasterized);
        assert!(analysis.units().is_empty());
    }

    #[test]
    fn header_candidate_on_blank_raster_is_redacted() {
        let doc = MemoryDocument::new("a", vec![page_with("ACME Corp")]);
        let analysis = detector(vec![literal("acme", "ACME")]).analyze(&doc, 0).unwrap();
        assert!(analysis.rasterized);
        assert_eq!(analysis.scored.len(), 1);
        assert!(analysis.max_density.unwrap().abs() < f64::EPSILON);
        let units = analysis.units();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].label, "acme");
    }

    #[test]
    fn raster_failure_becomes_detection_error() {
        let doc = MemoryDocument::new("a", vec![page_with("ACME Corp")]).with_failures(
            FailurePlan {
                rasterize_pages: [0].into_iter().collect(),
                ..FailurePlan::default()
            },
        );
        let err = detector(vec![literal("acme", "ACME")]).analyze(&doc, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Detection);
    }

    #[test]
    fn extraction_failure_stays_a_backend_error() {
        let doc = MemoryDocument::new("a", vec![page_with("ACME Corp")]).with_failures(
            FailurePlan {
                extract_pages: [0].into_iter().collect(),
                ..FailurePlan::default()
            },
        );
        let err = detector(vec![literal("acme", "ACME")]).analyze(&doc, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
    }

    #[test]
    fn degenerate_page_is_a_detection_error() {
        let doc = MemoryDocument::new("a", vec![MemoryPage::new(PageSize::new(0.0, 100.0))]);
        let err = detector(Vec::new()).analyze(&doc, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Detection);
        let diag = PageDiagnostic::from_error(0, &err);
        assert_eq!(diag.code, "PDFR-2001");
    }
}
