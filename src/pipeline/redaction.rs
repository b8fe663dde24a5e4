//! Redaction units and their application to a document backend.
//!
//! Planning is pure: accepted text candidates and logo matches become
//! [`RedactionUnit`]s, grouped per page and optionally unioned when close.
//! Execution is the only place that calls `apply_redaction`, once per planned
//! rectangle, with a single retry for transient backend failures.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::errors::Result;
use crate::core::geometry::{Rect, merge_nearby};
use crate::detect::fusion::{ScoredCandidate, SignalScores};
use crate::detect::logo::LogoMatch;
use crate::document::DocumentBackend;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::logger::jsonl::ScoreFactorsRecord;

// ──────────────────── redaction units ────────────────────

/// What produced a redaction unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// A text candidate.
    Text,
    /// A logo match.
    Logo,
}

impl UnitKind {
    /// Lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Logo => "logo",
        }
    }
}

/// One rectangle to remove, from either a text verdict or a logo match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionUnit {
    /// Zero-based page index.
    pub page: usize,
    /// Page coordinates.
    pub bbox: Rect,
    /// Source of the unit.
    pub kind: UnitKind,
    /// Pattern id for text, template name for logos.
    pub label: String,
    /// Fused score for text, correlation for logos.
    pub confidence: f64,
    /// Matched text, for text units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Signal breakdown, for text units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<SignalScores>,
}

impl RedactionUnit {
    /// `None` unless the candidate's verdict is redact.
    #[must_use]
    pub fn from_scored(scored: &ScoredCandidate) -> Option<Self> {
        scored.verdict.then(|| Self {
            page: scored.candidate.page,
            bbox: scored.candidate.bbox,
            kind: UnitKind::Text,
            label: scored.candidate.pattern_id.clone(),
            confidence: scored.fused,
            text: Some(scored.candidate.text.clone()),
            scores: Some(scored.scores),
        })
    }

    /// Unit covering a logo match.
    #[must_use]
    pub fn from_logo(found: &LogoMatch) -> Self {
        Self {
            page: found.page,
            bbox: found.bbox,
            kind: UnitKind::Logo,
            label: found.template.clone(),
            confidence: found.confidence,
            text: None,
            scores: None,
        }
    }
}

// ──────────────────── configuration ────────────────────

/// Executor behavior.
#[derive(Debug, Clone, Default)]
pub struct RedactionConfig {
    /// Plan and log only; the backend is never touched.
    pub dry_run: bool,
    /// Union same-page rectangles whose gap is at most this many points.
    pub merge_distance: Option<f64>,
}

// ──────────────────── plan / report types ────────────────────

/// One rectangle as it will be applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlannedRect {
    /// Zero-based page index.
    pub page: usize,
    /// Page coordinates.
    pub bbox: Rect,
}

/// Units plus the exact rectangles that will be applied, in page order.
#[derive(Debug, Clone, Default)]
pub struct RedactionPlan {
    /// Units in page order.
    pub units: Vec<RedactionUnit>,
    /// Rectangles after optional merging.
    pub rects: Vec<PlannedRect>,
}

impl RedactionPlan {
    /// Nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }
}

/// Outcome of executing a plan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RedactionReport {
    /// Rectangles the backend accepted.
    pub rects_applied: usize,
    /// Units behind those rectangles.
    pub units: usize,
    /// Transient failures that succeeded on retry.
    pub retries: usize,
    /// Nothing was applied.
    pub dry_run: bool,
    /// Wall time spent applying.
    #[serde(skip)]
    pub duration: Duration,
}

// ──────────────────── executor ────────────────────

/// Plans and applies redaction units against a backend.
pub struct RedactionExecutor {
    config: RedactionConfig,
    logger: Option<ActivityLoggerHandle>,
}

impl RedactionExecutor {
    /// Executor logging to `logger` when given.
    #[must_use]
    pub fn new(config: RedactionConfig, logger: Option<ActivityLoggerHandle>) -> Self {
        Self { config, logger }
    }

    /// Behavior in effect.
    #[must_use]
    pub fn config(&self) -> &RedactionConfig {
        &self.config
    }

    /// Orders units by page and derives the rectangles to apply.
    ///
    /// Without `merge_distance` there is exactly one rectangle per unit.
    #[must_use]
    pub fn plan(&self, mut units: Vec<RedactionUnit>) -> RedactionPlan {
        // Stable: within a page, text units keep detection order ahead of logos.
        units.sort_by_key(|u| u.page);

        let mut rects = Vec::with_capacity(units.len());
        for chunk in units.chunk_by(|a, b| a.page == b.page) {
            let page = chunk[0].page;
            let boxes: Vec<Rect> = chunk.iter().map(|u| u.bbox).collect();
            let boxes = match self.config.merge_distance {
                Some(distance) => merge_nearby(&boxes, distance),
                None => boxes,
            };
            rects.extend(boxes.into_iter().map(|bbox| PlannedRect { page, bbox }));
        }
        RedactionPlan { units, rects }
    }

    /// Applies every planned rectangle.
    ///
    /// A failure that survives the single transient retry aborts the file.
    pub fn execute(
        &self,
        backend: &mut dyn DocumentBackend,
        plan: &RedactionPlan,
    ) -> Result<RedactionReport> {
        let start = Instant::now();
        let mut report = RedactionReport {
            units: plan.units.len(),
            dry_run: self.config.dry_run,
            ..RedactionReport::default()
        };

        if !self.config.dry_run {
            for rect in &plan.rects {
                if apply_once_with_retry(backend, rect)? {
                    report.retries += 1;
                }
                report.rects_applied += 1;
            }
        }

        let source = backend.source().display().to_string();
        for unit in &plan.units {
            self.log_unit(&source, unit);
        }

        report.duration = start.elapsed();
        Ok(report)
    }

    /// Logs units without ever touching a backend.
    pub fn log_preview(&self, source: &str, units: &[RedactionUnit]) {
        for unit in units {
            self.log_unit_as(source, unit, false);
        }
    }

    fn log_unit(&self, source: &str, unit: &RedactionUnit) {
        self.log_unit_as(source, unit, !self.config.dry_run);
    }

    fn log_unit_as(&self, source: &str, unit: &RedactionUnit, applied: bool) {
        if let Some(logger) = &self.logger {
            logger.send(ActivityEvent::RedactionApplied {
                path: source.to_string(),
                page: unit.page,
                kind: unit.kind.as_str().to_string(),
                label: unit.label.clone(),
                confidence: unit.confidence,
                factors: unit.scores.map(|s| ScoreFactorsRecord {
                    proximity: s.proximity,
                    font: s.font,
                    zone: s.zone,
                    schematic: s.schematic_penalty,
                }),
                applied,
            });
        }
    }
}

/// Returns whether a retry was needed.
fn apply_once_with_retry(backend: &mut dyn DocumentBackend, rect: &PlannedRect) -> Result<bool> {
    match backend.apply_redaction(rect.page, rect.bbox) {
        Ok(()) => Ok(false),
        Err(error) if error.is_retryable() => {
            backend.apply_redaction(rect.page, rect.bbox)?;
            Ok(true)
        }
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::PixelRect;
    use crate::detect::patterns::Candidate;
    use crate::document::PageSize;
    use crate::document::memory::{FailurePlan, MemoryDocument, MemoryPage};

    fn unit(page: usize, x: f64) -> RedactionUnit {
        RedactionUnit {
            page,
            bbox: Rect::new(x, 10.0, x + 20.0, 20.0),
            kind: UnitKind::Text,
            label: "p".to_string(),
            confidence: 0.9,
            text: None,
            scores: None,
        }
    }

    fn doc(failures: FailurePlan) -> MemoryDocument {
        let pages = vec![MemoryPage::new(PageSize::new(200.0, 200.0)); 2];
        MemoryDocument::new("doc.json", pages).with_failures(failures)
    }

    fn executor(dry_run: bool, merge_distance: Option<f64>) -> RedactionExecutor {
        RedactionExecutor::new(
            RedactionConfig {
                dry_run,
                merge_distance,
            },
            None,
        )
    }

    #[test]
    fn units_from_verdicts_and_logos() {
        let candidate = Candidate {
            text: "a@b.io".to_string(),
            page: 1,
            bbox: Rect::new(1.0, 2.0, 3.0, 4.0),
            pattern_id: "pii.email".to_string(),
            font_name: "Arial".to_string(),
            font_size: 10.0,
            font_flags: 0,
        };
        let mut scored = ScoredCandidate {
            candidate,
            scores: SignalScores::default(),
            fused: 0.8,
            verdict: true,
            vetoed: false,
            veto_reason: None,
            ledger: crate::detect::fusion::EvidenceLedger {
                terms: Vec::new(),
                summary: String::new(),
            },
        };
        let text = RedactionUnit::from_scored(&scored).unwrap();
        assert_eq!(text.kind, UnitKind::Text);
        assert_eq!(text.label, "pii.email");
        scored.verdict = false;
        assert!(RedactionUnit::from_scored(&scored).is_none());

        let logo = RedactionUnit::from_logo(&LogoMatch {
            template: "acme".to_string(),
            page: 0,
            bbox: Rect::new(0.0, 0.0, 5.0, 5.0),
            raster_bbox: PixelRect::new(0, 0, 5, 5),
            confidence: 0.97,
            scale: 1.0,
            rotation_deg: 0.0,
        });
        assert_eq!(logo.kind, UnitKind::Logo);
        assert_eq!(logo.label, "acme");
    }

    #[test]
    fn plan_without_merge_keeps_one_rect_per_unit() {
        let plan = executor(false, None).plan(vec![unit(1, 0.0), unit(0, 0.0), unit(0, 25.0)]);
        assert_eq!(plan.rects.len(), 3);
        assert_eq!(plan.units[0].page, 0);
        assert_eq!(plan.units[2].page, 1);
    }

    #[test]
    fn plan_merges_close_rects_on_the_same_page_only() {
        let plan = executor(false, Some(10.0)).plan(vec![unit(0, 0.0), unit(0, 25.0), unit(1, 25.0)]);
        assert_eq!(plan.units.len(), 3);
        assert_eq!(plan.rects.len(), 2);
        assert_eq!(plan.rects[0].bbox, Rect::new(0.0, 10.0, 45.0, 20.0));
    }

    #[test]
    fn execute_applies_each_rect_once() {
        let mut document = doc(FailurePlan::default());
        let log = document.log();
        let exec = executor(false, None);
        let plan = exec.plan(vec![unit(0, 0.0), unit(1, 50.0)]);
        let report = exec.execute(&mut document, &plan).unwrap();
        assert_eq!(report.rects_applied, 2);
        assert_eq!(report.retries, 0);
        assert_eq!(log.apply_calls(), 2);
        assert_eq!(log.applied()[1].page, 1);
    }

    #[test]
    fn dry_run_never_calls_the_backend() {
        let mut document = doc(FailurePlan::default());
        let log = document.log();
        let exec = executor(true, None);
        let plan = exec.plan(vec![unit(0, 0.0)]);
        let report = exec.execute(&mut document, &plan).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.rects_applied, 0);
        assert_eq!(log.apply_calls(), 0);
    }

    #[test]
    fn transient_failure_is_retried_once() {
        let mut document = doc(FailurePlan {
            transient_apply_failures: 1,
            ..FailurePlan::default()
        });
        let log = document.log();
        let exec = executor(false, None);
        let report = exec.execute(&mut document, &exec.plan(vec![unit(0, 0.0)])).unwrap();
        assert_eq!(report.retries, 1);
        assert_eq!(log.apply_calls(), 2);
        assert_eq!(log.applied().len(), 1);
    }

    #[test]
    fn second_transient_failure_fails_the_file() {
        let mut document = doc(FailurePlan {
            transient_apply_failures: 2,
            ..FailurePlan::default()
        });
        let log = document.log();
        let exec = executor(false, None);
        let err = exec
            .execute(&mut document, &exec.plan(vec![unit(0, 0.0)]))
            .unwrap_err();
        assert_eq!(err.code(), "PDFR-3001");
        assert_eq!(log.apply_calls(), 2);
    }

    #[test]
    fn permanent_failure_is_not_retried() {
        let mut document = doc(FailurePlan {
            apply_always_fails: true,
            ..FailurePlan::default()
        });
        let log = document.log();
        let exec = executor(false, None);
        assert!(exec.execute(&mut document, &exec.plan(vec![unit(0, 0.0)])).is_err());
        assert_eq!(log.apply_calls(), 1);
    }
}
