//! Decision fusion: weighted combination of candidate scorers with hard vetoes.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::PageContext;
use super::font::FontClassifier;
use super::patterns::Candidate;
use super::proximity::ProximityAnalyzer;
use super::schematic::SchematicDetector;
use super::zones::ZoneClassifier;
use crate::core::config::Config;

/// One signal over a candidate, in `[0, 1]`.
pub trait Scorer: Send + Sync {
    /// Stable name used in evidence ledgers.
    fn name(&self) -> &'static str;

    /// Signal value; clamped to `[0, 1]` by the fusion.
    fn score(&self, candidate: &Candidate, page: &PageContext<'_>) -> f64;

    /// Reason this candidate must never be redacted, if any.
    fn veto(&self, _candidate: &Candidate, _page: &PageContext<'_>) -> Option<String> {
        None
    }
}

/// Whether a signal pushes toward or away from redaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Adds `weight * score`.
    Support,
    /// Subtracts `weight * score`.
    Penalty,
}

impl Polarity {
    const fn sign(self) -> f64 {
        match self {
            Self::Support => 1.0,
            Self::Penalty => -1.0,
        }
    }
}

/// Per-signal values of the standard scorer set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalScores {
    /// Keyword proximity, `[0, 1]`.
    pub proximity: f64,
    /// Font class.
    pub font: f64,
    /// Page zone, zero when vetoed by a zone filter.
    pub zone: f64,
    /// Local line density, subtracted.
    pub schematic_penalty: f64,
}

/// One scorer's share of the fused score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceTerm {
    /// Scorer name.
    pub name: &'static str,
    /// Signed weight.
    pub weight: f64,
    /// Clamped score.
    pub value: f64,
    /// `weight * value`.
    pub contribution: f64,
}

/// Audit trail behind a verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceLedger {
    /// Terms in registration order.
    pub terms: Vec<EvidenceTerm>,
    /// One-line rendering for logs.
    pub summary: String,
}

/// A candidate with its fused score and verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    /// The scored candidate.
    pub candidate: Candidate,
    /// Per-signal values.
    pub scores: SignalScores,
    /// Weighted sum, or zero when vetoed.
    pub fused: f64,
    /// True means redact.
    pub verdict: bool,
    /// Some scorer refused redaction outright.
    pub vetoed: bool,
    /// Why, when vetoed.
    pub veto_reason: Option<String>,
    /// Per-term breakdown.
    pub ledger: EvidenceLedger,
}

struct WeightedScorer {
    scorer: Box<dyn Scorer>,
    weight: f64,
    polarity: Polarity,
}

/// Ordered set of weighted scorers plus a verdict threshold.
///
/// `fused = sum(sign_i * w_i * s_i)` accumulated in registration order;
/// the verdict is `fused > threshold` unless any scorer vetoes.
pub struct DecisionFusion {
    scorers: Vec<WeightedScorer>,
    threshold: f64,
}

impl std::fmt::Debug for DecisionFusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<(&str, f64)> = self
            .scorers
            .iter()
            .map(|s| (s.scorer.name(), s.polarity.sign() * s.weight))
            .collect();
        f.debug_struct("DecisionFusion")
            .field("scorers", &names)
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl DecisionFusion {
    /// Empty fusion; every candidate scores zero until scorers are added.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            scorers: Vec::new(),
            threshold,
        }
    }

    /// Appends a scorer. Order is the accumulation order.
    #[must_use]
    pub fn with_scorer(
        mut self,
        scorer: impl Scorer + 'static,
        weight: f64,
        polarity: Polarity,
    ) -> Self {
        self.scorers.push(WeightedScorer {
            scorer: Box::new(scorer),
            weight,
            polarity,
        });
        self
    }

    /// Proximity, font and zone in support; schematic density as penalty.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let fusion = &config.fusion;
        Self::new(fusion.threshold)
            .with_scorer(
                ProximityAnalyzer::new(config.proximity.clone()),
                fusion.proximity_weight,
                Polarity::Support,
            )
            .with_scorer(
                FontClassifier::new(config.fonts.clone()),
                fusion.font_weight,
                Polarity::Support,
            )
            .with_scorer(
                ZoneClassifier::new(config.zones.clone()),
                fusion.zone_weight,
                Polarity::Support,
            )
            .with_scorer(
                SchematicDetector::new(config.schematic.clone()),
                fusion.schematic_weight,
                Polarity::Penalty,
            )
    }

    /// Verdict threshold.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Scores one candidate. Pure: identical inputs give identical output.
    #[must_use]
    pub fn evaluate(&self, candidate: Candidate, page: &PageContext<'_>) -> ScoredCandidate {
        let mut scores = SignalScores::default();
        let mut terms = Vec::with_capacity(self.scorers.len());
        let mut fused = 0.0_f64;
        let mut veto_reason = None;

        for entry in &self.scorers {
            let value = entry.scorer.score(&candidate, page).clamp(0.0, 1.0);
            let signed_weight = entry.polarity.sign() * entry.weight;
            let contribution = signed_weight * value;
            fused = signed_weight.mul_add(value, fused);
            match entry.scorer.name() {
                "proximity" => scores.proximity = value,
                "font" => scores.font = value,
                "zone" => scores.zone = value,
                "schematic" => scores.schematic_penalty = value,
                _ => {}
            }
            if veto_reason.is_none() {
                veto_reason = entry.scorer.veto(&candidate, page);
            }
            terms.push(EvidenceTerm {
                name: entry.scorer.name(),
                weight: signed_weight,
                value,
                contribution,
            });
        }

        let vetoed = veto_reason.is_some();
        if vetoed {
            fused = 0.0;
        }
        let verdict = !vetoed && fused > self.threshold;
        let ledger = build_ledger(terms, fused, self.threshold, verdict, veto_reason.as_deref());

        ScoredCandidate {
            candidate,
            scores,
            fused,
            verdict,
            vetoed,
            veto_reason,
            ledger,
        }
    }
}

fn build_ledger(
    terms: Vec<EvidenceTerm>,
    fused: f64,
    threshold: f64,
    verdict: bool,
    veto: Option<&str>,
) -> EvidenceLedger {
    let mut summary = format!(
        "fused={fused:.3} threshold={threshold:.3} verdict={}",
        if verdict { "redact" } else { "keep" }
    );
    if let Some(reason) = veto {
        let _ = write!(summary, " vetoed=({reason})");
    }
    for term in &terms {
        let _ = write!(
            summary,
            " {}={:.3}*{:.3}",
            term.name, term.weight, term.value
        );
    }
    EvidenceLedger { terms, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::Rect;
    use crate::detect::patterns::PatternRegistry;
    use crate::document::PageSize;

    struct Fixed(&'static str, f64);

    impl Scorer for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn score(&self, _: &Candidate, _: &PageContext<'_>) -> f64 {
            self.1
        }
    }

    struct Veto;

    impl Scorer for Veto {
        fn name(&self) -> &'static str {
            "veto"
        }

        fn score(&self, _: &Candidate, _: &PageContext<'_>) -> f64 {
            1.0
        }

        fn veto(&self, _: &Candidate, _: &PageContext<'_>) -> Option<String> {
            Some("always".to_string())
        }
    }

    fn candidate() -> Candidate {
        Candidate {
            text: "123".to_string(),
            page: 0,
            bbox: Rect::new(10.0, 10.0, 30.0, 20.0),
            pattern_id: "p".to_string(),
            font_name: "Arial".to_string(),
            font_size: 11.0,
            font_flags: 0,
        }
    }

    fn standard(prox: f64, font: f64, zone: f64, schematic: f64) -> DecisionFusion {
        DecisionFusion::new(0.6)
            .with_scorer(Fixed("proximity", prox), 0.4, Polarity::Support)
            .with_scorer(Fixed("font", font), 0.3, Polarity::Support)
            .with_scorer(Fixed("zone", zone), 0.3, Polarity::Support)
            .with_scorer(Fixed("schematic", schematic), 2.0, Polarity::Penalty)
    }

    fn with_page<T>(f: impl FnOnce(&PageContext<'_>) -> T) -> T {
        let registry = PatternRegistry::default();
        let page = PageContext {
            page: 0,
            size: PageSize::new(100.0, 100.0),
            runs: &[],
            density: None,
            registry: &registry,
        };
        f(&page)
    }

    #[test]
    fn weighted_sum_with_schematic_penalty() {
        let scored = with_page(|page| standard(1.0, 1.0, 0.9, 0.0).evaluate(candidate(), page));
        assert!((scored.fused - 0.97).abs() < 1e-12);
        assert!(scored.verdict);
        assert!((scored.scores.zone - 0.9).abs() < f64::EPSILON);
        assert_eq!(scored.ledger.terms.len(), 4);

        let dense = with_page(|page| standard(1.0, 0.0, 0.1, 0.9).evaluate(candidate(), page));
        assert!(dense.fused < 0.0);
        assert!(!dense.verdict);
        assert!((dense.scores.schematic_penalty - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn threshold_is_strict() {
        let fusion =
            DecisionFusion::new(0.5).with_scorer(Fixed("proximity", 0.5), 1.0, Polarity::Support);
        let scored = with_page(|page| fusion.evaluate(candidate(), page));
        assert!(!scored.verdict, "fused == threshold must not redact");
    }

    #[test]
    fn veto_forces_keep() {
        let fusion = standard(1.0, 1.0, 1.0, 0.0).with_scorer(Veto, 1.0, Polarity::Support);
        let scored = with_page(|page| fusion.evaluate(candidate(), page));
        assert!(scored.vetoed);
        assert!(!scored.verdict);
        assert!(scored.fused.abs() < f64::EPSILON);
        assert!(scored.ledger.summary.contains("vetoed=(always)"));
    }

    #[test]
    fn scores_are_clamped_into_unit_range() {
        let fusion =
            DecisionFusion::new(0.6).with_scorer(Fixed("proximity", 7.0), 1.0, Polarity::Support);
        let scored = with_page(|page| fusion.evaluate(candidate(), page));
        assert!((scored.scores.proximity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ledger_summary_lists_every_term() {
        let scored = with_page(|page| standard(1.0, 0.5, 0.5, 0.25).evaluate(candidate(), page));
        for name in ["proximity", "font", "zone", "schematic"] {
            assert!(scored.ledger.summary.contains(name), "{}", scored.ledger.summary);
        }
        let total: f64 = scored.ledger.terms.iter().map(|t| t.contribution).sum();
        assert!((total - scored.fused).abs() < 1e-12);
    }
}
