//! Context keyword proximity scoring.

#![allow(clippy::cast_precision_loss)]

use memchr::memmem;

use super::PageContext;
use super::fusion::Scorer;
use super::patterns::Candidate;
use crate::core::config::{ProximityConfig, TextPattern};
use crate::core::geometry::Rect;
use crate::document::TextRun;

/// Keyword tallies behind one proximity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityEvidence {
    /// Proximity signal, `[0, 1]`.
    pub score: f64,
    /// Context keywords found within the radius.
    pub context_hits: Vec<String>,
    /// Exclusion keywords found within the radius.
    pub exclusion_hits: Vec<String>,
    /// False when the rule configures no context keywords.
    pub applicable: bool,
}

/// Scores candidates by the keywords around them.
#[derive(Debug, Clone)]
pub struct ProximityAnalyzer {
    config: ProximityConfig,
}

impl ProximityAnalyzer {
    /// Analyzer with the given scoring knobs.
    #[must_use]
    pub fn new(config: ProximityConfig) -> Self {
        Self { config }
    }

    /// Full evidence for one candidate against its rule and the page runs.
    #[must_use]
    pub fn analyze(
        &self,
        candidate: &Candidate,
        rule: Option<&TextPattern>,
        runs: &[TextRun],
    ) -> ProximityEvidence {
        let Some(rule) = rule.filter(|r| !r.context_keywords.is_empty()) else {
            return ProximityEvidence {
                score: self.config.inapplicable_score,
                context_hits: Vec::new(),
                exclusion_hits: Vec::new(),
                applicable: false,
            };
        };

        let (cx, cy) = candidate.bbox.center();
        let radius = rule.proximity_threshold;
        let nearby: Vec<String> = runs
            .iter()
            .filter(|run| point_to_rect_distance(cx, cy, &run.bbox) <= radius)
            .map(|run| run.text.to_lowercase())
            .collect();

        let context_hits = keywords_present(&rule.context_keywords, &nearby);
        let exclusion_hits = keywords_present(&rule.exclude_if_near, &nearby);

        let score = if context_hits.is_empty() && exclusion_hits.is_empty() {
            self.config.neutral_score
        } else {
            let net = (self.config.exclusion_strength * exclusion_hits.len() as f64)
                .mul_add(-1.0, context_hits.len() as f64);
            (net / self.config.saturation).clamp(0.0, 1.0)
        };

        ProximityEvidence {
            score,
            context_hits,
            exclusion_hits,
            applicable: true,
        }
    }
}

impl Scorer for ProximityAnalyzer {
    fn name(&self) -> &'static str {
        "proximity"
    }

    fn score(&self, candidate: &Candidate, page: &PageContext<'_>) -> f64 {
        self.analyze(candidate, page.rule_for(candidate), page.runs)
            .score
    }
}

/// Distinct keywords (case-insensitive) found in any of the lowercased texts.
fn keywords_present(keywords: &[String], haystacks: &[String]) -> Vec<String> {
    let mut hits: Vec<String> = Vec::new();
    for keyword in keywords {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() || hits.iter().any(|h| h.to_lowercase() == needle) {
            continue;
        }
        let finder = memmem::Finder::new(needle.as_bytes());
        if haystacks
            .iter()
            .any(|text| finder.find(text.as_bytes()).is_some())
        {
            hits.push(keyword.clone());
        }
    }
    hits
}

fn point_to_rect_distance(x: f64, y: f64, rect: &Rect) -> f64 {
    let dx = (rect.x0 - x).max(x - rect.x1).max(0.0);
    let dy = (rect.y0 - y).max(y - rect.y1).max(0.0);
    dx.hypot(dy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(x0: f64, y0: f64) -> Candidate {
        Candidate {
            text: "123".to_string(),
            page: 0,
            bbox: Rect::new(x0, y0, x0 + 20.0, y0 + 10.0),
            pattern_id: "p".to_string(),
            font_name: "Arial".to_string(),
            font_size: 11.0,
            font_flags: 0,
        }
    }

    fn rule(context: &[&str], exclude: &[&str]) -> TextPattern {
        TextPattern {
            id: "p".to_string(),
            pattern: r"\d+".to_string(),
            context_keywords: context.iter().map(|s| (*s).to_string()).collect(),
            exclude_if_near: exclude.iter().map(|s| (*s).to_string()).collect(),
            ..TextPattern::default()
        }
    }

    fn label(text: &str, x0: f64, y0: f64) -> TextRun {
        TextRun::new(text, Rect::new(x0, y0, x0 + 40.0, y0 + 10.0), "Arial", 11.0)
    }

    fn analyzer() -> ProximityAnalyzer {
        ProximityAnalyzer::new(ProximityConfig::default())
    }

    #[test]
    fn no_context_keywords_is_inapplicable() {
        let runs = [label("Dimension:", 0.0, 0.0)];
        let ev = analyzer().analyze(&candidate(50.0, 0.0), Some(&rule(&[], &["Dimension"])), &runs);
        assert!(!ev.applicable);
        assert!((ev.score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn context_keyword_in_radius_saturates() {
        let runs = [label("ADDRESS:", 0.0, 0.0)];
        let ev = analyzer().analyze(&candidate(50.0, 0.0), Some(&rule(&["Address"], &[])), &runs);
        assert_eq!(ev.context_hits, vec!["Address".to_string()]);
        assert!((ev.score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn keywords_outside_radius_fall_back_to_neutral() {
        let runs = [label("Address:", 0.0, 500.0)];
        let ev = analyzer().analyze(&candidate(50.0, 0.0), Some(&rule(&["Address"], &[])), &runs);
        assert!(ev.context_hits.is_empty());
        assert!((ev.score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn exclusion_cancels_context() {
        let runs = [label("Address:", 0.0, 0.0), label("Dimension", 0.0, 20.0)];
        let ev = analyzer().analyze(
            &candidate(50.0, 0.0),
            Some(&rule(&["Address"], &["Dimension"])),
            &runs,
        );
        assert_eq!(ev.exclusion_hits.len(), 1);
        assert!(ev.score.abs() < f64::EPSILON);
    }

    #[test]
    fn extra_keywords_do_not_exceed_one() {
        let cfg = ProximityConfig {
            saturation: 2.0,
            ..ProximityConfig::default()
        };
        let runs = [label("name phone email address", 0.0, 0.0)];
        let ev = ProximityAnalyzer::new(cfg).analyze(
            &candidate(50.0, 0.0),
            Some(&rule(&["name", "phone", "email", "address"], &[])),
            &runs,
        );
        assert_eq!(ev.context_hits.len(), 4);
        assert!((ev.score - 1.0).abs() < f64::EPSILON);

        let one = [label("name", 0.0, 0.0)];
        let half = ProximityAnalyzer::new(cfg_with_saturation(2.0)).analyze(
            &candidate(50.0, 0.0),
            Some(&rule(&["name", "phone"], &[])),
            &one,
        );
        assert!((half.score - 0.5).abs() < f64::EPSILON);
    }

    fn cfg_with_saturation(saturation: f64) -> ProximityConfig {
        ProximityConfig {
            saturation,
            ..ProximityConfig::default()
        }
    }

    #[test]
    fn duplicate_keywords_count_once() {
        let runs = [label("Address Address", 0.0, 0.0)];
        let ev = analyzer().analyze(
            &candidate(50.0, 0.0),
            Some(&rule(&["Address", "address"], &[])),
            &runs,
        );
        assert_eq!(ev.context_hits.len(), 1);
    }
}
