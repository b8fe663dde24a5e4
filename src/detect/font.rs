//! Font family and size heuristics.
//!
//! A candidate's font falls into one [`FontClass`], which maps to a base
//! score. Bold or italic runs then get `style_bonus` on top, capped at 1.0,
//! unless the pattern's own font criteria rejected them.

use serde::Serialize;

use super::PageContext;
use super::fusion::Scorer;
use super::patterns::Candidate;
use crate::core::config::{FontConfig, TextPattern};
use crate::document::is_styled;

/// How a candidate's font reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FontClass {
    /// Annotation family at an annotation size.
    Annotation,
    /// Drafting or monospace family.
    Technical,
    /// Rejected by the pattern's own font criteria.
    RuleExcluded,
    /// None of the above.
    Neutral,
}

/// The font signal of [`DecisionFusion`](super::fusion::DecisionFusion).
#[derive(Debug, Clone)]
pub struct FontClassifier {
    config: FontConfig,
    annotation: Vec<String>,
    technical: Vec<String>,
}

/// Lowercased with separators removed, so "Courier New" matches "CourierNew".
fn normalize(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn matches_any(font: &str, names: &[String]) -> bool {
    names.iter().any(|n| !n.is_empty() && font.contains(n.as_str()))
}

impl FontClassifier {
    /// Classifier over `config`'s font lists.
    #[must_use]
    pub fn new(config: FontConfig) -> Self {
        let annotation = config.annotation_fonts.iter().map(|n| normalize(n)).collect();
        let technical = config.technical_fonts.iter().map(|n| normalize(n)).collect();
        Self {
            config,
            annotation,
            technical,
        }
    }

    /// Class of the candidate's font under `rule`'s criteria.
    #[must_use]
    pub fn classify(&self, candidate: &Candidate, rule: Option<&TextPattern>) -> FontClass {
        let font = normalize(&candidate.font_name);
        let size = candidate.font_size;

        if let Some(criteria) = rule.and_then(|r| r.font_criteria.as_ref()) {
            let excluded: Vec<String> = criteria.exclude_fonts.iter().map(|n| normalize(n)).collect();
            let too_small = criteria.min_size.is_some_and(|min| size < min);
            let too_large = criteria.max_size.is_some_and(|max| size > max);
            if matches_any(&font, &excluded) || too_small || too_large {
                return FontClass::RuleExcluded;
            }
        }

        if matches_any(&font, &self.technical) {
            return FontClass::Technical;
        }
        let [min, max] = self.config.annotation_size_range;
        if matches_any(&font, &self.annotation) && (min..=max).contains(&size) {
            return FontClass::Annotation;
        }
        FontClass::Neutral
    }

    /// Base score of `class`.
    #[must_use]
    pub fn score_class(&self, class: FontClass) -> f64 {
        match class {
            FontClass::Annotation => self.config.annotation_score,
            FontClass::Technical | FontClass::RuleExcluded => self.config.technical_score,
            FontClass::Neutral => self.config.neutral_score,
        }
    }

    /// Score of `class` for a run carrying style bits `flags`.
    #[must_use]
    pub fn score_styled(&self, class: FontClass, flags: u32) -> f64 {
        let base = self.score_class(class);
        if class == FontClass::RuleExcluded || !is_styled(flags) {
            return base;
        }
        (base + self.config.style_bonus).min(1.0)
    }
}

impl Scorer for FontClassifier {
    fn name(&self) -> &'static str {
        "font"
    }

    fn score(&self, candidate: &Candidate, page: &PageContext<'_>) -> f64 {
        let class = self.classify(candidate, page.rule_for(candidate));
        self.score_styled(class, candidate.font_flags)
    }
}
