//! Pattern registry: literal and regex text matching over positioned runs.

#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::core::config::{TextConfig, TextPattern};
use crate::core::errors::{RedactError, Result};
use crate::core::geometry::Rect;
use crate::document::TextRun;

/// One matched span of page text and where it sits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// The matched text.
    pub text: String,
    /// Zero-based page index.
    pub page: usize,
    /// The match's share of its run's box.
    pub bbox: Rect,
    /// Id of the rule that matched.
    pub pattern_id: String,
    /// Font of the source run.
    pub font_name: String,
    /// Font size of the source run, in points.
    pub font_size: f64,
    /// Style bits of the source run.
    pub font_flags: u32,
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    rule: TextPattern,
    regex: Regex,
}

/// Built-in and configured patterns, compiled once per batch.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    patterns: Vec<CompiledPattern>,
    by_id: HashMap<String, usize>,
}

/// Compile one pattern exactly as the matcher will run it.
///
/// Literal patterns are escaped; `whole_words_only` wraps the expression in
/// word boundaries.
pub fn compile_pattern(rule: &TextPattern) -> Result<Regex> {
    let body = if rule.literal {
        regex::escape(&rule.pattern)
    } else {
        rule.pattern.clone()
    };
    let source = if rule.whole_words_only {
        format!(r"\b(?:{body})\b")
    } else {
        body
    };
    RegexBuilder::new(&source)
        .case_insensitive(!rule.case_sensitive)
        .build()
        .map_err(|error| RedactError::InvalidPattern {
            pattern_id: rule.id.clone(),
            details: error.to_string(),
        })
}

fn builtin(id: &str, pattern: &str, description: &str) -> TextPattern {
    TextPattern {
        id: id.to_string(),
        pattern: pattern.to_string(),
        description: description.to_string(),
        ..TextPattern::default()
    }
}

/// Personal-data patterns enabled by the `[text.pii]` toggles.
#[must_use]
pub fn builtin_patterns(text: &TextConfig) -> Vec<TextPattern> {
    let pii = &text.pii;
    let mut out = Vec::new();
    if pii.redact_emails {
        out.push(builtin(
            "pii.email",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            "email address",
        ));
    }
    if pii.redact_phone_numbers {
        out.push(builtin(
            "pii.phone",
            r"(?:\+?1[-.\s]?)?\(?\b[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b",
            "North American phone number",
        ));
    }
    if pii.redact_ssn {
        out.push(builtin(
            "pii.ssn",
            r"\b\d{3}-\d{2}-\d{4}\b",
            "US social security number",
        ));
    }
    if pii.redact_addresses {
        out.push(builtin(
            "pii.address",
            r"\b\d+\s+[A-Za-z\s]+?\s(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Circle|Cir|Way)\b",
            "street address",
        ));
    }
    for (index, name) in pii.custom_names.iter().enumerate() {
        out.push(TextPattern {
            id: format!("name.{index}"),
            pattern: name.clone(),
            description: "custom name".to_string(),
            literal: true,
            whole_words_only: true,
            ..TextPattern::default()
        });
    }
    out
}

impl PatternRegistry {
    /// Built-ins first, then configured patterns in file order.
    pub fn from_config(text: &TextConfig) -> Result<Self> {
        let rules = builtin_patterns(text)
            .into_iter()
            .chain(text.patterns.iter().cloned());
        let mut registry = Self::default();
        for rule in rules {
            registry.push(rule)?;
        }
        Ok(registry)
    }

    /// Exactly `rules`, no built-ins.
    pub fn from_rules(rules: impl IntoIterator<Item = TextPattern>) -> Result<Self> {
        let mut registry = Self::default();
        for rule in rules {
            registry.push(rule)?;
        }
        Ok(registry)
    }

    fn push(&mut self, rule: TextPattern) -> Result<()> {
        if self.by_id.contains_key(&rule.id) {
            return Err(RedactError::InvalidConfig {
                details: format!("duplicate text pattern id {:?}", rule.id),
            });
        }
        let regex = compile_pattern(&rule)?;
        self.by_id.insert(rule.id.clone(), self.patterns.len());
        self.patterns.push(CompiledPattern { rule, regex });
        Ok(())
    }

    /// Number of compiled rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no rule is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The rule registered under `id`.
    #[must_use]
    pub fn rule(&self, id: &str) -> Option<&TextPattern> {
        self.by_id.get(id).map(|&index| &self.patterns[index].rule)
    }

    /// Every non-overlapping match of every pattern in every run.
    ///
    /// Matches from different patterns may overlap; all are kept.
    #[must_use]
    pub fn find_candidates(&self, page: usize, runs: &[TextRun]) -> Vec<Candidate> {
        let mut out = Vec::new();
        for compiled in &self.patterns {
            for run in runs {
                for m in compiled.regex.find_iter(&run.text) {
                    if m.as_str().trim().is_empty() {
                        continue;
                    }
                    out.push(Candidate {
                        text: m.as_str().to_string(),
                        page,
                        bbox: span_bbox(run, m.start(), m.end()),
                        pattern_id: compiled.rule.id.clone(),
                        font_name: run.font_name.clone(),
                        font_size: run.font_size,
                        font_flags: run.flags,
                    });
                }
            }
        }
        out
    }
}

/// Narrows a run's box to the byte span `start..end` by character share.
fn span_bbox(run: &TextRun, start: usize, end: usize) -> Rect {
    let total = run.text.chars().count();
    if total == 0 {
        return run.bbox;
    }
    let before = run.text[..start].chars().count();
    let within = run.text[start..end].chars().count();
    let width = run.bbox.width();
    let x0 = run.bbox.x0 + width * before as f64 / total as f64;
    let x1 = run.bbox.x0 + width * (before + within) as f64 / total as f64;
    Rect::new(x0, run.bbox.y0, x1, run.bbox.y1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PiiConfig;

    fn run(text: &str, x0: f64, x1: f64) -> TextRun {
        TextRun::new(text, Rect::new(x0, 10.0, x1, 20.0), "ArialMT", 11.0)
    }

    fn rule(id: &str, pattern: &str) -> TextPattern {
        TextPattern {
            id: id.to_string(),
            pattern: pattern.to_string(),
            ..TextPattern::default()
        }
    }

    fn no_pii() -> TextConfig {
        TextConfig {
            patterns: Vec::new(),
            pii: PiiConfig::default(),
        }
    }

    #[test]
    fn candidates_inherit_run_style_flags() {
        let registry = PatternRegistry::from_rules([rule("num", r"\d+")]).expect("compile");
        let runs = [run("REV 12", 0.0, 60.0).with_flags(crate::document::FLAG_BOLD)];
        let found = registry.find_candidates(0, &runs);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].font_flags, crate::document::FLAG_BOLD);
    }

    #[test]
    fn default_text_config_registers_no_builtin_rules() {
        assert!(builtin_patterns(&TextConfig::default()).is_empty());
        let registry = PatternRegistry::from_config(&TextConfig::default()).expect("compile");
        let runs = [run("Call 555-123-4567 or jane.doe@example.com", 0.0, 300.0)];
        assert!(registry.find_candidates(0, &runs).is_empty());
    }

    #[test]
    fn regex_matches_are_non_overlapping_per_pattern() {
        let registry = PatternRegistry::from_rules([rule("num", r"\d+")]).expect("compile");
        let candidates = registry.find_candidates(2, &[run("12 and 345", 0.0, 100.0)]);
        let texts: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["12", "345"]);
        assert!(candidates.iter().all(|c| c.page == 2 && c.pattern_id == "num"));
    }

    #[test]
    fn overlapping_patterns_keep_both_candidates() {
        let registry =
            PatternRegistry::from_rules([rule("street", r"Main Street"), rule("main", "Main")])
                .expect("compile");
        let candidates = registry.find_candidates(0, &[run("123 Main Street", 0.0, 150.0)]);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].pattern_id, "street");
        assert_eq!(candidates[1].pattern_id, "main");
    }

    #[test]
    fn literal_is_escaped_and_case_flag_honored() {
        let mut lit = rule("lit", "A.B");
        lit.literal = true;
        lit.case_sensitive = true;
        let registry = PatternRegistry::from_rules([lit]).expect("compile");
        assert!(registry.find_candidates(0, &[run("AxB", 0.0, 30.0)]).is_empty());
        assert!(registry.find_candidates(0, &[run("a.b", 0.0, 30.0)]).is_empty());
        assert_eq!(registry.find_candidates(0, &[run("A.B", 0.0, 30.0)]).len(), 1);
    }

    #[test]
    fn whole_words_only_rejects_embedded_matches() {
        let mut name = rule("name", "Ann");
        name.literal = true;
        name.whole_words_only = true;
        let registry = PatternRegistry::from_rules([name]).expect("compile");
        assert!(registry.find_candidates(0, &[run("Annual", 0.0, 60.0)]).is_empty());
        assert_eq!(registry.find_candidates(0, &[run("ann smith", 0.0, 90.0)]).len(), 1);
    }

    #[test]
    fn span_bbox_is_proportional_to_characters() {
        let registry = PatternRegistry::from_rules([rule("num", r"\d+")]).expect("compile");
        let candidates = registry.find_candidates(0, &[run("ab12", 0.0, 40.0)]);
        assert_eq!(candidates[0].bbox, Rect::new(20.0, 10.0, 40.0, 20.0));
    }

    #[test]
    fn bad_regex_reports_pattern_id() {
        let err = PatternRegistry::from_rules([rule("bad", "[a-")]).unwrap_err();
        assert_eq!(err.code(), "PDFR-1004");
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn builtin_pii_patterns_detect_common_formats() {
        let mut text = no_pii();
        text.pii.redact_emails = true;
        text.pii.redact_phone_numbers = true;
        text.pii.redact_ssn = true;
        text.pii.redact_addresses = true;
        let registry = PatternRegistry::from_config(&text).expect("compile");
        let runs = [
            run("mail jane.doe@example.com today", 0.0, 300.0),
            run("call (555) 123-4567", 0.0, 200.0),
            run("SSN 123-45-6789", 0.0, 150.0),
            run("ship to 42 Elm Street", 0.0, 210.0),
        ];
        let found: Vec<(String, String)> = registry
            .find_candidates(0, &runs)
            .into_iter()
            .map(|c| (c.pattern_id, c.text))
            .collect();
        assert!(found.contains(&("pii.email".into(), "jane.doe@example.com".into())));
        assert!(found.iter().any(|(id, t)| id == "pii.phone" && t.contains("123-4567")));
        assert!(found.contains(&("pii.ssn".into(), "123-45-6789".into())));
        assert!(found.contains(&("pii.address".into(), "42 Elm Street".into())));
    }

    #[test]
    fn custom_names_become_whole_word_literals() {
        let mut text = no_pii();
        text.pii.custom_names = vec!["J. Smith".to_string()];
        let registry = PatternRegistry::from_config(&text).expect("compile");
        let rule = registry.rule("name.0").expect("registered");
        assert!(rule.literal && rule.whole_words_only);
        assert_eq!(
            registry
                .find_candidates(0, &[run("signed j. smith", 0.0, 150.0)])
                .len(),
            1
        );
    }

    #[test]
    fn duplicate_ids_rejected() {
        let err = PatternRegistry::from_rules([rule("a", "x"), rule("a", "y")]).unwrap_err();
        assert!(matches!(err, RedactError::InvalidConfig { .. }));
    }
}
