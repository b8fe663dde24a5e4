//! Page region classification.

use std::fmt;

use serde::Serialize;

use super::PageContext;
use super::fusion::Scorer;
use super::patterns::Candidate;
use super::schematic::DensityGrid;
use crate::core::config::{TextPattern, ZoneConfig};
use crate::document::PageSize;

/// Page region a candidate center falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    /// Top band.
    Header,
    /// Bottom band.
    Footer,
    /// Drawing title block.
    TitleBlock,
    /// Everything else.
    Body,
    /// Body area dense with drawn lines.
    Schematic,
}

impl Zone {
    /// Every zone, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Header,
        Self::Footer,
        Self::TitleBlock,
        Self::Body,
        Self::Schematic,
    ];

    /// Config and log spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Footer => "footer",
            Self::TitleBlock => "title_block",
            Self::Body => "body",
            Self::Schematic => "schematic",
        }
    }

    /// Accepts `title_block`, `title-block` and `titleblock` spellings.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let key: String = name
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|zone| zone.as_str().replace('_', "") == key)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps candidates to zones and zone scores.
#[derive(Debug, Clone)]
pub struct ZoneClassifier {
    config: ZoneConfig,
}

impl ZoneClassifier {
    /// Classifier over the configured zones.
    #[must_use]
    pub fn new(config: ZoneConfig) -> Self {
        Self { config }
    }

    /// Most specific zone holding the candidate center.
    ///
    /// Title block beats header/footer, which beat the density-derived
    /// schematic zone, which beats body.
    #[must_use]
    pub fn classify(
        &self,
        candidate: &Candidate,
        size: PageSize,
        density: Option<&DensityGrid>,
    ) -> Zone {
        let (cx, cy) = candidate.bbox.center();
        let fx = (cx / size.width).clamp(0.0, 1.0);
        let fy = (cy / size.height).clamp(0.0, 1.0);
        let z = &self.config;
        if z.title_block.contains(fx, fy) {
            Zone::TitleBlock
        } else if z.header.contains(fx, fy) {
            Zone::Header
        } else if z.footer.contains(fx, fy) {
            Zone::Footer
        } else if density.is_some_and(|grid| grid.at_fraction(fx, fy) >= z.schematic_density) {
            Zone::Schematic
        } else {
            Zone::Body
        }
    }

    /// Configured score for `zone`.
    #[must_use]
    pub fn zone_score(&self, zone: Zone) -> f64 {
        let s = &self.config.scores;
        match zone {
            Zone::Header => s.header,
            Zone::Footer => s.footer,
            Zone::TitleBlock => s.title_block,
            Zone::Body => s.body,
            Zone::Schematic => s.schematic,
        }
    }

    /// Whether the rule's zone filter rules this zone out.
    #[must_use]
    pub fn excluded_by(zone: Zone, rule: Option<&TextPattern>) -> bool {
        let Some(filter) = rule.and_then(|r| r.zone_filter.as_ref()) else {
            return false;
        };
        let named = |names: &[String]| names.iter().any(|n| Zone::from_name(n) == Some(zone));
        named(&filter.exclude) || (!filter.include.is_empty() && !named(&filter.include))
    }
}

impl Scorer for ZoneClassifier {
    fn name(&self) -> &'static str {
        "zone"
    }

    fn score(&self, candidate: &Candidate, page: &PageContext<'_>) -> f64 {
        let zone = self.classify(candidate, page.size, page.density);
        if Self::excluded_by(zone, page.rule_for(candidate)) {
            return 0.0;
        }
        self.zone_score(zone)
    }

    fn veto(&self, candidate: &Candidate, page: &PageContext<'_>) -> Option<String> {
        let zone = self.classify(candidate, page.size, page.density);
        Self::excluded_by(zone, page.rule_for(candidate))
            .then(|| format!("zone {zone} excluded for pattern {}", candidate.pattern_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ZoneFilter;
    use crate::core::geometry::Rect;

    const PAGE: PageSize = PageSize::new(600.0, 800.0);

    fn at(cx: f64, cy: f64) -> Candidate {
        Candidate {
            text: "x".to_string(),
            page: 0,
            bbox: Rect::new(cx - 5.0, cy - 2.0, cx + 5.0, cy + 2.0),
            pattern_id: "p".to_string(),
            font_name: "Arial".to_string(),
            font_size: 11.0,
            font_flags: 0,
        }
    }

    fn classifier() -> ZoneClassifier {
        ZoneClassifier::new(ZoneConfig::default())
    }

    #[test]
    fn regions_by_center() {
        let c = classifier();
        assert_eq!(c.classify(&at(300.0, 40.0), PAGE, None), Zone::Header);
        assert_eq!(c.classify(&at(100.0, 760.0), PAGE, None), Zone::Footer);
        assert_eq!(c.classify(&at(300.0, 400.0), PAGE, None), Zone::Body);
    }

    #[test]
    fn title_block_beats_footer() {
        let c = classifier();
        assert_eq!(c.classify(&at(500.0, 760.0), PAGE, None), Zone::TitleBlock);
    }

    #[test]
    fn dense_body_becomes_schematic_but_header_stays() {
        let grid = DensityGrid::uniform(4, 4, 0.9);
        let c = classifier();
        assert_eq!(c.classify(&at(300.0, 400.0), PAGE, Some(&grid)), Zone::Schematic);
        assert_eq!(c.classify(&at(300.0, 40.0), PAGE, Some(&grid)), Zone::Header);
        assert!((c.zone_score(Zone::Schematic) - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn zone_names_parse_loosely() {
        assert_eq!(Zone::from_name("Title-Block"), Some(Zone::TitleBlock));
        assert_eq!(Zone::from_name("title_block"), Some(Zone::TitleBlock));
        assert_eq!(Zone::from_name(" HEADER "), Some(Zone::Header));
        assert_eq!(Zone::from_name("margin"), None);
    }

    #[test]
    fn include_and_exclude_filters() {
        let rule = |include: &[&str], exclude: &[&str]| TextPattern {
            zone_filter: Some(ZoneFilter {
                include: include.iter().map(|s| (*s).to_string()).collect(),
                exclude: exclude.iter().map(|s| (*s).to_string()).collect(),
            }),
            ..TextPattern::default()
        };
        let only_header = rule(&["header"], &[]);
        assert!(!ZoneClassifier::excluded_by(Zone::Header, Some(&only_header)));
        assert!(ZoneClassifier::excluded_by(Zone::Body, Some(&only_header)));

        let no_schematic = rule(&[], &["schematic"]);
        assert!(ZoneClassifier::excluded_by(Zone::Schematic, Some(&no_schematic)));
        assert!(!ZoneClassifier::excluded_by(Zone::Footer, Some(&no_schematic)));
        assert!(!ZoneClassifier::excluded_by(Zone::Footer, None));
    }
}
