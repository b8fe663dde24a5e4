//! Detection: pattern matching, the four candidate scorers, decision fusion,
//! and logo location.

pub mod font;
pub mod fusion;
pub mod logo;
pub mod patterns;
pub mod proximity;
pub mod schematic;
pub mod zones;

use crate::core::config::TextPattern;
use crate::document::{PageSize, TextRun};
use patterns::{Candidate, PatternRegistry};
use schematic::DensityGrid;

/// Everything the scorers may look at for one page.
///
/// Built by the page driver after text extraction and density analysis; the
/// borrowed pieces live exactly as long as the page being processed.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    /// Zero-based page index.
    pub page: usize,
    /// Page size in points.
    pub size: PageSize,
    /// Every text run on the page.
    pub runs: &'a [TextRun],
    /// Line densities, when the page was rasterized.
    pub density: Option<&'a DensityGrid>,
    /// Rules, for per-pattern criteria.
    pub registry: &'a PatternRegistry,
}

impl<'a> PageContext<'a> {
    /// Rule that produced `candidate`, if it is still registered.
    #[must_use]
    pub fn rule_for(&self, candidate: &Candidate) -> Option<&'a TextPattern> {
        self.registry.rule(&candidate.pattern_id)
    }
}
