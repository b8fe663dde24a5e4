//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use pdf_redactor::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{ErrorKind, RedactError, Result};
pub use crate::core::geometry::Rect;

// Document backends
pub use crate::document::manifest::{ManifestDocument, ManifestOpener};
pub use crate::document::memory::{MemoryDocument, MemoryOpener, MemoryPage};
pub use crate::document::{DocumentBackend, DocumentOpener, PageRaster, PageSize, TextRun};

// Detection
pub use crate::detect::fusion::{DecisionFusion, Polarity, ScoredCandidate, Scorer};
pub use crate::detect::logo::{LogoLocator, LogoMatch, Template};
pub use crate::detect::patterns::{Candidate, PatternRegistry};
pub use crate::detect::schematic::{DensityGrid, SchematicDetector};
pub use crate::detect::zones::{Zone, ZoneClassifier};

// Pipeline
pub use crate::pipeline::batch::{BatchOptions, BatchRunner, BatchSummary, FileOutcome};
pub use crate::pipeline::redaction::{RedactionUnit, UnitKind};
pub use crate::pipeline::{DocumentReport, Pipeline};

// Logging
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
