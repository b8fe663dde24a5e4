//! Configuration system: TOML file + env var overrides + smart defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{RedactError, Result};

/// Full redactor configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// `[text]`: patterns and PII toggles.
    pub text: TextConfig,
    /// `[logos]`: template images.
    pub logos: LogoConfig,
    /// `[proximity]`: keyword scoring.
    pub proximity: ProximityConfig,
    /// `[fonts]`: font classes.
    pub fonts: FontConfig,
    /// `[zones]`: page regions.
    pub zones: ZoneConfig,
    /// `[schematic]`: line-density analysis.
    pub schematic: SchematicConfig,
    /// `[fusion]`: weights and threshold.
    pub fusion: FusionConfig,
    /// `[processing]`: rendering, workers, output.
    pub processing: ProcessingConfig,
    /// `[paths]`.
    pub paths: PathsConfig,
}

/// Text patterns plus the built-in PII toggles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TextConfig {
    /// Configured rules, matched after the built-ins.
    pub patterns: Vec<TextPattern>,
    /// Built-in detectors.
    pub pii: PiiConfig,
}

/// One registered text pattern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextPattern {
    /// Unique rule id, reported as the unit label.
    pub id: String,
    /// Regular expression, or literal text when `literal` is set.
    pub pattern: String,
    /// Human-readable note.
    pub description: String,
    /// Literal substring search instead of a regular expression.
    pub literal: bool,
    /// Match case exactly.
    pub case_sensitive: bool,
    /// Wrap the pattern in word boundaries.
    pub whole_words_only: bool,
    /// Keywords that raise the proximity score when nearby.
    pub context_keywords: Vec<String>,
    /// Keywords that lower the proximity score when nearby.
    pub exclude_if_near: Vec<String>,
    /// Search radius in page units around the candidate center.
    pub proximity_threshold: f64,
    /// Zones this rule may or may not fire in.
    pub zone_filter: Option<ZoneFilter>,
    /// Font requirements for a positive font signal.
    pub font_criteria: Option<FontCriteria>,
}

/// Zone restriction for a pattern. Empty `include` means every zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ZoneFilter {
    /// Zone names the candidate must sit in.
    pub include: Vec<String>,
    /// Zone names that veto the candidate.
    pub exclude: Vec<String>,
}

/// Per-pattern font requirements; a miss scores the font signal at zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct FontCriteria {
    /// Smallest accepted size in points.
    pub min_size: Option<f64>,
    /// Largest accepted size in points.
    pub max_size: Option<f64>,
    /// Font name fragments that never qualify.
    pub exclude_fonts: Vec<String>,
}

/// Built-in personal-data detectors. Every detector is off unless enabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PiiConfig {
    /// Email addresses.
    pub redact_emails: bool,
    /// North American and international phone formats.
    pub redact_phone_numbers: bool,
    /// US social security numbers.
    pub redact_ssn: bool,
    /// Street addresses.
    pub redact_addresses: bool,
    /// Registered as case-insensitive whole-word literals.
    pub custom_names: Vec<String>,
}

/// Logo templates to locate on every page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LogoConfig {
    /// Templates in search order.
    pub templates: Vec<LogoTemplate>,
    /// Fail configuration when any template image cannot be loaded.
    pub strict: bool,
}

/// One reference image searched for on each page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogoTemplate {
    /// Reported as the unit label.
    pub name: String,
    /// Relative paths resolve against the config file's directory.
    pub image_path: PathBuf,
    /// A match must score strictly above this.
    pub confidence_threshold: f64,
    /// Scales tried.
    pub scale_range: ScaleRange,
    /// `None` searches upright only.
    pub rotation: Option<RotationRange>,
}

/// Inclusive template scale sweep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScaleRange {
    /// Smallest scale.
    pub min: f64,
    /// Largest scale.
    pub max: f64,
    /// Increment.
    pub step: f64,
}

/// Rotation sweep in degrees; `max_deg` is included unless it is a full turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RotationRange {
    /// First angle.
    pub min_deg: f64,
    /// Last angle.
    pub max_deg: f64,
    /// Increment.
    pub step_deg: f64,
}

/// Keyword proximity scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProximityConfig {
    /// Score when context keywords are configured but none are nearby.
    pub neutral_score: f64,
    /// Score when the pattern configures no context keywords.
    pub inapplicable_score: f64,
    /// Net keyword weight at which the score saturates to 1.0.
    pub saturation: f64,
    /// Weight subtracted per exclusion keyword hit.
    pub exclusion_strength: f64,
}

/// Font family and size scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FontConfig {
    /// Families typical of letterheads and annotations.
    pub annotation_fonts: Vec<String>,
    /// Drafting and monospace families.
    pub technical_fonts: Vec<String>,
    /// Inclusive `[min, max]` size in points.
    pub annotation_size_range: [f64; 2],
    /// Score for annotation fonts within the size range.
    pub annotation_score: f64,
    /// Score for technical fonts.
    pub technical_score: f64,
    /// Score for anything else.
    pub neutral_score: f64,
    /// Added for bold or italic runs, capped at 1.0.
    pub style_bonus: f64,
}

/// Fractional page box, origin at the top-left corner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ZoneBox {
    /// Left edge as a fraction of page width.
    pub left: f64,
    /// Top edge as a fraction of page height.
    pub top: f64,
    /// Right edge as a fraction of page width.
    pub right: f64,
    /// Bottom edge as a fraction of page height.
    pub bottom: f64,
}

impl ZoneBox {
    /// Box from fractional edges.
    #[must_use]
    pub const fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Half-open containment test on fractional coordinates.
    #[must_use]
    pub fn contains(&self, fx: f64, fy: f64) -> bool {
        let right_ok = if self.right >= 1.0 {
            fx <= self.right
        } else {
            fx < self.right
        };
        let bottom_ok = if self.bottom >= 1.0 {
            fy <= self.bottom
        } else {
            fy < self.bottom
        };
        fx >= self.left && fy >= self.top && right_ok && bottom_ok
    }
}

/// Page regions and their scores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ZoneConfig {
    /// Top band.
    pub header: ZoneBox,
    /// Bottom band.
    pub footer: ZoneBox,
    /// Drawing title block, usually bottom right.
    pub title_block: ZoneBox,
    /// Score per zone.
    pub scores: ZoneScores,
    /// Grid density at or above which a body point counts as schematic.
    pub schematic_density: f64,
}

/// Zone signal per zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ZoneScores {
    /// Header zone.
    pub header: f64,
    /// Footer zone.
    pub footer: f64,
    /// Title block.
    pub title_block: f64,
    /// Body.
    pub body: f64,
    /// Dense schematic area.
    pub schematic: f64,
}

/// Line-density analysis knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchematicConfig {
    /// Density grid rows over the page.
    pub grid_rows: usize,
    /// Density grid columns over the page.
    pub grid_cols: usize,
    /// Rasters above this resolution are downscaled first.
    pub analysis_dpi: u32,
    /// Lower Canny threshold.
    pub canny_low: f32,
    /// Upper Canny threshold.
    pub canny_high: f32,
    /// Hough accumulator votes for a line.
    pub vote_threshold: u32,
    /// Hough non-maximum suppression radius.
    pub suppression_radius: u32,
    /// Shortest traced segment, in analysis pixels.
    pub min_line_length: u32,
    /// Largest gap bridged while tracing.
    pub max_line_gap: u32,
    /// Minimum share of a traced segment that must be edge pixels.
    pub min_fill_ratio: f64,
    /// Parallel line spacing (analysis pixels) at which a cell saturates.
    pub saturation_spacing: f64,
}

/// Signal weights and the redaction threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FusionConfig {
    /// Proximity weight.
    pub proximity_weight: f64,
    /// Font weight.
    pub font_weight: f64,
    /// Zone weight.
    pub zone_weight: f64,
    /// Subtracted, times the density penalty.
    pub schematic_weight: f64,
    /// Redact when the fused score is strictly above this.
    pub threshold: f64,
}

/// Rendering, concurrency and output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Resolution for page rasters, 72 to 600.
    pub render_dpi: u32,
    /// Batch worker threads, 1 to 32.
    pub max_workers: usize,
    /// Preview only: plan every redaction, apply none.
    pub dry_run: bool,
    /// Union rectangles closer than this (page units) before application.
    pub merge_distance: Option<f64>,
    /// RGB fill painted over every redacted region.
    pub redaction_color: [u8; 3],
    /// `[processing.output]`.
    pub output: OutputConfig,
}

/// How redacted documents are written.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    /// Compact manifests and maximum PNG compression.
    pub compress: bool,
    /// Keep the document's metadata table in the output.
    pub preserve_metadata: bool,
}

/// Files the redactor reads and writes besides documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Where this config was loaded from.
    pub config_file: PathBuf,
    /// Activity log, one JSON object per line.
    pub jsonl_log: PathBuf,
}

// ──────────────────── defaults ────────────────────

impl Default for TextPattern {
    fn default() -> Self {
        Self {
            id: String::new(),
            pattern: String::new(),
            description: String::new(),
            literal: false,
            case_sensitive: false,
            whole_words_only: false,
            context_keywords: Vec::new(),
            exclude_if_near: Vec::new(),
            proximity_threshold: 150.0,
            zone_filter: None,
            font_criteria: None,
        }
    }
}

impl Default for LogoTemplate {
    fn default() -> Self {
        Self {
            name: String::new(),
            image_path: PathBuf::new(),
            confidence_threshold: 0.85,
            scale_range: ScaleRange::default(),
            rotation: None,
        }
    }
}

impl Default for ScaleRange {
    fn default() -> Self {
        Self {
            min: 0.5,
            max: 2.0,
            step: 0.1,
        }
    }
}

impl Default for RotationRange {
    fn default() -> Self {
        Self {
            min_deg: 0.0,
            max_deg: 0.0,
            step_deg: 90.0,
        }
    }
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            neutral_score: 0.5,
            inapplicable_score: 1.0,
            saturation: 1.0,
            exclusion_strength: 1.0,
        }
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|n| (*n).to_string()).collect();
        Self {
            annotation_fonts: owned(&["Arial", "Helvetica", "Times", "TimesNewRoman", "Calibri"]),
            technical_fonts: owned(&[
                "CourierNew",
                "Courier",
                "Monaco",
                "ISOCP",
                "ISOCPEUR",
                "TechnicBold",
            ]),
            annotation_size_range: [8.0, 14.0],
            annotation_score: 1.0,
            technical_score: 0.0,
            neutral_score: 0.5,
            style_bonus: 0.1,
        }
    }
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            header: ZoneBox::new(0.0, 0.0, 1.0, 0.15),
            footer: ZoneBox::new(0.0, 0.85, 1.0, 1.0),
            title_block: ZoneBox::new(0.6, 0.85, 1.0, 1.0),
            scores: ZoneScores::default(),
            schematic_density: 0.5,
        }
    }
}

impl Default for ZoneScores {
    fn default() -> Self {
        Self {
            header: 0.9,
            footer: 0.9,
            title_block: 0.7,
            body: 0.5,
            schematic: 0.1,
        }
    }
}

impl Default for SchematicConfig {
    fn default() -> Self {
        Self {
            grid_rows: 32,
            grid_cols: 32,
            analysis_dpi: 150,
            canny_low: 50.0,
            canny_high: 150.0,
            vote_threshold: 50,
            suppression_radius: 4,
            min_line_length: 30,
            max_line_gap: 10,
            min_fill_ratio: 0.9,
            saturation_spacing: 8.0,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            proximity_weight: 0.4,
            font_weight: 0.3,
            zone_weight: 0.3,
            schematic_weight: 2.0,
            threshold: 0.6,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            render_dpi: 300,
            max_workers: 4,
            dry_run: false,
            merge_distance: None,
            redaction_color: [255, 255, 255],
            output: OutputConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            compress: true,
            preserve_metadata: false,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[PDFR-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir.join(".config").join("pdfr").join("config.toml"),
            jsonl_log: home_dir
                .join(".local")
                .join("share")
                .join("pdfr")
                .join("activity.jsonl"),
        }
    }
}

// ──────────────────── loading ────────────────────

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| RedactError::Io {
                path: path_buf.clone(),
                source,
            })?;
            Self::from_toml_str(&raw)?
        } else if is_explicit_path {
            return Err(RedactError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.resolve_template_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let parsed: Self = toml::from_str(raw)?;
        Ok(parsed)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // fusion
        set_f64(
            &mut lookup,
            "PDFR_FUSION_PROXIMITY_WEIGHT",
            &mut self.fusion.proximity_weight,
        )?;
        set_f64(
            &mut lookup,
            "PDFR_FUSION_FONT_WEIGHT",
            &mut self.fusion.font_weight,
        )?;
        set_f64(
            &mut lookup,
            "PDFR_FUSION_ZONE_WEIGHT",
            &mut self.fusion.zone_weight,
        )?;
        set_f64(
            &mut lookup,
            "PDFR_FUSION_SCHEMATIC_WEIGHT",
            &mut self.fusion.schematic_weight,
        )?;
        set_f64(
            &mut lookup,
            "PDFR_FUSION_THRESHOLD",
            &mut self.fusion.threshold,
        )?;

        // proximity
        set_f64(
            &mut lookup,
            "PDFR_PROXIMITY_SATURATION",
            &mut self.proximity.saturation,
        )?;

        // schematic
        set_usize(
            &mut lookup,
            "PDFR_SCHEMATIC_GRID_ROWS",
            &mut self.schematic.grid_rows,
        )?;
        set_usize(
            &mut lookup,
            "PDFR_SCHEMATIC_GRID_COLS",
            &mut self.schematic.grid_cols,
        )?;

        // processing
        set_u32(
            &mut lookup,
            "PDFR_RENDER_DPI",
            &mut self.processing.render_dpi,
        )?;
        set_usize(
            &mut lookup,
            "PDFR_MAX_WORKERS",
            &mut self.processing.max_workers,
        )?;
        set_bool(&mut lookup, "PDFR_DRY_RUN", &mut self.processing.dry_run)?;

        // paths
        if let Some(raw) = lookup("PDFR_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Relative template paths are resolved against the config file directory.
    fn resolve_template_paths(&mut self) {
        let Some(base) = self.paths.config_file.parent() else {
            return;
        };
        for template in &mut self.logos.templates {
            if template.image_path.is_relative() && !template.image_path.as_os_str().is_empty() {
                template.image_path = base.join(&template.image_path);
            }
        }
    }

    /// Reject anything that would fail later at match time.
    #[allow(clippy::too_many_lines)]
    pub fn validate(&self) -> Result<()> {
        let mut seen_ids = std::collections::HashSet::new();
        for pattern in &self.text.patterns {
            if pattern.id.trim().is_empty() {
                return Err(RedactError::InvalidConfig {
                    details: format!("text pattern {:?} has an empty id", pattern.pattern),
                });
            }
            if !seen_ids.insert(pattern.id.as_str()) {
                return Err(RedactError::InvalidConfig {
                    details: format!("duplicate text pattern id {:?}", pattern.id),
                });
            }
            if pattern.pattern.is_empty() {
                return Err(RedactError::InvalidPattern {
                    pattern_id: pattern.id.clone(),
                    details: "pattern must not be empty".to_string(),
                });
            }
            if !(10.0..=1000.0).contains(&pattern.proximity_threshold) {
                return Err(RedactError::InvalidConfig {
                    details: format!(
                        "text pattern {:?}: proximity_threshold must be in [10, 1000], got {}",
                        pattern.id, pattern.proximity_threshold
                    ),
                });
            }
            if let Some(criteria) = &pattern.font_criteria
                && let (Some(min), Some(max)) = (criteria.min_size, criteria.max_size)
                && min > max
            {
                return Err(RedactError::InvalidConfig {
                    details: format!(
                        "text pattern {:?}: font_criteria.min_size {min} exceeds max_size {max}",
                        pattern.id
                    ),
                });
            }
            if let Some(filter) = &pattern.zone_filter {
                for name in filter.include.iter().chain(&filter.exclude) {
                    if crate::detect::zones::Zone::from_name(name).is_none() {
                        return Err(RedactError::InvalidConfig {
                            details: format!(
                                "text pattern {:?}: unknown zone {name:?} in zone_filter",
                                pattern.id
                            ),
                        });
                    }
                }
            }
            crate::detect::patterns::compile_pattern(pattern)?;
        }
        for name in &self.text.pii.custom_names {
            if name.trim().is_empty() {
                return Err(RedactError::InvalidConfig {
                    details: "text.pii.custom_names must not contain empty names".to_string(),
                });
            }
        }

        for template in &self.logos.templates {
            if template.name.trim().is_empty() {
                return Err(RedactError::InvalidConfig {
                    details: format!("logo template at {:?} has an empty name", template.image_path),
                });
            }
            validate_prob(
                &format!("logos.{}.confidence_threshold", template.name),
                template.confidence_threshold,
            )?;
            let scale = template.scale_range;
            if !(0.1..=1.0).contains(&scale.min)
                || !(1.0..=5.0).contains(&scale.max)
                || !(scale.step > 0.0 && scale.step <= 0.5)
            {
                return Err(RedactError::InvalidConfig {
                    details: format!(
                        "logos.{}.scale_range must satisfy min in [0.1,1], max in [1,5], step in (0,0.5]; got {scale:?}",
                        template.name
                    ),
                });
            }
            if let Some(rotation) = template.rotation
                && (rotation.step_deg <= 0.0
                    || rotation.min_deg > rotation.max_deg
                    || !rotation.min_deg.is_finite()
                    || !rotation.max_deg.is_finite())
            {
                return Err(RedactError::InvalidConfig {
                    details: format!(
                        "logos.{}.rotation must have step_deg > 0 and min_deg <= max_deg; got {rotation:?}",
                        template.name
                    ),
                });
            }
        }

        let prox = &self.proximity;
        validate_prob("proximity.neutral_score", prox.neutral_score)?;
        validate_prob("proximity.inapplicable_score", prox.inapplicable_score)?;
        if !(prox.saturation > 0.0 && prox.saturation.is_finite()) {
            return Err(RedactError::InvalidConfig {
                details: format!("proximity.saturation must be > 0, got {}", prox.saturation),
            });
        }
        validate_non_negative("proximity.exclusion_strength", prox.exclusion_strength)?;

        let fonts = &self.fonts;
        let [min_size, max_size] = fonts.annotation_size_range;
        if !(min_size > 0.0 && min_size <= max_size) {
            return Err(RedactError::InvalidConfig {
                details: format!(
                    "fonts.annotation_size_range must be 0 < min <= max, got [{min_size}, {max_size}]"
                ),
            });
        }
        validate_prob("fonts.annotation_score", fonts.annotation_score)?;
        validate_prob("fonts.technical_score", fonts.technical_score)?;
        validate_prob("fonts.neutral_score", fonts.neutral_score)?;
        validate_prob("fonts.style_bonus", fonts.style_bonus)?;

        let zones = &self.zones;
        for (name, zone) in [
            ("header", zones.header),
            ("footer", zones.footer),
            ("title_block", zones.title_block),
        ] {
            let in_unit = [zone.left, zone.top, zone.right, zone.bottom]
                .iter()
                .all(|v| (0.0..=1.0).contains(v));
            if !in_unit || zone.left >= zone.right || zone.top >= zone.bottom {
                return Err(RedactError::InvalidConfig {
                    details: format!(
                        "zones.{name} must be a non-empty fractional box inside [0,1], got {zone:?}"
                    ),
                });
            }
        }
        for (name, val) in [
            ("header", zones.scores.header),
            ("footer", zones.scores.footer),
            ("title_block", zones.scores.title_block),
            ("body", zones.scores.body),
            ("schematic", zones.scores.schematic),
        ] {
            validate_prob(&format!("zones.scores.{name}"), val)?;
        }
        if !(zones.schematic_density > 0.0 && zones.schematic_density <= 1.0) {
            return Err(RedactError::InvalidConfig {
                details: format!(
                    "zones.schematic_density must be in (0,1], got {}",
                    zones.schematic_density
                ),
            });
        }

        let sch = &self.schematic;
        if !(1..=512).contains(&sch.grid_rows) || !(1..=512).contains(&sch.grid_cols) {
            return Err(RedactError::InvalidConfig {
                details: format!(
                    "schematic grid must be 1..=512 in each dimension, got {}x{}",
                    sch.grid_rows, sch.grid_cols
                ),
            });
        }
        if !(18..=600).contains(&sch.analysis_dpi) {
            return Err(RedactError::InvalidConfig {
                details: format!(
                    "schematic.analysis_dpi must be in [18, 600], got {}",
                    sch.analysis_dpi
                ),
            });
        }
        if !(sch.canny_low > 0.0 && sch.canny_low <= sch.canny_high) {
            return Err(RedactError::InvalidConfig {
                details: format!(
                    "schematic canny thresholds must satisfy 0 < low <= high, got {} / {}",
                    sch.canny_low, sch.canny_high
                ),
            });
        }
        if sch.vote_threshold == 0 || sch.min_line_length == 0 {
            return Err(RedactError::InvalidConfig {
                details: "schematic.vote_threshold and min_line_length must be > 0".to_string(),
            });
        }
        if !(sch.min_fill_ratio > 0.0 && sch.min_fill_ratio <= 1.0) {
            return Err(RedactError::InvalidConfig {
                details: format!(
                    "schematic.min_fill_ratio must be in (0,1], got {}",
                    sch.min_fill_ratio
                ),
            });
        }
        if !(sch.saturation_spacing > 0.0 && sch.saturation_spacing.is_finite()) {
            return Err(RedactError::InvalidConfig {
                details: format!(
                    "schematic.saturation_spacing must be > 0, got {}",
                    sch.saturation_spacing
                ),
            });
        }

        let fusion = &self.fusion;
        for (name, val) in [
            ("proximity_weight", fusion.proximity_weight),
            ("font_weight", fusion.font_weight),
            ("zone_weight", fusion.zone_weight),
            ("schematic_weight", fusion.schematic_weight),
            ("threshold", fusion.threshold),
        ] {
            validate_non_negative(&format!("fusion.{name}"), val)?;
        }

        let proc = &self.processing;
        if !(72..=600).contains(&proc.render_dpi) {
            return Err(RedactError::InvalidConfig {
                details: format!(
                    "processing.render_dpi must be in [72, 600], got {}",
                    proc.render_dpi
                ),
            });
        }
        if !(1..=32).contains(&proc.max_workers) {
            return Err(RedactError::InvalidConfig {
                details: format!(
                    "processing.max_workers must be in [1, 32], got {}",
                    proc.max_workers
                ),
            });
        }
        if let Some(distance) = proc.merge_distance {
            validate_non_negative("processing.merge_distance", distance)?;
        }

        Ok(())
    }
}

fn validate_prob(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(RedactError::InvalidConfig {
            details: format!("{name} must be in [0,1], got {value}"),
        });
    }
    Ok(())
}

fn validate_non_negative(name: &str, value: f64) -> Result<()> {
    if !(value >= 0.0 && value.is_finite()) {
        return Err(RedactError::InvalidConfig {
            details: format!("{name} must be a finite non-negative number, got {value}"),
        });
    }
    Ok(())
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| RedactError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn set_f64<F>(lookup: &mut F, name: &str, slot: &mut f64) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}

fn set_u32<F>(lookup: &mut F, name: &str, slot: &mut u32) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}

fn set_usize<F>(lookup: &mut F, name: &str, slot: &mut usize) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}

fn set_bool<F>(lookup: &mut F, name: &str, slot: &mut bool) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}
