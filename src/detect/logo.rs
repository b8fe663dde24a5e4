//! Multi-scale, multi-rotation logo location by normalized cross-correlation.
//!
//! Every template is expanded once into its scale/rotation variants. Per
//! page, the raster's integral images are built once and shared by all
//! templates; each variant is then correlated against the page and scored
//! with zero-mean normalized cross-correlation (1.0 = perfect match, 0.0
//! for flat windows). The best variant above the template's threshold
//! becomes that template's single match on the page.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};
use imageproc::template_matching::{MatchTemplateMethod, match_template};
use serde::Serialize;

use crate::core::config::{LogoConfig, LogoTemplate, RotationRange, ScaleRange};
use crate::core::errors::{RedactError, Result};
use crate::core::geometry::{PixelRect, Rect};
use crate::document::PageRaster;

/// Variance below which a window or template counts as flat.
const FLAT_EPSILON: f64 = 1e-6;

/// A located logo on one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogoMatch {
    /// Template name.
    pub template: String,
    /// Zero-based page index.
    pub page: usize,
    /// Page coordinates.
    pub bbox: Rect,
    /// Raster pixels at the resolution the page was searched.
    pub raster_bbox: PixelRect,
    /// Normalized cross-correlation, clamped to `[0, 1]`.
    pub confidence: f64,
    /// Winning scale factor.
    pub scale: f64,
    /// Winning rotation, degrees.
    pub rotation_deg: f64,
}

#[derive(Debug, Clone)]
struct Variant {
    scale: f64,
    rotation_deg: f64,
    image: GrayImage,
    mean: f64,
    /// Sum of squared deviations from the mean.
    spread: f64,
}

impl Variant {
    fn new(scale: f64, rotation_deg: f64, image: GrayImage) -> Self {
        let n = f64::from(image.width()) * f64::from(image.height());
        let sum: f64 = image.pixels().map(|p| f64::from(p[0])).sum();
        let mean = sum / n.max(1.0);
        let spread = image
            .pixels()
            .map(|p| {
                let d = f64::from(p[0]) - mean;
                d * d
            })
            .sum();
        Self {
            scale,
            rotation_deg,
            image,
            mean,
            spread,
        }
    }
}

/// A loaded logo reference, immutable once built.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    confidence_threshold: f64,
    variants: Vec<Variant>,
}

/// Scale factors `min, min + step, ...` up to and including `max`.
#[must_use]
pub fn scale_steps(range: ScaleRange) -> Vec<f64> {
    if !(range.step > 0.0) || range.max < range.min {
        return vec![range.min];
    }
    let count = ((range.max - range.min) / range.step + 1e-9).floor() as usize + 1;
    (0..count)
        .map(|i| (i as f64).mul_add(range.step, range.min))
        .collect()
}

/// Rotation angles in degrees; just `0` when rotation is not configured.
#[must_use]
pub fn rotation_steps(range: Option<RotationRange>) -> Vec<f64> {
    let Some(range) = range.filter(|r| r.step_deg > 0.0 && r.max_deg >= r.min_deg) else {
        return vec![0.0];
    };
    let count = ((range.max_deg - range.min_deg) / range.step_deg + 1e-9).floor() as usize + 1;
    let mut out: Vec<f64> = Vec::with_capacity(count);
    for i in 0..count {
        let angle = (i as f64).mul_add(range.step_deg, range.min_deg).rem_euclid(360.0);
        if !out.iter().any(|a| (a - angle).abs() < 1e-9) {
            out.push(angle);
        }
    }
    out
}

fn rotate(image: &GrayImage, degrees: f64) -> GrayImage {
    let quarter = degrees / 90.0;
    if (quarter - quarter.round()).abs() < 1e-9 {
        return match (quarter.round() as i64).rem_euclid(4) {
            1 => imageops::rotate90(image),
            2 => imageops::rotate180(image),
            3 => imageops::rotate270(image),
            _ => image.clone(),
        };
    }
    rotate_about_center(
        image,
        degrees.to_radians() as f32,
        Interpolation::Bilinear,
        Luma([255]),
    )
}

fn rescale(image: &GrayImage, scale: f64) -> GrayImage {
    if (scale - 1.0).abs() < 1e-9 {
        return image.clone();
    }
    let w = ((f64::from(image.width()) * scale).round() as u32).max(1);
    let h = ((f64::from(image.height()) * scale).round() as u32).max(1);
    imageops::resize(image, w, h, FilterType::CatmullRom)
}

impl Template {
    /// Builds all variants of `image`. Rejects empty or uniform images.
    pub fn from_image(
        name: impl Into<String>,
        image: GrayImage,
        confidence_threshold: f64,
        scale_range: ScaleRange,
        rotation: Option<RotationRange>,
    ) -> Result<Self> {
        let name = name.into();
        if image.width() == 0 || image.height() == 0 {
            return Err(RedactError::TemplateLoad {
                name,
                path: Path::new("<memory>").to_path_buf(),
                details: "template image is empty".to_string(),
            });
        }
        let rotations = rotation_steps(rotation);
        let mut variants = Vec::new();
        for scale in scale_steps(scale_range) {
            let scaled = rescale(&image, scale);
            for &rotation_deg in &rotations {
                let variant = Variant::new(scale, rotation_deg, rotate(&scaled, rotation_deg));
                if variant.spread > FLAT_EPSILON {
                    variants.push(variant);
                }
            }
        }
        if variants.is_empty() {
            return Err(RedactError::TemplateLoad {
                name,
                path: Path::new("<memory>").to_path_buf(),
                details: "template image has no contrast".to_string(),
            });
        }
        Ok(Self {
            name,
            confidence_threshold,
            variants,
        })
    }

    /// Loads and expands a configured template.
    pub fn load(config: &LogoTemplate) -> Result<Self> {
        let image = image::open(&config.image_path)
            .map_err(|error| RedactError::TemplateLoad {
                name: config.name.clone(),
                path: config.image_path.clone(),
                details: error.to_string(),
            })?
            .to_luma8();
        Self::from_image(
            config.name.clone(),
            image,
            config.confidence_threshold,
            config.scale_range,
            config.rotation,
        )
        .map_err(|error| match error {
            RedactError::TemplateLoad { name, details, .. } => RedactError::TemplateLoad {
                name,
                path: config.image_path.clone(),
                details,
            },
            other => other,
        })
    }

    /// Configured template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of scale × rotation variants kept.
    #[must_use]
    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }
}

/// Page raster plus its integral images, built once per page.
pub struct PreparedPage<'a> {
    raster: &'a PageRaster,
    sums: image::ImageBuffer<Luma<u64>, Vec<u64>>,
    squares: image::ImageBuffer<Luma<u64>, Vec<u64>>,
}

impl<'a> PreparedPage<'a> {
    /// Computes the integral and squared-integral images.
    #[must_use]
    pub fn new(raster: &'a PageRaster) -> Self {
        Self {
            raster,
            sums: integral_image::<_, u64>(&raster.image),
            squares: integral_squared_image::<_, u64>(&raster.image),
        }
    }

    fn window_stats(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        let (r, b) = (x + w - 1, y + h - 1);
        let sum = sum_image_pixels(&self.sums, x, y, r, b)[0] as f64;
        let sq = sum_image_pixels(&self.squares, x, y, r, b)[0] as f64;
        (sum, sq)
    }
}

#[derive(Debug, Clone, Copy)]
struct Best {
    x: u32,
    y: u32,
    score: f64,
}

/// Holds the active templates for a batch.
#[derive(Debug, Clone, Default)]
pub struct LogoLocator {
    templates: Vec<Template>,
}

impl LogoLocator {
    /// Locator over already-loaded templates.
    #[must_use]
    pub fn new(templates: Vec<Template>) -> Self {
        Self { templates }
    }

    /// Loads every configured template.
    ///
    /// Templates that fail are returned alongside the locator and left out
    /// of the active set; with `strict` the first failure is returned instead.
    pub fn from_config(config: &LogoConfig) -> Result<(Self, Vec<RedactError>)> {
        let mut templates = Vec::with_capacity(config.templates.len());
        let mut rejected = Vec::new();
        for entry in &config.templates {
            match Template::load(entry) {
                Ok(template) => templates.push(template),
                Err(error) if config.strict => return Err(error),
                Err(error) => rejected.push(error),
            }
        }
        Ok((Self { templates }, rejected))
    }

    /// No active templates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Active templates, in configuration order.
    #[must_use]
    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// At most one match per template on this page.
    #[must_use]
    pub fn locate(&self, page: usize, raster: &PageRaster) -> Vec<LogoMatch> {
        if self.templates.is_empty() || raster.width() == 0 || raster.height() == 0 {
            return Vec::new();
        }
        let prepared = PreparedPage::new(raster);
        self.templates
            .iter()
            .filter_map(|template| Self::locate_template(template, page, &prepared))
            .collect()
    }

    fn locate_template(
        template: &Template,
        page: usize,
        prepared: &PreparedPage<'_>,
    ) -> Option<LogoMatch> {
        let mut best: Option<(Best, &Variant)> = None;
        for variant in &template.variants {
            let Some(found) = best_location(prepared, variant) else {
                continue;
            };
            if best.is_none_or(|(b, _)| found.score > b.score) {
                best = Some((found, variant));
            }
        }
        let (found, variant) = best?;
        if found.score <= template.confidence_threshold {
            return None;
        }
        let raster_bbox = PixelRect::new(
            found.x,
            found.y,
            variant.image.width(),
            variant.image.height(),
        );
        Some(LogoMatch {
            template: template.name.clone(),
            page,
            bbox: raster_bbox.to_page(prepared.raster.dpi),
            raster_bbox,
            confidence: found.score.clamp(0.0, 1.0),
            scale: variant.scale,
            rotation_deg: variant.rotation_deg,
        })
    }
}

/// Highest-scoring window for one variant; first in row-major order on ties.
fn best_location(prepared: &PreparedPage<'_>, variant: &Variant) -> Option<Best> {
    let image = &prepared.raster.image;
    let (tw, th) = variant.image.dimensions();
    if tw > image.width() || th > image.height() {
        return None;
    }
    let n = f64::from(tw) * f64::from(th);
    let correlation = match_template(image, &variant.image, MatchTemplateMethod::CrossCorrelation);
    let mut best: Option<Best> = None;
    for (x, y, value) in correlation.enumerate_pixels() {
        let (sum, sq) = prepared.window_stats(x, y, tw, th);
        let window_spread = sum.mul_add(-sum / n, sq);
        let score = if window_spread <= FLAT_EPSILON {
            0.0
        } else {
            let numerator = sum.mul_add(-variant.mean, f64::from(value[0]));
            numerator / (window_spread * variant.spread).sqrt()
        };
        if best.is_none_or(|b| score > b.score) {
            best = Some(Best { x, y, score });
        }
    }
    best
}
