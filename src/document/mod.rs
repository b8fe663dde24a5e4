//! Document backend seam: text-with-geometry extraction, page rasterization,
//! and irreversible redaction of page rectangles.
//!
//! The detection core only ever talks to [`DocumentBackend`]; concrete
//! backends live in [`memory`] and [`manifest`].

pub mod manifest;
pub mod memory;

use std::fs;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Pixel, Rgb};
use imageproc::drawing::{Canvas, draw_filled_rect_mut};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::config::ProcessingConfig;
use crate::core::errors::{RedactError, Result};
use crate::core::geometry::{POINTS_PER_INCH, Rect};

/// Font flag bit marking italic text.
pub const FLAG_ITALIC: u32 = 1 << 1;
/// Font flag bit marking bold text.
pub const FLAG_BOLD: u32 = 1 << 4;

/// Whether `flags` carry a bold or italic bit.
#[must_use]
pub const fn is_styled(flags: u32) -> bool {
    flags & (FLAG_ITALIC | FLAG_BOLD) != 0
}

/// One positioned run of text as extracted from a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    /// Decoded text.
    pub text: String,
    /// Bounding box in page points.
    pub bbox: Rect,
    /// Font name as embedded in the document, e.g. `ArialMT`.
    #[serde(default)]
    pub font_name: String,
    /// Font size in points.
    #[serde(default)]
    pub font_size: f64,
    /// Style bits reported by the extractor; see [`FLAG_ITALIC`] and [`FLAG_BOLD`].
    #[serde(default)]
    pub flags: u32,
}

impl TextRun {
    /// Unstyled run.
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        bbox: Rect,
        font_name: impl Into<String>,
        font_size: f64,
    ) -> Self {
        Self {
            text: text.into(),
            bbox,
            font_name: font_name.into(),
            font_size,
            flags: 0,
        }
    }

    /// Same run carrying style bits `flags`.
    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Replaces every character lying mostly under `rect` with a space.
    ///
    /// Character extents are spread evenly across the run's box, the same
    /// share the pattern matcher uses to narrow candidate boxes. Returns
    /// whether any character was blanked.
    #[allow(clippy::cast_precision_loss)]
    pub fn blank_under(&mut self, rect: &Rect) -> bool {
        let Some(overlap) = self.bbox.intersection(rect) else {
            return false;
        };
        let count = self.text.chars().count();
        if count == 0 {
            return false;
        }
        let x0 = self.bbox.x0;
        let step = self.bbox.width() / count as f64;
        let mut changed = false;
        let blanked: String = self
            .text
            .chars()
            .enumerate()
            .map(|(index, ch)| {
                let start = x0 + step * index as f64;
                let covered = overlap.x1.min(start + step) - overlap.x0.max(start);
                if !ch.is_whitespace() && covered >= step * 0.5 {
                    changed = true;
                    ' '
                } else {
                    ch
                }
            })
            .collect();
        self.text = blanked;
        changed
    }
}

/// Removes the text under `rect` from `runs`.
///
/// Partially covered runs keep their uncovered characters in place; runs left
/// with nothing but whitespace are dropped. Returns how many runs changed.
pub fn redact_runs(runs: &mut Vec<TextRun>, rect: &Rect) -> usize {
    let mut touched = 0;
    runs.retain_mut(|run| {
        if !run.blank_under(rect) {
            return true;
        }
        touched += 1;
        !run.text.trim().is_empty()
    });
    touched
}

/// Fills the pixels covering page rectangle `rect` on a rendering of a page of `size`.
///
/// The mapping comes from the canvas dimensions, so it holds for any raster
/// resolution. Edges round outwards.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn paint_page_rect<C: Canvas>(canvas: &mut C, rect: &Rect, size: PageSize, color: C::Pixel) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 || !(size.width > 0.0 && size.height > 0.0) {
        return;
    }
    let sx = f64::from(width) / size.width;
    let sy = f64::from(height) / size.height;
    let x0 = (rect.x0 * sx).floor().clamp(0.0, f64::from(width));
    let y0 = (rect.y0 * sy).floor().clamp(0.0, f64::from(height));
    let x1 = (rect.x1 * sx).ceil().clamp(0.0, f64::from(width));
    let y1 = (rect.y1 * sy).ceil().clamp(0.0, f64::from(height));
    if x1 <= x0 || y1 <= y0 {
        return;
    }
    let area = imageproc::rect::Rect::at(x0 as i32, y0 as i32)
        .of_size((x1 - x0) as u32, (y1 - y0) as u32);
    draw_filled_rect_mut(canvas, area, color);
}

/// How backends paint and write redacted output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOptions {
    /// RGB fill for redacted regions.
    pub fill: [u8; 3],
    /// Write compact files at the strongest compression.
    pub compress: bool,
    /// Keep document metadata in the output.
    pub preserve_metadata: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self::from_config(&ProcessingConfig::default())
    }
}

impl OutputOptions {
    /// Options from the `[processing]` section.
    #[must_use]
    pub const fn from_config(processing: &ProcessingConfig) -> Self {
        Self {
            fill: processing.redaction_color,
            compress: processing.output.compress,
            preserve_metadata: processing.output.preserve_metadata,
        }
    }

    /// The fill as an RGB pixel.
    #[must_use]
    pub const fn fill_rgb(&self) -> Rgb<u8> {
        Rgb(self.fill)
    }

    /// The fill converted for grayscale rasters.
    #[must_use]
    pub fn fill_luma(&self) -> Luma<u8> {
        self.fill_rgb().to_luma()
    }
}

/// Page dimensions in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    /// Width in points.
    pub width: f64,
    /// Height in points.
    pub height: f64,
}

impl PageSize {
    /// Page of `width` x `height` points.
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Pixel dimensions of this page rendered at `dpi`, at least 1x1.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn pixel_dimensions(&self, dpi: u32) -> (u32, u32) {
        let dpi = f64::from(dpi);
        let w = (self.width * dpi / POINTS_PER_INCH).round().max(1.0);
        let h = (self.height * dpi / POINTS_PER_INCH).round().max(1.0);
        (w as u32, h as u32)
    }
}

/// Grayscale rendering of one page at a known resolution.
#[derive(Debug, Clone)]
pub struct PageRaster {
    /// Pixels, white background.
    pub image: GrayImage,
    /// Resolution the image was rendered at.
    pub dpi: u32,
}

impl PageRaster {
    /// Wraps an image rendered at `dpi`.
    #[must_use]
    pub const fn new(image: GrayImage, dpi: u32) -> Self {
        Self { image, dpi }
    }

    /// All-white page of the given size.
    #[must_use]
    pub fn blank(size: PageSize, dpi: u32) -> Self {
        let (w, h) = size.pixel_dimensions(dpi);
        Self::new(GrayImage::from_pixel(w, h, Luma([255])), dpi)
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Resamples to exactly the pixel size `size` has at `dpi`.
    ///
    /// Returns a plain copy when the dimensions already agree.
    #[must_use]
    pub fn resampled(&self, size: PageSize, dpi: u32) -> Self {
        let (w, h) = size.pixel_dimensions(dpi);
        if (w, h) == self.image.dimensions() {
            return Self::new(self.image.clone(), dpi);
        }
        Self::new(imageops::resize(&self.image, w, h, FilterType::Triangle), dpi)
    }
}

/// A loaded document the pipeline can inspect and redact.
pub trait DocumentBackend: Send {
    /// Human-readable origin of the document (usually its path).
    fn source(&self) -> &Path;

    /// Number of pages; pages are addressed `0..page_count()`.
    fn page_count(&self) -> usize;

    /// Dimensions of `page` in points.
    fn page_size(&self, page: usize) -> Result<PageSize>;

    /// Text runs of `page` in extraction order.
    fn extract_text_runs(&self, page: usize) -> Result<Vec<TextRun>>;

    /// Renders `page` at `dpi`, sized exactly as [`PageSize::pixel_dimensions`].
    fn rasterize(&self, page: usize, dpi: u32) -> Result<PageRaster>;

    /// Removes the text under `rect` on `page` and paints the region over.
    ///
    /// From this call on, `extract_text_runs` no longer returns the covered
    /// characters and `rasterize` shows the fill. `save` carries both into
    /// the output.
    fn apply_redaction(&mut self, page: usize, rect: Rect) -> Result<()>;

    /// Writes the redacted document to `output`.
    fn save(&mut self, output: &Path) -> Result<()>;
}

/// Creates backends for the files of a batch.
pub trait DocumentOpener: Send + Sync {
    /// Loads the document at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn DocumentBackend>>;
}

pub(crate) fn page_out_of_range(page: usize, count: usize) -> RedactError {
    RedactError::Backend {
        operation: "page lookup",
        details: format!("page {page} out of range (document has {count} pages)"),
        transient: false,
    }
}

/// SHA-256 of the file contents, lowercase hex.
pub fn fingerprint(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| RedactError::io(path, source))?;
    Ok(fingerprint_bytes(&bytes))
}

/// SHA-256 of `bytes`, lowercase hex.
#[must_use]
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}
