//! Line-density analysis of rendered pages.
//!
//! The raster is reduced to the analysis resolution, edge-detected, and
//! searched for straight lines with a Hough transform. Each Hough line is
//! traced across the edge map to recover the actual drawn segments (gaps up
//! to `max_line_gap`, at least `min_line_length` long, mostly solid). Pixels
//! on accepted segments are counted per grid cell and normalized by cell
//! area, giving one [`DensityGrid`] per page shared by all its candidates.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]

use image::GrayImage;
use image::imageops::{self, FilterType};
use imageproc::edges::canny;
use imageproc::hough::{LineDetectionOptions, PolarLine, detect_lines};

use super::PageContext;
use super::fusion::Scorer;
use super::patterns::Candidate;
use crate::core::config::SchematicConfig;
use crate::core::errors::{RedactError, Result};
use crate::core::geometry::Rect;
use crate::document::{PageRaster, PageSize};

/// Smallest raster side worth analyzing; anything smaller has zero density.
const MIN_ANALYSIS_SIDE: u32 = 8;

/// Fixed `rows x cols` grid of line densities in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    rows: usize,
    cols: usize,
    cells: Vec<f64>,
}

impl DensityGrid {
    /// Every cell set to `value`, clamped to `[0, 1]`.
    #[must_use]
    pub fn uniform(rows: usize, cols: usize, value: f64) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            rows,
            cols,
            cells: vec![value.clamp(0.0, 1.0); rows * cols],
        }
    }

    /// Row-major cells; missing cells read as zero, extras are dropped.
    #[must_use]
    pub fn from_cells(rows: usize, cols: usize, mut cells: Vec<f64>) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        cells.resize(rows * cols, 0.0);
        for cell in &mut cells {
            *cell = cell.clamp(0.0, 1.0);
        }
        Self { rows, cols, cells }
    }

    /// Grid rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Grid columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Density at `(row, col)`; zero outside the grid.
    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> f64 {
        if row >= self.rows || col >= self.cols {
            return 0.0;
        }
        self.cells[row * self.cols + col]
    }

    /// Densest cell.
    #[must_use]
    pub fn max_density(&self) -> f64 {
        self.cells.iter().copied().fold(0.0, f64::max)
    }

    /// Density of the cell holding the fractional point `(fx, fy)`.
    #[must_use]
    pub fn at_fraction(&self, fx: f64, fy: f64) -> f64 {
        let col = ((fx.clamp(0.0, 1.0) * self.cols as f64) as usize).min(self.cols - 1);
        let row = ((fy.clamp(0.0, 1.0) * self.rows as f64) as usize).min(self.rows - 1);
        self.cell(row, col)
    }

    /// Area-weighted mean density over the fractional box.
    ///
    /// A degenerate box reads the cell under its center.
    #[must_use]
    pub fn area_weighted(&self, fx0: f64, fy0: f64, fx1: f64, fy1: f64) -> f64 {
        let (fx0, fx1) = (fx0.clamp(0.0, 1.0), fx1.clamp(0.0, 1.0));
        let (fy0, fy1) = (fy0.clamp(0.0, 1.0), fy1.clamp(0.0, 1.0));
        if fx1 <= fx0 || fy1 <= fy0 {
            return self.at_fraction((fx0 + fx1) / 2.0, (fy0 + fy1) / 2.0);
        }
        let (cw, ch) = (1.0 / self.cols as f64, 1.0 / self.rows as f64);
        let c0 = ((fx0 / cw) as usize).min(self.cols - 1);
        let c1 = ((fx1 / cw).ceil() as usize).clamp(c0 + 1, self.cols);
        let r0 = ((fy0 / ch) as usize).min(self.rows - 1);
        let r1 = ((fy1 / ch).ceil() as usize).clamp(r0 + 1, self.rows);

        let mut weighted = 0.0;
        let mut total = 0.0;
        for row in r0..r1 {
            let oy = (fy1.min((row + 1) as f64 * ch) - fy0.max(row as f64 * ch)).max(0.0);
            for col in c0..c1 {
                let ox = (fx1.min((col + 1) as f64 * cw) - fx0.max(col as f64 * cw)).max(0.0);
                let area = ox * oy;
                weighted = self.cell(row, col).mul_add(area, weighted);
                total += area;
            }
        }
        if total > 0.0 {
            (weighted / total).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Penalty for a page-space box on a page of `size`.
    #[must_use]
    pub fn penalty_for(&self, bbox: &Rect, size: PageSize) -> f64 {
        self.area_weighted(
            bbox.x0 / size.width,
            bbox.y0 / size.height,
            bbox.x1 / size.width,
            bbox.y1 / size.height,
        )
    }
}

/// A traced straight segment in analysis pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    /// Start x.
    pub x0: f32,
    /// Start y.
    pub y0: f32,
    /// End x.
    pub x1: f32,
    /// End y.
    pub y1: f32,
    /// Edge pixels found along the segment.
    pub pixels: u32,
}

impl LineSegment {
    /// Euclidean length in analysis pixels.
    #[must_use]
    pub fn length(&self) -> f32 {
        (self.x1 - self.x0).hypot(self.y1 - self.y0)
    }
}

/// Line-density analysis of page rasters.
#[derive(Debug, Clone)]
pub struct SchematicDetector {
    config: SchematicConfig,
}

/// Open run of hits while walking one Hough line.
struct Trace {
    start: i32,
    last_on: i32,
    hits: Vec<(u32, u32)>,
}

impl SchematicDetector {
    /// Detector with the given knobs.
    #[must_use]
    pub fn new(config: SchematicConfig) -> Self {
        Self { config }
    }

    /// Analysis knobs in use.
    #[must_use]
    pub fn config(&self) -> &SchematicConfig {
        &self.config
    }

    /// Builds the page density grid. Deterministic for identical rasters.
    pub fn analyze(&self, page: usize, raster: &PageRaster) -> Result<DensityGrid> {
        if raster.width() == 0 || raster.height() == 0 || raster.dpi == 0 {
            return Err(RedactError::detection(
                page,
                format!(
                    "cannot analyze empty raster {}x{} at {} dpi",
                    raster.width(),
                    raster.height(),
                    raster.dpi
                ),
            ));
        }
        let gray = self.analysis_image(raster);
        let (w, h) = gray.dimensions();
        if w < MIN_ANALYSIS_SIDE || h < MIN_ANALYSIS_SIDE {
            return Ok(DensityGrid::uniform(
                self.config.grid_rows,
                self.config.grid_cols,
                0.0,
            ));
        }
        let edges = canny(&gray, self.config.canny_low, self.config.canny_high);
        let (_, mask) = self.trace_segments(&edges);
        Ok(self.grid_from_mask(&mask, w, h))
    }

    /// Accepted line segments in the analysis-resolution image.
    #[must_use]
    pub fn detect_segments(&self, raster: &PageRaster) -> Vec<LineSegment> {
        let gray = self.analysis_image(raster);
        if gray.width() < MIN_ANALYSIS_SIDE || gray.height() < MIN_ANALYSIS_SIDE {
            return Vec::new();
        }
        let edges = canny(&gray, self.config.canny_low, self.config.canny_high);
        self.trace_segments(&edges).0
    }

    fn analysis_image(&self, raster: &PageRaster) -> GrayImage {
        if raster.dpi <= self.config.analysis_dpi {
            return raster.image.clone();
        }
        let ratio = f64::from(self.config.analysis_dpi) / f64::from(raster.dpi);
        let w = ((f64::from(raster.width()) * ratio).round() as u32).max(1);
        let h = ((f64::from(raster.height()) * ratio).round() as u32).max(1);
        imageops::resize(&raster.image, w, h, FilterType::Triangle)
    }

    fn trace_segments(&self, edges: &GrayImage) -> (Vec<LineSegment>, Vec<bool>) {
        let (w, h) = edges.dimensions();
        let mut mask = vec![false; (w as usize) * (h as usize)];
        let options = LineDetectionOptions {
            vote_threshold: self.config.vote_threshold,
            suppression_radius: self.config.suppression_radius,
        };
        let mut segments = Vec::new();
        for line in detect_lines(edges, options) {
            self.trace_line(edges, &line, &mut mask, &mut segments);
        }
        (segments, mask)
    }

    /// Walks `line` across the image one pixel at a time, tolerating a
    /// one-pixel offset from the quantized Hough position.
    fn trace_line(
        &self,
        edges: &GrayImage,
        line: &PolarLine,
        mask: &mut [bool],
        out: &mut Vec<LineSegment>,
    ) {
        let (w, h) = edges.dimensions();
        let theta = (line.angle_in_degrees as f32).to_radians();
        let (sin, cos) = theta.sin_cos();
        let (foot_x, foot_y) = (line.r * cos, line.r * sin);
        let (dir_x, dir_y) = (-sin, cos);
        let half = (w as f32).hypot(h as f32).ceil() as i32;

        let edge_at = |x: f32, y: f32| -> Option<(u32, u32)> {
            for offset in [0.0_f32, -1.0, 1.0] {
                let sx = offset.mul_add(cos, x).round();
                let sy = offset.mul_add(sin, y).round();
                if sx >= 0.0
                    && sy >= 0.0
                    && (sx as u32) < w
                    && (sy as u32) < h
                    && edges.get_pixel(sx as u32, sy as u32)[0] > 0
                {
                    return Some((sx as u32, sy as u32));
                }
            }
            None
        };

        let mut current: Option<Trace> = None;
        for t in -half..=half {
            let x = (t as f32).mul_add(dir_x, foot_x);
            let y = (t as f32).mul_add(dir_y, foot_y);
            let Some(hit) = edge_at(x, y) else {
                continue;
            };
            match current.as_mut() {
                Some(run) if t - run.last_on - 1 <= self.config.max_line_gap as i32 => {
                    run.last_on = t;
                    run.hits.push(hit);
                }
                _ => {
                    if let Some(done) = current.take() {
                        self.finish_trace(done, line, mask, w, out);
                    }
                    current = Some(Trace {
                        start: t,
                        last_on: t,
                        hits: vec![hit],
                    });
                }
            }
        }
        if let Some(done) = current {
            self.finish_trace(done, line, mask, w, out);
        }
    }

    fn finish_trace(
        &self,
        trace: Trace,
        line: &PolarLine,
        mask: &mut [bool],
        width: u32,
        out: &mut Vec<LineSegment>,
    ) {
        let length = (trace.last_on - trace.start + 1) as u32;
        if length < self.config.min_line_length {
            return;
        }
        let fill = trace.hits.len() as f64 / f64::from(length);
        if fill < self.config.min_fill_ratio {
            return;
        }
        let theta = (line.angle_in_degrees as f32).to_radians();
        let (sin, cos) = theta.sin_cos();
        let point = |t: i32| {
            (
                (t as f32).mul_add(-sin, line.r * cos),
                (t as f32).mul_add(cos, line.r * sin),
            )
        };
        let (x0, y0) = point(trace.start);
        let (x1, y1) = point(trace.last_on);
        for &(x, y) in &trace.hits {
            mask[(y as usize) * (width as usize) + x as usize] = true;
        }
        out.push(LineSegment {
            x0,
            y0,
            x1,
            y1,
            pixels: trace.hits.len() as u32,
        });
    }

    /// Line pixels per cell, scaled so parallel lines `saturation_spacing`
    /// apart reach 1.0.
    fn grid_from_mask(&self, mask: &[bool], w: u32, h: u32) -> DensityGrid {
        let rows = self.config.grid_rows.max(1);
        let cols = self.config.grid_cols.max(1);
        let mut counts = vec![0_u64; rows * cols];
        let (w_us, h_us) = (w as usize, h as usize);
        for (index, _) in mask.iter().enumerate().filter(|(_, on)| **on) {
            let (x, y) = (index % w_us, index / w_us);
            let col = (x * cols / w_us).min(cols - 1);
            let row = (y * rows / h_us).min(rows - 1);
            counts[row * cols + col] += 1;
        }
        let cells = counts
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let (row, col) = (i / cols, i % cols);
                let cw = (col + 1) * w_us / cols - col * w_us / cols;
                let ch = (row + 1) * h_us / rows - row * h_us / rows;
                let area = (cw * ch).max(1) as f64;
                (count as f64 / area * self.config.saturation_spacing).clamp(0.0, 1.0)
            })
            .collect();
        DensityGrid::from_cells(rows, cols, cells)
    }
}

impl Scorer for SchematicDetector {
    fn name(&self) -> &'static str {
        "schematic"
    }

    fn score(&self, candidate: &Candidate, page: &PageContext<'_>) -> f64 {
        page.density
            .map_or(0.0, |grid| grid.penalty_for(&candidate.bbox, page.size))
    }
}
