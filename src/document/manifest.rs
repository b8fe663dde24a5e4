//! File-backed document described by a JSON page manifest.
//!
//! ```json
//! {
//!   "source": "drawing-17.pdf",
//!   "metadata": { "author": "J. Smith" },
//!   "pages": [
//!     { "width": 612, "height": 792, "raster": "p1.png", "raster_dpi": 150,
//!       "runs": [ { "text": "Address:", "bbox": [72, 40, 120, 52],
//!                   "font_name": "ArialMT", "font_size": 11, "flags": 16 } ] }
//!   ]
//! }
//! ```
//!
//! Raster paths resolve relative to the manifest. Saving writes the redacted
//! manifest: covered characters are gone from the runs, and every page with a
//! redaction gets a painted PNG copy next to the output
//! (`<output stem>.page<N>.png`). Untouched pages point at their original
//! raster by absolute path. The applied rectangles are listed under
//! `redactions`.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use super::memory::AppliedRedaction;
use super::{
    DocumentBackend, DocumentOpener, OutputOptions, PageRaster, PageSize, TextRun,
    page_out_of_range, paint_page_rect, redact_runs,
};
use crate::core::errors::{RedactError, Result};
use crate::core::geometry::Rect;

/// On-disk manifest format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// The document the pages were extracted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Document information entries (author, title, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Pages in order.
    pub pages: Vec<ManifestPage>,
    /// Rectangles applied by earlier runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redactions: Vec<AppliedRedaction>,
}

/// One page entry of a [`Manifest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestPage {
    /// Width in points.
    pub width: f64,
    /// Height in points.
    pub height: f64,
    /// PNG rendering of the page; absent pages rasterize blank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raster: Option<PathBuf>,
    /// Resolution of `raster`.
    #[serde(default = "default_raster_dpi")]
    pub raster_dpi: u32,
    /// Text runs in reading order.
    #[serde(default)]
    pub runs: Vec<TextRun>,
}

const fn default_raster_dpi() -> u32 {
    72
}

/// A manifest loaded for redaction.
#[derive(Debug)]
pub struct ManifestDocument {
    path: PathBuf,
    base_dir: PathBuf,
    manifest: Manifest,
    applied: Vec<AppliedRedaction>,
    output: OutputOptions,
}

impl ManifestDocument {
    /// Reads and checks the manifest at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| RedactError::io(path, source))?;
        let manifest: Manifest =
            serde_json::from_str(&raw).map_err(|error| RedactError::Backend {
                operation: "open",
                details: format!("{}: malformed manifest: {error}", path.display()),
                transient: false,
            })?;
        for (index, page) in manifest.pages.iter().enumerate() {
            if !(page.width > 0.0 && page.height > 0.0) || page.raster_dpi == 0 {
                return Err(RedactError::backend(
                    "open",
                    format!("{}: page {index} has invalid geometry", path.display()),
                ));
            }
        }
        let base_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(Self {
            path: path.to_path_buf(),
            base_dir,
            manifest,
            applied: Vec::new(),
            output: OutputOptions::default(),
        })
    }

    /// Same document writing its output as `output` says.
    #[must_use]
    pub fn with_output(mut self, output: OutputOptions) -> Self {
        self.output = output;
        self
    }

    fn page(&self, page: usize) -> Result<&ManifestPage> {
        self.manifest
            .pages
            .get(page)
            .ok_or_else(|| page_out_of_range(page, self.manifest.pages.len()))
    }

    fn resolve(&self, raster: &Path) -> PathBuf {
        if raster.is_absolute() {
            raster.to_path_buf()
        } else {
            self.base_dir.join(raster)
        }
    }

    /// Redactions applied since the document was opened.
    #[must_use]
    pub fn applied(&self) -> &[AppliedRedaction] {
        &self.applied
    }

    fn load_rgb(&self, page: &ManifestPage) -> Result<RgbImage> {
        let Some(raster) = &page.raster else {
            let size = PageSize::new(page.width, page.height);
            let (w, h) = size.pixel_dimensions(page.raster_dpi);
            return Ok(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])));
        };
        let path = self.resolve(raster);
        image::open(&path)
            .map(|image| image.to_rgb8())
            .map_err(|error| RedactError::Backend {
                operation: "save",
                details: format!("{}: {error}", path.display()),
                transient: false,
            })
    }

    /// Writes `page` with `rects` painted over to `target`.
    fn write_redacted_raster(
        &self,
        page: &ManifestPage,
        rects: &[Rect],
        target: &Path,
    ) -> Result<()> {
        let mut image = self.load_rgb(page)?;
        let size = PageSize::new(page.width, page.height);
        for rect in rects {
            paint_page_rect(&mut image, rect, size, self.output.fill_rgb());
        }
        let file = File::create(target).map_err(|source| RedactError::io(target, source))?;
        let compression = if self.output.compress {
            CompressionType::Best
        } else {
            CompressionType::Fast
        };
        let encoder =
            PngEncoder::new_with_quality(BufWriter::new(file), compression, PngFilter::Adaptive);
        image
            .write_with_encoder(encoder)
            .map_err(|error| RedactError::Backend {
                operation: "save",
                details: format!("{}: {error}", target.display()),
                transient: false,
            })
    }
}

/// File name of the painted copy of page `index` saved beside `output`.
fn redacted_raster_name(output: &Path, index: usize) -> String {
    let stem = output
        .file_stem()
        .map_or_else(|| "document".into(), |stem| stem.to_string_lossy());
    format!("{stem}.page{}.png", index + 1)
}

impl DocumentBackend for ManifestDocument {
    fn source(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.manifest.pages.len()
    }

    fn page_size(&self, page: usize) -> Result<PageSize> {
        let p = self.page(page)?;
        Ok(PageSize::new(p.width, p.height))
    }

    fn extract_text_runs(&self, page: usize) -> Result<Vec<TextRun>> {
        Ok(self.page(page)?.runs.clone())
    }

    fn rasterize(&self, page: usize, dpi: u32) -> Result<PageRaster> {
        let p = self.page(page)?;
        let size = PageSize::new(p.width, p.height);
        let mut raster = match &p.raster {
            None => PageRaster::blank(size, dpi),
            Some(raster) => {
                let path = self.resolve(raster);
                let image = image::open(&path)
                    .map_err(|error| RedactError::Backend {
                        operation: "rasterize",
                        details: format!("{}: {error}", path.display()),
                        transient: false,
                    })?
                    .to_luma8();
                PageRaster::new(image, p.raster_dpi).resampled(size, dpi)
            }
        };
        for applied in self.applied.iter().filter(|a| a.page == page) {
            paint_page_rect(&mut raster.image, &applied.bbox, size, self.output.fill_luma());
        }
        Ok(raster)
    }

    fn apply_redaction(&mut self, page: usize, rect: Rect) -> Result<()> {
        let count = self.manifest.pages.len();
        let p = self
            .manifest
            .pages
            .get_mut(page)
            .ok_or_else(|| page_out_of_range(page, count))?;
        let clipped = rect.clamp_to(p.width, p.height);
        redact_runs(&mut p.runs, &clipped);
        if !self
            .applied
            .iter()
            .any(|a| a.page == page && a.bbox == clipped)
        {
            self.applied.push(AppliedRedaction {
                page,
                bbox: clipped,
            });
        }
        Ok(())
    }

    fn save(&mut self, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| RedactError::io(parent, source))?;
        }

        let mut saved = self.manifest.clone();
        if saved.source.is_none() {
            saved.source = Some(self.path.display().to_string());
        }
        if !self.output.preserve_metadata {
            saved.metadata.clear();
        }
        for (index, page) in saved.pages.iter_mut().enumerate() {
            let rects: Vec<Rect> = self
                .applied
                .iter()
                .filter(|a| a.page == index)
                .map(|a| a.bbox)
                .collect();
            if rects.is_empty() {
                if let Some(raster) = page.raster.take() {
                    page.raster = Some(self.resolve(&raster));
                }
                continue;
            }
            let name = redacted_raster_name(output, index);
            self.write_redacted_raster(page, &rects, &output.with_file_name(&name))?;
            page.raster = Some(PathBuf::from(name));
        }
        saved.redactions.extend(self.applied.iter().cloned());

        let json = if self.output.compress {
            serde_json::to_string(&saved)?
        } else {
            serde_json::to_string_pretty(&saved)?
        };
        fs::write(output, json).map_err(|source| RedactError::io(output, source))
    }
}

/// Opens `*.json` page manifests from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestOpener {
    output: OutputOptions,
}

impl ManifestOpener {
    /// Opener whose documents write their output as `output` says.
    #[must_use]
    pub const fn new(output: OutputOptions) -> Self {
        Self { output }
    }
}

impl DocumentOpener for ManifestOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn DocumentBackend>> {
        Ok(Box::new(ManifestDocument::open(path)?.with_output(self.output)))
    }
}
