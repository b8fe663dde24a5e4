#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pdf_redactor::core::config::{Config, TextPattern};
use pdf_redactor::core::geometry::Rect;
use pdf_redactor::document::TextRun;
use pdf_redactor::document::memory::{MemoryDocument, MemoryPage};
use pdf_redactor::document::PageSize;
use pdf_redactor::pipeline::Pipeline;

pub const LETTER: PageSize = PageSize::new(612.0, 792.0);

/// Light paper-like background: values in 200..=255, reproducible per seed.
pub fn noise_page(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    GrayImage::from_fn(width, height, |_, _| Luma([rng.random_range(200..=255)]))
}

/// A high-contrast mark with no symmetry: bars, a diagonal and a block.
pub fn logo(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let bar = x < width / 4;
        let diagonal = x.abs_diff(y * width / height.max(1)) <= 1;
        let block = x > width * 2 / 3 && y > height / 2;
        if bar || diagonal || block {
            Luma([20])
        } else {
            Luma([235])
        }
    })
}

pub fn embed(page: &mut GrayImage, mark: &GrayImage, x: u32, y: u32) {
    imageops::replace(page, mark, i64::from(x), i64::from(y));
}

pub fn scaled(mark: &GrayImage, scale: f64) -> GrayImage {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (w, h) = (
        (f64::from(mark.width()) * scale).round() as u32,
        (f64::from(mark.height()) * scale).round() as u32,
    );
    imageops::resize(mark, w, h, FilterType::CatmullRom)
}

/// Drawing-like raster: 2 px dark horizontal rules every `spacing` pixels.
pub fn grating(width: u32, height: u32, spacing: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |_, y| {
        if y >= spacing && y % spacing < 2 {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

pub fn run(text: &str, x0: f64, y0: f64, x1: f64, y1: f64, font: &str, size: f64) -> TextRun {
    TextRun::new(text, Rect::new(x0, y0, x1, y1), font, size)
}

pub fn literal(id: &str, pattern: &str) -> TextPattern {
    TextPattern {
        id: id.to_string(),
        pattern: pattern.to_string(),
        literal: true,
        ..TextPattern::default()
    }
}

/// Defaults (built-in PII patterns off) with a 72 dpi render.
pub fn quiet_config(patterns: Vec<TextPattern>) -> Config {
    let mut config = Config::default();
    config.text.patterns = patterns;
    config.processing.render_dpi = 72;
    config
}

pub fn pipeline(config: &Config) -> Pipeline {
    let (pipeline, rejected) = Pipeline::from_config(config).expect("pipeline");
    assert!(rejected.is_empty(), "unexpected template rejections: {rejected:?}");
    pipeline
}

pub fn text_document(path: &str, runs: Vec<TextRun>) -> MemoryDocument {
    MemoryDocument::new(path, vec![MemoryPage::new(LETTER).with_runs(runs)])
}

pub fn write_png(dir: &Path, name: &str, image: &GrayImage) -> PathBuf {
    let path = dir.join(name);
    image.save(&path).expect("write png");
    path
}

pub fn write_json(dir: &Path, name: &str, value: &serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_vec_pretty(value).expect("json")).expect("write json");
    path
}

#[derive(Debug)]
pub struct CmdResult {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdResult {
    /// First stdout line parsed as JSON.
    pub fn json(&self) -> serde_json::Value {
        let line = self.stdout.lines().next().unwrap_or_default();
        serde_json::from_str(line)
            .unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {}\n{}", self.stdout, self.stderr))
    }
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_pdfr") {
        return PathBuf::from(path);
    }
    let exe_name = if cfg!(windows) { "pdfr.exe" } else { "pdfr" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));
    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve pdfr binary path for integration test"),
    }
}

pub fn run_cli(args: &[&str]) -> CmdResult {
    let output = Command::new(resolve_bin_path())
        .args(args)
        .env_remove("PDFR_OUTPUT_FORMAT")
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute pdfr command");
    CmdResult {
        status: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}
