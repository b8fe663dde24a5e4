#![forbid(unsafe_code)]

//! pdf_redactor: context-aware redaction of sensitive text and logos.
//!
//! Two detection paths share one page raster:
//! 1. **Text**: pattern candidates scored by proximity, font, zone and
//!    schematic density, fused into a redact/keep verdict
//! 2. **Logos**: multi-scale, multi-rotation normalized cross-correlation
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use pdf_redactor::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use pdf_redactor::core::config::Config;
//! use pdf_redactor::pipeline::batch::{BatchOptions, BatchRunner};
//! ```

pub mod prelude;

pub mod core;
pub mod detect;
pub mod document;
pub mod logger;
pub mod pipeline;
