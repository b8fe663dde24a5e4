//! Core types: errors, configuration, page geometry.

pub mod config;
pub mod errors;
pub mod geometry;
