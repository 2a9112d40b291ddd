#![forbid(unsafe_code)]

//! Rendering-side building blocks for livemark: markdown parsing,
//! source-line annotation of rendered blocks, baseline diffing, and
//! change indicators.
//!
//! The pipeline runs leaves-first: [`source_map::annotate`] turns
//! document content into top-level blocks that remember their source
//! lines, [`diff::DiffEngine`] compares new content against the last
//! accepted baseline, and [`indicators::ChangeIndicators`] paints the
//! diff over the annotated blocks.

pub mod diff;
pub mod indicators;
pub mod markdown;
pub mod source_map;
