// src/crawl/mod.rs
// =============================================================================
// This module discovers new pastes.
//
// Submodules:
// - engine: the watermark-driven pagination loop
// - paste: decoding of listing/detail responses and field projection
// - watermark: the "collected up to here" instant
// =============================================================================

mod engine;
mod paste;
mod watermark;

pub use engine::CrawlEngine;
pub use paste::ProjectedPaste;
pub use watermark::Watermark;
