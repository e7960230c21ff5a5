//! Mod manifest extraction.

mod extractor;

pub use extractor::{extract, parse_manifest, Manifest, ENTRY_SELECTOR};
