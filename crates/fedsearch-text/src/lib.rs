//! fedsearch-text
//!
//! Tantivy-based keyword/facet index serving as the keyword side of federated
//! search. See `index` for the `KeywordIndex` implementation.

pub mod tantivy_utils;
pub mod index;

pub use index::TantivyKeywordIndex;
