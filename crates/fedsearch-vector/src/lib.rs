//! Index B: a LanceDB table of content vectors behind the `SimilarityIndex` trait.

pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use search::LanceSimilarityIndex;
