#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

//! Shared vocabulary for federated keyword + similarity search: domain types,
//! the error taxonomy, index capability traits, continuation codec and
//! configuration.

pub mod config;
pub mod continuation;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fixed;
pub mod loader;
pub mod traits;
pub mod types;

pub use continuation::{Continuation, Cursor};
pub use error::{Error, Result};
pub use traits::{KeywordIndex, SimilarityIndex};
pub use types::{CombinedPage, DocId, Document, IndexPage, KeywordQuery, Limit, SearchQuery, SimilarityQuery, SimilarityTarget};
