use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DocId, IndexPage, KeywordQuery, Limit, SimilarityQuery};

/// Index A: text and facet search, paged, with bounded ID restriction.
#[async_trait]
pub trait KeywordIndex: Send + Sync {
    /// Returns `limit` matches starting at `offset` in the index's own order.
    ///
    /// With `restrict_to`, only the listed IDs are eligible; callers keep the
    /// list within the back-end's restriction-clause limit.
    async fn page(
        &self,
        query: &KeywordQuery,
        offset: usize,
        limit: usize,
        restrict_to: Option<&[DocId]>,
    ) -> Result<IndexPage>;
}

/// Index B: nearest-neighbour search that can enumerate all matches at once.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    async fn page(
        &self,
        query: &SimilarityQuery,
        offset: usize,
        limit: Limit,
        restrict_to: Option<&[DocId]>,
    ) -> Result<IndexPage>;

    /// Version stamp of the data currently served, if the back-end has one.
    async fn snapshot(&self) -> Result<Option<u64>> { Ok(None) }
}
