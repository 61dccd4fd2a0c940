//! Paging, draining and restricted probing against the two indices.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use fedsearch_core::config::FederationConfig;
use fedsearch_core::{DocId, IndexPage, KeywordIndex, Limit, Result, SearchQuery, SimilarityIndex};

use crate::roles::Side;

/// IDs gathered from one index over one or more page calls.
#[derive(Debug, Default)]
pub(crate) struct Drained {
    pub ids: Vec<DocId>,
    /// Match count the index reported for the whole query.
    pub total: usize,
    pub distances: HashMap<DocId, f32>,
    pub requests: usize,
}

impl Drained {
    /// Fewer IDs were gathered than the index matched (counting from `offset`).
    pub fn truncated(&self, offset: usize) -> bool { offset + self.ids.len() < self.total }

    pub fn id_set(&self) -> HashSet<DocId> { self.ids.iter().copied().collect() }
}

/// The two indices as seen by one search request.
pub(crate) struct Sources<'a, K, S> {
    pub keyword: &'a K,
    pub similarity: &'a S,
    pub query: &'a SearchQuery,
    pub config: &'a FederationConfig,
}

impl<'a, K: KeywordIndex, S: SimilarityIndex> Sources<'a, K, S> {
    pub async fn keyword_page(&self, offset: usize, limit: usize) -> Result<IndexPage> {
        self.keyword.page(&self.query.keyword, offset, limit, None).await
    }

    pub async fn similarity_page(&self, offset: usize, limit: Limit) -> Result<IndexPage> {
        self.similarity.page(&self.query.similarity, offset, limit, None).await
    }

    /// Pages through the keyword index from the top, at most `max_pages` calls.
    pub async fn drain_keyword(&self, page_size: usize, max_pages: usize) -> Result<Drained> {
        let mut out = Drained::default();
        while out.requests < max_pages {
            let page = self.keyword_page(out.ids.len(), page_size).await?;
            out.requests += 1;
            out.total = page.total;
            let exhausted = page.ids.is_empty();
            out.ids.extend(page.ids);
            if exhausted || out.ids.len() >= out.total {
                break;
            }
        }
        if out.truncated(0) {
            warn!(side = %Side::Keyword, retrieved = out.ids.len(), total = out.total, "drain stopped at its page cap");
        }
        debug!(side = %Side::Keyword, retrieved = out.ids.len(), total = out.total, requests = out.requests, "drained");
        Ok(out)
    }

    /// Enumerates the similarity index from `offset`.
    ///
    /// Without a page size everything is fetched in one call; otherwise at most
    /// `max_pages` calls of `page_size` are made.
    pub async fn drain_similarity(&self, offset: usize, page_size: Option<usize>, max_pages: usize) -> Result<Drained> {
        let mut out = Drained::default();
        match page_size {
            None => {
                let page = self.similarity_page(offset, Limit::All).await?;
                out.requests = 1;
                out.total = page.total;
                out.distances = page.distances;
                out.ids = page.ids;
            }
            Some(size) => {
                while out.requests < max_pages {
                    let page = self.similarity_page(offset + out.ids.len(), Limit::Count(size)).await?;
                    out.requests += 1;
                    out.total = page.total;
                    out.distances.extend(page.distances);
                    let exhausted = page.ids.is_empty();
                    out.ids.extend(page.ids);
                    if exhausted || offset + out.ids.len() >= out.total {
                        break;
                    }
                }
            }
        }
        if out.truncated(offset) {
            warn!(side = %Side::Similarity, offset, retrieved = out.ids.len(), total = out.total, "drain stopped at its page cap");
        }
        debug!(side = %Side::Similarity, offset, retrieved = out.ids.len(), total = out.total, requests = out.requests, "drained");
        Ok(out)
    }

    /// Asks `side` which of `ids` match the query.
    ///
    /// The list is split into calls of at most `max_restrict_ids` IDs, issued
    /// one after another; results are concatenated in call order.
    pub async fn probe(&self, side: Side, ids: &[DocId]) -> Result<IndexPage> {
        let mut merged = IndexPage::default();
        if ids.is_empty() {
            return Ok(merged);
        }
        for chunk in ids.chunks(self.config.max_restrict_ids) {
            let page = match side {
                Side::Keyword => self.keyword.page(&self.query.keyword, 0, chunk.len(), Some(chunk)).await?,
                Side::Similarity => self.similarity.page(&self.query.similarity, 0, Limit::All, Some(chunk)).await?,
            };
            merged.total += page.total;
            merged.ids.extend(page.ids);
            merged.distances.extend(page.distances);
        }
        debug!(side = %side, probed = ids.len(), hits = merged.ids.len(), "probe");
        Ok(merged)
    }

    /// Probes independent blocks through a worker pool of `probe_concurrency`
    /// calls in flight. Results come back in block order.
    pub async fn probe_blocks(&self, side: Side, blocks: &[&[DocId]]) -> Result<Vec<IndexPage>> {
        stream::iter(blocks.iter().map(|block| self.probe(side, block)))
            .buffered(self.config.probe_concurrency)
            .try_collect()
            .await
    }
}
