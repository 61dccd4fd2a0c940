use tracing::info;

use fedsearch_core::config::{FederationConfig, Strategy};
use fedsearch_core::{CombinedPage, Continuation, Error, KeywordIndex, Limit, Result, SearchQuery, SimilarityIndex};

use crate::combiner::pick_distances;
use crate::roles::Roles;
use crate::sources::Sources;
use crate::strategy::{filter_both, full_merge, incremental};

/// Answers combined page requests over a keyword index and a similarity index.
///
/// Holds no state between requests: everything needed to resume a result
/// list travels in the returned `Continuation`.
pub struct Federator<K, S> {
    keyword: K,
    similarity: S,
    config: FederationConfig,
}

impl<K: KeywordIndex, S: SimilarityIndex> Federator<K, S> {
    pub fn new(keyword: K, similarity: S, config: FederationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { keyword, similarity, config })
    }

    pub fn config(&self) -> &FederationConfig { &self.config }

    pub fn keyword(&self) -> &K { &self.keyword }

    pub fn similarity(&self) -> &S { &self.similarity }

    /// Like [`Federator::search`], with the continuation in its transport form.
    pub async fn search_encoded(&self, query: &SearchQuery, continuation: Option<&str>) -> Result<CombinedPage> {
        let continuation = continuation.filter(|c| !c.is_empty()).map(Continuation::decode).transpose()?;
        self.search(query, continuation.as_ref()).await
    }

    pub async fn search(&self, query: &SearchQuery, continuation: Option<&Continuation>) -> Result<CombinedPage> {
        let config = match &query.tuning {
            Some(tuning) => {
                tuning.validate()?;
                tuning
            }
            None => &self.config,
        };
        if query.page < 1 {
            return Err(Error::not_found(format!("page {} does not exist", query.page)));
        }
        if query.page_size == 0 || query.page_size > config.max_page_size {
            return Err(Error::bad_input(format!(
                "page size must be between 1 and {}, got {}",
                config.max_page_size, query.page_size
            )));
        }
        if query.checked_page_offset().is_none() {
            return Err(Error::not_found(format!("page {} does not exist", query.page)));
        }

        let sources = Sources { keyword: &self.keyword, similarity: &self.similarity, query, config };
        let has_keyword = !query.keyword.is_empty();
        let has_similarity = !query.similarity.is_empty();
        let mut federation = None;
        let (route, page) = match (has_keyword, has_similarity) {
            (false, false) => ("empty", CombinedPage::empty()),
            (false, true) => {
                let page = sources.similarity_page(query.page_offset(), Limit::Count(query.page_size)).await?;
                let combined = CombinedPage {
                    distances: pick_distances(&page.ids, &page.distances),
                    ids: page.ids,
                    count: page.total,
                    ..CombinedPage::empty()
                };
                ("similarity", combined)
            }
            (true, false) => {
                let page = sources.keyword_page(query.page_offset(), query.page_size).await?;
                ("keyword", CombinedPage { ids: page.ids, count: page.total, ..CombinedPage::empty() })
            }
            (true, true) => {
                let roles = Roles::for_query(query);
                let page = match config.strategy {
                    Strategy::FullMerge => full_merge::run(&sources, roles).await?,
                    Strategy::FilterBoth => filter_both::run(&sources, roles).await?,
                    Strategy::Incremental => {
                        let snapshot = self.similarity.snapshot().await?;
                        incremental::run(&sources, roles, continuation, snapshot).await?
                    }
                };
                federation = Some((config.strategy, roles.primary));
                ("federated", page)
            }
        };
        let strategy = federation.map(|(s, _)| s.to_string());
        let primary = federation.map(|(_, p)| p.to_string());
        info!(
            route,
            strategy = strategy.as_deref(),
            primary = primary.as_deref(),
            page = query.page,
            page_size = query.page_size,
            returned = page.ids.len(),
            count = page.count,
            note = %page.note,
            "search"
        );
        Ok(page)
    }
}
