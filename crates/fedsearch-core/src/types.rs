//! Domain types shared by the keyword index, the similarity index and the federator.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::config::FederationConfig;
use crate::continuation::Continuation;

pub type DocId = u64;

/// A record as it is ingested into both indices.
///
/// - `id`: identity shared by both indices
/// - `text`: payload for the keyword index
/// - `category`: hierarchical facet (e.g. "/topic/subtopic"), filterable in both
/// - `vector`: content descriptor for the similarity index; documents without
///   one are only searchable by keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
}

fn default_category() -> String { "/misc".to_string() }

/// What a similarity search measures distances against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityTarget {
    Vector(Vec<f32>),
    Document(DocId),
}

/// The keyword index's share of a query: free text plus a filter expression.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordQuery {
    pub text: Option<String>,
    pub filter: Option<String>,
}

impl KeywordQuery {
    pub fn is_empty(&self) -> bool { is_blank(&self.text) && is_blank(&self.filter) }
}

/// The similarity index's share of a query: a target and/or a descriptor filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityQuery {
    pub target: Option<SimilarityTarget>,
    pub filter: Option<String>,
}

impl SimilarityQuery {
    pub fn is_empty(&self) -> bool { self.target.is_none() && is_blank(&self.filter) }
}

fn is_blank(s: &Option<String>) -> bool { s.as_deref().map_or(true, |s| s.trim().is_empty()) }

/// One logical search request. Immutable for the duration of a page request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub keyword: KeywordQuery,
    pub similarity: SimilarityQuery,
    /// 1-based page number; ignored by the incremental strategy, which pages by continuation.
    pub page: usize,
    pub page_size: usize,
    /// Per-request tuning that replaces the federator's configured knobs.
    #[serde(default)]
    pub tuning: Option<FederationConfig>,
}

impl SearchQuery {
    pub fn new(keyword: KeywordQuery, similarity: SimilarityQuery) -> Self {
        Self { keyword, similarity, page: 1, page_size: 15, tuning: None }
    }

    pub fn with_page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn with_tuning(mut self, tuning: FederationConfig) -> Self {
        self.tuning = Some(tuning);
        self
    }

    pub fn has_target(&self) -> bool { self.similarity.target.is_some() }

    /// Offset of the first result of the requested page, `None` when it is not addressable.
    pub fn checked_page_offset(&self) -> Option<usize> { self.page.saturating_sub(1).checked_mul(self.page_size) }

    /// Offset of the first result of the requested page.
    pub fn page_offset(&self) -> usize { self.checked_page_offset().unwrap_or(usize::MAX) }
}

/// Result count requested from an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    All,
    Count(usize),
}

impl From<Option<usize>> for Limit {
    fn from(size: Option<usize>) -> Self { size.map_or(Limit::All, Limit::Count) }
}

/// One page returned by an index.
///
/// `total` is the index's match count for the query (restricted calls count
/// only the restricted set). `distances` is filled by the similarity index
/// when a target was given, and is empty otherwise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexPage {
    pub ids: Vec<DocId>,
    pub total: usize,
    pub distances: HashMap<DocId, f32>,
}

impl IndexPage {
    pub fn new(ids: Vec<DocId>, total: usize) -> Self { Self { ids, total, distances: HashMap::new() } }

    pub fn with_distances(mut self, distances: HashMap<DocId, f32>) -> Self {
        self.distances = distances;
        self
    }
}

/// The federator's answer for one page request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedPage {
    pub ids: Vec<DocId>,
    pub count: usize,
    pub distances: BTreeMap<DocId, f32>,
    pub note: String,
    pub continuation: Option<Continuation>,
}

impl CombinedPage {
    pub fn empty() -> Self { Self::default() }

    /// Whether a follow-up page request can return anything.
    ///
    /// Continuation-paged results are exhausted once the continuation says so;
    /// page-numbered results once the requested page reaches `count`.
    pub fn has_more(&self, page: usize, page_size: usize) -> bool {
        match &self.continuation {
            Some(c) => !c.no_more_results,
            None => page.saturating_mul(page_size) < self.count,
        }
    }
}
