//! Deterministic in-memory indices with fixed result lists.
//!
//! Both ignore the query text and always match the same IDs in the same
//! order, which makes federation behaviour easy to pin down in tests. They
//! count calls so probe budgets can be asserted.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::traits::{KeywordIndex, SimilarityIndex};
use crate::types::{DocId, IndexPage, KeywordQuery, Limit, SimilarityQuery};

#[derive(Default)]
struct CallLog {
    calls: AtomicUsize,
    restricted_calls: AtomicUsize,
    largest_restriction: AtomicUsize,
}

impl CallLog {
    fn record(&self, restrict_to: Option<&[DocId]>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ids) = restrict_to {
            self.restricted_calls.fetch_add(1, Ordering::SeqCst);
            self.largest_restriction.fetch_max(ids.len(), Ordering::SeqCst);
        }
    }
}

fn eligible<'a>(ids: impl Iterator<Item = &'a DocId>, restrict_to: Option<&[DocId]>) -> Vec<DocId> {
    match restrict_to {
        Some(allowed) => {
            let allowed: HashSet<DocId> = allowed.iter().copied().collect();
            ids.filter(|id| allowed.contains(id)).copied().collect()
        }
        None => ids.copied().collect(),
    }
}

fn window(ids: &[DocId], offset: usize, limit: usize) -> Vec<DocId> {
    ids.iter().skip(offset).take(limit).copied().collect()
}

/// Keyword index that matches `ids`, in that order, for every query.
#[derive(Default)]
pub struct FixedKeywordIndex {
    ids: Vec<DocId>,
    failure: Option<Error>,
    log: CallLog,
}

impl FixedKeywordIndex {
    pub fn new(ids: Vec<DocId>) -> Self { Self { ids, ..Self::default() } }

    /// Every call fails with `err`.
    pub fn failing(err: Error) -> Self { Self { failure: Some(err), ..Self::default() } }

    pub fn calls(&self) -> usize { self.log.calls.load(Ordering::SeqCst) }

    pub fn restricted_calls(&self) -> usize { self.log.restricted_calls.load(Ordering::SeqCst) }

    pub fn largest_restriction(&self) -> usize { self.log.largest_restriction.load(Ordering::SeqCst) }
}

#[async_trait]
impl KeywordIndex for FixedKeywordIndex {
    async fn page(
        &self,
        _query: &KeywordQuery,
        offset: usize,
        limit: usize,
        restrict_to: Option<&[DocId]>,
    ) -> Result<IndexPage> {
        self.log.record(restrict_to);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let matches = eligible(self.ids.iter(), restrict_to);
        Ok(IndexPage::new(window(&matches, offset, limit), matches.len()))
    }
}

/// Similarity index that ranks `entries` (ID, distance) in the given order.
#[derive(Default)]
pub struct FixedSimilarityIndex {
    entries: Vec<(DocId, f32)>,
    failure: Option<Error>,
    snapshot: AtomicU64,
    versioned: bool,
    log: CallLog,
}

impl FixedSimilarityIndex {
    pub fn new(entries: Vec<(DocId, f32)>) -> Self { Self { entries, ..Self::default() } }

    /// Ranks `ids` in order with distances 0.0, 1.0, 2.0, ...
    pub fn ranked(ids: &[DocId]) -> Self {
        Self::new(ids.iter().enumerate().map(|(i, id)| (*id, i as f32)).collect())
    }

    pub fn failing(err: Error) -> Self { Self { failure: Some(err), ..Self::default() } }

    /// Report `version` from `snapshot()`.
    pub fn versioned(mut self, version: u64) -> Self {
        self.snapshot = AtomicU64::new(version);
        self.versioned = true;
        self
    }

    pub fn set_version(&self, version: u64) { self.snapshot.store(version, Ordering::SeqCst); }

    pub fn calls(&self) -> usize { self.log.calls.load(Ordering::SeqCst) }

    pub fn restricted_calls(&self) -> usize { self.log.restricted_calls.load(Ordering::SeqCst) }

    pub fn largest_restriction(&self) -> usize { self.log.largest_restriction.load(Ordering::SeqCst) }
}

#[async_trait]
impl SimilarityIndex for FixedSimilarityIndex {
    async fn page(
        &self,
        query: &SimilarityQuery,
        offset: usize,
        limit: Limit,
        restrict_to: Option<&[DocId]>,
    ) -> Result<IndexPage> {
        self.log.record(restrict_to);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let matches = eligible(self.entries.iter().map(|(id, _)| id), restrict_to);
        let limit = match limit {
            Limit::All => matches.len(),
            Limit::Count(n) => n,
        };
        let ids = window(&matches, offset, limit);
        let distances: HashMap<DocId, f32> = if query.target.is_some() {
            let returned: HashSet<DocId> = ids.iter().copied().collect();
            self.entries.iter().filter(|(id, _)| returned.contains(id)).copied().collect()
        } else {
            HashMap::new()
        };
        Ok(IndexPage::new(ids, matches.len()).with_distances(distances))
    }

    async fn snapshot(&self) -> Result<Option<u64>> {
        Ok(self.versioned.then(|| self.snapshot.load(Ordering::SeqCst)))
    }
}
