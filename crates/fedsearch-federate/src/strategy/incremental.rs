use std::collections::HashMap;
use tracing::debug;

use fedsearch_core::{CombinedPage, Continuation, Cursor, DocId, Error, KeywordIndex, Result, SimilarityIndex};

use crate::combiner::{pick_distances, ResultCombiner};
use crate::roles::{Roles, Side};
use crate::sources::Sources;

/// Where one incremental call ended up.
struct Progress {
    ids: Vec<DocId>,
    distances: HashMap<DocId, f32>,
    position: usize,
    done: bool,
    requests: usize,
    full: bool,
}

/// Resumes the primary index's order from `previous` and fills one page.
///
/// The cursor only ever advances past IDs that were actually examined, so
/// concatenating the pages of successive calls gives the full intersection
/// without gaps or repeats.
pub(crate) async fn run<K: KeywordIndex, S: SimilarityIndex>(
    sources: &Sources<'_, K, S>,
    roles: Roles,
    previous: Option<&Continuation>,
    snapshot: Option<u64>,
) -> Result<CombinedPage> {
    let query = sources.query;
    let previous = match previous {
        Some(c) => {
            c.check_query(query)?;
            if c.snapshot.is_some() && c.snapshot != snapshot {
                return Err(Error::bad_input("continuation is stale: the similarity index changed since it was issued"));
            }
            c.clone()
        }
        None => Continuation::for_query(query),
    };
    match (roles.primary, previous.cursor) {
        (Side::Similarity, Some(Cursor::KeywordRetrieved(_))) | (Side::Keyword, Some(Cursor::SimilarityChecked(_))) => {
            return Err(Error::bad_input("continuation cursor does not match the driving index"));
        }
        _ => {}
    }
    if previous.no_more_results {
        return Ok(CombinedPage { count: previous.emitted, continuation: Some(previous), ..CombinedPage::empty() });
    }

    let start = previous.position();
    let progress = match roles.primary {
        Side::Similarity => similarity_drives(sources, start).await?,
        Side::Keyword => keyword_drives(sources, start).await?,
    };

    let emitted = previous
        .emitted
        .checked_add(progress.ids.len())
        .ok_or_else(|| Error::bad_input("continuation result count is out of range"))?;
    let cursor = match roles.primary {
        Side::Similarity => Cursor::SimilarityChecked(progress.position),
        Side::Keyword => Cursor::KeywordRetrieved(progress.position),
    };
    let note = if progress.requests == 0 {
        String::new()
    } else if progress.full {
        format!("Found enough results in {} requests", progress.requests)
    } else {
        format!("Did {} requests, still not enough results", progress.requests)
    };
    debug!(start, position = progress.position, done = progress.done, requests = progress.requests, "incremental step");
    Ok(CombinedPage {
        distances: pick_distances(&progress.ids, &progress.distances),
        ids: progress.ids,
        count: emitted,
        note,
        continuation: Some(Continuation {
            cursor: Some(cursor),
            no_more_results: progress.done,
            emitted,
            query_fingerprint: previous.query_fingerprint,
            snapshot,
        }),
    })
}

/// Walks similarity order from `start`, confirming blocks against the keyword index.
async fn similarity_drives<K: KeywordIndex, S: SimilarityIndex>(sources: &Sources<'_, K, S>, start: usize) -> Result<Progress> {
    let cfg = &sources.config.incremental;
    let fetched = sources.drain_similarity(start, cfg.similarity_page_size, cfg.max_similarity_pages).await?;
    if fetched.ids.is_empty() {
        return Ok(Progress { ids: vec![], distances: HashMap::new(), position: start, done: true, requests: 0, full: false });
    }

    let mut combiner = ResultCombiner::new(sources.query.page_size);
    let mut checked = 0;
    let mut requests = 0;
    for block in fetched.ids.chunks(cfg.probe_block_size).take(cfg.max_probe_blocks) {
        let hits = sources.probe(Side::Keyword, block).await?;
        requests += 1;
        checked += combiner.offer(block, &hits.ids.into_iter().collect());
        if combiner.is_full() {
            break;
        }
    }
    let position = start + checked;
    Ok(Progress {
        full: combiner.is_full(),
        ids: combiner.into_ids(),
        distances: fetched.distances,
        done: checked == fetched.ids.len() && position >= fetched.total,
        position,
        requests,
    })
}

/// Walks keyword order from `start`, keeping what the fully drained similarity set contains.
async fn keyword_drives<K: KeywordIndex, S: SimilarityIndex>(sources: &Sources<'_, K, S>, start: usize) -> Result<Progress> {
    let cfg = &sources.config.incremental;
    let similarity = sources.drain_similarity(0, cfg.similarity_page_size, cfg.max_similarity_pages).await?;
    if similarity.ids.is_empty() {
        return Ok(Progress { ids: vec![], distances: HashMap::new(), position: start, done: true, requests: 0, full: false });
    }
    let confirmed = similarity.id_set();

    let mut combiner = ResultCombiner::new(sources.query.page_size);
    let mut position = start;
    let mut requests = 0;
    let mut done = false;
    while requests < cfg.max_keyword_requests && !combiner.is_full() {
        let page = sources.keyword_page(position, cfg.keyword_page_size).await?;
        requests += 1;
        position += combiner.offer(&page.ids, &confirmed);
        if page.ids.is_empty() || position >= page.total {
            done = true;
            break;
        }
    }
    Ok(Progress { full: combiner.is_full(), ids: combiner.into_ids(), distances: similarity.distances, position, done, requests })
}
