use futures::try_join;
use std::collections::{HashMap, HashSet};

use fedsearch_core::{CombinedPage, DocId, KeywordIndex, Result, SimilarityIndex};

use crate::combiner::{intersect, pick_distances};
use crate::roles::{Roles, Side};
use crate::sources::{Drained, Sources};

/// Drains the primary index and probes the secondary one with blocks of the
/// primary's IDs.
///
/// When the similarity index is secondary and cheap to enumerate it is
/// fetched once instead of probed. Results are exact when every drained ID
/// fits in the probe budget.
pub(crate) async fn run<K: KeywordIndex, S: SimilarityIndex>(sources: &Sources<'_, K, S>, roles: Roles) -> Result<CombinedPage> {
    let cfg = &sources.config.filter_both;
    let (driving, confirmed, checked, distances) = match roles.primary {
        Side::Similarity => {
            let driving = sources.drain_similarity(0, cfg.similarity_page_size, cfg.max_similarity_pages).await?;
            let (confirmed, checked) = probe(sources, Side::Keyword, &driving.ids, cfg.keyword_block_size, cfg.max_keyword_blocks).await?;
            let distances = driving.distances.clone();
            (driving, confirmed, checked, distances)
        }
        Side::Keyword if cfg.similarity_enumerable => {
            let (driving, other) = try_join!(
                sources.drain_keyword(cfg.keyword_page_size, cfg.max_keyword_pages),
                sources.drain_similarity(0, cfg.similarity_page_size, cfg.max_similarity_pages)
            )?;
            let checked = driving.ids.len();
            (driving, other.id_set(), checked, other.distances)
        }
        Side::Keyword => {
            let driving = sources.drain_keyword(cfg.keyword_page_size, cfg.max_keyword_pages).await?;
            let (confirmed, checked) = probe(sources, Side::Similarity, &driving.ids, cfg.similarity_block_size, cfg.max_similarity_blocks).await?;
            (driving, confirmed, checked, HashMap::new())
        }
    };

    let matched = intersect(&driving.ids[..checked], &confirmed);
    let query = sources.query;
    let ids: Vec<DocId> = matched.iter().skip(query.page_offset()).take(query.page_size).copied().collect();
    Ok(CombinedPage {
        distances: pick_distances(&ids, &distances),
        ids,
        count: matched.len(),
        note: coverage_note(&driving, checked),
        continuation: None,
    })
}

/// Probes `side` with up to `max_blocks` blocks of `ids`. Returns the
/// confirmed IDs and how many of `ids` were covered.
async fn probe<K: KeywordIndex, S: SimilarityIndex>(
    sources: &Sources<'_, K, S>,
    side: Side,
    ids: &[DocId],
    block_size: usize,
    max_blocks: usize,
) -> Result<(HashSet<DocId>, usize)> {
    let blocks: Vec<&[DocId]> = ids.chunks(block_size).take(max_blocks).collect();
    let checked = blocks.iter().map(|b| b.len()).sum();
    let pages = sources.probe_blocks(side, &blocks).await?;
    Ok((pages.into_iter().flat_map(|p| p.ids).collect(), checked))
}

fn coverage_note(driving: &Drained, checked: usize) -> String {
    if checked < driving.total {
        format!("checked {} of {} primary results", checked, driving.total)
    } else {
        String::new()
    }
}
