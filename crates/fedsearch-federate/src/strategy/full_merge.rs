use futures::try_join;

use fedsearch_core::{CombinedPage, KeywordIndex, Result, SimilarityIndex};

use crate::combiner::{intersect, pick_distances};
use crate::roles::{Roles, Side};
use crate::sources::Sources;

/// Drains both indices independently and intersects the two lists.
///
/// `count` is exact whenever neither drain hit its page cap; the note says
/// which side was cut short otherwise.
pub(crate) async fn run<K: KeywordIndex, S: SimilarityIndex>(sources: &Sources<'_, K, S>, roles: Roles) -> Result<CombinedPage> {
    let cfg = &sources.config.full_merge;
    let (keyword, similarity) = try_join!(
        sources.drain_keyword(cfg.keyword_page_size, cfg.max_keyword_pages),
        sources.drain_similarity(0, cfg.similarity_page_size, cfg.max_similarity_pages)
    )?;
    let (primary, secondary) = match roles.primary {
        Side::Keyword => (&keyword, &similarity),
        Side::Similarity => (&similarity, &keyword),
    };
    let matched = intersect(&primary.ids, &secondary.id_set());
    let query = sources.query;
    let ids: Vec<_> = matched.iter().skip(query.page_offset()).take(query.page_size).copied().collect();

    let mut truncated = Vec::new();
    if keyword.truncated(0) {
        truncated.push(format!("keyword results truncated at {} of {}", keyword.ids.len(), keyword.total));
    }
    if similarity.truncated(0) {
        truncated.push(format!("similarity results truncated at {} of {}", similarity.ids.len(), similarity.total));
    }
    Ok(CombinedPage {
        distances: pick_distances(&ids, &similarity.distances),
        ids,
        count: matched.len(),
        note: truncated.join("; "),
        continuation: None,
    })
}
