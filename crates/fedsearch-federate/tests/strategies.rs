use std::collections::{BTreeMap, HashSet};

use fedsearch_core::config::{FederationConfig, FilterBothConfig, FullMergeConfig, IncrementalConfig, Strategy};
use fedsearch_core::fixed::{FixedKeywordIndex, FixedSimilarityIndex};
use fedsearch_core::{CombinedPage, Continuation, Cursor, DocId, Error, KeywordQuery, SearchQuery, SimilarityQuery, SimilarityTarget};
use fedsearch_federate::Federator;

type Fixed = Federator<FixedKeywordIndex, FixedSimilarityIndex>;

fn federator(keyword: FixedKeywordIndex, similarity: FixedSimilarityIndex, config: FederationConfig) -> Fixed {
    Federator::new(keyword, similarity, config).expect("valid config")
}

fn with_strategy(strategy: Strategy) -> FederationConfig {
    FederationConfig { strategy, ..FederationConfig::default() }
}

/// Keyword text plus a similarity target: the similarity index drives.
fn targeted() -> SearchQuery {
    SearchQuery::new(
        KeywordQuery { text: Some("rain".into()), filter: None },
        SimilarityQuery { target: Some(SimilarityTarget::Document(99)), filter: None },
    )
}

/// Keyword text plus a similarity filter only: the keyword index drives.
fn filtered() -> SearchQuery {
    SearchQuery::new(
        KeywordQuery { text: Some("rain".into()), filter: None },
        SimilarityQuery { target: None, filter: Some("category = '/field'".into()) },
    )
}

/// Follows continuations until the result list is exhausted, passing each
/// one through its transport form.
async fn walk(fed: &Fixed, query: &SearchQuery) -> Vec<DocId> {
    let mut all = Vec::new();
    let mut token: Option<String> = None;
    for _ in 0..100 {
        let page = fed.search_encoded(query, token.as_deref()).await.expect("page");
        assert!(page.ids.len() <= query.page_size);
        all.extend(page.ids);
        let continuation = page.continuation.expect("incremental pages carry a continuation");
        if continuation.no_more_results {
            return all;
        }
        token = Some(continuation.encode());
    }
    panic!("continuations never reached the end");
}

#[tokio::test]
async fn similarity_primary_keeps_distance_order() {
    for strategy in [Strategy::FullMerge, Strategy::FilterBoth, Strategy::Incremental] {
        let fed = federator(
            FixedKeywordIndex::new(vec![1, 2, 3, 4, 5]),
            FixedSimilarityIndex::new(vec![(4, 0.3), (2, 0.1), (6, 0.9)]),
            with_strategy(strategy),
        );
        let page = fed.search(&targeted(), None).await.unwrap();
        assert_eq!(page.ids, vec![4, 2], "{strategy}");
        assert_eq!(page.count, 2, "{strategy}");
        assert_eq!(page.distances, BTreeMap::from([(2, 0.1), (4, 0.3)]), "{strategy}");
    }
}

#[tokio::test]
async fn empty_similarity_side_makes_no_keyword_calls() {
    for query in [targeted(), filtered()] {
        let fed = federator(FixedKeywordIndex::new(vec![1, 2, 3]), FixedSimilarityIndex::ranked(&[]), FederationConfig::default());
        let page = fed.search(&query, None).await.unwrap();
        assert!(page.ids.is_empty());
        assert_eq!(page.count, 0);
        assert_eq!(page.note, "");
        assert!(page.continuation.as_ref().is_some_and(|c| c.no_more_results));
        assert_eq!(fed.keyword().calls(), 0);
        assert!(!page.has_more(1, 15));
    }
}

#[tokio::test]
async fn probe_budget_bounds_one_call() {
    let config = FederationConfig {
        incremental: IncrementalConfig { probe_block_size: 2, max_probe_blocks: 2, ..IncrementalConfig::default() },
        ..FederationConfig::default()
    };
    let fed = federator(FixedKeywordIndex::new(vec![100, 101]), FixedSimilarityIndex::ranked(&[1, 2, 3, 4, 5]), config);
    let query = targeted().with_page(1, 10);

    let page = fed.search(&query, None).await.unwrap();
    assert!(page.ids.is_empty());
    let continuation = page.continuation.clone().unwrap();
    assert_eq!(continuation.cursor, Some(Cursor::SimilarityChecked(4)));
    assert!(!continuation.no_more_results);
    assert_eq!(page.note, "Did 2 requests, still not enough results");
    assert_eq!(fed.keyword().calls(), 2);
    assert_eq!(fed.keyword().largest_restriction(), 2);
    assert!(page.has_more(1, 10));

    let page = fed.search(&query, Some(&continuation)).await.unwrap();
    let continuation = page.continuation.unwrap();
    assert_eq!(continuation.cursor, Some(Cursor::SimilarityChecked(5)));
    assert!(continuation.no_more_results);
}

#[tokio::test]
async fn page_fills_before_budget_runs_out() {
    let config = FederationConfig {
        incremental: IncrementalConfig { probe_block_size: 2, max_probe_blocks: 5, ..IncrementalConfig::default() },
        ..FederationConfig::default()
    };
    let fed = federator(FixedKeywordIndex::new(vec![1, 2, 3, 4, 5, 6]), FixedSimilarityIndex::ranked(&[6, 5, 4, 3, 2, 1]), config);
    let page = fed.search(&targeted().with_page(1, 3), None).await.unwrap();
    assert_eq!(page.ids, vec![6, 5, 4]);
    assert_eq!(page.note, "Found enough results in 2 requests");
    let continuation = page.continuation.unwrap();
    assert_eq!(continuation.cursor, Some(Cursor::SimilarityChecked(3)), "only examined ids are consumed");
    assert_eq!(continuation.emitted, 3);
}

fn evens_desc() -> FixedKeywordIndex { FixedKeywordIndex::new((1..=20).rev().map(|i| i * 2).collect()) }

fn not_threes() -> FixedSimilarityIndex {
    FixedSimilarityIndex::ranked(&(1..=40).filter(|i| i % 3 != 0).collect::<Vec<DocId>>())
}

fn small_budgets(strategy: Strategy) -> FederationConfig {
    FederationConfig {
        strategy,
        incremental: IncrementalConfig {
            probe_block_size: 4,
            max_probe_blocks: 2,
            keyword_page_size: 5,
            max_keyword_requests: 2,
            ..IncrementalConfig::default()
        },
        ..FederationConfig::default()
    }
}

#[tokio::test]
async fn incremental_pages_concatenate_to_full_merge() {
    for query in [targeted(), filtered()] {
        let full = federator(evens_desc(), not_threes(), small_budgets(Strategy::FullMerge));
        let expected = full.search(&query.clone().with_page(1, 150), None).await.unwrap();
        assert_eq!(expected.count, 14);
        assert!(expected.note.is_empty(), "nothing truncated: {}", expected.note);

        let incremental = federator(evens_desc(), not_threes(), small_budgets(Strategy::Incremental));
        let walked = walk(&incremental, &query.clone().with_page(1, 3)).await;
        assert_eq!(walked, expected.ids);
        let unique: HashSet<DocId> = walked.iter().copied().collect();
        assert_eq!(unique.len(), walked.len(), "no id repeats across pages");
    }
}

#[tokio::test]
async fn keyword_primary_orders_by_keyword_index() {
    let fed = federator(evens_desc(), not_threes(), small_budgets(Strategy::Incremental));
    let page = fed.search(&filtered().with_page(1, 4), None).await.unwrap();
    assert_eq!(page.ids, vec![40, 38, 34, 32]);
    assert!(page.distances.is_empty(), "no target, no distances");
    let continuation = page.continuation.unwrap();
    assert_eq!(continuation.cursor, Some(Cursor::KeywordRetrieved(5)));
    assert_eq!(fed.similarity().calls(), 1, "similarity set drained once");
}

#[tokio::test]
async fn same_request_gives_same_answer() {
    let fed = federator(evens_desc(), not_threes(), small_budgets(Strategy::Incremental));
    let query = targeted().with_page(1, 3);
    let first = fed.search(&query, None).await.unwrap();
    let continuation = first.continuation.clone().unwrap();
    let a = fed.search(&query, Some(&continuation)).await.unwrap();
    let b = fed.search(&query, Some(&continuation)).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(
        a.continuation.as_ref().map(Continuation::encode),
        b.continuation.as_ref().map(Continuation::encode)
    );
    assert_ne!(a.ids, first.ids);
}

#[tokio::test]
async fn disjoint_indices_combine_to_nothing() {
    for strategy in [Strategy::FullMerge, Strategy::FilterBoth, Strategy::Incremental] {
        for query in [targeted(), filtered()] {
            let fed = federator(FixedKeywordIndex::new(vec![1, 2, 3]), FixedSimilarityIndex::ranked(&[7, 8, 9]), with_strategy(strategy));
            let page = fed.search(&query, None).await.unwrap();
            assert!(page.ids.is_empty(), "{strategy}");
            assert_eq!(page.count, 0, "{strategy}");
        }
    }
}

#[tokio::test]
async fn stale_or_foreign_continuations_are_rejected() {
    let fed = federator(evens_desc(), not_threes().versioned(7), small_budgets(Strategy::Incremental));
    let query = targeted().with_page(1, 3);
    let continuation = fed.search(&query, None).await.unwrap().continuation.unwrap();
    assert_eq!(continuation.snapshot, Some(7));

    let other = SearchQuery::new(KeywordQuery { text: Some("thunder".into()), filter: None }, query.similarity.clone());
    let err = fed.search(&other, Some(&continuation)).await.unwrap_err();
    assert!(matches!(err, Error::BadInput(_)), "got {err:?}");

    let wrong_kind = Continuation { cursor: Some(Cursor::KeywordRetrieved(2)), ..continuation.clone() };
    let err = fed.search(&query, Some(&wrong_kind)).await.unwrap_err();
    assert!(matches!(err, Error::BadInput(_)), "got {err:?}");

    let err = fed.search_encoded(&query, Some("checked=x")).await.unwrap_err();
    assert!(matches!(err, Error::BadInput(_)), "got {err:?}");

    let err = fed.search_encoded(&query, Some("checked=0")).await.unwrap_err();
    assert!(matches!(err, Error::BadInput(_)), "a token without a query digest is foreign, got {err:?}");
    let fresh = fed.search_encoded(&query, Some("")).await.unwrap();
    assert_eq!(fresh.continuation.unwrap().snapshot, Some(7), "an empty token starts over");

    fed.similarity().set_version(8);
    let err = fed.search(&query, Some(&continuation)).await.unwrap_err();
    assert!(matches!(err, Error::BadInput(_)), "got {err:?}");
}

#[tokio::test]
async fn result_count_overflow_in_continuation_is_rejected() {
    let fed = federator(evens_desc(), not_threes(), small_budgets(Strategy::Incremental));
    let query = targeted().with_page(1, 3);
    let forged = Continuation { emitted: usize::MAX, ..Continuation::for_query(&query) };
    let err = fed.search_encoded(&query, Some(&forged.encode())).await.unwrap_err();
    assert!(matches!(err, Error::BadInput(_)), "got {err:?}");
}

#[tokio::test]
async fn index_errors_pass_through_unchanged() {
    let fed = federator(FixedKeywordIndex::failing(Error::upstream("keyword index down")), not_threes(), FederationConfig::default());
    let err = fed.search(&targeted(), None).await.unwrap_err();
    assert_eq!(err, Error::upstream("keyword index down"));

    for strategy in [Strategy::FullMerge, Strategy::FilterBoth, Strategy::Incremental] {
        let fed = federator(evens_desc(), FixedSimilarityIndex::failing(Error::not_found("no such target")), with_strategy(strategy));
        let err = fed.search(&targeted(), None).await.unwrap_err();
        assert_eq!(err, Error::not_found("no such target"), "{strategy}");
    }
}

#[tokio::test]
async fn filter_both_fetches_enumerable_similarity_once() {
    let fed = federator(
        FixedKeywordIndex::new((1..=10).collect()),
        FixedSimilarityIndex::ranked(&[10, 8, 6, 4, 2]),
        with_strategy(Strategy::FilterBoth),
    );
    let page = fed.search(&filtered(), None).await.unwrap();
    assert_eq!(page.ids, vec![2, 4, 6, 8, 10]);
    assert_eq!(page.count, 5);
    assert_eq!(fed.similarity().calls(), 1);
    assert_eq!(fed.similarity().restricted_calls(), 0);
}

#[tokio::test]
async fn filter_both_probes_in_blocks_within_budget() {
    let config = FederationConfig {
        strategy: Strategy::FilterBoth,
        filter_both: FilterBothConfig {
            similarity_enumerable: false,
            similarity_block_size: 3,
            max_similarity_blocks: 2,
            ..FilterBothConfig::default()
        },
        ..FederationConfig::default()
    };
    let fed = federator(FixedKeywordIndex::new((1..=10).collect()), FixedSimilarityIndex::ranked(&[10, 8, 6, 4, 2]), config);
    let page = fed.search(&filtered(), None).await.unwrap();
    assert_eq!(page.ids, vec![2, 4, 6]);
    assert_eq!(page.count, 3);
    assert_eq!(page.note, "checked 6 of 10 primary results");
    assert_eq!(fed.similarity().restricted_calls(), 2);
    assert_eq!(fed.similarity().largest_restriction(), 3);
    assert!(page.continuation.is_none());
}

#[tokio::test]
async fn full_merge_pages_by_number_and_reports_truncation() {
    let config = FederationConfig {
        strategy: Strategy::FullMerge,
        full_merge: FullMergeConfig { keyword_page_size: 2, max_keyword_pages: 1, ..FullMergeConfig::default() },
        ..FederationConfig::default()
    };
    let fed = federator(FixedKeywordIndex::new(vec![1, 2, 3, 4]), FixedSimilarityIndex::ranked(&[4, 3, 2, 1]), config);
    let page = fed.search(&filtered(), None).await.unwrap();
    assert_eq!(page.ids, vec![1, 2]);
    assert_eq!(page.note, "keyword results truncated at 2 of 4");

    let fed = federator(evens_desc(), not_threes(), with_strategy(Strategy::FullMerge));
    let second = fed.search(&targeted().with_page(2, 5), None).await.unwrap();
    assert_eq!(second.ids, vec![16, 20, 22, 26, 28]);
    assert_eq!(second.count, 14);
    assert!(second.has_more(2, 5));
    let third = fed.search(&targeted().with_page(3, 5), None).await.unwrap();
    assert_eq!(third.ids, vec![32, 34, 38, 40]);
    assert!(!third.has_more(3, 5));
}

#[tokio::test]
async fn single_sided_queries_bypass_federation() {
    let fed = federator(FixedKeywordIndex::new((1..=10).collect()), FixedSimilarityIndex::new(vec![(3, 0.5), (1, 0.7)]), FederationConfig::default());

    let page = fed.search(&SearchQuery::new(KeywordQuery::default(), SimilarityQuery::default()), None).await.unwrap();
    assert_eq!(page, CombinedPage::empty());
    assert_eq!(fed.keyword().calls() + fed.similarity().calls(), 0);

    let keyword_only = SearchQuery::new(KeywordQuery { text: Some("rain".into()), filter: None }, SimilarityQuery::default()).with_page(2, 3);
    let page = fed.search(&keyword_only, None).await.unwrap();
    assert_eq!(page.ids, vec![4, 5, 6]);
    assert_eq!(page.count, 10);
    assert!(page.continuation.is_none());
    assert_eq!(fed.similarity().calls(), 0);

    let similar_only = SearchQuery::new(KeywordQuery::default(), SimilarityQuery { target: Some(SimilarityTarget::Vector(vec![0.0])), filter: None });
    let page = fed.search(&similar_only, None).await.unwrap();
    assert_eq!(page.ids, vec![3, 1]);
    assert_eq!(page.distances, BTreeMap::from([(1, 0.7), (3, 0.5)]));
    assert_eq!(fed.keyword().calls(), 1);
}

#[tokio::test]
async fn request_validation() {
    let fed = federator(evens_desc(), not_threes(), FederationConfig::default());
    let err = fed.search(&targeted().with_page(0, 15), None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
    let keyword_only = SearchQuery::new(KeywordQuery { text: Some("rain".into()), filter: None }, SimilarityQuery::default());
    for query in [keyword_only, filtered()] {
        let err = fed.search(&query.with_page(usize::MAX / 10, 150), None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "unaddressable page, got {err:?}");
    }
    for size in [0, 151] {
        let err = fed.search(&targeted().with_page(1, size), None).await.unwrap_err();
        assert!(matches!(err, Error::BadInput(_)), "got {err:?}");
    }

    let mut broken = FederationConfig::default();
    broken.incremental.probe_block_size = 0;
    let err = fed.search(&targeted().with_tuning(broken), None).await.unwrap_err();
    assert!(matches!(err, Error::BadInput(_)), "got {err:?}");
    assert!(Federator::new(evens_desc(), not_threes(), FederationConfig { max_restrict_ids: 10, ..FederationConfig::default() }).is_err());
}

#[tokio::test]
async fn per_request_tuning_switches_strategy() {
    let fed = federator(evens_desc(), not_threes(), FederationConfig::default());
    let tuned = fed.config().with_overrides([("strategy", "full_merge")]).unwrap();
    let page = fed.search(&targeted().with_tuning(tuned), None).await.unwrap();
    assert!(page.continuation.is_none());
    assert_eq!(page.count, 14);

    let page = fed.search(&targeted(), None).await.unwrap();
    assert!(page.continuation.is_some(), "configured strategy is incremental");
}
