//! Intersection of a primary result order with a secondary membership set.
//!
//! This is the only place the combined ordering is decided: the primary
//! index's order is kept as-is, never re-sorted.

use std::collections::{BTreeMap, HashMap, HashSet};

use fedsearch_core::DocId;

/// Filters `primary` to members of `secondary`, keeping `primary` order and
/// dropping repeats, then returns the `[offset, offset + page_size)` slice.
pub fn combine(primary: &[DocId], secondary: &HashSet<DocId>, offset: usize, page_size: usize) -> Vec<DocId> {
    intersect(primary, secondary).into_iter().skip(offset).take(page_size).collect()
}

/// All of `primary` that is in `secondary`, in `primary` order, without repeats.
pub fn intersect(primary: &[DocId], secondary: &HashSet<DocId>) -> Vec<DocId> {
    let mut seen = HashSet::with_capacity(primary.len().min(secondary.len()));
    primary
        .iter()
        .filter(|id| secondary.contains(id) && seen.insert(**id))
        .copied()
        .collect()
}

/// Distances of `ids` that the similarity index reported.
pub fn pick_distances(ids: &[DocId], distances: &HashMap<DocId, f32>) -> BTreeMap<DocId, f32> {
    ids.iter().filter_map(|id| distances.get(id).map(|d| (*id, *d))).collect()
}

/// Page under construction for the incremental strategy.
///
/// Candidates are offered one by one in primary order; the combiner keeps
/// those the secondary index confirmed until the page is full.
#[derive(Debug)]
pub struct ResultCombiner {
    ids: Vec<DocId>,
    seen: HashSet<DocId>,
    page_size: usize,
}

impl ResultCombiner {
    pub fn new(page_size: usize) -> Self {
        Self { ids: Vec::with_capacity(page_size), seen: HashSet::new(), page_size }
    }

    pub fn is_full(&self) -> bool { self.ids.len() >= self.page_size }

    pub fn len(&self) -> usize { self.ids.len() }

    pub fn is_empty(&self) -> bool { self.ids.is_empty() }

    /// Walks `candidates` in order, keeping those in `confirmed`.
    ///
    /// Returns how many candidates were examined: all of them, or fewer when
    /// the page filled up part way through.
    pub fn offer(&mut self, candidates: &[DocId], confirmed: &HashSet<DocId>) -> usize {
        let mut examined = 0;
        for id in candidates {
            if self.is_full() {
                break;
            }
            examined += 1;
            if confirmed.contains(id) && self.seen.insert(*id) {
                self.ids.push(*id);
            }
        }
        examined
    }

    pub fn into_ids(self) -> Vec<DocId> { self.ids }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[DocId]) -> HashSet<DocId> { ids.iter().copied().collect() }

    #[test]
    fn combine_keeps_primary_order() {
        assert_eq!(combine(&[4, 2, 6], &set(&[1, 2, 3, 4, 5]), 0, 10), vec![4, 2]);
        assert_eq!(combine(&[1, 2, 3, 4, 5], &set(&[2, 4, 6]), 0, 10), vec![2, 4]);
    }

    #[test]
    fn combine_slices_after_filtering() {
        let primary = [9, 1, 8, 2, 7, 3];
        let secondary = set(&[1, 2, 3, 7]);
        assert_eq!(combine(&primary, &secondary, 0, 2), vec![1, 2]);
        assert_eq!(combine(&primary, &secondary, 2, 2), vec![7, 3]);
        assert!(combine(&primary, &secondary, 4, 2).is_empty());
    }

    #[test]
    fn disjoint_and_repeated() {
        assert!(intersect(&[1, 2], &set(&[3, 4])).is_empty());
        assert_eq!(intersect(&[2, 1, 2, 1], &set(&[1, 2])), vec![2, 1]);
    }

    #[test]
    fn offer_stops_at_page_size() {
        let mut combiner = ResultCombiner::new(2);
        let confirmed = set(&[2, 3, 5]);
        assert_eq!(combiner.offer(&[1, 2], &confirmed), 2);
        assert!(!combiner.is_full());
        assert_eq!(combiner.offer(&[3, 4, 5], &confirmed), 1, "stops right after the id that filled the page");
        assert!(combiner.is_full());
        assert_eq!(combiner.offer(&[6], &confirmed), 0);
        assert_eq!(combiner.into_ids(), vec![2, 3]);
    }

    #[test]
    fn distances_follow_ids() {
        let distances = HashMap::from([(1, 0.5), (2, 0.1)]);
        let picked = pick_distances(&[2, 3], &distances);
        assert_eq!(picked, BTreeMap::from([(2, 0.1)]));
    }
}
