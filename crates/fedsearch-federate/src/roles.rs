use std::fmt;

use fedsearch_core::SearchQuery;

/// One of the two federated indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Keyword,
    Similarity,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Keyword => Side::Similarity,
            Side::Similarity => Side::Keyword,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Keyword => "keyword",
            Side::Similarity => "similarity",
        })
    }
}

/// Which index orders the combined output (`primary`) and which only filters it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roles {
    pub primary: Side,
    pub secondary: Side,
}

impl Roles {
    /// A similarity target makes the similarity index primary; otherwise the keyword index is.
    pub fn for_query(query: &SearchQuery) -> Self {
        let primary = if query.has_target() { Side::Similarity } else { Side::Keyword };
        Self { primary, secondary: primary.other() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedsearch_core::{KeywordQuery, SimilarityQuery, SimilarityTarget};

    #[test]
    fn target_decides_primary() {
        let keyword = KeywordQuery { text: Some("rain".into()), filter: None };
        let query = SearchQuery::new(keyword.clone(), SimilarityQuery { target: None, filter: Some("category = '/a'".into()) });
        assert_eq!(Roles::for_query(&query), Roles { primary: Side::Keyword, secondary: Side::Similarity });

        let query = SearchQuery::new(keyword, SimilarityQuery { target: Some(SimilarityTarget::Document(3)), filter: None });
        assert_eq!(Roles::for_query(&query), Roles { primary: Side::Similarity, secondary: Side::Keyword });
    }
}
