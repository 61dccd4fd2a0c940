//! The three ways of combining the two indices for one page request.
//!
//! `full_merge` and `filter_both` are page-numbered and rebuild everything on
//! each request; `incremental` resumes from a client-held continuation.

pub(crate) mod filter_both;
pub(crate) mod full_merge;
pub(crate) mod incremental;
