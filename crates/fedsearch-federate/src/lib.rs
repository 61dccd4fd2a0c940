//! Federation of a keyword index and a similarity index into one paged
//! result list.

pub mod combiner;
pub mod federator;
pub mod roles;
mod sources;
mod strategy;

pub use combiner::ResultCombiner;
pub use federator::Federator;
pub use roles::{Roles, Side};
