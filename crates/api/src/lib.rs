//! HTTP/GraphQL clients for external services.
//!
//! - `subgraph`: borrower enumeration via a GraphQL subgraph, used by the
//!   Tracker's bootstrap step (spec §4.4, §6).

mod subgraph;

pub use subgraph::{SubgraphClient, PAGE_SIZE};
