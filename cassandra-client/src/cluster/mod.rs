//! Token-aware routing across the nodes of a cluster.

mod builder;
mod router;
mod token_map;

pub use builder::ClusterBuilder;
pub use router::Cluster;
pub use token_map::TokenRangeMap;
