//! Caching strategies and their executor

mod executor;
mod snapshot;
mod strategy;

pub use executor::StrategyExecutor;
pub use snapshot::{from_snapshot, to_snapshot};
pub use strategy::{PartitionKind, Strategy, is_cacheable};
