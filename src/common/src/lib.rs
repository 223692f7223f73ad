//! Mergeable distinct-count state for sharded aggregations.
//!
//! Shards collect hashed values into a [`store::CounterStore`], one counter
//! per bucket ordinal, wrap bucket 0 in a [`result::CardinalityResult`] and
//! stream it to the coordinator, which folds all partial results with
//! [`reduce::reduce`].

pub mod codec;
pub mod collector;
pub mod config;
pub mod error;
pub mod estimator;
pub mod format;
pub mod reduce;
pub mod result;
pub mod store;

pub use collector::CardinalityCollector;
pub use config::CardinalityConfig;
pub use error::{CardinalityError, Result};
pub use estimator::{Counter, CounterKind};
pub use format::ValueFormatter;
pub use reduce::{reduce, ReduceContext, ReduceMode};
pub use result::{CardinalityResult, CardinalityValue};
pub use store::{BucketedCounters, CounterStore};
