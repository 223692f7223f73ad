use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::estimator::{check_precision, hll, CounterKind, DEFAULT_PRECISION};
use crate::reduce::{ReduceContext, ReduceMode};
use crate::store::CounterStore;

fn default_precision() -> u8 {
    DEFAULT_PRECISION
}

fn default_kind() -> CounterKind {
    CounterKind::Exact
}

/// CardinalityConfig holds the settings every shard and the coordinator of
/// one aggregation must agree on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardinalityConfig {
    #[serde(default = "default_kind")]
    pub kind: CounterKind,
    #[serde(default = "default_precision")]
    pub precision: u8,
    #[serde(default)]
    pub reduce: ReduceMode,
}

impl Default for CardinalityConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            precision: default_precision(),
            reduce: ReduceMode::default(),
        }
    }
}

impl CardinalityConfig {
    pub fn validate(&self) -> Result<()> {
        check_precision(self.precision)?;
        Ok(())
    }

    /// build_store returns an empty store of the configured kind and precision.
    pub fn build_store(&self) -> Result<CounterStore> {
        CounterStore::new(self.kind, self.precision)
    }

    pub fn reduce_context(&self) -> ReduceContext {
        ReduceContext::new(self.reduce)
    }

    /// relative_error returns the expected relative standard error of the
    /// estimate, 0 for exact counting.
    pub fn relative_error(&self) -> f64 {
        match self.kind {
            CounterKind::Exact => 0.0,
            CounterKind::HyperLogLog => hll::relative_error(self.precision),
        }
    }
}
