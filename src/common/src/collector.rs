//! Shard-side collection: hashes raw values into per-bucket counters and
//! builds the partial result of one bucket.

use cardinality_utils::hash_key;

use crate::config::CardinalityConfig;
use crate::error::Result;
use crate::format::ValueFormatter;
use crate::result::CardinalityResult;
use crate::store::CounterStore;

pub struct CardinalityCollector {
    name: String,
    formatter: Option<ValueFormatter>,
    counts: CounterStore,
}

impl CardinalityCollector {
    pub fn new(
        name: impl Into<String>,
        config: &CardinalityConfig,
        formatter: Option<ValueFormatter>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            formatter,
            counts: config.build_store()?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn counts(&self) -> &CounterStore {
        &self.counts
    }

    pub fn collect(&mut self, ordinal: usize, value: &[u8]) -> Result<()> {
        self.collect_hash(ordinal, hash_key(value))
    }

    pub fn collect_hash(&mut self, ordinal: usize, hash: u64) -> Result<()> {
        self.counts.record_value(ordinal, hash)
    }

    /// build_result returns the partial result of bucket `ordinal`. A bucket
    /// that never collected a value yields the empty result.
    pub fn build_result(&self, ordinal: usize) -> Result<CardinalityResult> {
        if ordinal >= self.counts.capacity() || self.counts.is_empty(ordinal)? {
            return Ok(self.build_empty_result());
        }
        Ok(CardinalityResult::new(
            self.name.clone(),
            Some(self.counts.extract(ordinal)?),
            self.formatter.clone(),
        ))
    }

    pub fn build_empty_result(&self) -> CardinalityResult {
        CardinalityResult::empty(self.name.clone(), self.formatter.clone())
    }
}
