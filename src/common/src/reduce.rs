//! Reduce folds the partial results that every shard produced for one
//! logical aggregation into a single result.
//!
//! The reduce is a pure in-memory fold. Inputs are consumed; a merge error
//! on any input aborts the whole reduction, since dropping a shard would
//! understate the count.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CardinalityError, Result};
use crate::result::CardinalityResult;
use crate::store::CounterStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReduceMode {
    /// Fold inputs into one accumulator in list order.
    #[default]
    Linear,
    /// Merge inputs pairwise, level by level.
    Tree,
}

#[derive(Debug, Clone, Default)]
pub struct ReduceContext {
    pub mode: ReduceMode,
}

impl ReduceContext {
    pub fn new(mode: ReduceMode) -> Self {
        Self { mode }
    }
}

/// ReduceState tracks the linear fold. The accumulator only exists once an
/// input with counts has been seen, so an all-empty reduce allocates no
/// counter.
enum ReduceState {
    Scanning,
    Accumulating(CounterStore),
}

impl ReduceState {
    fn fold(self, counts: &CounterStore) -> Result<Self> {
        let mut acc = match self {
            Self::Scanning => {
                debug!(
                    kind = %counts.kind(),
                    precision = counts.precision(),
                    "create reduce accumulator"
                );
                CounterStore::with_capacity(counts.kind(), counts.precision(), 1)?
            }
            Self::Accumulating(acc) => acc,
        };
        acc.merge(0, counts, 0)?;
        Ok(Self::Accumulating(acc))
    }
}

/// reduce merges `results`, all carrying the same aggregation name, into one
/// result named after the first input and using its formatter.
///
/// A single input, or a list where no input holds counts, returns the first
/// input unchanged.
pub fn reduce(results: Vec<CardinalityResult>, ctx: &ReduceContext) -> Result<CardinalityResult> {
    let inputs = results.len();
    let mut it = results.into_iter();
    let first = it.next().ok_or(CardinalityError::EmptyReduce)?;
    if inputs == 1 {
        return Ok(first);
    }

    let reduced = match ctx.mode {
        ReduceMode::Linear => reduce_linear(first, it)?,
        ReduceMode::Tree => reduce_tree(first, it)?,
    };
    debug!(
        name = reduced.name(),
        inputs,
        mode = ?ctx.mode,
        value = reduced.value(),
        "reduced cardinality"
    );
    Ok(reduced)
}

fn reduce_linear(
    first: CardinalityResult,
    rest: impl Iterator<Item = CardinalityResult>,
) -> Result<CardinalityResult> {
    let mut state = ReduceState::Scanning;
    if let Some(counts) = first.counts() {
        state = state.fold(counts)?;
    }
    for r in rest {
        if let Some(counts) = r.counts() {
            state = state.fold(counts)?;
        }
    }

    Ok(match state {
        ReduceState::Scanning => first,
        ReduceState::Accumulating(acc) => {
            let (name, _, formatter) = first.into_parts();
            CardinalityResult::new(name, Some(acc), formatter)
        }
    })
}

fn reduce_tree(
    first: CardinalityResult,
    rest: impl Iterator<Item = CardinalityResult>,
) -> Result<CardinalityResult> {
    let (name, first_counts, formatter) = first.into_parts();

    // inputs are checked in list order, like the linear fold, so both modes
    // fail on the same input with the same error
    let mut level: Vec<CounterStore> = Vec::new();
    for counts in first_counts
        .into_iter()
        .chain(rest.filter_map(|r| r.into_parts().1))
    {
        if let Some(base) = level.first() {
            base.check_compatible(&counts)?;
        }
        level.push(counts.extract(0)?);
    }

    if level.is_empty() {
        return Ok(CardinalityResult::empty(name, formatter));
    }

    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        let mut pairs = level.into_iter();
        while let Some(mut left) = pairs.next() {
            if let Some(right) = pairs.next() {
                left.merge(0, &right, 0)?;
            }
            next.push(left);
        }
        level = next;
    }

    let root = level.swap_remove(0);
    Ok(CardinalityResult::new(name, Some(root), formatter))
}
