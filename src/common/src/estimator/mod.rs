use std::fmt::{self, Debug, Display, Formatter};

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{CardinalityError, Result};

pub mod exact;
pub mod hll;

pub const MIN_PRECISION: u8 = 4;
pub const MAX_PRECISION: u8 = 18;

/// DEFAULT_PRECISION is the default precision.
pub const DEFAULT_PRECISION: u8 = 14;

/// CounterKind selects the counter implementation backing a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    Exact,
    HyperLogLog,
}

impl CounterKind {
    /// The stream tag written ahead of a store's counter bytes.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Exact => 1,
            Self::HyperLogLog => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Self::Exact),
            2 => Ok(Self::HyperLogLog),
            _ => Err(CardinalityError::decoding(format!(
                "unknown counter kind tag {}",
                tag
            ))),
        }
    }
}

impl Display for CounterKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => f.write_str("exact"),
            Self::HyperLogLog => f.write_str("hyperloglog"),
        }
    }
}

impl std::str::FromStr for CounterKind {
    type Err = CardinalityError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact" => Ok(Self::Exact),
            "hyperloglog" | "hll" => Ok(Self::HyperLogLog),
            _ => Err(CardinalityError::InvalidParameter(format!(
                "unknown counter kind {:?}",
                s
            ))),
        }
    }
}

pub(crate) fn check_precision(p: u8) -> Result<u8> {
    if !(MIN_PRECISION..=MAX_PRECISION).contains(&p) {
        return Err(CardinalityError::InvalidParameter(format!(
            "precision must be between {} and {}, got {}",
            MIN_PRECISION, MAX_PRECISION, p
        )));
    }
    Ok(p)
}

/// Counter is the interface representing the distinct-count state of a
/// single bucket.
pub trait Counter: Clone + Debug + Send + Sync + Sized {
    const KIND: CounterKind;

    fn with_precision(p: u8) -> Result<Self>;

    fn precision(&self) -> u8;

    /// add_hash adds a single hashed value to the counter.
    fn add_hash(&mut self, hash: u64);

    /// count returns a cardinality estimate for the counter.
    fn count(&self) -> u64;

    /// merge merges another counter into this one. The merge is associative
    /// and commutative.
    fn merge(&mut self, other: &Self) -> Result<()>;

    fn is_empty(&self) -> bool;

    /// bytes estimates the memory footprint of the counter, in bytes.
    fn bytes(&self) -> usize;

    fn encode<B: BufMut>(&self, buf: &mut B);

    /// decode reads a counter written by `encode` for a store of precision `p`.
    fn decode<B: Buf>(p: u8, buf: &mut B) -> Result<Self>;
}
