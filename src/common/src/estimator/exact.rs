//! Exact distinct counting over a set of hashes. Memory grows with the true
//! cardinality; the precision is carried only so stores of both kinds share
//! one compatibility check.

use std::collections::HashSet;
use std::mem;

use bytes::{Buf, BufMut};

use crate::codec::{StreamInput, StreamOutput};
use crate::error::{CardinalityError, Result};
use crate::estimator::{check_precision, Counter, CounterKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactCounter {
    p: u8,
    hashes: HashSet<u64>,
}

impl Counter for ExactCounter {
    const KIND: CounterKind = CounterKind::Exact;

    fn with_precision(p: u8) -> Result<Self> {
        Ok(Self {
            p: check_precision(p)?,
            hashes: HashSet::new(),
        })
    }

    fn precision(&self) -> u8 {
        self.p
    }

    fn add_hash(&mut self, hash: u64) {
        self.hashes.insert(hash);
    }

    fn count(&self) -> u64 {
        self.hashes.len() as u64
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.p != other.p {
            return Err(CardinalityError::IncompatiblePrecision {
                left: self.p,
                right: other.p,
            });
        }
        self.hashes.extend(other.hashes.iter().copied());
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    fn bytes(&self) -> usize {
        self.hashes.capacity() * mem::size_of::<u64>() + mem::size_of::<Self>()
    }

    /// The hashes are written sorted, the first one as is and every other one
    /// as the delta from its predecessor.
    fn encode<B: BufMut>(&self, buf: &mut B) {
        let mut sorted: Vec<u64> = self.hashes.iter().copied().collect();
        sorted.sort_unstable();

        buf.write_vlong(sorted.len() as u64);
        let mut last = 0_u64;
        for h in sorted {
            buf.write_vlong(h - last);
            last = h;
        }
    }

    fn decode<B: Buf>(p: u8, buf: &mut B) -> Result<Self> {
        let p = check_precision(p).map_err(|e| CardinalityError::decoding(e.to_string()))?;

        // every hash takes at least one byte
        let n = buf.read_len(1)?;
        let mut hashes = HashSet::with_capacity(n);
        let mut last = 0_u64;
        for i in 0..n {
            let delta = buf.read_vlong()?;
            if i > 0 && delta == 0 {
                return Err(CardinalityError::decoding("duplicate hash in exact counter"));
            }
            last = last
                .checked_add(delta)
                .ok_or_else(|| CardinalityError::decoding("hash delta overflows u64"))?;
            hashes.insert(last);
        }

        Ok(Self { p, hashes })
    }
}
