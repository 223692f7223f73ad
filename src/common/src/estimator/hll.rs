//! HyperLogLog cardinality estimator.
//!
//! Registers hold the maximum observed rank per substream. The estimate
//! applies the small-range linear counting correction and the large-range
//! correction for a 64-bit hash space.

use std::mem;

use bytes::{Buf, BufMut};

use crate::codec::{StreamInput, StreamOutput};
use crate::error::{CardinalityError, Result};
use crate::estimator::{check_precision, Counter, CounterKind};

const REPR_EMPTY: u8 = 0;
const REPR_DENSE: u8 = 1;
const REPR_SPARSE: u8 = 2;

/// Plus implements the HyperLogLog algorithm over pre-hashed 64-bit values.
///
/// The register array is only allocated once the first hash is added, so an
/// empty bucket costs no heap memory.
#[derive(Debug, Clone)]
pub struct Plus {
    /// precision.
    p: u8,
    /// Number of substream used for stochastic averaging of stream.
    m: u32,
    /// alpha is used for bias correction.
    alpha: f64,

    /// The dense representation of the HLL, empty until first use.
    registers: Vec<u8>,
}

impl Plus {
    /// max_rank is the largest rank a register can hold for precision p.
    fn max_rank(p: u8) -> u8 {
        64 - p + 1
    }

    /// rank returns the position of the first set bit after the index bits,
    /// 1-indexed.
    fn rank(hash: u64, p: u8) -> u8 {
        let suffix = hash << p;
        let rank = suffix.leading_zeros() as u8 + 1;
        rank.min(Self::max_rank(p))
    }

    fn alpha(m: u32) -> f64 {
        match m {
            16 => 0.673,
            32 => 0.697,
            64 => 0.709,
            _ => 0.7213 / (1_f64 + 1.079 / (m as f64)),
        }
    }

    fn estimate(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }

        let m = self.m as f64;
        let harmonic_sum: f64 = self
            .registers
            .iter()
            .map(|&r| 2_f64.powi(-(r as i32)))
            .sum();
        let raw = self.alpha * m * m / harmonic_sum;

        let zeros = self.registers.iter().filter(|&&r| r == 0).count() as f64;

        // Small-range correction (linear counting).
        let corrected = if raw <= 2.5 * m && zeros > 0.0 {
            m * (m / zeros).ln()
        } else {
            raw
        };

        // Large-range correction in 64-bit hash space.
        let two_to_64 = (u64::MAX as f64) + 1.0;
        if corrected > two_to_64 / 30.0 {
            let ratio = (corrected / two_to_64).min(1.0 - f64::EPSILON);
            -two_to_64 * (1.0 - ratio).ln()
        } else {
            corrected
        }
    }

    /// encode_sparse writes the non-zero registers as (index delta, rank)
    /// pairs.
    fn encode_sparse(&self, buf: &mut Vec<u8>) {
        let n = self.registers.iter().filter(|&&r| r != 0).count();
        buf.write_vlong(n as u64);

        let mut last = 0_usize;
        for (i, &r) in self.registers.iter().enumerate() {
            if r == 0 {
                continue;
            }
            buf.write_vlong((i - last) as u64);
            buf.write_byte(r);
            last = i;
        }
    }

    fn decode_sparse<B: Buf>(p: u8, m: usize, buf: &mut B) -> Result<Vec<u8>> {
        let max_rank = Self::max_rank(p);
        // a pair takes at least two bytes
        let n = buf.read_len(2)?;
        if n > m {
            return Err(CardinalityError::decoding(format!(
                "sparse register count {} exceeds {}",
                n, m
            )));
        }

        let mut registers = vec![0_u8; m];
        let mut last = 0_u64;
        for i in 0..n {
            let delta = buf.read_vlong()?;
            if i > 0 && delta == 0 {
                return Err(CardinalityError::decoding("duplicate sparse register"));
            }
            let idx = last.saturating_add(delta);
            if idx >= m as u64 {
                return Err(CardinalityError::decoding(format!(
                    "register index {} out of range",
                    idx
                )));
            }
            let r = buf.read_byte()?;
            if r == 0 || r > max_rank {
                return Err(CardinalityError::decoding(format!("invalid register rank {}", r)));
            }
            registers[idx as usize] = r;
            last = idx;
        }
        Ok(registers)
    }
}

/// relative_error returns the expected relative standard error of a sketch
/// with precision p.
pub fn relative_error(p: u8) -> f64 {
    1.04 / ((1_u64 << p) as f64).sqrt()
}

impl Counter for Plus {
    const KIND: CounterKind = CounterKind::HyperLogLog;

    fn with_precision(p: u8) -> Result<Self> {
        let p = check_precision(p)?;
        let m = 1_u32 << p;
        Ok(Self {
            p,
            m,
            alpha: Self::alpha(m),
            registers: Vec::new(),
        })
    }

    fn precision(&self) -> u8 {
        self.p
    }

    fn add_hash(&mut self, hash: u64) {
        if self.registers.is_empty() {
            self.registers = vec![0; self.m as usize];
        }

        let idx = (hash >> (64 - self.p as u32)) as usize;
        let rank = Self::rank(hash, self.p);
        if rank > self.registers[idx] {
            self.registers[idx] = rank;
        }
    }

    fn count(&self) -> u64 {
        self.estimate().round() as u64
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.p != other.p {
            return Err(CardinalityError::IncompatiblePrecision {
                left: self.p,
                right: other.p,
            });
        }
        if other.registers.is_empty() {
            return Ok(());
        }
        if self.registers.is_empty() {
            self.registers = other.registers.clone();
            return Ok(());
        }

        for (left, right) in self.registers.iter_mut().zip(other.registers.iter()) {
            *left = (*left).max(*right);
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.registers.iter().all(|&r| r == 0)
    }

    fn bytes(&self) -> usize {
        self.registers.capacity() + mem::size_of::<Self>()
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        if self.is_empty() {
            buf.write_byte(REPR_EMPTY);
            return;
        }

        let mut sparse = Vec::new();
        self.encode_sparse(&mut sparse);
        if sparse.len() < self.registers.len() {
            buf.write_byte(REPR_SPARSE);
            buf.put_slice(&sparse);
        } else {
            buf.write_byte(REPR_DENSE);
            buf.put_slice(&self.registers);
        }
    }

    fn decode<B: Buf>(p: u8, buf: &mut B) -> Result<Self> {
        let mut plus =
            Self::with_precision(p).map_err(|e| CardinalityError::decoding(e.to_string()))?;
        let m = plus.m as usize;

        match buf.read_byte()? {
            REPR_EMPTY => {}
            REPR_DENSE => {
                if buf.remaining() < m {
                    return Err(CardinalityError::decoding(format!(
                        "not enough data for {} registers",
                        m
                    )));
                }
                let mut registers = vec![0; m];
                buf.copy_to_slice(&mut registers);
                let max_rank = Self::max_rank(p);
                if let Some(r) = registers.iter().find(|&&r| r > max_rank) {
                    return Err(CardinalityError::decoding(format!("invalid register rank {}", r)));
                }
                plus.registers = registers;
            }
            REPR_SPARSE => {
                plus.registers = Self::decode_sparse(p, m, buf)?;
            }
            repr => {
                return Err(CardinalityError::decoding(format!(
                    "unknown sketch representation {}",
                    repr
                )))
            }
        }

        Ok(plus)
    }
}
