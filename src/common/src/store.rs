//! Bucketed counter storage.
//!
//! One counter slot per bucket ordinal, kept in a single growable arena.
//! Slots are appended, never shrunk or reused, so an ordinal keeps
//! addressing the same bucket for the lifetime of the store.

use bytes::{Buf, BufMut};
use tracing::trace;

use crate::codec::{StreamInput, StreamOutput};
use crate::error::{CardinalityError, Result};
use crate::estimator::exact::ExactCounter;
use crate::estimator::hll::Plus;
use crate::estimator::{check_precision, Counter, CounterKind};

#[derive(Debug, Clone)]
pub struct BucketedCounters<C: Counter> {
    p: u8,
    slots: Vec<C>,
}

impl<C: Counter> BucketedCounters<C> {
    pub fn new(p: u8) -> Result<Self> {
        Self::with_capacity(p, 0)
    }

    /// with_capacity returns a store with `n` empty slots already allocated.
    pub fn with_capacity(p: u8, n: usize) -> Result<Self> {
        let p = check_precision(p)?;
        let mut store = Self {
            p,
            slots: Vec::new(),
        };
        if n > 0 {
            store.ensure_capacity(n - 1)?;
        }
        Ok(store)
    }

    pub fn precision(&self) -> u8 {
        self.p
    }

    /// capacity returns the number of addressable ordinals.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// ensure_capacity grows the store so that `ordinal` is addressable. New
    /// slots start empty; existing slots are left untouched.
    pub fn ensure_capacity(&mut self, ordinal: usize) -> Result<()> {
        if ordinal < self.slots.len() {
            return Ok(());
        }

        let n = ordinal
            .checked_add(1)
            .ok_or(CardinalityError::IndexOutOfRange {
                ordinal,
                capacity: self.slots.len(),
            })?;
        trace!(from = self.slots.len(), to = n, "grow counter store");

        let empty = C::with_precision(self.p)?;
        self.slots
            .try_reserve(n - self.slots.len())
            .map_err(|_| CardinalityError::IndexOutOfRange {
                ordinal,
                capacity: self.slots.len(),
            })?;
        self.slots.resize(n, empty);
        Ok(())
    }

    pub fn counter(&self, ordinal: usize) -> Result<&C> {
        self.slots
            .get(ordinal)
            .ok_or(CardinalityError::IndexOutOfRange {
                ordinal,
                capacity: self.slots.len(),
            })
    }

    pub fn estimate(&self, ordinal: usize) -> Result<u64> {
        Ok(self.counter(ordinal)?.count())
    }

    /// record_value adds one hashed value to the bucket at `ordinal`, growing
    /// the store first if needed.
    pub fn record_value(&mut self, ordinal: usize, hash: u64) -> Result<()> {
        self.ensure_capacity(ordinal)?;
        self.slots[ordinal].add_hash(hash);
        Ok(())
    }

    /// merge folds `other`'s bucket at `ordinal_other` into this store's
    /// bucket at `ordinal_self`.
    pub fn merge(&mut self, ordinal_self: usize, other: &Self, ordinal_other: usize) -> Result<()> {
        if self.p != other.p {
            return Err(CardinalityError::IncompatiblePrecision {
                left: self.p,
                right: other.p,
            });
        }
        let src = other.counter(ordinal_other)?;
        self.ensure_capacity(ordinal_self)?;
        self.slots[ordinal_self].merge(src)
    }

    /// extract copies the bucket at `ordinal` into a new single slot store.
    pub fn extract(&self, ordinal: usize) -> Result<Self> {
        let c = self.counter(ordinal)?.clone();
        Ok(Self {
            p: self.p,
            slots: vec![c],
        })
    }

    /// bytes estimates the memory footprint of every slot, in bytes.
    pub fn bytes(&self) -> usize {
        self.slots.iter().map(|c| c.bytes()).sum()
    }

    /// write_to encodes the counter at `ordinal` without the store header.
    pub fn write_to<B: BufMut>(&self, ordinal: usize, buf: &mut B) -> Result<()> {
        self.counter(ordinal)?.encode(buf);
        Ok(())
    }

    /// read_from decodes one counter into a store whose only slot is ordinal 0.
    pub fn read_from<B: Buf>(p: u8, buf: &mut B) -> Result<Self> {
        let c = C::decode(p, buf)?;
        Ok(Self { p, slots: vec![c] })
    }
}

/// CounterStore is a bucketed store whose counter kind is fixed when it is
/// built or decoded.
#[derive(Debug, Clone)]
pub enum CounterStore {
    Exact(BucketedCounters<ExactCounter>),
    HyperLogLog(BucketedCounters<Plus>),
}

macro_rules! dispatch {
    ($store:expr, $s:ident => $e:expr) => {
        match $store {
            CounterStore::Exact($s) => $e,
            CounterStore::HyperLogLog($s) => $e,
        }
    };
}

impl CounterStore {
    pub fn new(kind: CounterKind, p: u8) -> Result<Self> {
        Self::with_capacity(kind, p, 0)
    }

    pub fn with_capacity(kind: CounterKind, p: u8, n: usize) -> Result<Self> {
        Ok(match kind {
            CounterKind::Exact => Self::Exact(BucketedCounters::with_capacity(p, n)?),
            CounterKind::HyperLogLog => Self::HyperLogLog(BucketedCounters::with_capacity(p, n)?),
        })
    }

    pub fn kind(&self) -> CounterKind {
        match self {
            Self::Exact(_) => ExactCounter::KIND,
            Self::HyperLogLog(_) => Plus::KIND,
        }
    }

    pub fn precision(&self) -> u8 {
        dispatch!(self, s => s.precision())
    }

    pub fn capacity(&self) -> usize {
        dispatch!(self, s => s.capacity())
    }

    pub fn bytes(&self) -> usize {
        dispatch!(self, s => s.bytes())
    }

    pub fn ensure_capacity(&mut self, ordinal: usize) -> Result<()> {
        dispatch!(self, s => s.ensure_capacity(ordinal))
    }

    pub fn estimate(&self, ordinal: usize) -> Result<u64> {
        dispatch!(self, s => s.estimate(ordinal))
    }

    pub fn record_value(&mut self, ordinal: usize, hash: u64) -> Result<()> {
        dispatch!(self, s => s.record_value(ordinal, hash))
    }

    pub fn is_empty(&self, ordinal: usize) -> Result<bool> {
        dispatch!(self, s => Ok(s.counter(ordinal)?.is_empty()))
    }

    /// check_compatible returns the error a merge of `other` into self
    /// would fail with on precision or kind.
    pub fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.precision() != other.precision() {
            return Err(CardinalityError::IncompatiblePrecision {
                left: self.precision(),
                right: other.precision(),
            });
        }
        if self.kind() != other.kind() {
            return Err(CardinalityError::IncompatibleKind {
                left: self.kind(),
                right: other.kind(),
            });
        }
        Ok(())
    }

    pub fn merge(&mut self, ordinal_self: usize, other: &Self, ordinal_other: usize) -> Result<()> {
        self.check_compatible(other)?;
        match (self, other) {
            (Self::Exact(a), Self::Exact(b)) => a.merge(ordinal_self, b, ordinal_other),
            (Self::HyperLogLog(a), Self::HyperLogLog(b)) => a.merge(ordinal_self, b, ordinal_other),
            (a, b) => Err(CardinalityError::IncompatibleKind {
                left: a.kind(),
                right: b.kind(),
            }),
        }
    }

    pub fn extract(&self, ordinal: usize) -> Result<Self> {
        Ok(match self {
            Self::Exact(s) => Self::Exact(s.extract(ordinal)?),
            Self::HyperLogLog(s) => Self::HyperLogLog(s.extract(ordinal)?),
        })
    }

    /// write_to encodes the bucket at `ordinal` as kind tag, precision, then
    /// the counter bytes.
    pub fn write_to<B: BufMut>(&self, ordinal: usize, buf: &mut B) -> Result<()> {
        // validate before writing the header so a failed write leaves buf untouched
        dispatch!(self, s => s.counter(ordinal).map(|_| ()))?;

        buf.write_byte(self.kind().tag());
        buf.write_byte(self.precision());
        dispatch!(self, s => s.write_to(ordinal, buf))
    }

    pub fn read_from<B: Buf>(buf: &mut B) -> Result<Self> {
        let kind = CounterKind::from_tag(buf.read_byte()?)?;
        let p = buf.read_byte()?;
        check_precision(p).map_err(|e| CardinalityError::decoding(e.to_string()))?;

        Ok(match kind {
            CounterKind::Exact => Self::Exact(BucketedCounters::read_from(p, buf)?),
            CounterKind::HyperLogLog => Self::HyperLogLog(BucketedCounters::read_from(p, buf)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use cardinality_utils::hash_u64;
    use quickcheck::{quickcheck, TestResult};

    use crate::error::CardinalityError;
    use crate::estimator::exact::ExactCounter;
    use crate::estimator::CounterKind;
    use crate::store::{BucketedCounters, CounterStore};

    fn store_of(kind: CounterKind, values: &[u64]) -> CounterStore {
        let mut s = CounterStore::new(kind, 12).unwrap();
        s.ensure_capacity(0).unwrap();
        for v in values {
            s.record_value(0, hash_u64(*v)).unwrap();
        }
        s
    }

    fn merged(parts: &[&CounterStore]) -> u64 {
        let mut acc = CounterStore::with_capacity(parts[0].kind(), parts[0].precision(), 1).unwrap();
        for p in parts {
            acc.merge(0, p, 0).unwrap();
        }
        acc.estimate(0).unwrap()
    }

    #[test]
    fn test_ensure_capacity_is_idempotent() {
        let mut s = BucketedCounters::<ExactCounter>::new(14).unwrap();
        assert_eq!(s.capacity(), 0);

        s.ensure_capacity(3).unwrap();
        assert_eq!(s.capacity(), 4);
        s.record_value(2, 99).unwrap();

        s.ensure_capacity(1).unwrap();
        s.ensure_capacity(3).unwrap();
        assert_eq!(s.capacity(), 4);
        assert_eq!(s.estimate(2).unwrap(), 1, "growth lost slot data");

        s.ensure_capacity(10).unwrap();
        assert_eq!(s.capacity(), 11);
        assert_eq!(s.estimate(2).unwrap(), 1, "growth lost slot data");
        assert_eq!(s.estimate(10).unwrap(), 0);
    }

    #[test]
    fn test_huge_ordinal_is_an_error() {
        let mut s = CounterStore::new(CounterKind::Exact, 14).unwrap();
        s.record_value(1, 7).unwrap();

        for ordinal in [usize::MAX, usize::MAX - 1, usize::MAX / 2] {
            assert_eq!(
                s.record_value(ordinal, 7).unwrap_err(),
                CardinalityError::IndexOutOfRange { ordinal, capacity: 2 }
            );
            assert!(s.ensure_capacity(ordinal).is_err());
        }
        assert_eq!(s.capacity(), 2, "failed growth changed the store");
        assert_eq!(s.estimate(1).unwrap(), 1);

        let other = CounterStore::with_capacity(CounterKind::Exact, 14, 1).unwrap();
        assert!(s.merge(usize::MAX - 1, &other, 0).is_err());
        assert!(CounterStore::with_capacity(CounterKind::HyperLogLog, 14, usize::MAX).is_err());
    }

    #[test]
    fn test_estimate_out_of_range() {
        let s = CounterStore::new(CounterKind::HyperLogLog, 14).unwrap();
        assert_eq!(
            s.estimate(0).unwrap_err(),
            CardinalityError::IndexOutOfRange { ordinal: 0, capacity: 0 }
        );
    }

    #[test]
    fn test_buckets_are_independent() {
        let mut s = CounterStore::new(CounterKind::Exact, 14).unwrap();
        for v in 0..10_u64 {
            s.record_value(0, hash_u64(v)).unwrap();
        }
        for v in 5..8_u64 {
            s.record_value(3, hash_u64(v)).unwrap();
        }
        assert_eq!(s.capacity(), 4);
        assert_eq!(s.estimate(0).unwrap(), 10);
        assert_eq!(s.estimate(1).unwrap(), 0);
        assert_eq!(s.estimate(3).unwrap(), 3);
    }

    #[test]
    fn test_merge_between_ordinals() {
        let mut a = CounterStore::new(CounterKind::Exact, 14).unwrap();
        a.record_value(0, 1).unwrap();
        let mut b = CounterStore::new(CounterKind::Exact, 14).unwrap();
        b.record_value(2, 1).unwrap();
        b.record_value(2, 2).unwrap();

        a.merge(5, &b, 2).unwrap();
        assert_eq!(a.capacity(), 6);
        assert_eq!(a.estimate(5).unwrap(), 2);
        assert_eq!(a.estimate(0).unwrap(), 1);

        assert_eq!(
            a.merge(0, &b, 7).unwrap_err(),
            CardinalityError::IndexOutOfRange { ordinal: 7, capacity: 3 }
        );
    }

    #[test]
    fn test_merge_rejects_precision_and_kind() {
        let mut a = CounterStore::with_capacity(CounterKind::HyperLogLog, 14, 1).unwrap();
        let b = CounterStore::with_capacity(CounterKind::HyperLogLog, 12, 1).unwrap();
        assert_eq!(
            a.merge(0, &b, 0).unwrap_err(),
            CardinalityError::IncompatiblePrecision { left: 14, right: 12 }
        );

        let c = CounterStore::with_capacity(CounterKind::Exact, 14, 1).unwrap();
        assert_eq!(
            a.merge(0, &c, 0).unwrap_err(),
            CardinalityError::IncompatibleKind {
                left: CounterKind::HyperLogLog,
                right: CounterKind::Exact
            }
        );
    }

    #[test]
    fn test_check_compatible() {
        let a = CounterStore::new(CounterKind::Exact, 14).unwrap();
        assert!(a.check_compatible(&CounterStore::new(CounterKind::Exact, 14).unwrap()).is_ok());
        assert_eq!(
            a.check_compatible(&CounterStore::new(CounterKind::Exact, 10).unwrap()).unwrap_err(),
            CardinalityError::IncompatiblePrecision { left: 14, right: 10 }
        );
        assert_eq!(
            a.check_compatible(&CounterStore::new(CounterKind::HyperLogLog, 14).unwrap()).unwrap_err(),
            CardinalityError::IncompatibleKind {
                left: CounterKind::Exact,
                right: CounterKind::HyperLogLog
            }
        );
    }

    #[test]
    fn test_extract() {
        let mut s = CounterStore::new(CounterKind::Exact, 14).unwrap();
        s.record_value(4, 10).unwrap();
        s.record_value(4, 11).unwrap();

        let e = s.extract(4).unwrap();
        assert_eq!(e.capacity(), 1);
        assert_eq!(e.estimate(0).unwrap(), 2);
        assert!(s.extract(5).is_err());
    }

    #[test]
    fn test_write_read_bucket() {
        for kind in [CounterKind::Exact, CounterKind::HyperLogLog] {
            let mut s = CounterStore::new(kind, 12).unwrap();
            for v in 0..1_000_u64 {
                s.record_value(1, hash_u64(v)).unwrap();
            }

            let mut b = Vec::new();
            s.write_to(1, &mut b).unwrap();
            assert_eq!(b[0], kind.tag());
            assert_eq!(b[1], 12);

            let got = CounterStore::read_from(&mut b.as_slice()).unwrap();
            assert_eq!(got.kind(), kind);
            assert_eq!(got.capacity(), 1);
            assert_eq!(got.estimate(0).unwrap(), s.estimate(1).unwrap());
        }
    }

    #[test]
    fn test_write_unallocated_ordinal() {
        let s = CounterStore::new(CounterKind::Exact, 14).unwrap();
        let mut b = Vec::new();
        assert!(s.write_to(0, &mut b).is_err());
        assert!(b.is_empty(), "header written for failed bucket");
    }

    #[test]
    fn test_read_rejects_bad_header() {
        assert!(CounterStore::read_from(&mut [7_u8, 14, 0].as_slice()).is_err());
        assert!(CounterStore::read_from(&mut [1_u8, 30, 0].as_slice()).is_err());
        assert!(CounterStore::read_from(&mut [1_u8].as_slice()).is_err());
    }

    #[test]
    fn test_merge_laws() {
        fn prop(kind: CounterKind, a: Vec<u64>, b: Vec<u64>, c: Vec<u64>) -> TestResult {
            if a.is_empty() || b.is_empty() || c.is_empty() {
                return TestResult::discard();
            }
            let (a, b, c) = (store_of(kind, &a), store_of(kind, &b), store_of(kind, &c));

            let abc = merged(&[&a, &b, &c]);
            let bca = merged(&[&b, &c, &a]);

            let mut bc = b.clone();
            bc.merge(0, &c, 0).unwrap();
            let a_bc = merged(&[&a, &bc]);

            let mut ac = a.clone();
            ac.merge(0, &c, 0).unwrap();
            let ac_b = merged(&[&ac, &b]);

            TestResult::from_bool(abc == bca && abc == a_bc && abc == ac_b)
        }

        fn exact(a: Vec<u64>, b: Vec<u64>, c: Vec<u64>) -> TestResult {
            prop(CounterKind::Exact, a, b, c)
        }

        fn sketch(a: Vec<u64>, b: Vec<u64>, c: Vec<u64>) -> TestResult {
            prop(CounterKind::HyperLogLog, a, b, c)
        }

        quickcheck(exact as fn(Vec<u64>, Vec<u64>, Vec<u64>) -> TestResult);
        quickcheck(sketch as fn(Vec<u64>, Vec<u64>, Vec<u64>) -> TestResult);
    }

    #[test]
    fn test_merge_empty_identity() {
        fn prop(values: Vec<u64>) -> bool {
            [CounterKind::Exact, CounterKind::HyperLogLog].into_iter().all(|kind| {
                let a = store_of(kind, &values);
                let empty = store_of(kind, &[]);
                merged(&[&a, &empty]) == a.estimate(0).unwrap()
                    && merged(&[&empty, &a]) == a.estimate(0).unwrap()
            })
        }
        quickcheck(prop as fn(Vec<u64>) -> bool);
    }

    #[test]
    fn test_round_trip_estimate() {
        fn prop(values: Vec<u64>) -> bool {
            [CounterKind::Exact, CounterKind::HyperLogLog].into_iter().all(|kind| {
                let s = store_of(kind, &values);
                let mut b = Vec::new();
                s.write_to(0, &mut b).unwrap();
                let got = CounterStore::read_from(&mut b.as_slice()).unwrap();
                got.estimate(0).unwrap() == s.estimate(0).unwrap()
            })
        }
        quickcheck(prop as fn(Vec<u64>) -> bool);
    }
}
