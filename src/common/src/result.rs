//! The named, mergeable and streamable partial result of one cardinality
//! aggregation, as produced by a shard or by a reduce step.

use bytes::{Buf, BufMut};
use serde::Serialize;
use tracing::debug;

use crate::codec::{StreamInput, StreamOutput};
use crate::error::{CardinalityError, Result};
use crate::format::ValueFormatter;
use crate::store::CounterStore;

/// TYPE names the aggregation type; callers only merge results of the same
/// type and name.
pub const TYPE: &str = "cardinality.exact";

/// CardinalityValue is what a result contributes to an output document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardinalityValue {
    pub value: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_as_string: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CardinalityResult {
    name: String,
    /// None when the shard contributed no data.
    counts: Option<CounterStore>,
    formatter: Option<ValueFormatter>,
}

impl CardinalityResult {
    pub fn new(
        name: impl Into<String>,
        counts: Option<CounterStore>,
        formatter: Option<ValueFormatter>,
    ) -> Self {
        Self {
            name: name.into(),
            counts,
            formatter,
        }
    }

    pub fn empty(name: impl Into<String>, formatter: Option<ValueFormatter>) -> Self {
        Self::new(name, None, formatter)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn counts(&self) -> Option<&CounterStore> {
        self.counts.as_ref()
    }

    pub fn formatter(&self) -> Option<&ValueFormatter> {
        self.formatter.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_none()
    }

    pub(crate) fn into_parts(self) -> (String, Option<CounterStore>, Option<ValueFormatter>) {
        (self.name, self.counts, self.formatter)
    }

    /// value returns the estimate of bucket 0, or 0 when no counts are held.
    pub fn value(&self) -> u64 {
        self.counts
            .as_ref()
            .and_then(|c| c.estimate(0).ok())
            .unwrap_or(0)
    }

    /// merge folds other's bucket 0 into this result's bucket 0. Whichever
    /// side holds counts is the merge base; name and formatter stay self's.
    pub fn merge(mut self, other: Self) -> Result<Self> {
        let theirs = match other.counts {
            Some(c) => c,
            None => return Ok(self),
        };

        if let Some(ours) = self.counts.as_mut() {
            ours.merge(0, &theirs, 0)?;
        } else {
            self.counts = Some(theirs);
        }
        Ok(self)
    }

    /// render returns the value, plus its formatted string when a non raw
    /// formatter is configured.
    pub fn render(&self) -> CardinalityValue {
        let value = self.value();
        let value_as_string = match &self.formatter {
            Some(f) if !f.is_raw() => Some(f.format(value)),
            _ => None,
        };
        CardinalityValue {
            value,
            value_as_string,
        }
    }

    /// write_to streams name, optional formatter, presence flag and the
    /// bucket 0 counter.
    pub fn write_to<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        // encode the counts first so a failure leaves buf untouched
        let counts = match &self.counts {
            Some(c) => {
                let mut b = Vec::new();
                c.write_to(0, &mut b)?;
                Some(b)
            }
            None => None,
        };

        buf.write_string(&self.name);
        ValueFormatter::write_optional(self.formatter.as_ref(), buf);
        match counts {
            Some(b) => {
                buf.write_bool(true);
                buf.put_slice(&b);
            }
            None => buf.write_bool(false),
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut b = Vec::new();
        self.write_to(&mut b)?;
        Ok(b)
    }

    pub fn read_from<B: Buf>(buf: &mut B) -> Result<Self> {
        let name = buf.read_string()?;
        let formatter = ValueFormatter::read_optional(buf)?;
        let counts = if buf.read_bool()? {
            Some(CounterStore::read_from(buf)?)
        } else {
            None
        };
        debug!(name = %name, present = counts.is_some(), "read cardinality result");

        Ok(Self {
            name,
            counts,
            formatter,
        })
    }

    /// from_bytes decodes a result that must span all of `data`.
    pub fn from_bytes(mut data: &[u8]) -> Result<Self> {
        let result = Self::read_from(&mut data)?;
        if !data.is_empty() {
            return Err(CardinalityError::decoding(format!(
                "{} trailing bytes after cardinality result",
                data.len()
            )));
        }
        Ok(result)
    }
}
