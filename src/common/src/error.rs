use crate::estimator::CounterKind;

pub type Result<T> = std::result::Result<T, CardinalityError>;

/// CardinalityError is returned by every fallible counter, store and reduce
/// operation. None of them are retried; callers propagate them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CardinalityError {
    #[error("ordinal {ordinal} out of range (capacity {capacity})")]
    IndexOutOfRange { ordinal: usize, capacity: usize },

    #[error("incompatible precision: {left} != {right}")]
    IncompatiblePrecision { left: u8, right: u8 },

    #[error("incompatible counter kind: {left} != {right}")]
    IncompatibleKind { left: CounterKind, right: CounterKind },

    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("nothing to reduce")]
    EmptyReduce,
}

impl CardinalityError {
    pub(crate) fn decoding(msg: impl Into<String>) -> Self {
        Self::Decoding(msg.into())
    }
}
