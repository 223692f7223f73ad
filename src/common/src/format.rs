//! Value formatters turn a final count into its display string. `Raw` marks
//! the common case where the numeric value is enough and no string field is
//! emitted.

use std::fmt::Write;
use std::net::Ipv4Addr;

use bytes::{Buf, BufMut};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};

use crate::codec::{StreamInput, StreamOutput};
use crate::error::{CardinalityError, Result};

const RAW_ID: u8 = 1;
const DATE_TIME_ID: u8 = 2;
const NUMBER_ID: u8 = 4;
const IPV4_ID: u8 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueFormatter {
    /// Raw prints the value as a plain decimal.
    Raw,
    /// DateTime reads the value as epoch milliseconds, printed in UTC with a
    /// strftime pattern.
    DateTime { pattern: String },
    /// Number groups thousands with `separator`.
    Number { separator: char },
    /// Ipv4 prints the low 32 bits as a dotted quad.
    Ipv4,
}

impl ValueFormatter {
    pub fn date_time(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
            return Err(CardinalityError::InvalidParameter(format!(
                "invalid date time pattern {:?}",
                pattern
            )));
        }
        Ok(Self::DateTime { pattern })
    }

    pub fn number(separator: char) -> Self {
        Self::Number { separator }
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::Raw => RAW_ID,
            Self::DateTime { .. } => DATE_TIME_ID,
            Self::Number { .. } => NUMBER_ID,
            Self::Ipv4 => IPV4_ID,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw)
    }

    pub fn format(&self, v: u64) -> String {
        match self {
            Self::Raw => v.to_string(),
            Self::DateTime { pattern } => format_date_time(v, pattern),
            Self::Number { separator } => group_thousands(v, *separator),
            Self::Ipv4 => Ipv4Addr::from(v as u32).to_string(),
        }
    }

    /// write_to writes the formatter id followed by its parameters.
    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.write_byte(self.id());
        match self {
            Self::DateTime { pattern } => buf.write_string(pattern),
            Self::Number { separator } => buf.write_string(separator.encode_utf8(&mut [0; 4])),
            Self::Raw | Self::Ipv4 => {}
        }
    }

    pub fn read_from<B: Buf>(buf: &mut B) -> Result<Self> {
        match buf.read_byte()? {
            RAW_ID => Ok(Self::Raw),
            DATE_TIME_ID => {
                let pattern = buf.read_string()?;
                Self::date_time(pattern).map_err(|e| CardinalityError::decoding(e.to_string()))
            }
            NUMBER_ID => {
                let s = buf.read_string()?;
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(separator), None) => Ok(Self::Number { separator }),
                    _ => Err(CardinalityError::decoding(format!(
                        "invalid number separator {:?}",
                        s
                    ))),
                }
            }
            IPV4_ID => Ok(Self::Ipv4),
            id => Err(CardinalityError::decoding(format!(
                "unknown value formatter id {}",
                id
            ))),
        }
    }

    /// write_optional writes a presence flag, then the formatter if any.
    pub fn write_optional<B: BufMut>(formatter: Option<&Self>, buf: &mut B) {
        match formatter {
            Some(f) => {
                buf.write_bool(true);
                f.write_to(buf);
            }
            None => buf.write_bool(false),
        }
    }

    pub fn read_optional<B: Buf>(buf: &mut B) -> Result<Option<Self>> {
        if buf.read_bool()? {
            Ok(Some(Self::read_from(buf)?))
        } else {
            Ok(None)
        }
    }
}

fn format_date_time(v: u64, pattern: &str) -> String {
    let dt = match i64::try_from(v).ok().and_then(DateTime::<Utc>::from_timestamp_millis) {
        Some(dt) => dt,
        None => return v.to_string(),
    };

    let mut s = String::new();
    if write!(s, "{}", dt.format(pattern)).is_err() {
        return v.to_string();
    }
    s
}

fn group_thousands(v: u64, separator: char) -> String {
    let digits = v.to_string();
    let mut s = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            s.push(separator);
        }
        s.push(c);
    }
    s
}
