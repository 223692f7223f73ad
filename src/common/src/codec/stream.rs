//! Primitive stream codecs shared by every wire structure. Writers append to
//! any `BufMut`; readers consume any `Buf` and fail with
//! `CardinalityError::Decoding` when the input ends early or holds a value
//! outside its domain.

use bytes::{Buf, BufMut};

use crate::codec::varint::{VarInt, MAX_VARINT_LEN64};
use crate::error::{CardinalityError, Result};

pub trait StreamOutput: BufMut {
    fn write_byte(&mut self, v: u8) {
        self.put_u8(v);
    }

    fn write_bool(&mut self, v: bool) {
        self.put_u8(v as u8);
    }

    fn write_vlong(&mut self, v: u64) {
        let mut b = [0; MAX_VARINT_LEN64];
        let n = v.encode_var(&mut b);
        self.put_slice(&b[..n]);
    }

    /// write_string writes the utf-8 length as a varint followed by the bytes.
    fn write_string(&mut self, s: &str) {
        self.write_vlong(s.len() as u64);
        self.put_slice(s.as_bytes());
    }
}

impl<B: BufMut + ?Sized> StreamOutput for B {}

pub trait StreamInput: Buf {
    fn read_byte(&mut self) -> Result<u8> {
        if self.remaining() < 1 {
            return Err(CardinalityError::decoding("unexpected end of stream"));
        }
        Ok(self.get_u8())
    }

    fn read_bool(&mut self) -> Result<bool> {
        match self.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(CardinalityError::decoding(format!("invalid bool byte {}", b))),
        }
    }

    fn read_vlong(&mut self) -> Result<u64> {
        let mut x = 0_u64;
        let mut s = 0_u32;
        for i in 0..MAX_VARINT_LEN64 {
            let b = self
                .read_byte()
                .map_err(|_| CardinalityError::decoding("truncated varint"))?;
            if b < 0x80 {
                if i == MAX_VARINT_LEN64 - 1 && b > 1 {
                    break;
                }
                return Ok(x | (b as u64) << s);
            }
            x |= ((b & 0x7f) as u64) << s;
            s += 7;
        }
        Err(CardinalityError::decoding("varint overflows u64"))
    }

    /// read_len reads a varint length and checks that at least `len * unit`
    /// bytes are still available, so a corrupt length never drives an
    /// allocation larger than the input itself.
    fn read_len(&mut self, unit: usize) -> Result<usize> {
        let len = self.read_vlong()?;
        let len = usize::try_from(len)
            .map_err(|_| CardinalityError::decoding(format!("length {} too large", len)))?;
        let need = len.saturating_mul(unit);
        if self.remaining() < need {
            return Err(CardinalityError::decoding(format!(
                "not enough data: need {} bytes, have {}",
                need,
                self.remaining()
            )));
        }
        Ok(len)
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_len(1)?;
        let mut b = vec![0; len];
        self.copy_to_slice(&mut b);
        String::from_utf8(b).map_err(|e| CardinalityError::decoding(e.to_string()))
    }
}

impl<B: Buf + ?Sized> StreamInput for B {}

#[cfg(test)]
mod tests {
    use crate::codec::stream::{StreamInput, StreamOutput};
    use crate::error::CardinalityError;

    #[test]
    fn test_stream_primitives() {
        let mut out = Vec::new();
        out.write_string("distinct_users");
        out.write_bool(true);
        out.write_bool(false);
        out.write_vlong(1 << 40);
        out.write_byte(7);

        let mut input = out.as_slice();
        assert_eq!(input.read_string().unwrap(), "distinct_users");
        assert_eq!(input.read_bool().unwrap(), true);
        assert_eq!(input.read_bool().unwrap(), false);
        assert_eq!(input.read_vlong().unwrap(), 1 << 40);
        assert_eq!(input.read_byte().unwrap(), 7);
        assert!(input.is_empty(), "unexpected trailing bytes: {}", input.len());
    }

    #[test]
    fn test_vlong_boundaries() {
        for v in [0_u64, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            let mut out = Vec::new();
            out.write_vlong(v);
            let mut input = out.as_slice();
            let got = input.read_vlong().unwrap();
            assert_eq!(got, v, "unexpected value: got {}, exp {}", got, v);
            assert!(input.is_empty(), "unexpected trailing bytes: {}", input.len());
        }
    }

    #[test]
    fn test_read_vlong_truncated() {
        let mut out = Vec::new();
        out.write_vlong(300);
        let mut input = &out[..out.len() - 1];
        assert!(input.read_vlong().is_err());
        let mut input: &[u8] = &[];
        assert!(input.read_vlong().is_err());
    }

    #[test]
    fn test_read_vlong_overflow() {
        let mut input: &[u8] = &[0xff_u8; 11];
        let err = input.read_vlong().unwrap_err();
        assert!(matches!(err, CardinalityError::Decoding(_)), "unexpected error: {}", err);

        let mut b = [0xff_u8; 10];
        b[9] = 0x02;
        assert!(b.as_slice().read_vlong().is_err());
    }

    #[test]
    fn test_read_bool_rejects_other_bytes() {
        let mut input = [2_u8].as_slice();
        let err = input.read_bool().unwrap_err();
        assert!(matches!(err, CardinalityError::Decoding(_)), "unexpected error: {}", err);
    }

    #[test]
    fn test_read_string_truncated() {
        let mut out = Vec::new();
        out.write_string("abcdef");
        for n in 0..out.len() {
            let mut input = &out[..n];
            assert!(
                input.read_string().is_err(),
                "prefix of {} bytes decoded unexpectedly",
                n
            );
        }
    }

    #[test]
    fn test_read_string_invalid_utf8() {
        let mut out = Vec::new();
        out.write_vlong(2);
        out.extend_from_slice(&[0xc3, 0x28]);
        assert!(out.as_slice().read_string().is_err());
    }

    #[test]
    fn test_read_len_rejects_oversized() {
        let mut out = Vec::new();
        out.write_vlong(u64::MAX >> 1);
        let mut input = out.as_slice();
        assert!(input.read_len(8).is_err());
    }
}
