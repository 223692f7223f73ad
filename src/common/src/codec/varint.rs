//! LEB128 style variable length unsigned integers: 7 payload bits per byte,
//! high bit set on every byte but the last.

/// MAX_VARINT_LEN64 is the maximum length of a varint-encoded 64-bit integer.
pub const MAX_VARINT_LEN64: usize = 10;

pub trait VarInt: Sized {
    /// encode_var writes self into dst and returns the number of bytes written.
    /// dst must hold at least `MAX_VARINT_LEN64` bytes.
    fn encode_var(self, dst: &mut [u8]) -> usize;
}

impl VarInt for u64 {
    fn encode_var(self, dst: &mut [u8]) -> usize {
        let mut x = self;
        let mut i = 0;
        while x >= 0x80 {
            dst[i] = (x as u8) | 0x80;
            x >>= 7;
            i += 1;
        }
        dst[i] = x as u8;
        i + 1
    }
}
