//! 256-bit machine word.
//!
//! Every value on the operand stack is a [`Word`]. Arithmetic wraps modulo
//! 2^256, so no operation can produce a value outside `[0, 2^256)`.

use ruint::aliases::U256;
use std::fmt;

/// Size of a word in bytes.
pub const WORD_BYTES: usize = 32;

/// Unsigned 256-bit integer with modular arithmetic.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Word(U256);

impl Word {
    pub const ZERO: Word = Word(U256::ZERO);
    pub const MAX: Word = Word(U256::MAX);

    /// Builds a word from up to 32 big-endian bytes.
    ///
    /// Shorter inputs are zero-extended on the left, so `[0x01, 0x02]`
    /// yields `0x0102`. Returns `None` if more than 32 bytes are given.
    pub fn from_be_slice(bytes: &[u8]) -> Option<Word> {
        if bytes.len() > WORD_BYTES {
            return None;
        }
        let mut buf = [0u8; WORD_BYTES];
        buf[WORD_BYTES - bytes.len()..].copy_from_slice(bytes);
        Some(Word(U256::from_be_bytes(buf)))
    }

    /// Returns the 32-byte big-endian representation.
    pub fn to_be_bytes(&self) -> [u8; WORD_BYTES] {
        self.0.to_be_bytes()
    }

    /// Minimal big-endian encoding without leading zero bytes.
    ///
    /// Zero encodes as a single `0x00` byte.
    pub fn to_be_bytes_trimmed(&self) -> Vec<u8> {
        let bytes = self.to_be_bytes();
        let first = bytes
            .iter()
            .position(|b| *b != 0)
            .unwrap_or(WORD_BYTES - 1);
        bytes[first..].to_vec()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `(self + rhs) mod 2^256`
    pub fn wrapping_add(self, rhs: Word) -> Word {
        Word(self.0.wrapping_add(rhs.0))
    }

    /// `(self - rhs) mod 2^256`
    pub fn wrapping_sub(self, rhs: Word) -> Word {
        Word(self.0.wrapping_sub(rhs.0))
    }

    /// `(self * rhs) mod 2^256`
    pub fn wrapping_mul(self, rhs: Word) -> Word {
        Word(self.0.wrapping_mul(rhs.0))
    }

    /// `floor(self / rhs)`, or zero when `rhs` is zero.
    pub fn div_or_zero(self, rhs: Word) -> Word {
        Word(self.0.checked_div(rhs.0).unwrap_or(U256::ZERO))
    }

    /// Parses a decimal literal or a `0x`-prefixed hex literal.
    ///
    /// Returns `None` for malformed input or values of 2^256 and above.
    pub fn parse(token: &str) -> Option<Word> {
        let (digits, radix) = match token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
        {
            Some(hex) => (hex, 16),
            None => (token, 10),
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix as u32)) {
            return None;
        }
        U256::from_str_radix(digits, radix).ok().map(Word)
    }

    /// Returns the value as `u64` if it fits.
    pub fn to_u64(&self) -> Option<u64> {
        u64::try_from(self.0).ok()
    }
}

impl From<u8> for Word {
    fn from(value: u8) -> Self {
        Word(U256::from(value))
    }
}

impl From<u64> for Word {
    fn from(value: u64) -> Self {
        Word(U256::from(value))
    }
}

impl From<U256> for Word {
    fn from(value: U256) -> Self {
        Word(value)
    }
}

impl From<Word> for U256 {
    fn from(value: Word) -> Self {
        value.0
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::LowerHex for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
