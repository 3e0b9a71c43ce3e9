//! Primitive types shared by the dynamic SSZ codec and its code generator.

use std::fmt;

use ruint::Uint;

/// A 128-bit unsigned integer (two 64-bit limbs).
pub type U128 = Uint<128, 2>;

/// A 256-bit unsigned integer (four 64-bit limbs).
pub type U256 = Uint<256, 4>;

/// A 32-byte hash, the output size of hash-tree-root.
pub type Hash256 = FixedBytes<32>;

/// A fixed-size byte array with hex conversions.
///
/// A thin wrapper around `[u8; N]` so roots and addresses get `Display`,
/// hex parsing and slice conversions without pulling in an Ethereum type
/// crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixedBytes<const N: usize>(pub [u8; N]);

impl<const N: usize> FixedBytes<N> {
    /// All-zero bytes.
    pub const fn zero() -> Self {
        Self([0u8; N])
    }

    /// Copies from `slice`, zero-padding on the right when it is shorter
    /// than `N`. Longer input is truncated.
    pub fn from_slice(slice: &[u8]) -> Self {
        let mut out = [0u8; N];
        let len = slice.len().min(N);
        out[..len].copy_from_slice(&slice[..len]);
        Self(out)
    }

    /// Parses a hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        if bytes.len() != N {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    /// The contents as a byte slice.
    pub const fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl<const N: usize> Default for FixedBytes<N> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<const N: usize> AsRef<[u8]> for FixedBytes<N> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> From<[u8; N]> for FixedBytes<N> {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes)
    }
}

impl<const N: usize> fmt::Display for FixedBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Hash256 {
    /// A hash filled with zeros.
    pub const ZERO: Self = Self::zero();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let h = Hash256::from_hex(
            "0x4138be0e47d6daea84065f2a1e4435e16d2b269f9c2c8fcf9e6cf03de1d5026e",
        )
        .unwrap();
        assert_eq!(
            h.to_string(),
            "0x4138be0e47d6daea84065f2a1e4435e16d2b269f9c2c8fcf9e6cf03de1d5026e"
        );
    }

    #[test]
    fn from_slice_pads() {
        let h = Hash256::from_slice(&[1, 2, 3]);
        assert_eq!(h.0[0], 1);
        assert_eq!(h.0[3], 0);
        assert!(!h.is_zero());
        assert!(Hash256::ZERO.is_zero());
    }

    #[test]
    fn rejects_wrong_length_hex() {
        assert!(Hash256::from_hex("0xabcd").is_err());
    }
}
