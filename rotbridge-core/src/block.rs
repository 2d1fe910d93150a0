use std::{
    fmt,
    ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Not},
};

use aes::cipher::generic_array::{GenericArray, typenum::U16};
use bytemuck::{Pod, Zeroable};
use rand::{Rng, distr::StandardUniform, prelude::Distribution};
use serde::{Deserialize, Serialize};
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};
use wide::u8x16;

use crate::random_oracle::RandomOracle;

pub mod gf128;

/// A 128-bit block. Uses SIMD operations where available.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct Block(u8x16);

impl Block {
    pub const ZERO: Self = Self(u8x16::ZERO);
    pub const ONES: Self = Self(u8x16::MAX);
    pub const ONE: Self = Self::new(1_u128.to_le_bytes());

    pub const BYTES: usize = 16;
    pub const BITS: usize = 128;

    #[inline]
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(u8x16::new(bytes))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_array_ref()
    }

    #[inline]
    pub fn as_mut_bytes(&mut self) -> &mut [u8; 16] {
        self.0.as_array_mut()
    }

    #[inline]
    pub fn ro_hash(&self) -> blake3::Hash {
        let mut ro = RandomOracle::new();
        ro.update(self.as_bytes());
        ro.finalize()
    }

    ///  Create a block from 128 [`Choice`]s.
    ///
    /// # Panics
    /// If choices.len() != 128
    #[inline]
    pub fn from_choices(choices: &[Choice]) -> Self {
        assert_eq!(128, choices.len(), "choices.len() must be 128");
        let mut bytes = [0_u8; 16];
        for (chunk, byte) in choices.chunks_exact(8).zip(&mut bytes) {
            for (i, choice) in chunk.iter().enumerate() {
                *byte ^= choice.unwrap_u8() << i;
            }
        }
        Self::new(bytes)
    }

    /// The least significant byte of the block.
    ///
    /// This is byte 0 of the little-endian representation, the same byte
    /// `_mm_extract_epi8(block, 0)` returns on x86.
    #[inline]
    pub fn lsb_byte(&self) -> u8 {
        self.as_bytes()[0]
    }

    #[inline]
    pub fn lsb(&self) -> bool {
        self.lsb_byte() & 1 == 1
    }

    #[inline]
    pub fn low(&self) -> u64 {
        (u128::from(*self) & u64::MAX as u128) as u64
    }

    #[inline]
    pub fn high(&self) -> u64 {
        (u128::from(*self) >> 64) as u64
    }
}

macro_rules! impl_bit_op {
    ($op:ident, $f:ident, $op_assign:ident, $f_assign:ident) => {
        impl $op for Block {
            type Output = Self;

            #[inline]
            fn $f(self, rhs: Self) -> Self {
                Self(self.0.$f(rhs.0))
            }
        }

        impl $op_assign for Block {
            #[inline]
            fn $f_assign(&mut self, rhs: Self) {
                *self = (*self).$f(rhs);
            }
        }
    };
}

impl_bit_op!(BitAnd, bitand, BitAndAssign, bitand_assign);
impl_bit_op!(BitOr, bitor, BitOrAssign, bitor_assign);
impl_bit_op!(BitXor, bitxor, BitXorAssign, bitxor_assign);

impl Not for Block {
    type Output = Self;

    #[inline]
    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl Eq for Block {}

impl Distribution<Block> for StandardUniform {
    #[inline]
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Block {
        let mut bytes = [0; 16];
        rng.fill_bytes(&mut bytes);
        Block::new(bytes)
    }
}

impl AsRef<[u8]> for Block {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsMut<[u8]> for Block {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_mut_bytes()
    }
}

impl From<Block> for GenericArray<u8, U16> {
    #[inline]
    fn from(value: Block) -> Self {
        GenericArray::from(*value.as_bytes())
    }
}

impl From<GenericArray<u8, U16>> for Block {
    #[inline]
    fn from(value: GenericArray<u8, U16>) -> Self {
        let mut bytes = [0; 16];
        bytes.copy_from_slice(value.as_slice());
        Self::new(bytes)
    }
}

impl From<Block> for u128 {
    #[inline]
    fn from(value: Block) -> Self {
        u128::from_le_bytes(*value.as_bytes())
    }
}

impl From<u128> for Block {
    #[inline]
    fn from(value: u128) -> Self {
        Self::new(value.to_le_bytes())
    }
}

impl From<usize> for Block {
    fn from(value: usize) -> Self {
        (value as u128).into()
    }
}

impl ConditionallySelectable for Block {
    #[inline]
    // adapted from https://github.com/dalek-cryptography/subtle/blob/369e7463e85921377a5f2df80aabcbbc6d57a930/src/lib.rs#L510-L517
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        // if choice = 0, mask = (-0) = 0000...0000
        // if choice = 1, mask = (-1) = 1111...1111
        let mask = Block::new((-(choice.unwrap_u8() as i128)).to_le_bytes());
        *a ^ (mask & (*a ^ *b))
    }
}

impl fmt::Binary for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Binary::fmt(&u128::from(*self), f)
    }
}

#[cfg(test)]
mod tests {
    use subtle::{Choice, ConditionallySelectable};

    use crate::Block;

    #[test]
    fn test_block_cond_select() {
        let choice = Choice::from(0);
        assert_eq!(
            Block::ZERO,
            Block::conditional_select(&Block::ZERO, &Block::ONES, choice)
        );
        let choice = Choice::from(1);
        assert_eq!(
            Block::ONES,
            Block::conditional_select(&Block::ZERO, &Block::ONES, choice)
        );
    }

    #[test]
    fn test_block_low_high() {
        let b = Block::from(1_u128 | (7_u128 << 64));
        assert_eq!(1, b.low());
        assert_eq!(7, b.high());
    }

    #[test]
    fn test_lsb_byte() {
        let b = Block::from(0xdead_beef_u128);
        assert_eq!(0xef, b.lsb_byte());
        assert!(b.lsb());
        assert!(!Block::from(0x100_u128).lsb());
        assert_eq!(0, Block::from(0x100_u128).lsb_byte());
    }

    #[test]
    fn test_from_choices() {
        let mut choices = vec![Choice::from(0); 128];
        choices[0] = Choice::from(1);
        choices[9] = Choice::from(1);
        choices[127] = Choice::from(1);
        let b = Block::from_choices(&choices);
        assert_eq!(1 | (1 << 9) | (1 << 127), u128::from(b));
    }

    #[test]
    fn test_u128_round_trip_is_little_endian() {
        let b = Block::from(0x0102_u128);
        assert_eq!(&[0x02, 0x01], &b.as_bytes()[..2]);
        assert_eq!(0x0102, u128::from(b));
    }
}
