//! RNG based on AES in CTR mode.
//!
//! This implementation is based on the implementation given in the
//! [scuttlebutt](https://github.com/GaloisInc/swanky/blob/4455754abadee07f168079ac45ef33535b0df27d/scuttlebutt/src/rand_aes.rs)
//! crate. Instead of using an own AES implementation, [`AesRng`](`AesRng`) uses
//! the [aes](`aes`) crate.
//!
//! The OT extension expands every base OT seed into a row of the extension
//! matrix with one of these generators, so its throughput bounds the
//! throughput of the whole protocol.
use aes::{
    Aes128,
    cipher::{BlockEncrypt, KeyInit},
};
use rand::{Rng, SeedableRng};
use rand_core::{
    CryptoRng, RngCore,
    block::{BlockRng, BlockRngCore},
};

use crate::{AES_PAR_BLOCKS, Block};

/// This uses AES in a counter-mode to implement a PRG.
#[derive(Clone, Debug)]
pub struct AesRng(BlockRng<AesRngCore>);

impl RngCore for AesRng {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    #[inline]
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let block_len = dest.len() / Block::BYTES * Block::BYTES;
        let (block_bytes, rest_bytes) = dest.split_at_mut(block_len);
        // whole blocks are encrypted directly into dest, skipping the buffer
        self.0.core.encrypt_counters(block_bytes);
        self.0.fill_bytes(rest_bytes);
    }
}

impl SeedableRng for AesRng {
    type Seed = Block;

    #[inline]
    fn from_seed(seed: Self::Seed) -> Self {
        AesRng(BlockRng::new(AesRngCore::from_seed(seed)))
    }
}

impl CryptoRng for AesRng {}

impl AesRng {
    /// Create a new random number generator using a random seed from
    /// `rand::random`.
    #[inline]
    pub fn new() -> Self {
        let seed = rand::random::<Block>();
        AesRng::from_seed(seed)
    }

    /// Create a new RNG using a random seed from this one.
    #[inline]
    pub fn fork(&mut self) -> Self {
        let seed = self.random::<Block>();
        AesRng::from_seed(seed)
    }
}

impl Default for AesRng {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// The core of `AesRng`, used with `BlockRng`.
#[derive(Clone)]
pub struct AesRngCore {
    aes: Aes128,
    counter: u128,
}

impl AesRngCore {
    /// Fill `out` with `E(counter)`, `E(counter + 1)`, ...
    fn encrypt_counters(&mut self, out: &mut [u8]) {
        debug_assert_eq!(0, out.len() % Block::BYTES);
        let mut blocks = [aes::Block::default(); AES_PAR_BLOCKS];
        for out_chunk in out.chunks_mut(AES_PAR_BLOCKS * Block::BYTES) {
            let n = out_chunk.len() / Block::BYTES;
            for blk in &mut blocks[..n] {
                blk.copy_from_slice(&self.counter.to_le_bytes());
                self.counter = self.counter.wrapping_add(1);
            }
            self.aes.encrypt_blocks(&mut blocks[..n]);
            for (dest, blk) in out_chunk.chunks_exact_mut(Block::BYTES).zip(&blocks) {
                dest.copy_from_slice(blk);
            }
        }
    }
}

impl std::fmt::Debug for AesRngCore {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "AesRngCore {{}}")
    }
}

impl BlockRngCore for AesRngCore {
    type Item = u32;
    // eight encrypted counters
    type Results = [u32; 32];

    #[inline]
    fn generate(&mut self, results: &mut Self::Results) {
        self.encrypt_counters(bytemuck::cast_slice_mut(&mut results[..]));
    }
}

impl SeedableRng for AesRngCore {
    type Seed = Block;

    #[inline]
    fn from_seed(seed: Self::Seed) -> Self {
        AesRngCore {
            aes: Aes128::new(&seed.into()),
            counter: 0,
        }
    }
}

impl From<AesRngCore> for AesRng {
    #[inline]
    fn from(core: AesRngCore) -> Self {
        AesRng(BlockRng::new(core))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate() {
        let mut rng = AesRng::new();
        let a = rng.random::<[Block; 8]>();
        let b = rng.random::<[Block; 8]>();
        assert_ne!(a, b);
    }

    #[test]
    fn test_same_seed_same_stream() {
        let seed = Block::from(42_u128);
        let mut rng1 = AesRng::from_seed(seed);
        let mut rng2 = AesRng::from_seed(seed);
        let mut a = vec![0_u8; 1000];
        rng1.fill_bytes(&mut a);
        let mut b = vec![0_u8; 1000];
        rng2.fill_bytes(&mut b);
        assert_eq!(a, b);
        assert_eq!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn whole_blocks_match_buffered_words() {
        let seed = Block::from(7_u128);
        let mut direct = AesRng::from_seed(seed);
        let mut buffered = AesRng::from_seed(seed);
        let mut bytes = [0_u8; 8 * Block::BYTES];
        direct.fill_bytes(&mut bytes);
        let words: Vec<u8> = (0..32)
            .flat_map(|_| buffered.next_u32().to_le_bytes())
            .collect();
        assert_eq!(&bytes[..], &words[..]);
    }
}
