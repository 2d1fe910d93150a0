//! Correlation robust AES hash.
//!
//! This implementation of a correlation robust AES hash function
//! is based on the findings of <https://eprint.iacr.org/2019/074>.
use std::sync::LazyLock;

use aes::{
    Aes128,
    cipher::{BlockEncrypt, Key, KeyInit},
};

use crate::{AES_PAR_BLOCKS, Block};

pub struct AesHash {
    aes: Aes128,
}

impl AesHash {
    /// Create a new `AesHash` with the given key.
    pub fn new(key: &Key<Aes128>) -> Self {
        Self {
            aes: Aes128::new(key),
        }
    }

    /// Compute the correlation robust hash of a block.
    ///
    /// # Warning: only secure in semi-honest setting!
    /// See <https://eprint.iacr.org/2019/074> for details.
    pub fn cr_hash_block(&self, x: Block) -> Block {
        let mut x_enc = x.into();
        self.aes.encrypt_block(&mut x_enc);
        x ^ x_enc.into()
    }

    /// Compute the correlation robust hashes of multiple blocks in place.
    ///
    /// Warning: only secure in semi-honest setting!
    /// See <https://eprint.iacr.org/2019/074> for details.
    pub fn cr_hash_slice_mut(&self, x: &mut [Block]) {
        let mut tmp = [aes::Block::default(); AES_PAR_BLOCKS];

        for chunk in x.chunks_mut(AES_PAR_BLOCKS) {
            let tmp = &mut tmp[..chunk.len()];
            for (t, x) in tmp.iter_mut().zip(chunk.iter()) {
                *t = (*x).into();
            }
            self.aes.encrypt_blocks(tmp);
            chunk
                .iter_mut()
                .zip(tmp.iter())
                .for_each(|(x, x_enc)| *x ^= Block::from(*x_enc));
        }
    }

    /// Tweakable circular correlation robust hash `π(π(x) ⊕ i) ⊕ π(x)`.
    ///
    /// `tweak_fn` is called with the index of each block in `x`.
    pub fn tccr_hash_slice_mut(&self, x: &mut [Block], mut tweak_fn: impl FnMut(usize) -> Block) {
        let mut pi_x = [aes::Block::default(); AES_PAR_BLOCKS];
        let mut masked = [aes::Block::default(); AES_PAR_BLOCKS];
        for (chunk_idx, chunk) in x.chunks_mut(AES_PAR_BLOCKS).enumerate() {
            let len = chunk.len();
            for (t, x) in pi_x[..len].iter_mut().zip(chunk.iter()) {
                *t = (*x).into();
            }
            self.aes.encrypt_blocks(&mut pi_x[..len]);
            for (idx, (m, p)) in masked[..len].iter_mut().zip(&pi_x[..len]).enumerate() {
                *m = (Block::from(*p) ^ tweak_fn(chunk_idx * AES_PAR_BLOCKS + idx)).into();
            }
            self.aes.encrypt_blocks(&mut masked[..len]);
            for ((dest, m), p) in chunk.iter_mut().zip(&masked[..len]).zip(&pi_x[..len]) {
                *dest = Block::from(*m) ^ Block::from(*p);
            }
        }
    }
}

/// An `AesHash` with a fixed key.
pub static FIXED_KEY_HASH: LazyLock<AesHash> = LazyLock::new(|| {
    let key = 193502124791825095790518994062991136444_u128.to_le_bytes();
    AesHash::new(&key.into())
});

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::FIXED_KEY_HASH;
    use crate::Block;

    #[test]
    fn slice_hash_matches_block_hash() {
        let mut rng = StdRng::seed_from_u64(1);
        let blocks: Vec<Block> = (0..21).map(|_| rng.random()).collect();
        let mut hashed = blocks.clone();
        FIXED_KEY_HASH.cr_hash_slice_mut(&mut hashed);
        for (b, h) in blocks.iter().zip(&hashed) {
            assert_eq!(FIXED_KEY_HASH.cr_hash_block(*b), *h);
        }
    }

    #[test]
    fn tccr_hash_depends_on_tweak() {
        let mut a = vec![Block::from(5_u128); 3];
        let mut b = a.clone();
        FIXED_KEY_HASH.tccr_hash_slice_mut(&mut a, Block::from);
        FIXED_KEY_HASH.tccr_hash_slice_mut(&mut b, |_| Block::ZERO);
        // same input, different tweaks per index
        assert_ne!(a[0], a[1]);
        assert_ne!(a[1], a[2]);
        // tweak 0 is the same for index 0
        assert_eq!(a[0], b[0]);
        assert_eq!(b[0], b[1]);
    }
}
