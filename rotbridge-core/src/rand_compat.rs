//! Adapter from rand_core 0.9 generators to the rand_core 0.6 traits.
//!
//! `curve25519-dalek` still samples scalars through rand_core 0.6, while the
//! rest of the workspace uses rand 0.9.
use rand_core::{CryptoRng, RngCore};

/// Exposes a rand_core 0.9 generator as a rand_core 0.6 one.
///
/// Usually wraps a borrowed generator, e.g. `RngCompat(&mut rng)`, so the
/// caller keeps using it afterwards.
pub struct RngCompat<R>(pub R);

impl<R> RngCompat<R> {
    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<R: RngCore> rand_core_0_6::RngCore for RngCompat<R> {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest)
    }

    // rand_core 0.9 generators are infallible
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core_0_6::Error> {
        self.0.fill_bytes(dest);
        Ok(())
    }
}

impl<R: CryptoRng> rand_core_0_6::CryptoRng for RngCompat<R> {}
