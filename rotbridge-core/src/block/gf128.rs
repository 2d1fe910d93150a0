//! Arithmetic in GF(2^128) modulo `x^128 + x^7 + x^2 + x + 1`.
//!
//! The malicious OT extension check only needs carry-less multiplication and
//! reduction. This is a portable, constant-time implementation.
use crate::Block;

impl Block {
    /// Carry-less multiplication of two blocks. Returns the `(low, high)`
    /// halves of the 256-bit product.
    #[inline]
    pub fn clmul(&self, rhs: &Self) -> (Self, Self) {
        let (a0, a1) = (self.low(), self.high());
        let (b0, b1) = (rhs.low(), rhs.high());
        let lo = clmul64(a0, b0);
        let hi = clmul64(a1, b1);
        let mid = clmul64(a0, b1) ^ clmul64(a1, b0);
        let low = lo ^ (mid << 64);
        let high = hi ^ (mid >> 64);
        (Block::from(low), Block::from(high))
    }

    /// Reduce a 256-bit carry-less product modulo the GCM polynomial.
    #[inline]
    pub fn gf_reduce(low: &Self, high: &Self) -> Self {
        let low = u128::from(*low);
        let high = u128::from(*high);
        // x^128 = x^7 + x^2 + x + 1. Shifting `high` by 1, 2 and 7 overflows
        // into bits >= 128 which are folded a second time.
        let overflow = (high >> 127) ^ (high >> 126) ^ (high >> 121);
        let folded = high ^ (high << 1) ^ (high << 2) ^ (high << 7);
        let overflow = overflow ^ (overflow << 1) ^ (overflow << 2) ^ (overflow << 7);
        Block::from(low ^ folded ^ overflow)
    }

    /// Multiplication in GF(2^128).
    #[inline]
    pub fn gf_mul(&self, rhs: &Self) -> Self {
        let (low, high) = self.clmul(rhs);
        Block::gf_reduce(&low, &high)
    }
}

#[inline]
fn clmul64(a: u64, b: u64) -> u128 {
    let a = a as u128;
    let mut acc = 0_u128;
    for i in 0..64 {
        // mask is all ones iff bit i of b is set
        let mask = 0_u128.wrapping_sub(((b >> i) & 1) as u128);
        acc ^= (a << i) & mask;
    }
    acc
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use crate::Block;

    #[test]
    fn clmul_small_values() {
        // (x + 1) * (x + 1) = x^2 + 1 in GF(2)[x]
        let (low, high) = Block::from(0b11_u128).clmul(&Block::from(0b11_u128));
        assert_eq!(0b101, u128::from(low));
        assert_eq!(Block::ZERO, high);
    }

    #[test]
    fn clmul_crosses_halves() {
        let a = Block::from(1_u128 << 127);
        let (low, high) = a.clmul(&Block::from(0b10_u128));
        assert_eq!(Block::ZERO, low);
        assert_eq!(1, u128::from(high));
    }

    #[test]
    fn reduce_x128() {
        // x^128 reduces to x^7 + x^2 + x + 1
        let reduced = Block::gf_reduce(&Block::ZERO, &Block::ONE);
        assert_eq!(0b1000_0111, u128::from(reduced));
    }

    #[test]
    fn gf_mul_identity_and_commutativity() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..32 {
            let a: Block = rng.random();
            let b: Block = rng.random();
            assert_eq!(a, a.gf_mul(&Block::ONE));
            assert_eq!(a.gf_mul(&b), b.gf_mul(&a));
        }
    }

    #[test]
    fn gf_mul_distributes_over_xor() {
        let mut rng = StdRng::seed_from_u64(24);
        for _ in 0..32 {
            let a: Block = rng.random();
            let b: Block = rng.random();
            let c: Block = rng.random();
            assert_eq!(a.gf_mul(&(b ^ c)), a.gf_mul(&b) ^ a.gf_mul(&c));
        }
    }

    #[test]
    fn gf_mul_associative() {
        let mut rng = StdRng::seed_from_u64(7);
        let a: Block = rng.random();
        let b: Block = rng.random();
        let c: Block = rng.random();
        assert_eq!(a.gf_mul(&b).gf_mul(&c), a.gf_mul(&b.gf_mul(&c)));
    }
}
