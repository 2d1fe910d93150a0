//! Simplest-OT base OT protocol by [[CO15]] (malicious security).
//!
//! The sender commits to a random seed alongside its first message and only
//! opens it after receiving the receiver's points. The seed is part of the
//! final hash, so the receiver can not bias the distribution of the OTs.
//! This gives the "uniform message security" of [[MR19]].
//!
//! [CO15]: https://eprint.iacr.org/2015/267
//! [MR19]: https://eprint.iacr.org/2019/706.pdf

use curve25519_dalek::{RistrettoPoint, Scalar, constants::RISTRETTO_BASEPOINT_TABLE};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rotbridge_core::{
    Block,
    rand_compat::RngCompat,
    random_oracle::{Hash, RandomOracle},
};
use rotbridge_net::{Channel, ChannelError};
use subtle::{Choice, ConditionallySelectable};
use tracing::Level;

use crate::{Malicious, RotReceiver, RotSender, SemiHonest, phase};

/// Sender and Receiver for the base OT protocol.
pub struct SimplestOt {
    rng: StdRng,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("channel error during base OT")]
    Channel(#[from] ChannelError),
    #[error("insufficient points received. expected: {expected}, actual: {actual}")]
    InsufficientPoints { expected: usize, actual: usize },
    #[error("seed commitment and seed hash not equal")]
    CommitmentHashesNotEqual,
}

impl SimplestOt {
    pub fn new() -> Self {
        Self::new_with_rng(StdRng::from_os_rng())
    }

    pub fn new_with_rng(rng: StdRng) -> SimplestOt {
        Self { rng }
    }
}

impl Default for SimplestOt {
    fn default() -> Self {
        Self::new()
    }
}

impl SemiHonest for SimplestOt {}

impl Malicious for SimplestOt {}

impl RotSender for SimplestOt {
    type Error = Error;

    #[allow(non_snake_case)]
    #[tracing::instrument(level = Level::DEBUG, skip_all, fields(count = count))]
    #[tracing::instrument(target = "rotbridge_metrics", level = Level::TRACE, skip_all, fields(phase = phase::BASE_OT))]
    async fn send(&mut self, conn: &mut Channel, count: usize) -> Result<Vec<[Block; 2]>, Error> {
        let a = Scalar::random(&mut RngCompat(&mut self.rng));
        let mut A = RISTRETTO_BASEPOINT_TABLE * &a;
        let seed: Block = self.rng.random();
        let seed_commitment = seed.ro_hash();
        conn.send_msg(&(A, *seed_commitment.as_bytes())).await?;

        let B_points: Vec<RistrettoPoint> = conn.recv_msg().await?;
        if B_points.len() != count {
            return Err(Error::InsufficientPoints {
                expected: count,
                actual: B_points.len(),
            });
        }
        // decommit seed
        conn.send_msg(&seed).await?;
        conn.flush().await?;

        A *= a;
        let ots = B_points
            .into_iter()
            .enumerate()
            .map(|(i, mut B)| {
                B *= a;
                let k0 = ro_hash_point(&B, i, seed);
                B -= A;
                let k1 = ro_hash_point(&B, i, seed);
                [k0, k1]
            })
            .collect();
        Ok(ots)
    }
}

impl RotReceiver for SimplestOt {
    type Error = Error;

    #[allow(non_snake_case)]
    #[tracing::instrument(level = Level::DEBUG, skip_all, fields(count = choices.len()))]
    #[tracing::instrument(target = "rotbridge_metrics", level = Level::TRACE, skip_all, fields(phase = phase::BASE_OT))]
    async fn receive(
        &mut self,
        conn: &mut Channel,
        choices: &[Choice],
    ) -> Result<Vec<Block>, Error> {
        let (A, commitment): (RistrettoPoint, [u8; 32]) = conn.recv_msg().await?;

        let (b_points, B_points): (Vec<_>, Vec<_>) = choices
            .iter()
            .map(|choice| {
                let b = Scalar::random(&mut RngCompat(&mut self.rng));
                let B_0 = RISTRETTO_BASEPOINT_TABLE * &b;
                let B_1 = B_0 + A;
                let B_choice = RistrettoPoint::conditional_select(&B_0, &B_1, *choice);
                (b, B_choice)
            })
            .unzip();
        conn.send_msg(&B_points).await?;

        let seed: Block = conn.recv_msg().await?;
        if Hash::from_bytes(commitment) != seed.ro_hash() {
            return Err(Error::CommitmentHashesNotEqual);
        }
        let ots = b_points
            .into_iter()
            .enumerate()
            .map(|(i, b)| ro_hash_point(&(A * b), i, seed))
            .collect();
        Ok(ots)
    }
}

fn ro_hash_point(point: &RistrettoPoint, tweak: usize, seed: Block) -> Block {
    let mut ro = RandomOracle::new();
    ro.update(point.compress().as_bytes());
    ro.update(&tweak.to_le_bytes());
    ro.update(seed.as_bytes());
    let mut out_reader = ro.finalize_xof();
    let mut ret = Block::ZERO;
    out_reader.fill(ret.as_mut_bytes());
    ret
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use rand::{SeedableRng, rngs::StdRng};
    use rotbridge_net::testing::{init_tracing, local_channels};

    use super::SimplestOt;
    use crate::{RotReceiver, RotSender, random_choices};

    #[tokio::test]
    async fn base_rot() -> Result<()> {
        let _g = init_tracing();
        let (mut c1, mut c2) = local_channels().await?;
        let mut rng1 = StdRng::seed_from_u64(42);
        let rng2 = StdRng::seed_from_u64(42 * 42);
        let count = 128;
        let choices = random_choices(count, &mut rng1);

        let mut sender = SimplestOt::new_with_rng(rng1);
        let mut receiver = SimplestOt::new_with_rng(rng2);
        let (s_ot, r_ot) = tokio::try_join!(
            sender.send(&mut c1, count),
            receiver.receive(&mut c2, &choices)
        )?;

        for ((r, s), c) in r_ot.into_iter().zip(s_ot).zip(choices) {
            assert_eq!(r, s[c.unwrap_u8() as usize])
        }
        Ok(())
    }

    #[tokio::test]
    async fn rejects_wrong_point_count() -> Result<()> {
        let _g = init_tracing();
        let (mut c1, mut c2) = local_channels().await?;
        let mut rng = StdRng::seed_from_u64(7);
        let choices = random_choices(64, &mut rng);
        let mut sender = SimplestOt::new_with_rng(StdRng::seed_from_u64(1));
        let mut receiver = SimplestOt::new_with_rng(rng);
        let (send_res, _) = tokio::join!(sender.send(&mut c1, 128), async {
            // the receiver waits for the seed which is never sent, so bound it
            c2.set_io_timeout(std::time::Duration::from_millis(200));
            receiver.receive(&mut c2, &choices).await
        });
        assert!(matches!(
            send_res,
            Err(super::Error::InsufficientPoints {
                expected: 128,
                actual: 64
            })
        ));
        Ok(())
    }
}
