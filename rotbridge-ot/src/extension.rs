//! Fast OT extension using optimized [[IKNP03](https://www.iacr.org/archive/crypto2003/27290145/27290145.pdf)] (semi-honest)
//! or [[KOS15]](https://eprint.iacr.org/2015/546.pdf) (malicious) protocol.
//!
//! ## Batching
//! The protocols compute the OTs in batches. While the receiver streams the
//! rows of a batch, the sender already transposes and hashes the previous one.
//! The [`DEFAULT_OT_BATCH_SIZE`] can be changed using the corresponding methods
//! on the sender and receiver (e.g. [`OtExtensionSender::with_batch_size`]).
//!
//! ## Compute
//! The CPU heavy part runs on a [`ComputePool`]. Hashing and the malicious
//! check are parallelized over the threads of the pool. Without an explicit
//! pool, a single threaded one is created on first use.
//!
//! ## Malicious check
//! The receiver commits to a seed before the extension. After the extension
//! the sender reveals its seed, the receiver opens its commitment and both
//! derive the random challenges from the xor of both seeds. 128 additional
//! OTs are computed and discarded to mask the receiver's choices in the check.
use std::{marker::PhantomData, mem};

use bytemuck::cast_slice_mut;
use rand::{Rng, RngCore, SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use rotbridge_core::{
    Block,
    aes_hash::FIXED_KEY_HASH,
    aes_rng::AesRng,
    compute::{ComputePool, ComputePoolError, TokioRayonJoinHandle},
    random_oracle::{self, Hash},
    transpose::transpose_bitmatrix,
};
use rotbridge_net::{Channel, ChannelError};
use subtle::{Choice, ConditionallySelectable};
use tokio::sync::mpsc;
use tracing::{Level, debug, warn};

use crate::{
    Malicious, MaliciousMarker, RandomOt, RotReceiver, RotSender, Security, SemiHonest,
    SemiHonestMarker,
    base::{self, SimplestOt},
    cache::{CacheConfig, CacheRole, Cached, ReceiverBaseOts, SenderBaseOts},
    phase, random_choices,
};

pub const BASE_OT_COUNT: usize = 128;

pub const DEFAULT_OT_BATCH_SIZE: usize = 2_usize.pow(16);

/// OTs consumed by the malicious check.
const KOS_EXTRA_OTS: usize = 128;

/// Number of blocks per parallel hashing or check task.
const PAR_CHUNK: usize = 4096;

/// OT extension sender generic over its [`Security`] level.
pub struct OtExtensionSender<S: Security> {
    rng: StdRng,
    base_ot: SimplestOt,
    base_rngs: Vec<AesRng>,
    base_choices: Vec<Choice>,
    delta: Option<Block>,
    batch_size: usize,
    pool: Option<ComputePool>,
    cache: Option<CacheConfig>,
    security: PhantomData<S>,
}

/// OT extension receiver generic over its [`Security`] level.
pub struct OtExtensionReceiver<S: Security> {
    rng: StdRng,
    base_ot: SimplestOt,
    base_rngs: Vec<[AesRng; 2]>,
    batch_size: usize,
    pool: Option<ComputePool>,
    cache: Option<CacheConfig>,
    security: PhantomData<S>,
}

/// Sender and receiver in one value. Accepts any number of OTs.
pub struct OtExtension<S: Security> {
    rng: StdRng,
    sender: OtExtensionSender<S>,
    receiver: OtExtensionReceiver<S>,
}

/// SemiHonest OT extension sender alias.
pub type SemiHonestOtExtensionSender = OtExtensionSender<SemiHonestMarker>;
/// SemiHonest OT extension receiver alias.
pub type SemiHonestOtExtensionReceiver = OtExtensionReceiver<SemiHonestMarker>;

/// Malicious OT extension sender alias.
pub type MaliciousOtExtensionSender = OtExtensionSender<MaliciousMarker>;
/// Malicious OT extension receiver alias.
pub type MaliciousOtExtensionReceiver = OtExtensionReceiver<MaliciousMarker>;

/// Error type returned by the OT extension protocols.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("unable to compute base OTs")]
    BaseOT(#[from] base::Error),
    #[error("channel error")]
    Channel(#[from] ChannelError),
    #[error("unable to create compute pool")]
    ComputePool(#[from] ComputePoolError),
    /// Only possible for malicious variant.
    #[error("Commitment does not match seed")]
    WrongCommitment,
    /// Only possible for malicious variant.
    #[error("malicious check failed")]
    MaliciousCheck,
    #[error("compute task panicked or was dropped")]
    ComputeTask,
}

impl Error {
    /// The channel error this error was caused by, if any.
    pub fn channel_error(&self) -> Option<&ChannelError> {
        match self {
            Error::Channel(err) | Error::BaseOT(base::Error::Channel(err)) => Some(err),
            _ => None,
        }
    }
}

impl<S: Security> OtExtensionSender<S> {
    pub fn new() -> Self {
        Self::new_with_rng(StdRng::from_os_rng())
    }

    /// For an rng seeded with a fixed seed, the output is deterministic.
    pub fn new_with_rng(mut rng: StdRng) -> Self {
        let base_ot = SimplestOt::new_with_rng(StdRng::from_rng(&mut rng));
        Self {
            rng,
            base_ot,
            base_rngs: vec![],
            base_choices: vec![],
            delta: None,
            batch_size: DEFAULT_OT_BATCH_SIZE,
            pool: None,
            cache: None,
            security: PhantomData,
        }
    }

    /// Set the OT batch size for the sender.
    ///
    /// If the sender batch size is changed, the receiver's must also be changed
    /// (see [`OtExtensionReceiver::with_batch_size`]).
    ///
    /// # Panics
    /// If `batch_size` is not a positive multiple of 128.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        assert_valid_batch_size(batch_size);
        self.batch_size = batch_size;
        self
    }

    pub fn with_compute_pool(mut self, pool: ComputePool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Reuse base OTs stored in `cache`. Only used by the malicious protocol.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The currently configured OT batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns true if base OTs have been performed. Subsequent calls to send
    /// will not perform base OTs again.
    pub fn has_base_ots(&self) -> bool {
        self.base_rngs.len() == BASE_OT_COUNT
    }

    /// Perform base OTs for later extension, or take them from the cache.
    pub async fn do_base_ots(&mut self, conn: &mut Channel) -> Result<(), Error> {
        let cached = if S::MALICIOUS_SECURITY {
            let cached = self
                .cache
                .as_ref()
                .and_then(|c| c.load::<SenderBaseOts>(CacheRole::Sender));
            exchange_cache_key(conn, cached).await?
        } else {
            None
        };
        let Cached { id, epoch, state } = match cached {
            Some(cached) => cached,
            None => {
                let base_choices = random_choices(BASE_OT_COUNT, &mut self.rng);
                let seeds = self.base_ot.receive(conn, &base_choices).await?;
                let delta = Block::from_choices(&base_choices);
                Cached {
                    id: fresh_cache_id::<S>(conn, &mut self.rng).await?,
                    epoch: 0,
                    state: SenderBaseOts { delta, seeds },
                }
            }
        };
        self.base_rngs = state
            .derive_seeds(epoch)
            .into_iter()
            .map(AesRng::from_seed)
            .collect();
        self.base_choices = state.choices();
        self.delta = Some(state.delta);
        if let (true, Some(cache)) = (S::MALICIOUS_SECURITY, &self.cache) {
            cache.store(CacheRole::Sender, id, epoch + 1, &state);
        }
        Ok(())
    }
}

impl<S: Security> Default for OtExtensionSender<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl SemiHonest for OtExtensionSender<SemiHonestMarker> {}
/// A maliciously secure sender also offers semi-honest security at decreased
/// performance.
impl SemiHonest for OtExtensionSender<MaliciousMarker> {}

impl Malicious for OtExtensionSender<MaliciousMarker> {}

impl<S: Security> RotSender for OtExtensionSender<S> {
    type Error = Error;

    /// Sender part of OT extension.
    ///
    /// # Panics
    /// - If `count` is not divisable by 128.
    #[tracing::instrument(level = Level::DEBUG, skip_all, fields(count = count))]
    #[tracing::instrument(target = "rotbridge_metrics", level = Level::TRACE, skip_all, fields(phase = phase::OT_EXTENSION))]
    async fn send(&mut self, conn: &mut Channel, count: usize) -> Result<Vec<[Block; 2]>, Error> {
        assert_eq!(0, count % 128, "count must be multiple of 128");
        let num_extra = (S::MALICIOUS_SECURITY as usize) * KOS_EXTRA_OTS;
        let sizes = batch_sizes(count, self.batch_size, num_extra);

        if !self.has_base_ots() {
            self.do_base_ots(conn).await?;
        }
        let delta = self.delta.expect("base OTs are done");
        let pool = default_pool(&mut self.pool)?;

        let their_seed_comm: Option<[u8; 32]> = if S::MALICIOUS_SECURITY {
            Some(conn.recv_msg().await?)
        } else {
            None
        };

        // channel for communication between async task and compute thread
        let (ch_s, ch_r) = std::sync::mpsc::channel::<Vec<Block>>();
        // take these to move them into compute thread, will be returned via join handle
        let mut base_rngs = mem::take(&mut self.base_rngs);
        let base_choices = mem::take(&mut self.base_choices);
        let sizes_th = sizes.clone();

        let jh = pool.spawn_compute(move || {
            let mut ots = vec![[Block::ZERO; 2]; count + num_extra];
            let max_batch = sizes_th.iter().copied().max().unwrap_or(0);
            let mut transposed = vec![Block::ZERO; max_batch];
            let mut offset = 0;

            for batch_size in sizes_th {
                let ot_batch = &mut ots[offset..offset + batch_size];
                offset += batch_size;
                let cols_byte_batch = batch_size / 8;
                // we temporarily use the output OT buffer to hold the current chunk of the Q
                // matrix which we XOR with our received row or 0 and then
                // transpose into `transposed`
                let q_mat: &mut [u8] = cast_slice_mut(&mut ot_batch[..batch_size / 2]);
                for ((q_row, base_rng), base_choice) in q_mat
                    .chunks_exact_mut(cols_byte_batch)
                    .zip(&mut base_rngs)
                    .zip(&base_choices)
                {
                    base_rng.fill_bytes(q_row);
                    let recv_row = ch_r.recv()?;
                    // q_row ^= recv_row iff base_choice, in constant time
                    let choice_mask =
                        Block::conditional_select(&Block::ZERO, &Block::ONES, *base_choice);
                    let q_row: &mut [Block] = cast_slice_mut(q_row);
                    for (q, u) in q_row.iter_mut().zip(&recv_row) {
                        *q ^= *u & choice_mask;
                    }
                }
                transpose_bitmatrix(
                    q_mat,
                    cast_slice_mut(&mut transposed[..batch_size]),
                    BASE_OT_COUNT,
                );

                for (q, ot) in transposed.iter().zip(ot_batch.iter_mut()) {
                    *ot = [*q, *q ^ delta];
                }

                if !S::MALICIOUS_SECURITY {
                    ot_batch.par_chunks_mut(PAR_CHUNK / 2).for_each(|chunk| {
                        FIXED_KEY_HASH.cr_hash_slice_mut(cast_slice_mut(chunk));
                    });
                }
            }
            Ok::<_, Error>((ots, base_rngs, base_choices))
        });

        for &batch_size in &sizes {
            for _ in 0..BASE_OT_COUNT {
                let mut recv_row = vec![Block::ZERO; batch_size / Block::BITS];
                conn.recv_bytes(cast_slice_mut(&mut recv_row[..])).await?;
                if ch_s.send(recv_row).is_err() {
                    // the compute task only drops the receiver if it failed
                    return Err(compute_failure(jh).await);
                }
            }
        }

        let (ots, base_rngs, base_choices) = jh.await.map_err(|_| Error::ComputeTask)??;
        self.base_rngs = base_rngs;
        self.base_choices = base_choices;

        match their_seed_comm {
            Some(comm) => {
                let my_seed = self.rng.random();
                let checked = sender_check(conn, &pool, ots, count, delta, my_seed, comm).await;
                if let Err(Error::MaliciousCheck | Error::WrongCommitment) = checked {
                    // the base OTs can not be trusted anymore
                    self.base_rngs.clear();
                    if let Some(cache) = &self.cache {
                        discard_cache(cache);
                    }
                }
                checked
            }
            None => Ok(ots),
        }
    }
}

#[tracing::instrument(target = "rotbridge_metrics", level = Level::TRACE, skip_all, fields(phase = phase::MALICIOUS_CHECK))]
async fn sender_check(
    conn: &mut Channel,
    pool: &ComputePool,
    mut ots: Vec<[Block; 2]>,
    count: usize,
    delta: Block,
    my_seed: Block,
    their_seed_comm: [u8; 32],
) -> Result<Vec<[Block; 2]>, Error> {
    conn.send_msg(&my_seed).await?;
    let their_seed: Block = conn.recv_msg().await?;
    if commit(their_seed) != Hash::from_bytes(their_seed_comm) {
        return Err(Error::WrongCommitment);
    }
    let (x, t): (Block, Block) = conn.recv_msg().await?;
    let seed = my_seed ^ their_seed;

    pool.spawn_compute(move || {
        let q = fold_challenges(&ots, seed, |[q, _]| *q);
        if x.gf_mul(&delta) ^ q != t {
            return Err(Error::MaliciousCheck);
        }
        ots.truncate(count);
        // the tweak for both messages of OT i is i
        cast_slice_mut::<_, Block>(&mut ots[..])
            .par_chunks_mut(PAR_CHUNK)
            .enumerate()
            .for_each(|(chunk_idx, chunk)| {
                let offset = chunk_idx * PAR_CHUNK;
                FIXED_KEY_HASH.tccr_hash_slice_mut(chunk, |idx| Block::from((offset + idx) / 2));
            });
        Ok(ots)
    })
    .await
    .map_err(|_| Error::ComputeTask)?
}

impl SemiHonest for OtExtensionReceiver<SemiHonestMarker> {}
impl SemiHonest for OtExtensionReceiver<MaliciousMarker> {}

impl Malicious for OtExtensionReceiver<MaliciousMarker> {}

impl<S: Security> OtExtensionReceiver<S> {
    pub fn new() -> Self {
        Self::new_with_rng(StdRng::from_os_rng())
    }

    /// For an rng seeded with a fixed seed, the output is deterministic.
    pub fn new_with_rng(mut rng: StdRng) -> Self {
        let base_ot = SimplestOt::new_with_rng(StdRng::from_rng(&mut rng));
        Self {
            rng,
            base_ot,
            base_rngs: vec![],
            batch_size: DEFAULT_OT_BATCH_SIZE,
            pool: None,
            cache: None,
            security: PhantomData,
        }
    }

    /// Set the OT batch size for the receiver.
    ///
    /// If the receiver batch size is changed, the senders's must also be
    /// changed (see [`OtExtensionSender::with_batch_size`]).
    ///
    /// # Panics
    /// If `batch_size` is not a positive multiple of 128.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        assert_valid_batch_size(batch_size);
        self.batch_size = batch_size;
        self
    }

    pub fn with_compute_pool(mut self, pool: ComputePool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Reuse base OTs stored in `cache`. Only used by the malicious protocol.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The currently configured OT batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns true if base OTs have been performed. Subsequent calls to
    /// receive will not perform base OTs again.
    pub fn has_base_ots(&self) -> bool {
        self.base_rngs.len() == BASE_OT_COUNT
    }

    /// Perform base OTs for later extension, or take them from the cache.
    pub async fn do_base_ots(&mut self, conn: &mut Channel) -> Result<(), Error> {
        let cached = if S::MALICIOUS_SECURITY {
            let cached = self
                .cache
                .as_ref()
                .and_then(|c| c.load::<ReceiverBaseOts>(CacheRole::Receiver));
            exchange_cache_key(conn, cached).await?
        } else {
            None
        };
        let Cached { id, epoch, state } = match cached {
            Some(cached) => cached,
            None => {
                let seeds = self.base_ot.send(conn, BASE_OT_COUNT).await?;
                Cached {
                    id: fresh_cache_id::<S>(conn, &mut self.rng).await?,
                    epoch: 0,
                    state: ReceiverBaseOts { seeds },
                }
            }
        };
        self.base_rngs = state
            .derive_seeds(epoch)
            .into_iter()
            .map(|[s0, s1]| [AesRng::from_seed(s0), AesRng::from_seed(s1)])
            .collect();
        if let (true, Some(cache)) = (S::MALICIOUS_SECURITY, &self.cache) {
            cache.store(CacheRole::Receiver, id, epoch + 1, &state);
        }
        Ok(())
    }
}

impl<S: Security> Default for OtExtensionReceiver<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Security> RotReceiver for OtExtensionReceiver<S> {
    type Error = Error;

    /// Receiver part of OT extension.
    ///
    /// # Panics
    /// - If `choices.len()` is not divisable by 128.
    #[tracing::instrument(level = Level::DEBUG, skip_all, fields(count = choices.len()))]
    #[tracing::instrument(target = "rotbridge_metrics", level = Level::TRACE, skip_all, fields(phase = phase::OT_EXTENSION))]
    async fn receive(
        &mut self,
        conn: &mut Channel,
        choices: &[Choice],
    ) -> Result<Vec<Block>, Error> {
        assert_eq!(
            0,
            choices.len() % 128,
            "choices.len() must be multiple of 128"
        );
        let count = choices.len();
        let num_extra = (S::MALICIOUS_SECURITY as usize) * KOS_EXTRA_OTS;
        let sizes = batch_sizes(count, self.batch_size, num_extra);

        if !self.has_base_ots() {
            self.do_base_ots(conn).await?;
        }
        let pool = default_pool(&mut self.pool)?;

        let my_seed = if S::MALICIOUS_SECURITY {
            let seed: Block = self.rng.random();
            conn.send_msg(commit(seed).as_bytes()).await?;
            Some(seed)
        } else {
            None
        };

        let mut all_choices = choices.to_vec();
        all_choices.extend(random_choices(num_extra, &mut self.rng));
        let choice_vec = choices_to_u8_vec(&all_choices);

        let (ch_s, mut ch_r) = mpsc::unbounded_channel::<Vec<u8>>();
        let mut base_rngs = mem::take(&mut self.base_rngs);

        let jh = pool.spawn_compute(move || {
            let mut ots = vec![Block::ZERO; count + num_extra];
            let max_batch = sizes.iter().copied().max().unwrap_or(0);
            let mut t_mat = vec![0_u8; BASE_OT_COUNT * max_batch / 8];
            let mut offset = 0;

            for batch_size in sizes {
                let cols_byte_batch = batch_size / 8;
                let choice_batch = &choice_vec[offset / 8..(offset + batch_size) / 8];
                let rows = t_mat.chunks_exact_mut(cols_byte_batch);
                for (row, [rng1, rng2]) in rows.zip(&mut base_rngs) {
                    rng1.fill_bytes(row);
                    let mut send_row = vec![0_u8; cols_byte_batch];
                    rng2.fill_bytes(&mut send_row);
                    for ((u, t), choices) in send_row.iter_mut().zip(row.iter()).zip(choice_batch) {
                        *u ^= *t ^ *choices;
                    }
                    ch_s.send(send_row)?;
                }
                let output_chunk = &mut ots[offset..offset + batch_size];
                offset += batch_size;
                transpose_bitmatrix(
                    &t_mat[..BASE_OT_COUNT * cols_byte_batch],
                    cast_slice_mut(&mut output_chunk[..]),
                    BASE_OT_COUNT,
                );
                if !S::MALICIOUS_SECURITY {
                    output_chunk.par_chunks_mut(PAR_CHUNK).for_each(|chunk| {
                        FIXED_KEY_HASH.cr_hash_slice_mut(chunk);
                    });
                }
            }
            Ok::<_, Error>((ots, base_rngs, all_choices))
        });

        while let Some(row) = ch_r.recv().await {
            conn.send_bytes(&row).await?;
        }
        conn.flush().await?;

        let (ots, base_rngs, all_choices) = jh.await.map_err(|_| Error::ComputeTask)??;
        self.base_rngs = base_rngs;

        match my_seed {
            Some(my_seed) => receiver_check(conn, &pool, ots, all_choices, count, my_seed).await,
            None => Ok(ots),
        }
    }
}

#[tracing::instrument(target = "rotbridge_metrics", level = Level::TRACE, skip_all, fields(phase = phase::MALICIOUS_CHECK))]
async fn receiver_check(
    conn: &mut Channel,
    pool: &ComputePool,
    mut ots: Vec<Block>,
    choices: Vec<Choice>,
    count: usize,
    my_seed: Block,
) -> Result<Vec<Block>, Error> {
    let their_seed: Block = conn.recv_msg().await?;
    conn.send_msg(&my_seed).await?;
    let seed = my_seed ^ their_seed;

    let (ots, x, t) = pool
        .spawn_compute(move || {
            // a choice bit as a field element is either zero or one
            let x = fold_challenges(&choices, seed, |choice| {
                Block::conditional_select(&Block::ZERO, &Block::ONE, *choice)
            });
            let t = fold_challenges(&ots, seed, |t| *t);
            ots.truncate(count);
            ots.par_chunks_mut(PAR_CHUNK)
                .enumerate()
                .for_each(|(chunk_idx, chunk)| {
                    let offset = chunk_idx * PAR_CHUNK;
                    FIXED_KEY_HASH.tccr_hash_slice_mut(chunk, |idx| Block::from(offset + idx));
                });
            (ots, x, t)
        })
        .await
        .map_err(|_| Error::ComputeTask)?;

    conn.send_msg(&(x, t)).await?;
    conn.flush().await?;
    Ok(ots)
}

/// Compute `sum_i chi_i * f(v_i)` in GF(2^128) where the `chi_i` are
/// generated from `seed`.
fn fold_challenges<T: Sync>(values: &[T], seed: Block, f: impl Fn(&T) -> Block + Sync) -> Block {
    let mut rng = AesRng::from_seed(seed);
    // every chunk gets its own challenge generator so the sum can be
    // computed in parallel and is independent of the thread count
    let chunk_rngs: Vec<AesRng> = values.chunks(PAR_CHUNK).map(|_| rng.fork()).collect();
    let (low, high) = values
        .par_chunks(PAR_CHUNK)
        .zip(chunk_rngs)
        .map(|(chunk, mut rng)| {
            let mut acc = (Block::ZERO, Block::ZERO);
            for v in chunk {
                let challenge: Block = rng.random();
                let (low, high) = f(v).clmul(&challenge);
                acc.0 ^= low;
                acc.1 ^= high;
            }
            acc
        })
        .reduce(
            || (Block::ZERO, Block::ZERO),
            |a, b| (a.0 ^ b.0, a.1 ^ b.1),
        );
    Block::gf_reduce(&low, &high)
}

impl<S: Security> OtExtension<S> {
    pub fn new() -> Self {
        Self::new_with_rng(StdRng::from_os_rng())
    }

    pub fn new_with_rng(mut rng: StdRng) -> Self {
        Self {
            sender: OtExtensionSender::new_with_rng(StdRng::from_rng(&mut rng)),
            receiver: OtExtensionReceiver::new_with_rng(StdRng::from_rng(&mut rng)),
            rng,
        }
    }

    /// See [`OtExtensionSender::with_batch_size`].
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.sender = self.sender.with_batch_size(batch_size);
        self.receiver = self.receiver.with_batch_size(batch_size);
        self
    }

    pub fn with_compute_pool(mut self, pool: ComputePool) -> Self {
        self.sender = self.sender.with_compute_pool(pool.clone());
        self.receiver = self.receiver.with_compute_pool(pool);
        self
    }

    /// Reuse base OTs stored in `cache`. Only used by the malicious protocol.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.sender = self.sender.with_cache(cache.clone());
        self.receiver = self.receiver.with_cache(cache);
        self
    }
}

impl<S: Security> Default for OtExtension<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Security> RandomOt for OtExtension<S> {
    type Error = Error;

    /// Pads `count` to a multiple of 128 and discards the surplus OTs.
    async fn batch_send(
        &mut self,
        conn: &mut Channel,
        count: usize,
    ) -> Result<Vec<[Block; 2]>, Error> {
        if count == 0 {
            return Ok(vec![]);
        }
        let mut ots = self.sender.send(conn, count.next_multiple_of(128)).await?;
        ots.truncate(count);
        Ok(ots)
    }

    /// Pads `choices` with random choices to a multiple of 128 and discards the
    /// surplus OTs.
    async fn batch_receive(
        &mut self,
        conn: &mut Channel,
        choices: &[Choice],
    ) -> Result<Vec<Block>, Error> {
        if choices.is_empty() {
            return Ok(vec![]);
        }
        let padded = choices.len().next_multiple_of(128);
        let mut padded_choices = choices.to_vec();
        padded_choices.extend(random_choices(padded - choices.len(), &mut self.rng));
        let mut ots = self.receiver.receive(conn, &padded_choices).await?;
        ots.truncate(choices.len());
        Ok(ots)
    }
}

/// Exchange id and epoch of both parties' cached base OTs. Returns the cached
/// state if both parties hold the same id and epoch.
async fn exchange_cache_key<T>(
    conn: &mut Channel,
    cached: Option<Cached<T>>,
) -> Result<Option<Cached<T>>, Error> {
    let mine = cached.as_ref().map(|c| (c.id, c.epoch));
    conn.send_msg(&mine).await?;
    let theirs: Option<(Block, u64)> = conn.recv_msg().await?;
    match (mine, theirs) {
        (Some(mine), Some(theirs)) if mine == theirs => {
            debug!(epoch = mine.1, "reusing cached base OTs");
            Ok(cached)
        }
        _ => {
            debug!(
                mine = ?mine.map(|(_, epoch)| epoch),
                theirs = ?theirs.map(|(_, epoch)| epoch),
                "no usable cached base OTs"
            );
            Ok(None)
        }
    }
}

/// Coin toss of the id of freshly computed base OTs. Only the malicious
/// protocol caches base OTs.
async fn fresh_cache_id<S: Security>(conn: &mut Channel, rng: &mut StdRng) -> Result<Block, Error> {
    if !S::MALICIOUS_SECURITY {
        return Ok(Block::ZERO);
    }
    let mine: Block = rng.random();
    conn.send_msg(&mine).await?;
    let theirs: Block = conn.recv_msg().await?;
    Ok(mine ^ theirs)
}

fn discard_cache(cache: &CacheConfig) {
    warn!(identity = cache.identity(), "malicious check failed, removing base OT cache");
    if let Err(err) = cache.clear() {
        warn!(%err, "unable to remove base OT cache");
    }
}

fn batch_sizes(count: usize, batch_size: usize, num_extra: usize) -> Vec<usize> {
    let mut sizes = vec![batch_size; count / batch_size];
    if count % batch_size != 0 {
        sizes.push(count % batch_size);
    }
    if num_extra != 0 {
        sizes.push(num_extra);
    }
    sizes
}

fn assert_valid_batch_size(batch_size: usize) {
    assert!(
        batch_size > 0 && batch_size % 128 == 0,
        "batch_size must be a positive multiple of 128"
    );
}

fn default_pool(pool: &mut Option<ComputePool>) -> Result<ComputePool, Error> {
    if let Some(pool) = pool {
        return Ok(pool.clone());
    }
    Ok(pool.insert(ComputePool::with_threads(1)?).clone())
}

async fn compute_failure<T: Send + 'static>(jh: TokioRayonJoinHandle<Result<T, Error>>) -> Error {
    match jh.await {
        Ok(Err(err)) => err,
        _ => Error::ComputeTask,
    }
}

fn commit(b: Block) -> random_oracle::Hash {
    random_oracle::hash(b.as_bytes())
}

fn choices_to_u8_vec(choices: &[Choice]) -> Vec<u8> {
    assert_eq!(0, choices.len() % 8);
    let mut v = vec![0_u8; choices.len() / 8];
    for (chunk, byte) in choices.chunks_exact(8).zip(&mut v) {
        for (i, choice) in chunk.iter().enumerate() {
            *byte ^= choice.unwrap_u8() << i;
        }
    }
    v
}

impl From<std::sync::mpsc::RecvError> for Error {
    fn from(_: std::sync::mpsc::RecvError) -> Self {
        Error::ComputeTask
    }
}

impl<T> From<mpsc::error::SendError<T>> for Error {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        Error::ComputeTask
    }
}
