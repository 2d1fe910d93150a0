//! Random oblivious transfer protocols over a [`Channel`].
//!
//! - base OT: "Simplest OT" [[CO15](https://eprint.iacr.org/2015/267)]
//! - semi-honest OT extension: optimized [[IKNP03](https://www.iacr.org/archive/crypto2003/27290145/27290145.pdf)]
//!   protocol
//! - malicious OT extension: optimized [[KOS15](https://eprint.iacr.org/2015/546.pdf)]
//!   protocol, optionally reusing cached base OTs (see [`cache`])
//!
//! A TCP channel can not be multiplexed, so protocol instances do not own their
//! channel. Every operation borrows it for its duration instead.
//!
//! The [`RandomOt`] trait is the capability the bridge depends on. It is
//! implemented by [`OtExtension`](extension::OtExtension) for both security
//! levels and accepts any number of OTs.
use std::{fmt::Debug, future::Future};

use rand::{CryptoRng, Rng, distr, prelude::Distribution};
use rotbridge_core::Block;
use rotbridge_net::Channel;
use subtle::Choice;

pub mod base;
pub mod cache;
pub mod extension;
pub mod phase;

/// A random OT sender.
pub trait RotSender: Send {
    /// The error type returned by send operations.
    type Error;

    /// Send `count` many random OTs over `conn`.
    fn send(
        &mut self,
        conn: &mut Channel,
        count: usize,
    ) -> impl Future<Output = Result<Vec<[Block; 2]>, Self::Error>> + Send;
}

/// A random OT receiver.
pub trait RotReceiver: Send {
    /// The error type returned by receive operations.
    type Error;

    /// Receive `choices.len()` many random OTs over `conn`.
    fn receive(
        &mut self,
        conn: &mut Channel,
        choices: &[Choice],
    ) -> impl Future<Output = Result<Vec<Block>, Self::Error>> + Send;
}

/// Batch random OT of arbitrary size, in either role.
///
/// For the i-th OT the receiver's output equals `ots[i][choices[i]]` of the
/// sender.
pub trait RandomOt: Send {
    type Error;

    /// Produce `count` random message pairs shared with the receiving peer.
    fn batch_send(
        &mut self,
        conn: &mut Channel,
        count: usize,
    ) -> impl Future<Output = Result<Vec<[Block; 2]>, Self::Error>> + Send;

    /// Obtain one message of every pair, selected by `choices`.
    fn batch_receive(
        &mut self,
        conn: &mut Channel,
        choices: &[Choice],
    ) -> impl Future<Output = Result<Vec<Block>, Self::Error>> + Send;
}

impl<S: RotSender> RotSender for &mut S {
    type Error = S::Error;

    fn send(
        &mut self,
        conn: &mut Channel,
        count: usize,
    ) -> impl Future<Output = Result<Vec<[Block; 2]>, Self::Error>> + Send {
        (*self).send(conn, count)
    }
}

impl<R: RotReceiver> RotReceiver for &mut R {
    type Error = R::Error;

    fn receive(
        &mut self,
        conn: &mut Channel,
        choices: &[Choice],
    ) -> impl Future<Output = Result<Vec<Block>, Self::Error>> + Send {
        (*self).receive(conn, choices)
    }
}

/// Marker trait for OT implementations secure against semi-honest adversaries.
pub trait SemiHonest {}

/// Marker trait for OT implementations secure against malicious adversaries.
pub trait Malicious: SemiHonest {}

/// Used to abstract over [`SemiHonestMarker`] or [`MaliciousMarker`]
pub trait Security: Send + Sync + Debug + Copy + Clone + private::Sealed {
    const MALICIOUS_SECURITY: bool;
}

/// Used as a marker type for semi-honest security OT implementation.
#[derive(Copy, Clone, Debug)]
pub struct SemiHonestMarker;

impl Security for SemiHonestMarker {
    const MALICIOUS_SECURITY: bool = false;
}

/// Used as a marker type for malicious security OT implementation.
#[derive(Copy, Clone, Debug)]
pub struct MaliciousMarker;

impl Security for MaliciousMarker {
    const MALICIOUS_SECURITY: bool = true;
}

mod private {
    pub trait Sealed {}

    impl Sealed for super::SemiHonestMarker {}

    impl Sealed for super::MaliciousMarker {}
}

/// Sample `count` many [`Choice`]es using the provided rng.
pub fn random_choices<RNG: Rng + CryptoRng>(count: usize, rng: &mut RNG) -> Vec<Choice> {
    let uniform = distr::Uniform::new(0, 2).expect("correct range");
    uniform
        .sample_iter(rng)
        .take(count)
        .map(Choice::from)
        .collect()
}
