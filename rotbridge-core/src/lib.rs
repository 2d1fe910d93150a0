//! Core utilites for the random OT bridge.
//!
//! This crate implements the primitives the OT protocols are built from. The
//! most important type is the 128-bit [`Block`]. As we generally use a
//! security parameter of 128 bits, this type is a convenient way of storing
//! security parameter many bits. Random OT outputs are handed to the bridge as
//! blocks and only narrowed to bytes at the very end.

pub mod aes_hash;
pub mod aes_rng;
pub mod block;
pub mod compute;
pub mod rand_compat;
pub mod random_oracle;
pub mod transpose;

pub use block::Block;

/// Number of Blocks for which hardware accelerated AES can make use of ILP.
///
/// This corresponds to `ParBlocksSize` of the AES backend on the target
/// architecture. Do not depend on the value of the constant.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub const AES_PAR_BLOCKS: usize = 8;
#[cfg(target_arch = "aarch64")]
pub const AES_PAR_BLOCKS: usize = 21;
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
pub const AES_PAR_BLOCKS: usize = 4;
