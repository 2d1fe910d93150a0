//! Narrowing of OT blocks to the byte messages handed to the caller.
//!
//! Every block is narrowed to its least significant byte. Only the lowest bit
//! of these bytes is a random OT, the other bits are just as random but must
//! not be relied upon by callers.
use rotbridge_core::Block;

use crate::{config::Role, driver::RawCorrelations};

/// Byte outputs of a batch, keyed by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotOutput {
    Sender { m0: Vec<u8>, m1: Vec<u8> },
    /// `choices` holds one byte, 0 or 1, per OT.
    Receiver { m: Vec<u8>, choices: Vec<u8> },
}

/// Single-bit random OTs, keyed by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotBits {
    Sender { m0: Vec<bool>, m1: Vec<bool> },
    Receiver { m: Vec<bool>, choices: Vec<bool> },
}

/// Caller owned buffers the outputs are written into.
#[derive(Debug)]
pub enum OutputBuffers<'a> {
    Sender {
        m0: &'a mut [u8],
        m1: &'a mut [u8],
    },
    Receiver {
        m: &'a mut [u8],
        choices: &'a mut [u8],
    },
}

impl RotOutput {
    pub fn role(&self) -> Role {
        match self {
            RotOutput::Sender { .. } => Role::Initiator,
            RotOutput::Receiver { .. } => Role::Responder,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RotOutput::Sender { m0, .. } => m0.len(),
            RotOutput::Receiver { m, .. } => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The lowest bit of every byte.
    pub fn to_bits(&self) -> RotBits {
        let bits = |bytes: &[u8]| -> Vec<bool> { bytes.iter().map(|b| b & 1 == 1).collect() };
        match self {
            RotOutput::Sender { m0, m1 } => RotBits::Sender {
                m0: bits(m0),
                m1: bits(m1),
            },
            RotOutput::Receiver { m, choices } => RotBits::Receiver {
                m: bits(m),
                choices: bits(choices),
            },
        }
    }
}

impl OutputBuffers<'_> {
    pub fn role(&self) -> Role {
        match self {
            OutputBuffers::Sender { .. } => Role::Initiator,
            OutputBuffers::Receiver { .. } => Role::Responder,
        }
    }
}

/// Narrow `raw` into owned byte vectors.
pub fn extract(raw: &RawCorrelations) -> RotOutput {
    match raw {
        RawCorrelations::Sent(ots) => RotOutput::Sender {
            m0: ots.iter().map(|[b0, _]| b0.lsb_byte()).collect(),
            m1: ots.iter().map(|[_, b1]| b1.lsb_byte()).collect(),
        },
        RawCorrelations::Received { ots, choices } => RotOutput::Receiver {
            m: ots.iter().map(Block::lsb_byte).collect(),
            choices: choices.iter().map(|c| c.unwrap_u8()).collect(),
        },
    }
}

/// Narrow `raw` into the first `raw.len()` bytes of `out`.
///
/// # Panics
/// If `out` belongs to the other role or a buffer is shorter than `raw`.
pub fn extract_into(raw: &RawCorrelations, out: OutputBuffers<'_>) {
    let count = raw.len();
    match (raw, out) {
        (RawCorrelations::Sent(ots), OutputBuffers::Sender { m0, m1 }) => {
            assert!(
                m0.len() >= count && m1.len() >= count,
                "output buffers must hold {count} bytes"
            );
            for ((d0, d1), [b0, b1]) in m0.iter_mut().zip(m1.iter_mut()).zip(ots) {
                *d0 = b0.lsb_byte();
                *d1 = b1.lsb_byte();
            }
        }
        (RawCorrelations::Received { ots, choices }, OutputBuffers::Receiver { m, choices: c }) => {
            assert!(
                m.len() >= count && c.len() >= count,
                "output buffers must hold {count} bytes"
            );
            let outputs = m.iter_mut().zip(c.iter_mut());
            for ((dm, dc), (ot, choice)) in outputs.zip(ots.iter().zip(choices)) {
                *dm = ot.lsb_byte();
                *dc = choice.unwrap_u8();
            }
        }
        (raw, out) => panic!(
            "output buffers of the {:?} can not hold outputs of the {:?}",
            out.role(),
            raw.role()
        ),
    }
}

#[cfg(test)]
mod tests {
    use rotbridge_core::Block;
    use subtle::Choice;

    use super::*;

    fn sent() -> RawCorrelations {
        RawCorrelations::Sent(vec![
            [Block::from(0x1ff_u128), Block::from(0x2_u128)],
            [Block::from(0xab00_u128), Block::from(u128::MAX)],
        ])
    }

    fn received() -> RawCorrelations {
        RawCorrelations::Received {
            ots: vec![Block::from(0x2_u128), Block::from(0xab00_u128)],
            choices: vec![Choice::from(1), Choice::from(0)],
        }
    }

    #[test]
    fn extracts_least_significant_byte() {
        assert_eq!(
            RotOutput::Sender {
                m0: vec![0xff, 0x00],
                m1: vec![0x02, 0xff]
            },
            extract(&sent())
        );
        assert_eq!(
            RotOutput::Receiver {
                m: vec![0x02, 0x00],
                choices: vec![1, 0]
            },
            extract(&received())
        );
    }

    #[test]
    fn to_bits_masks_lsb() {
        assert_eq!(
            RotBits::Sender {
                m0: vec![true, false],
                m1: vec![false, true]
            },
            extract(&sent()).to_bits()
        );
        assert_eq!(
            RotBits::Receiver {
                m: vec![false, false],
                choices: vec![true, false]
            },
            extract(&received()).to_bits()
        );
    }

    #[test]
    fn extract_into_leaves_tail_untouched() {
        let (mut m, mut c) = ([7_u8; 4], [7_u8; 4]);
        extract_into(
            &received(),
            OutputBuffers::Receiver {
                m: &mut m,
                choices: &mut c,
            },
        );
        assert_eq!([0x02, 0x00, 7, 7], m);
        assert_eq!([1, 0, 7, 7], c);
    }

    #[test]
    fn extract_into_matches_extract() {
        let (mut m0, mut m1) = ([0_u8; 2], [0_u8; 2]);
        extract_into(
            &sent(),
            OutputBuffers::Sender {
                m0: &mut m0,
                m1: &mut m1,
            },
        );
        assert_eq!(
            RotOutput::Sender {
                m0: m0.to_vec(),
                m1: m1.to_vec()
            },
            extract(&sent())
        );
    }

    #[test]
    #[should_panic(expected = "must hold 2 bytes")]
    fn short_buffer_panics() {
        let (mut m0, mut m1) = ([0_u8; 1], [0_u8; 2]);
        extract_into(
            &sent(),
            OutputBuffers::Sender {
                m0: &mut m0,
                m1: &mut m1,
            },
        );
    }

    #[test]
    #[should_panic(expected = "can not hold outputs")]
    fn wrong_role_panics() {
        let (mut m0, mut m1) = ([0_u8; 2], [0_u8; 2]);
        extract_into(
            &received(),
            OutputBuffers::Sender {
                m0: &mut m0,
                m1: &mut m1,
            },
        );
    }
}
