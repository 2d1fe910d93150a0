//! Opt-in correlation check.
//!
//! The sender reveals both messages of every OT and the receiver compares
//! them with its outputs. Afterwards the batch is useless for anything but
//! testing.
use rotbridge_net::Channel;
use tracing::{debug, warn};

use crate::{driver::RawCorrelations, error::BridgeError};

/// Run the check for the party holding `raw`.
///
/// Only the least significant bit of every message is compared.
#[tracing::instrument(level = "debug", skip_all, fields(count = raw.len()))]
pub async fn verify(conn: &mut Channel, raw: &RawCorrelations) -> Result<(), BridgeError> {
    match raw {
        RawCorrelations::Sent(ots) => {
            let (m0, m1): (Vec<u8>, Vec<u8>) = ots
                .iter()
                .map(|[b0, b1]| (b0.lsb_byte(), b1.lsb_byte()))
                .unzip();
            conn.send_msg(&(m0, m1)).await?;
            conn.flush().await?;
        }
        RawCorrelations::Received { ots, choices } => {
            let (m0, m1): (Vec<u8>, Vec<u8>) = conn.recv_msg().await?;
            let count = ots.len();
            if m0.len() != count || m1.len() != count {
                warn!(count, revealed = m0.len().min(m1.len()), "revealed message count differs");
                return Err(BridgeError::CorrelationMismatch {
                    index: count.min(m0.len()).min(m1.len()),
                });
            }
            let mismatch = ots
                .iter()
                .zip(choices)
                .zip(m0.iter().zip(&m1))
                .position(|((ot, choice), (m0, m1))| {
                    let expected = if choice.unwrap_u8() == 0 { m0 } else { m1 };
                    (ot.lsb_byte() ^ expected) & 1 != 0
                });
            if let Some(index) = mismatch {
                return Err(BridgeError::CorrelationMismatch { index });
            }
            debug!(count, "correlations verified");
        }
    }
    Ok(())
}
