//! Runs one batch of random OTs on an open channel.
use std::time::{Duration, Instant};

use rand::{SeedableRng, rngs::StdRng};
use rotbridge_core::Block;
use rotbridge_net::{Channel, ChannelError};
use rotbridge_ot::{RandomOt, phase, random_choices};
use subtle::Choice;

use crate::{config::Role, error::BridgeError};

/// The unprocessed outputs of a batch, keyed by role.
#[derive(Debug, Clone)]
pub enum RawCorrelations {
    /// Both messages of every OT.
    Sent(Vec<[Block; 2]>),
    /// The chosen message of every OT with its choice.
    Received { ots: Vec<Block>, choices: Vec<Choice> },
}

impl RawCorrelations {
    pub fn role(&self) -> Role {
        match self {
            RawCorrelations::Sent(_) => Role::Initiator,
            RawCorrelations::Received { .. } => Role::Responder,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RawCorrelations::Sent(ots) => ots.len(),
            RawCorrelations::Received { ots, .. } => ots.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Synchronize with the peer, run `count` random OTs in `role` and flush.
///
/// The returned duration covers the OTs and the flush, not the sync. The
/// responder draws its choices from the OS rng.
#[tracing::instrument(level = "debug", skip_all, fields(role = ?role, count = count))]
pub async fn run<B>(
    backend: &mut B,
    conn: &mut Channel,
    role: Role,
    count: usize,
) -> Result<(RawCorrelations, Duration), BridgeError>
where
    B: RandomOt,
    BridgeError: From<B::Error>,
{
    conn.sync().await?;
    let start = Instant::now();
    let raw = match role {
        Role::Initiator => RawCorrelations::Sent(backend.batch_send(conn, count).await?),
        Role::Responder => {
            let choices = random_choices(count, &mut StdRng::from_os_rng());
            let ots = backend.batch_receive(conn, &choices).await?;
            RawCorrelations::Received { ots, choices }
        }
    };
    flush(conn).await?;
    Ok((raw, start.elapsed()))
}

#[tracing::instrument(target = "rotbridge_metrics", level = "trace", skip_all, fields(phase = phase::FLUSH))]
async fn flush(conn: &mut Channel) -> Result<(), ChannelError> {
    conn.flush().await
}
