//! Random OT batches between two processes, for Rust and C callers.
//!
//! One call of [`random_ot`] connects the two parties, runs a batch of
//! random OTs with the extension selected by [`ProtocolMode`] and returns the
//! outputs together with the number of bytes this party moved. The
//! [initiator](Role::Initiator) listens and is the OT sender, the
//! [responder](Role::Responder) connects and is the OT receiver. For the i-th
//! OT the responder's byte `m[i]` agrees with the initiator's
//! `m0[i]`/`m1[i]`, selected by `choices[i]`, in the least significant bit.
//!
//! The steps of a call are exposed as separate modules:
//! - [`endpoint`] resolves where the channel is opened
//! - [`selector`] creates the OT extension session
//! - [`driver`] runs the batch on the open channel
//! - [`extract`] narrows the OT blocks to bytes
//! - [`cost`] measures the traffic of the batch
//!
//! C callers use [`ffi::rot_random_ot`], declared in `include/rotbridge.h`.
use std::time::Duration;

use rotbridge_net::Channel;
use tokio::runtime;
use tracing::info;

pub mod config;
pub mod cost;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod extract;
pub mod ffi;
pub mod selector;
pub mod verify;

pub use config::{CacheConfig, ProtocolMode, Role, RotConfig};
pub use cost::TransferCost;
pub use driver::RawCorrelations;
pub use error::{BridgeError, ConfigError};
pub use extract::{OutputBuffers, RotBits, RotOutput};

use crate::{cost::CostAccountant, selector::ProtocolSelector};

/// Outputs of a batch.
#[derive(Debug, Clone)]
pub struct RotBatch {
    pub output: RotOutput,
    /// Traffic of the batch, including the sync but not the verification.
    pub cost: TransferCost,
    /// Time spent on the OTs after the sync.
    pub elapsed: Duration,
}

/// Outputs of a batch before they are narrowed to bytes.
#[derive(Debug, Clone)]
pub struct RawBatch {
    pub correlations: RawCorrelations,
    pub cost: TransferCost,
    pub elapsed: Duration,
}

/// Run one batch of random OTs with the peer described by `config`.
///
/// Configuration errors are reported before the channel is opened. The
/// channel is closed when the call returns.
pub async fn random_ot(config: &RotConfig) -> Result<RotBatch, BridgeError> {
    let raw = random_ot_raw(config).await?;
    Ok(RotBatch {
        output: extract::extract(&raw.correlations),
        cost: raw.cost,
        elapsed: raw.elapsed,
    })
}

/// Like [`random_ot`] but returns the OT blocks.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(
        role = ?config.role(),
        mode = ?config.mode(),
        port = config.port(),
        count = config.count()
    )
)]
pub async fn random_ot_raw(config: &RotConfig) -> Result<RawBatch, BridgeError> {
    let channel_config = config.channel_config()?;
    let mut session = ProtocolSelector::from_config(config).select()?;
    let mut conn = Channel::open(&channel_config).await?;

    let accountant = CostAccountant::start(&conn);
    let (correlations, elapsed) =
        driver::run(&mut session, &mut conn, config.role(), config.count()).await?;
    let cost = accountant.measure(&conn);

    if config.verification() {
        verify::verify(&mut conn, &correlations).await?;
    }
    conn.close().await?;
    info!(
        bytes_sent = cost.bytes_sent,
        bytes_received = cost.bytes_received,
        elapsed_ms = elapsed.as_millis() as u64,
        "random OT batch finished"
    );
    Ok(RawBatch {
        correlations,
        cost,
        elapsed,
    })
}

/// Blocking version of [`random_ot`].
///
/// Runs the call on a new current-thread runtime. Must not be called from
/// within an async runtime.
pub fn random_ot_blocking(config: &RotConfig) -> Result<RotBatch, BridgeError> {
    current_thread_runtime()?.block_on(random_ot(config))
}

/// Blocking version of [`random_ot_raw`].
pub fn random_ot_raw_blocking(config: &RotConfig) -> Result<RawBatch, BridgeError> {
    current_thread_runtime()?.block_on(random_ot_raw(config))
}

fn current_thread_runtime() -> Result<runtime::Runtime, BridgeError> {
    runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(BridgeError::Runtime)
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use rotbridge_net::testing::{free_port, init_tracing};

    use crate::{
        BridgeError, CacheConfig, ConfigError, ProtocolMode, RotBatch, RotBits, RotConfig,
        RotOutput, random_ot, random_ot_blocking,
    };

    async fn pair(
        count: usize,
        mode: ProtocolMode,
        customize: impl Fn(RotConfig) -> RotConfig,
    ) -> anyhow::Result<(RotBatch, RotBatch)> {
        let port = free_port()?;
        let initiator = customize(RotConfig::initiator(port).with_count(count).with_mode(mode));
        let responder = customize(
            RotConfig::responder("127.0.0.1", port)
                .with_count(count)
                .with_mode(mode),
        );
        Ok(tokio::try_join!(random_ot(&initiator), random_ot(&responder))?)
    }

    fn assert_correlated(sender: &RotOutput, receiver: &RotOutput, count: usize) {
        let (RotBits::Sender { m0, m1 }, RotBits::Receiver { m, choices }) =
            (sender.to_bits(), receiver.to_bits())
        else {
            panic!("unexpected roles");
        };
        assert_eq!(count, m0.len());
        assert_eq!(count, m1.len());
        assert_eq!(count, m.len());
        assert_eq!(count, choices.len());
        for i in 0..count {
            let expected = if choices[i] { m1[i] } else { m0[i] };
            assert_eq!(expected, m[i], "OT {i}");
        }
    }

    #[tokio::test]
    async fn role_symmetry() -> anyhow::Result<()> {
        let _g = init_tracing();
        for mode in [ProtocolMode::SemiHonest, ProtocolMode::Malicious] {
            for count in [1, 128, 1000] {
                let (sent, received) = pair(count, mode, RotConfig::without_cache).await?;
                assert_correlated(&sent.output, &received.output, count);
                assert_eq!(sent.cost.bytes_sent, received.cost.bytes_received);
                assert_eq!(sent.cost.bytes_received, received.cost.bytes_sent);
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn zero_count_costs_sync() -> anyhow::Result<()> {
        let _g = init_tracing();
        for mode in [ProtocolMode::SemiHonest, ProtocolMode::Malicious] {
            let (sent, received) = pair(0, mode, RotConfig::without_cache).await?;
            assert!(sent.output.is_empty());
            assert!(received.output.is_empty());
            assert_eq!(1, sent.cost.bytes_sent);
            assert_eq!(1, received.cost.bytes_sent);
        }
        Ok(())
    }

    #[tokio::test]
    async fn cost_grows_with_count() -> anyhow::Result<()> {
        let _g = init_tracing();
        let mut last = 0;
        for count in [128, 4096, 100_000] {
            let (sent, received) = pair(count, ProtocolMode::SemiHonest, |c| c).await?;
            let total = sent.cost.total() + received.cost.total();
            assert!(total > last, "count {count}: {total} <= {last}");
            last = total;
        }
        Ok(())
    }

    #[tokio::test]
    async fn mode_does_not_change_interface() -> anyhow::Result<()> {
        let _g = init_tracing();
        let (sh_sent, sh_received) = pair(200, ProtocolMode::SemiHonest, |c| c).await?;
        let (m_sent, m_received) =
            pair(200, ProtocolMode::Malicious, RotConfig::without_cache).await?;
        assert_eq!(sh_sent.output.role(), m_sent.output.role());
        assert_eq!(sh_received.output.role(), m_received.output.role());
        assert_eq!(sh_sent.output.len(), m_sent.output.len());
        // the malicious check costs extra traffic
        assert!(m_sent.cost.total() > sh_sent.cost.total());
        Ok(())
    }

    #[tokio::test]
    async fn threads_do_not_change_correctness() -> anyhow::Result<()> {
        let _g = init_tracing();
        let (sent, received) =
            pair(5000, ProtocolMode::Malicious, |c| c.without_cache().with_threads(3)).await?;
        assert_correlated(&sent.output, &received.output, 5000);
        Ok(())
    }

    #[tokio::test]
    async fn verification_passes() -> anyhow::Result<()> {
        let _g = init_tracing();
        for mode in [ProtocolMode::SemiHonest, ProtocolMode::Malicious] {
            let (sent, received) =
                pair(777, mode, |c| c.without_cache().with_verification(true)).await?;
            assert_correlated(&sent.output, &received.output, 777);
        }
        Ok(())
    }

    #[tokio::test]
    async fn malicious_reuses_cache() -> anyhow::Result<()> {
        let _g = init_tracing();
        let dir = std::env::temp_dir().join(format!(
            "rotbridge-bridge-test-{:x}",
            rand::random::<u64>()
        ));
        let port = free_port()?;
        let cache = CacheConfig::new(&dir, format!("bridge-{port}"));
        let mut costs = vec![];
        for _ in 0..2 {
            let (sent, received) =
                pair(256, ProtocolMode::Malicious, |c| c.with_cache(cache.clone())).await?;
            assert_correlated(&sent.output, &received.output, 256);
            costs.push(sent.cost.total());
        }
        assert!(costs[1] < costs[0], "{costs:?}");
        cache.clear()?;
        std::fs::remove_dir(&dir)?;
        Ok(())
    }

    #[tokio::test]
    async fn config_errors_before_connecting() {
        let _g = init_tracing();
        // nobody listens on this port, a connection attempt would time out
        let responder = |addr: &str| {
            RotConfig::responder(addr, 1)
                .with_count(128)
                .with_connect_timeout(Duration::from_secs(600))
        };
        let cases = [
            (responder(""), ConfigError::MissingRemoteAddress),
            (responder("  "), ConfigError::MissingRemoteAddress),
            (RotConfig::responder("127.0.0.1", 0), ConfigError::InvalidPort(0)),
            (responder("127.0.0.1").with_threads(0), ConfigError::ZeroThreads),
        ];
        for (config, expected) in cases {
            let res = tokio::time::timeout(Duration::from_secs(5), random_ot(&config))
                .await
                .expect("configuration errors return immediately");
            match res {
                Err(BridgeError::Configuration(err)) => assert_eq!(expected, err),
                other => panic!("expected configuration error, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn transport_error_on_missing_peer() -> anyhow::Result<()> {
        let _g = init_tracing();
        let port = free_port()?;
        let config = RotConfig::responder("127.0.0.1", port)
            .with_count(128)
            .with_connect_timeout(Duration::from_millis(100));
        let res = random_ot(&config).await;
        assert!(matches!(res, Err(BridgeError::Transport(_))), "{res:?}");
        Ok(())
    }

    #[test]
    fn blocking_api() -> anyhow::Result<()> {
        let _g = init_tracing();
        let port = free_port()?;
        let initiator = RotConfig::initiator(port).with_count(300);
        let responder = RotConfig::responder("127.0.0.1", port).with_count(300);
        let sender = thread::spawn(move || random_ot_blocking(&initiator));
        let received = random_ot_blocking(&responder)?;
        let sent = sender.join().expect("initiator panicked")?;
        assert_correlated(&sent.output, &received.output, 300);
        Ok(())
    }
}
