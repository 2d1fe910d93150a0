//! Choice of the OT extension backend.
use rotbridge_core::{Block, compute::ComputePool};
use rotbridge_net::Channel;
use rotbridge_ot::{
    MaliciousMarker, RandomOt, SemiHonestMarker,
    cache::CacheConfig,
    extension::{self, OtExtension},
};
use subtle::Choice;
use tracing::debug;

use crate::{
    config::{ProtocolMode, RotConfig},
    error::{BridgeError, ConfigError},
};

/// Builds the [`ProtocolSession`] of one batch.
#[derive(Debug, Clone)]
pub struct ProtocolSelector {
    mode: ProtocolMode,
    threads: usize,
    cache: Option<CacheConfig>,
}

/// An OT extension instance of either security level.
///
/// The session does not own a channel, it borrows one for every batch.
pub enum ProtocolSession {
    SemiHonest(OtExtension<SemiHonestMarker>),
    Malicious(OtExtension<MaliciousMarker>),
}

impl ProtocolSelector {
    pub fn new(mode: ProtocolMode) -> Self {
        Self {
            mode,
            threads: 1,
            cache: None,
        }
    }

    pub fn from_config(config: &RotConfig) -> Self {
        Self {
            mode: config.mode(),
            threads: config.threads(),
            cache: config.cache(),
        }
    }

    /// Number of threads of the session's compute pool.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Base OT cache of a malicious session. Ignored in semi-honest mode.
    pub fn with_cache(mut self, cache: Option<CacheConfig>) -> Self {
        self.cache = cache;
        self
    }

    /// Create the session with a dedicated compute pool.
    pub fn select(&self) -> Result<ProtocolSession, BridgeError> {
        if self.threads == 0 {
            return Err(ConfigError::ZeroThreads.into());
        }
        let pool = ComputePool::with_threads(self.threads).map_err(extension::Error::from)?;
        debug!(
            mode = ?self.mode,
            threads = self.threads,
            cache = ?self.cache,
            "selected OT extension"
        );
        let session = match self.mode {
            ProtocolMode::SemiHonest => {
                ProtocolSession::SemiHonest(OtExtension::new().with_compute_pool(pool))
            }
            ProtocolMode::Malicious => {
                let ext = OtExtension::new().with_compute_pool(pool);
                ProtocolSession::Malicious(match &self.cache {
                    Some(cache) => ext.with_cache(cache.clone()),
                    None => ext,
                })
            }
        };
        Ok(session)
    }
}

impl ProtocolSession {
    pub fn mode(&self) -> ProtocolMode {
        match self {
            ProtocolSession::SemiHonest(_) => ProtocolMode::SemiHonest,
            ProtocolSession::Malicious(_) => ProtocolMode::Malicious,
        }
    }
}

impl RandomOt for ProtocolSession {
    type Error = extension::Error;

    async fn batch_send(
        &mut self,
        conn: &mut Channel,
        count: usize,
    ) -> Result<Vec<[Block; 2]>, Self::Error> {
        match self {
            ProtocolSession::SemiHonest(ext) => ext.batch_send(conn, count).await,
            ProtocolSession::Malicious(ext) => ext.batch_send(conn, count).await,
        }
    }

    async fn batch_receive(
        &mut self,
        conn: &mut Channel,
        choices: &[Choice],
    ) -> Result<Vec<Block>, Self::Error> {
        match self {
            ProtocolSession::SemiHonest(ext) => ext.batch_receive(conn, choices).await,
            ProtocolSession::Malicious(ext) => ext.batch_receive(conn, choices).await,
        }
    }
}
