//! Configuration of a single random OT batch.
use std::time::Duration;

pub use rotbridge_ot::cache::CacheConfig;
use rotbridge_net::{ChannelConfig, config::DEFAULT_CONNECT_TIMEOUT};

use crate::{endpoint, error::ConfigError};

/// The side of the batch a party takes.
///
/// The initiator listens and is the OT sender. The responder connects to the
/// initiator and is the OT receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    /// Parse the party number used at the C boundary, 1 or 2.
    pub fn from_party(party: i32) -> Result<Self, ConfigError> {
        match party {
            1 => Ok(Role::Initiator),
            2 => Ok(Role::Responder),
            other => Err(ConfigError::InvalidParty(other)),
        }
    }
}

/// Security level of the OT extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolMode {
    /// IKNP extension.
    #[default]
    SemiHonest,
    /// KOS extension with cached base OTs.
    Malicious,
}

impl ProtocolMode {
    /// 0 is semi-honest, every other value malicious.
    pub fn from_mode_num(mode: i32) -> Self {
        if mode == 0 {
            ProtocolMode::SemiHonest
        } else {
            ProtocolMode::Malicious
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CacheSetting {
    PerPort,
    Custom(CacheConfig),
    Disabled,
}

/// Builder for one call of [`random_ot`](crate::random_ot).
///
/// ```no_run
/// # async fn run() -> Result<(), rotbridge::BridgeError> {
/// use rotbridge::{ProtocolMode, RotConfig, random_ot};
///
/// let config = RotConfig::responder("127.0.0.1", 9000)
///     .with_count(128)
///     .with_mode(ProtocolMode::SemiHonest);
/// let batch = random_ot(&config).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotConfig {
    role: Role,
    remote_addr: Option<String>,
    port: u16,
    count: usize,
    mode: ProtocolMode,
    threads: usize,
    cache: CacheSetting,
    io_timeout: Option<Duration>,
    connect_timeout: Duration,
    verify: bool,
}

impl RotConfig {
    /// Config for `role`. `remote_addr` is only used by the responder.
    pub fn new(role: Role, remote_addr: Option<String>, port: u16) -> Self {
        Self {
            role,
            remote_addr,
            port,
            count: 0,
            mode: ProtocolMode::default(),
            threads: 1,
            cache: CacheSetting::PerPort,
            io_timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            verify: false,
        }
    }

    /// Listen on `port` as the OT sender.
    pub fn initiator(port: u16) -> Self {
        Self::new(Role::Initiator, None, port)
    }

    /// Connect to `addr:port` as the OT receiver.
    pub fn responder(addr: impl Into<String>, port: u16) -> Self {
        Self::new(Role::Responder, Some(addr.into()), port)
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_mode(mut self, mode: ProtocolMode) -> Self {
        self.mode = mode;
        self
    }

    /// Size of the compute pool of the session. Does not change the outputs.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Base OT cache used in malicious mode. Defaults to
    /// [`CacheConfig::for_port`].
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = CacheSetting::Custom(cache);
        self
    }

    /// Always perform fresh base OTs in malicious mode.
    pub fn without_cache(mut self) -> Self {
        self.cache = CacheSetting::Disabled;
        self
    }

    /// Deadline for every read, write and flush on the channel, and for
    /// accepting the peer.
    pub fn with_io_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.io_timeout = timeout.into();
        self
    }

    /// How long the responder retries connecting to the initiator.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Check the correlations after the batch by revealing the sender's
    /// messages to the receiver.
    ///
    /// This destroys the security of the batch and is only meant for
    /// testing. Both parties must enable it.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mode(&self) -> ProtocolMode {
        self.mode
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn verification(&self) -> bool {
        self.verify
    }

    /// The base OT cache of the session. Always `None` in semi-honest mode.
    pub fn cache(&self) -> Option<CacheConfig> {
        match (self.mode, &self.cache) {
            (ProtocolMode::SemiHonest, _) | (_, CacheSetting::Disabled) => None,
            (ProtocolMode::Malicious, CacheSetting::PerPort) => {
                Some(CacheConfig::for_port(self.port))
            }
            (ProtocolMode::Malicious, CacheSetting::Custom(cache)) => Some(cache.clone()),
        }
    }

    /// Validate the config and resolve the channel endpoint.
    pub fn channel_config(&self) -> Result<ChannelConfig, ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        Ok(
            endpoint::resolve(self.role, self.remote_addr(), self.port)?
                .with_io_timeout(self.io_timeout)
                .with_connect_timeout(self.connect_timeout),
        )
    }
}
