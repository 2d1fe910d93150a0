//! Where and how a [`Channel`](crate::Channel) is opened.
use std::{fmt, time::Duration};

/// Default time the connecting party keeps retrying a refused connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// One side of a two-party connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Listen on all interfaces and accept exactly one peer.
    Listen { port: u16 },
    /// Actively connect to `host:port`.
    Connect { host: String, port: u16 },
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub(crate) endpoint: Endpoint,
    pub(crate) io_timeout: Option<Duration>,
    pub(crate) connect_timeout: Duration,
}

impl ChannelConfig {
    pub fn listen(port: u16) -> Self {
        Self::new(Endpoint::Listen { port })
    }

    pub fn connect(host: impl Into<String>, port: u16) -> Self {
        Self::new(Endpoint::Connect {
            host: host.into(),
            port,
        })
    }

    fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            io_timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Deadline for every read, write and flush on the opened channel and for
    /// accepting the peer. Without it, a silent peer blocks forever.
    pub fn with_io_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.io_timeout = timeout.into();
        self
    }

    /// How long a refused connection attempt is retried.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Listen { port } => write!(f, "listen on 0.0.0.0:{port}"),
            Endpoint::Connect { host, port } => write!(f, "connect to {host}:{port}"),
        }
    }
}
