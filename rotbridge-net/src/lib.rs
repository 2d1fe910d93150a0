//! Counted TCP channel between exactly two parties.
//!
//! A [`Channel`] is opened either by listening for and accepting a single peer
//! or by connecting to one, see [`ChannelConfig`]. It offers raw byte transfer
//! and length prefixed [`bincode`] messages. All bytes that reach or leave the
//! socket are counted, and reported as `bytes_written`/`bytes_read` events
//! with the `rotbridge_metrics` target, so protocols can determine their exact
//! communication cost.
//!
//! Writes are buffered. Buffered output is flushed before any read blocks, so
//! a party never waits on a peer that waits on it.
use std::{
    future::Future,
    io::{self, IoSlice},
    net::{Ipv4Addr, SocketAddr},
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use pin_project_lite::pin_project;
use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadBuf},
    net::{
        TcpSocket, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::{Instant, sleep, timeout, timeout_at},
};
use tracing::{Level, debug, event, trace};

pub mod config;

#[doc(hidden)]
#[cfg(any(test, feature = "__testing"))]
pub mod testing;

pub use config::{ChannelConfig, Endpoint};

/// Maximum length of a serialized message.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

const SYNC_TAG: u8 = 0xA5;
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(10);
const BUF_CAPACITY: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("unable to listen on port {port}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("unable to accept connection")]
    Accept(#[source] io::Error),
    #[error("unable to connect to {addr}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error on channel")]
    Io(#[from] io::Error),
    #[error("channel operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("unable to (de)serialize message")]
    Codec(#[from] bincode::Error),
    #[error("frame of {len} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
    #[error("sync barrier received unexpected byte {0:#x}")]
    SyncMismatch(u8),
}

/// An open, ordered and bidirectional byte stream to exactly one peer.
#[derive(Debug)]
pub struct Channel {
    reader: BufReader<CountingReader<OwnedReadHalf>>,
    writer: BufWriter<CountingWriter<OwnedWriteHalf>>,
    io_timeout: Option<Duration>,
    peer_addr: SocketAddr,
}

pin_project! {
    /// Counts the bytes written to the inner writer.
    #[derive(Debug)]
    pub struct CountingWriter<W> {
        #[pin]
        inner: W,
        written: u64,
    }
}

pin_project! {
    /// Counts the bytes read from the inner reader.
    #[derive(Debug)]
    pub struct CountingReader<R> {
        #[pin]
        inner: R,
        read: u64,
    }
}

impl Channel {
    /// Open a channel as described by `config`.
    ///
    /// A listening party accepts exactly one connection. A connecting party
    /// retries refused connections until the connect timeout elapses, so both
    /// parties may be started in any order.
    #[tracing::instrument(level = "debug", skip_all, fields(endpoint = %config.endpoint))]
    pub async fn open(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let stream = match &config.endpoint {
            Endpoint::Listen { port } => accept_one(*port, config.io_timeout).await?,
            Endpoint::Connect { host, port } => {
                connect_with_retry(host, *port, config.connect_timeout).await?
            }
        };
        let channel = Self::from_stream(stream, config.io_timeout)?;
        debug!(peer = %channel.peer_addr, "channel open");
        Ok(channel)
    }

    /// Wrap an already connected stream.
    pub fn from_stream(
        stream: TcpStream,
        io_timeout: Option<Duration>,
    ) -> Result<Self, ChannelError> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        let (read, write) = stream.into_split();
        Ok(Self {
            reader: BufReader::with_capacity(BUF_CAPACITY, CountingReader::new(read)),
            writer: BufWriter::with_capacity(BUF_CAPACITY, CountingWriter::new(write)),
            io_timeout,
            peer_addr,
        })
    }

    /// Buffer `bytes` for sending.
    pub async fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        with_deadline(self.io_timeout, self.writer.write_all(bytes)).await
    }

    /// Fill `buf` with the next `buf.len()` bytes from the peer.
    pub async fn recv_bytes(&mut self, buf: &mut [u8]) -> Result<(), ChannelError> {
        if !self.writer.buffer().is_empty() {
            self.flush().await?;
        }
        with_deadline(self.io_timeout, self.reader.read_exact(buf)).await?;
        Ok(())
    }

    /// Buffer a length prefixed, bincode serialized message for sending.
    pub async fn send_msg<T: Serialize + ?Sized>(&mut self, msg: &T) -> Result<(), ChannelError> {
        let bytes = bincode::serialize(msg)?;
        let len = checked_frame_len(bytes.len())?;
        self.send_bytes(&len.to_be_bytes()).await?;
        self.send_bytes(&bytes).await
    }

    pub async fn recv_msg<T: DeserializeOwned>(&mut self) -> Result<T, ChannelError> {
        let mut len = [0; 4];
        self.recv_bytes(&mut len).await?;
        let len = checked_frame_len(u32::from_be_bytes(len) as usize)?;
        let mut buf = vec![0; len as usize];
        self.recv_bytes(&mut buf).await?;
        Ok(bincode::deserialize(&buf)?)
    }

    pub async fn flush(&mut self) -> Result<(), ChannelError> {
        with_deadline(self.io_timeout, self.writer.flush()).await
    }

    /// Barrier that returns once both parties have called it.
    #[tracing::instrument(target = "rotbridge_metrics", level = "trace", skip_all, fields(phase = "sync"))]
    pub async fn sync(&mut self) -> Result<(), ChannelError> {
        self.send_bytes(&[SYNC_TAG]).await?;
        self.flush().await?;
        let mut tag = [0];
        self.recv_bytes(&mut tag).await?;
        if tag[0] != SYNC_TAG {
            return Err(ChannelError::SyncMismatch(tag[0]));
        }
        Ok(())
    }

    /// Flush all buffered output and shut down the sending half.
    pub async fn close(mut self) -> Result<(), ChannelError> {
        with_deadline(self.io_timeout, self.writer.shutdown()).await?;
        debug!(
            bytes_sent = self.bytes_sent(),
            bytes_received = self.bytes_received(),
            "channel closed"
        );
        Ok(())
    }

    /// Total number of bytes that have been written to the socket.
    ///
    /// Buffered bytes are only counted once they are flushed.
    pub fn bytes_sent(&self) -> u64 {
        self.writer.get_ref().count()
    }

    /// Total number of bytes that have been read from the socket.
    pub fn bytes_received(&self) -> u64 {
        self.reader.get_ref().count()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout
    }

    pub fn set_io_timeout(&mut self, io_timeout: impl Into<Option<Duration>>) {
        self.io_timeout = io_timeout.into();
    }
}

async fn with_deadline<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = io::Result<T>>,
) -> Result<T, ChannelError> {
    match limit {
        Some(limit) => timeout(limit, fut)
            .await
            .map_err(|_| ChannelError::Timeout(limit))?
            .map_err(ChannelError::Io),
        None => fut.await.map_err(ChannelError::Io),
    }
}

fn checked_frame_len(len: usize) -> Result<u32, ChannelError> {
    if len > MAX_FRAME_LEN {
        return Err(ChannelError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    Ok(len as u32)
}

async fn accept_one(port: u16, io_timeout: Option<Duration>) -> Result<TcpStream, ChannelError> {
    let bind_err = |source| ChannelError::Bind { port, source };
    let socket = TcpSocket::new_v4().map_err(bind_err)?;
    socket.set_reuseaddr(true).map_err(bind_err)?;
    socket
        .bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .map_err(bind_err)?;
    let listener = socket.listen(1).map_err(bind_err)?;
    debug!(port, "waiting for peer");
    let accepted = match io_timeout {
        Some(limit) => timeout(limit, listener.accept())
            .await
            .map_err(|_| ChannelError::Timeout(limit))?,
        None => listener.accept().await,
    };
    let (stream, peer) = accepted.map_err(ChannelError::Accept)?;
    debug!(%peer, "accepted connection");
    Ok(stream)
}

async fn connect_with_retry(
    host: &str,
    port: u16,
    connect_timeout: Duration,
) -> Result<TcpStream, ChannelError> {
    let deadline = Instant::now() + connect_timeout;
    let mut attempts = 0_u32;
    loop {
        attempts += 1;
        let err = match timeout_at(deadline, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                debug!(attempts, "connected");
                return Ok(stream);
            }
            Ok(Err(err)) => err,
            Err(_) => io::Error::from(io::ErrorKind::TimedOut),
        };
        if !is_retryable(&err) || Instant::now() + CONNECT_RETRY_INTERVAL >= deadline {
            return Err(ChannelError::Connect {
                addr: format!("{host}:{port}"),
                source: err,
            });
        }
        trace!(attempts, %err, "connect failed, retrying");
        sleep(CONNECT_RETRY_INTERVAL).await;
    }
}

fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

impl<W> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn count(&self) -> u64 {
        self.written
    }
}

impl<W: AsyncWrite> AsyncWrite for CountingWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        let poll = this.inner.poll_write(cx, buf);
        if let Poll::Ready(Ok(bytes)) = poll {
            *this.written += bytes as u64;
            event!(target: "rotbridge_metrics", Level::TRACE, bytes_written = bytes);
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        let poll = this.inner.poll_write_vectored(cx, bufs);
        if let Poll::Ready(Ok(bytes)) = poll {
            *this.written += bytes as u64;
            event!(target: "rotbridge_metrics", Level::TRACE, bytes_written = bytes);
        }
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, read: 0 }
    }

    pub fn count(&self) -> u64 {
        self.read
    }
}

impl<R: AsyncRead> AsyncRead for CountingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        let poll = this.inner.poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let bytes = buf.filled().len() - before;
            if bytes > 0 {
                *this.read += bytes as u64;
                event!(target: "rotbridge_metrics", Level::TRACE, bytes_read = bytes);
            }
        }
        poll
    }
}
