//! TCP control connection and stream framing.

use std::net::SocketAddr;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::ProtocolError;
use crate::frame::{read_frame, Frame};

/// A framed TCP connection to a macroboard peer.
///
/// The connection owns exactly one reader and one writer, each behind its own
/// lock so a read loop and a write loop can use it concurrently. Once any I/O
/// fails the connection is invalidated: pending and future operations on
/// either half return [`ProtocolError::ConnectionLost`], and the owner is
/// expected to drop it and dial a new one.
pub struct Connection {
    remote: SocketAddr,
    sender: Mutex<FrameSender>,
    receiver: Mutex<FrameReceiver>,
    closed: CancellationToken,
}

impl Connection {
    /// Dial `addr`.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ProtocolError> {
        let stream = TcpStream::connect(addr).await?;
        Self::from_stream(stream)
    }

    /// Wrap an accepted or connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self, ProtocolError> {
        let remote = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();
        Ok(Self {
            remote,
            sender: Mutex::new(FrameSender::new(write)),
            receiver: Mutex::new(FrameReceiver::new(read)),
            closed: CancellationToken::new(),
        })
    }

    /// Get the remote address of this connection.
    pub fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    /// Send a frame. Fails fast once the connection has been invalidated.
    pub async fn send(&self, frame: &Frame) -> Result<(), ProtocolError> {
        if self.closed.is_cancelled() {
            return Err(ProtocolError::ConnectionLost);
        }
        let mut sender = self.sender.lock().await;
        let result = tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(ProtocolError::ConnectionLost),
            result = sender.send(frame) => result,
        };
        if result.as_ref().is_err_and(ProtocolError::is_connection_error) {
            self.invalidate();
        }
        result
    }

    /// Receive the next frame.
    ///
    /// Returns `None` when the peer closed the stream; the connection is
    /// invalidated in that case too.
    pub async fn recv(&self) -> Result<Option<Frame>, ProtocolError> {
        if self.closed.is_cancelled() {
            return Err(ProtocolError::ConnectionLost);
        }
        let mut receiver = self.receiver.lock().await;
        let result = tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(ProtocolError::ConnectionLost),
            result = receiver.recv() => result,
        };
        if !matches!(result, Ok(Some(_))) {
            self.invalidate();
        }
        result
    }

    /// Mark the connection unusable and unblock any pending send or receive.
    pub fn invalidate(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Wait until the connection has been invalidated.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("remote", &self.remote)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Writes encoded frames to the write half of a TCP stream.
pub struct FrameSender {
    stream: OwnedWriteHalf,
}

impl FrameSender {
    pub fn new(stream: OwnedWriteHalf) -> Self {
        Self { stream }
    }

    /// Encode and write one frame.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        let bytes = frame.encode()?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        trace!(len = bytes.len(), "sent frame");
        Ok(())
    }
}

/// Reads frames from the read half of a TCP stream.
pub struct FrameReceiver {
    stream: BufReader<OwnedReadHalf>,
}

impl FrameReceiver {
    pub fn new(stream: OwnedReadHalf) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Receive and decode a frame.
    ///
    /// Returns `None` if the stream has been cleanly closed by the peer.
    pub async fn recv(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let frame = read_frame(&mut self.stream).await?;
        if let Some(frame) = &frame {
            trace!(?frame, "received frame");
        }
        Ok(frame)
    }
}
