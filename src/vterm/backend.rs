use super::socket::SocketBackend;
use super::stream::{DuplexStream, StreamBackend};
use std::io::{self, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;

/// Result of one backend read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Data(usize),
    /// Nothing available right now; not an error.
    WouldBlock,
    /// Orderly close by the peer.
    Closed,
}

/// Which read discipline the caller needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCall {
    /// Return immediately; used from the timer.
    Poll,
    /// Wait for data; used from the reader thread.
    Blocking,
}

/// Where a backend write is issued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSite {
    /// The periodic timer: must not park holding the execution token.
    Timer,
    /// Application or interpreter code, which may be holding the execution token.
    Caller,
}

/// The transport a session duplicates over.
///
/// Handles are cheap to clone: the reader thread and the timer read through a
/// clone while the session keeps the original for writes and teardown.
#[derive(Clone, Default)]
pub enum Backend {
    /// Inert variant installed whenever no session is active.
    #[default]
    Null,
    Socket(Arc<SocketBackend>),
    Stream(Arc<StreamBackend>),
}

impl Backend {
    /// Wrap a connected TCP socket, disabling Nagle's algorithm.
    pub fn socket(stream: TcpStream) -> io::Result<Self> {
        Ok(Self::Socket(Arc::new(SocketBackend::new(stream)?)))
    }

    pub fn stream(channel: impl DuplexStream + 'static) -> Self {
        Self::Stream(Arc::new(StreamBackend::new(Box::new(channel))))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Socket(_) => "socket",
            Self::Stream(_) => "stream",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn read(&self, buf: &mut [u8], call: ReadCall) -> io::Result<ReadStatus> {
        match self {
            Self::Null => Err(not_connected()),
            Self::Socket(socket) => socket.read(buf, call),
            Self::Stream(stream) => stream.read(buf, call),
        }
    }

    pub fn write(&self, data: &[u8], site: WriteSite) -> io::Result<usize> {
        match self {
            Self::Null => Err(not_connected()),
            Self::Socket(socket) => socket.write(data, site),
            Self::Stream(stream) => stream.write(data, site),
        }
    }

    /// Release the transport. Idempotent.
    pub fn unregister(&self) {
        match self {
            Self::Null => {}
            Self::Socket(socket) => socket.unregister(),
            Self::Stream(stream) => stream.unregister(),
        }
    }
}

fn not_connected() -> io::Error {
    io::Error::new(ErrorKind::NotConnected, "no console duplication backend")
}

pub(super) fn should_retry_read_error(err: &io::Error) -> bool {
    err.kind() == ErrorKind::Interrupted || err.kind() == ErrorKind::WouldBlock
}

/// Hand `data` to the backend until all of it is written or the backend fails.
/// Partial writes are retried; errors are not.
pub(super) fn write_all(backend: &Backend, mut data: &[u8], site: WriteSite) -> io::Result<()> {
    while !data.is_empty() {
        match backend.write(data, site) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "console backend accepted no bytes",
                ))
            }
            Ok(written) => data = data.get(written..).unwrap_or(&[]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
