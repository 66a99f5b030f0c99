//! Stream backend: duplicates the console over any duplex byte channel.

use super::backend::{should_retry_read_error, ReadCall, ReadStatus, WriteSite};
use crate::config::defaults::STREAM_RETRY_DELAY;
use crate::{log_debug, token};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// A duplex byte channel the console can be duplicated over.
///
/// `read` must report "no data yet" as [`ErrorKind::WouldBlock`] and an orderly
/// close as `Ok(0)`.
pub trait DuplexStream: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&self, data: &[u8]) -> io::Result<usize>;

    fn close(&self) -> io::Result<()>;
}

pub struct StreamBackend {
    channel: Box<dyn DuplexStream>,
    closed: AtomicBool,
}

impl StreamBackend {
    pub fn new(channel: Box<dyn DuplexStream>) -> Self {
        Self {
            channel,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(super) fn read(&self, buf: &mut [u8], call: ReadCall) -> io::Result<ReadStatus> {
        match call {
            ReadCall::Poll => self.poll_byte(buf),
            ReadCall::Blocking => self.read_blocking(buf),
        }
    }

    /// Strict single-byte, non-blocking poll.
    fn poll_byte(&self, buf: &mut [u8]) -> io::Result<ReadStatus> {
        if self.is_closed() {
            return Ok(ReadStatus::Closed);
        }
        let Some(slot) = buf.first_mut() else {
            return Ok(ReadStatus::WouldBlock);
        };
        let mut byte = [0u8; 1];
        match self.channel.read(&mut byte) {
            Ok(0) => Ok(ReadStatus::Closed),
            Ok(_) => {
                *slot = byte[0];
                Ok(ReadStatus::Data(1))
            }
            Err(err) if should_retry_read_error(&err) => Ok(ReadStatus::WouldBlock),
            Err(err) => Err(err),
        }
    }

    /// Wait for data, retrying transient would-block instead of treating it as EOF.
    fn read_blocking(&self, buf: &mut [u8]) -> io::Result<ReadStatus> {
        if buf.is_empty() {
            return Ok(ReadStatus::WouldBlock);
        }
        loop {
            if self.is_closed() {
                return Ok(ReadStatus::Closed);
            }
            match self.channel.read(buf) {
                Ok(0) => return Ok(ReadStatus::Closed),
                Ok(n) => return Ok(ReadStatus::Data(n)),
                Err(err) if should_retry_read_error(&err) => {
                    let _span = token::release_for_blocking();
                    thread::sleep(STREAM_RETRY_DELAY);
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub(super) fn write(&self, data: &[u8], _site: WriteSite) -> io::Result<usize> {
        if self.is_closed() {
            return Err(io::Error::new(
                ErrorKind::NotConnected,
                "console stream already closed",
            ));
        }
        self.channel.write(data)
    }

    pub(super) fn unregister(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.channel.close() {
            log_debug(&format!("console stream close failed: {err}"));
        }
    }
}

impl DuplexStream for UnixStream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut &*self, buf)
    }

    fn write(&self, data: &[u8]) -> io::Result<usize> {
        Write::write(&mut &*self, data)
    }

    fn close(&self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            result => result,
        }
    }
}

/// In-memory duplex channel: the console end of a pair made by [`ChannelStream::pair`].
pub struct ChannelStream {
    incoming: Receiver<Vec<u8>>,
    outgoing: Mutex<Option<Sender<Vec<u8>>>>,
    pending: Mutex<VecDeque<u8>>,
    closed: AtomicBool,
}

/// The remote end of a [`ChannelStream`].
pub struct ChannelPeer {
    to_console: Sender<Vec<u8>>,
    from_console: Receiver<Vec<u8>>,
}

impl ChannelStream {
    /// Create a connected pair; each direction holds at most `capacity` chunks.
    pub fn pair(capacity: usize) -> (ChannelStream, ChannelPeer) {
        let (to_console, incoming) = bounded(capacity);
        let (outgoing, from_console) = bounded(capacity);
        let stream = ChannelStream {
            incoming,
            outgoing: Mutex::new(Some(outgoing)),
            pending: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        };
        let peer = ChannelPeer {
            to_console,
            from_console,
        };
        (stream, peer)
    }
}

impl DuplexStream for ChannelStream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(0);
        }
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            match self.incoming.try_recv() {
                Ok(chunk) => pending.extend(chunk),
                Err(TryRecvError::Empty) => return Err(ErrorKind::WouldBlock.into()),
                Err(TryRecvError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(pending.len());
        for (slot, byte) in buf.iter_mut().zip(pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    /// Blocks while the peer lags more than `capacity` chunks behind.
    fn write(&self, data: &[u8]) -> io::Result<usize> {
        let outgoing = self.outgoing.lock().clone();
        let Some(outgoing) = outgoing else {
            return Err(ErrorKind::NotConnected.into());
        };
        outgoing
            .send(data.to_vec())
            .map(|()| data.len())
            .map_err(|_| io::Error::from(ErrorKind::BrokenPipe))
    }

    fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::Release);
        self.outgoing.lock().take();
        Ok(())
    }
}

impl ChannelPeer {
    /// Send bytes toward the console. Returns `false` once the console end is gone.
    pub fn send(&self, data: &[u8]) -> bool {
        self.to_console.send(data.to_vec()).is_ok()
    }

    pub fn try_recv(&self) -> Option<Vec<u8>> {
        self.from_console.try_recv().ok()
    }

    /// Wait for the next chunk of console output. Fails with `TimedOut` when nothing
    /// arrived and `BrokenPipe` once the console end has closed.
    pub fn recv_timeout(&self, timeout: Duration) -> io::Result<Vec<u8>> {
        self.from_console
            .recv_timeout(timeout)
            .map_err(|err| match err {
                RecvTimeoutError::Timeout => ErrorKind::TimedOut.into(),
                RecvTimeoutError::Disconnected => ErrorKind::BrokenPipe.into(),
            })
    }
}
