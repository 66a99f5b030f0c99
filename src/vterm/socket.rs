//! Socket backend: duplicates the console over an already-connected TCP stream.

use super::backend::{should_retry_read_error, ReadCall, ReadStatus, WriteSite};
use crate::{log_debug, token};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct SocketBackend {
    stream: TcpStream,
    closed: AtomicBool,
}

impl SocketBackend {
    /// Take ownership of a connected socket. Nagle is disabled so keystroke echoes
    /// are not held back waiting for more output.
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(super) fn read(&self, buf: &mut [u8], call: ReadCall) -> io::Result<ReadStatus> {
        if self.is_closed() {
            return Ok(ReadStatus::Closed);
        }
        if buf.is_empty() {
            return Ok(ReadStatus::WouldBlock);
        }
        match call {
            ReadCall::Poll => self.recv_nonblocking(buf),
            ReadCall::Blocking => self.recv_blocking(buf),
        }
    }

    fn recv_nonblocking(&self, buf: &mut [u8]) -> io::Result<ReadStatus> {
        // SAFETY: `buf` is valid for `buf.len()` bytes and the fd stays open for the
        // lifetime of `self.stream`; MSG_DONTWAIT affects only this call.
        let n = unsafe {
            libc::recv(
                self.stream.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                libc::MSG_DONTWAIT,
            )
        };
        if n > 0 {
            return Ok(ReadStatus::Data(n as usize));
        }
        if n == 0 {
            return Ok(ReadStatus::Closed);
        }
        let err = io::Error::last_os_error();
        if should_retry_read_error(&err) {
            return Ok(ReadStatus::WouldBlock);
        }
        Err(err)
    }

    fn recv_blocking(&self, buf: &mut [u8]) -> io::Result<ReadStatus> {
        let _span = token::release_for_blocking();
        loop {
            match (&self.stream).read(buf) {
                Ok(0) => return Ok(ReadStatus::Closed),
                Ok(n) => return Ok(ReadStatus::Data(n)),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Ok(ReadStatus::WouldBlock)
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub(super) fn write(&self, data: &[u8], site: WriteSite) -> io::Result<usize> {
        if self.is_closed() {
            return Err(io::Error::new(
                ErrorKind::NotConnected,
                "console socket already closed",
            ));
        }
        let _span = (site == WriteSite::Caller).then(token::release_for_blocking);
        loop {
            match (&self.stream).write(data) {
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }

    /// Shut the socket down once. Shutting down (rather than only dropping) wakes a
    /// reader thread blocked in `recv`; the descriptor itself is released with the
    /// last handle.
    pub(super) fn unregister(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.stream.shutdown(Shutdown::Both) {
            if err.kind() != ErrorKind::NotConnected {
                log_debug(&format!("console socket shutdown failed: {err}"));
            }
        }
    }
}
