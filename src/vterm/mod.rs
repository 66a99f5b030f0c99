//! Console duplication engine.
//!
//! Mirrors the console across the local terminal and one remote backend:
//!
//! - Output: console write -> interceptor -> coalescing buffer (or direct path) -> backend
//! - Input: backend read (timer poll or reader thread) -> stdin injector -> input queue
//!
//! Contexts that touch the engine concurrently:
//! - the receive interrupt (only through the console's try-only enqueue),
//! - the periodic timer (try-lock only, skips the tick when busy),
//! - the optional reader thread (blocking reads, no lock held while blocked),
//! - application code calling `register`/`unregister` at any time.
//!
//! One process-wide engine exists ([`init`]); its mutex and timer are created once
//! and reused by every session.

mod backend;
mod buffer;
mod engine;
mod socket;
mod stats;
mod stdin;
mod stream;
mod timer;


pub use backend::{Backend, ReadCall, ReadStatus, WriteSite};
pub use buffer::OutputBuffer;
pub use engine::Vterm;
pub use socket::SocketBackend;
pub use stats::VtermStats;
pub use stdin::{insert_stdin, InsertOutcome};
pub use stream::{ChannelPeer, ChannelStream, DuplexStream, StreamBackend};
pub use timer::PeriodicTimer;

use crate::console::Console;
use anyhow::{anyhow, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::net::TcpStream;
use std::sync::{Arc, OnceLock};

/// How bytes from the remote peer are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// Output-only duplication.
    Disabled,
    /// One non-blocking read attempt per timer tick.
    Poll,
    /// A dedicated thread blocks in the backend's read.
    Thread,
}

/// How console output reaches the remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Every console write goes straight to the backend.
    Direct,
    /// Console writes are coalesced and flushed by the timer.
    Buffered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DupModes {
    pub read: ReadMode,
    pub write: WriteMode,
}

impl DupModes {
    /// Default for socket transports.
    pub const SOCKET: Self = Self {
        read: ReadMode::Poll,
        write: WriteMode::Buffered,
    };

    /// Default for generic duplex channels.
    pub const STREAM: Self = Self {
        read: ReadMode::Thread,
        write: WriteMode::Buffered,
    };

    pub(crate) const IDLE: Self = Self {
        read: ReadMode::Disabled,
        write: WriteMode::Direct,
    };

    pub fn new(read: ReadMode, write: WriteMode) -> Self {
        Self { read, write }
    }

    /// The timer is owned by a session iff it flushes a buffer or polls for input.
    pub fn needs_timer(self) -> bool {
        self.read == ReadMode::Poll || self.write == WriteMode::Buffered
    }
}

static VTERM: OnceLock<Vterm> = OnceLock::new();

/// Create the process-wide engine (lock and timer) once; later calls return it.
pub fn init() -> &'static Vterm {
    VTERM.get_or_init(|| Vterm::new(Arc::clone(Console::global())))
}

pub fn global() -> Option<&'static Vterm> {
    VTERM.get()
}

fn initialized() -> Result<&'static Vterm> {
    global().ok_or_else(|| anyhow!("console duplication is not initialized"))
}

/// Duplicate the process console over `backend` with explicit modes.
pub fn register(backend: Backend, modes: DupModes) -> Result<()> {
    initialized()?.register(backend, modes)
}

/// Duplicate the process console over a connected TCP socket.
pub fn register_socket(stream: TcpStream) -> Result<()> {
    initialized()?.register_socket(stream)
}

/// Duplicate the process console over a generic duplex channel.
pub fn register_stream(channel: impl DuplexStream + 'static) -> Result<()> {
    initialized()?.register_stream(channel)
}

/// Stop duplicating the process console. Safe to call at any time, from any thread.
pub fn unregister() -> bool {
    global().is_some_and(Vterm::unregister)
}

pub fn is_active() -> bool {
    global().is_some_and(Vterm::is_active)
}
