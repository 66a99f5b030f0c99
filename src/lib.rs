//! Console duplication for a hosted interpreter.
//!
//! One logical console stream is mirrored across the local terminal and at most
//! one remote transport (a TCP socket or a generic duplex channel). Output written
//! to the local terminal is forwarded to the remote peer; bytes typed by the peer
//! are injected into the interpreter's input queue as if they came from the
//! local keyboard.

pub mod config;
pub mod console;
pub mod local_terminal;
mod lock;
mod logging;
mod telemetry;
pub mod token;
pub mod vterm;

pub(crate) use lock::lock_bounded;
pub use logging::{
    crash_log_path, init_logging, log_bytes, log_debug, log_debug_content, log_file_path,
    log_panic,
};
pub use telemetry::init_tracing;
