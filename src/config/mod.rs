//! Command-line parsing and validation for the `dupterm` host.

pub mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use clap::Parser;
use std::net::SocketAddr;

use crate::vterm::{ReadMode, WriteMode};
use defaults::{DEFAULT_INTERRUPT_CHAR, DEFAULT_LISTEN_ADDR};

/// CLI options for the duplicating console host.
#[derive(Debug, Parser, Clone)]
#[command(about = "dupterm console duplication host", author, version)]
pub struct AppConfig {
    /// Address the remote console listener binds to
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,

    /// How bytes from the remote peer are read
    #[arg(long = "read-mode", value_enum, default_value_t = ReadMode::Poll)]
    pub read_mode: ReadMode,

    /// How console output reaches the remote peer
    #[arg(long = "write-mode", value_enum, default_value_t = WriteMode::Buffered)]
    pub write_mode: WriteMode,

    /// Byte that raises a keyboard interrupt instead of being queued
    #[arg(long = "interrupt-char", default_value_t = DEFAULT_INTERRUPT_CHAR)]
    pub interrupt_char: u8,

    /// Treat the interrupt byte as ordinary input
    #[arg(long = "no-interrupt", default_value_t = false)]
    pub no_interrupt: bool,

    /// Leave the local terminal in cooked mode
    #[arg(long = "no-raw", default_value_t = false)]
    pub no_raw: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "DUPTERM_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "DUPTERM_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging duplicated console bytes (debug log only)
    #[arg(
        long = "log-content",
        env = "DUPTERM_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,
}

impl AppConfig {
    pub fn logging_enabled(&self) -> bool {
        self.logs && !self.no_logs
    }

    /// Interrupt byte in effect, `None` when interrupts are disabled.
    pub fn effective_interrupt_char(&self) -> Option<u8> {
        (!self.no_interrupt).then_some(self.interrupt_char)
    }
}
