use super::AppConfig;
use anyhow::{bail, Result};
use clap::Parser;

/// Bytes that would make the interrupt byte collide with line editing.
const RESERVED_INTERRUPT_BYTES: [u8; 3] = [b'\r', b'\n', 0x7f];

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values.
    pub fn validate(&mut self) -> Result<()> {
        if !self.no_interrupt {
            if !self.interrupt_char.is_ascii() {
                bail!(
                    "--interrupt-char must be an ASCII byte (< 0x80), got {:#04x}",
                    self.interrupt_char
                );
            }
            if RESERVED_INTERRUPT_BYTES.contains(&self.interrupt_char) {
                bail!(
                    "--interrupt-char {:#04x} is reserved for line editing",
                    self.interrupt_char
                );
            }
        }
        if self.listen.ip().is_multicast() {
            bail!("--listen must not be a multicast address, got {}", self.listen);
        }
        if self.log_content && !self.logging_enabled() {
            // Content logging without logging is a no-op; normalize so callers see the truth.
            self.log_content = false;
        }
        Ok(())
    }
}
