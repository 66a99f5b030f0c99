//! The console the engine duplicates: local terminal output, the input queue and
//! the interrupt byte.
//!
//! These are the collaborators the duplication engine plugs into. The local
//! terminal is any `Write` sink; [`Console::global`] wraps the process stdout.

mod input;
mod interrupt;
mod output;

#[cfg(test)]
mod tests;

pub use input::InputQueue;
pub use interrupt::InterruptSignal;
pub use output::Forwarder;

use crate::config::defaults::{COOKED_CHUNK, DEFAULT_INTERRUPT_CHAR, INPUT_QUEUE_CAPACITY};
use crate::token;
use output::{cook_chunks, ForwarderSlot};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

static GLOBAL_CONSOLE: OnceLock<Arc<Console>> = OnceLock::new();

pub struct Console {
    local: Mutex<Box<dyn Write + Send>>,
    forwarder: ForwarderSlot,
    input: InputQueue,
    interrupt: InterruptSignal,
    isr_dropped: AtomicU64,
}

impl Console {
    pub fn new(local: Box<dyn Write + Send>) -> Self {
        Self {
            local: Mutex::new(local),
            forwarder: ForwarderSlot::default(),
            input: InputQueue::new(INPUT_QUEUE_CAPACITY),
            interrupt: InterruptSignal::new(Some(DEFAULT_INTERRUPT_CHAR)),
            isr_dropped: AtomicU64::new(0),
        }
    }

    /// The process console, writing to stdout.
    pub fn global() -> &'static Arc<Console> {
        GLOBAL_CONSOLE.get_or_init(|| Arc::new(Console::new(Box::new(io::stdout()))))
    }

    pub fn input(&self) -> &InputQueue {
        &self.input
    }

    pub fn interrupt(&self) -> &InterruptSignal {
        &self.interrupt
    }

    /// Install or clear the Output Interceptor. Only the duplication engine calls this.
    pub fn set_stdout_forwarder(&self, forwarder: Option<Forwarder>) {
        self.forwarder.set(forwarder);
    }

    pub fn has_stdout_forwarder(&self) -> bool {
        self.forwarder.is_set()
    }

    /// Write raw bytes to the local terminal, then hand the same bytes to the interceptor.
    pub fn stdout_write(&self, data: &[u8], forward: bool) {
        let _span = token::release_for_blocking();
        self.write_local(data);
        if forward {
            self.forwarder.call(data);
        }
    }

    /// Like [`Console::stdout_write`] but with `\n` expanded to `\r\n` on both sides.
    pub fn stdout_write_cooked(&self, data: &[u8], forward: bool) {
        let _span = token::release_for_blocking();
        let forward = forward && self.forwarder.is_set();
        cook_chunks(data, COOKED_CHUNK, |chunk| {
            self.write_local(chunk);
            if forward {
                self.forwarder.call(chunk);
            }
        });
    }

    pub fn stdout_str(&self, text: &str) {
        self.stdout_write_cooked(text.as_bytes(), true);
    }

    fn write_local(&self, data: &[u8]) {
        let mut local = self.local.lock();
        // The local terminal is best effort; a broken stdout must not stop duplication.
        let _ = local.write_all(data);
        let _ = local.flush();
    }

    /// Receive interrupt entry point for bytes arriving on the local hardware terminal.
    /// Never blocks: the interrupt byte only sets a flag and queueing is try-only.
    pub fn uart_rx_isr(&self, bytes: &[u8]) {
        for &byte in bytes {
            if self.interrupt.is_interrupt(byte) {
                self.interrupt.raise();
            } else if !self.input.isr_enqueue(byte) {
                self.isr_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn isr_dropped(&self) -> u64 {
        self.isr_dropped.load(Ordering::Relaxed)
    }

    /// Interpreter input routine: wait for the next input byte, releasing the
    /// execution token while waiting. Returns `None` on timeout.
    pub fn stdin_rx_chr(&self, timeout: Duration) -> Option<u8> {
        if let Some(byte) = self.input.dequeue() {
            return Some(byte);
        }
        let _span = token::release_for_blocking();
        self.input.dequeue_timeout(timeout)
    }
}
