use crate::config::defaults::STDIN_ENQUEUE_TIMEOUT;
use crate::console::Console;
use crate::log_debug;
use std::time::Duration;

/// What [`insert_stdin`] did with a batch of remote input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub queued: usize,
    pub dropped: usize,
    pub interrupts: usize,
}

/// Feed bytes received from the remote peer into the console input queue.
///
/// The interrupt byte raises the interpreter's keyboard interrupt instead of being
/// queued. Other bytes wait a bounded time for room. Once one wait has timed out
/// the rest of the batch is only offered to the queue, so a batch costs at most one
/// wait and an interrupt byte behind a full queue is still seen promptly.
pub fn insert_stdin(console: &Console, bytes: &[u8]) -> InsertOutcome {
    let mut outcome = InsertOutcome::default();
    let mut wait = STDIN_ENQUEUE_TIMEOUT;
    for &byte in bytes {
        if console.interrupt().is_interrupt(byte) {
            console.interrupt().raise();
            outcome.interrupts += 1;
        } else if console.input().enqueue_timeout(byte, wait) {
            outcome.queued += 1;
        } else {
            outcome.dropped += 1;
            wait = Duration::ZERO;
        }
    }
    if outcome.dropped > 0 {
        log_debug(&format!(
            "console input queue full; dropped {} remote bytes",
            outcome.dropped
        ));
    }
    outcome
}
