use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Process-wide bounded byte queue feeding the interpreter's input routine.
///
/// Two distinct enqueue paths exist: [`InputQueue::isr_enqueue`] never waits and is
/// reserved for the receive interrupt; [`InputQueue::enqueue_timeout`] waits a bounded
/// time and is used by everything else.
pub struct InputQueue {
    tx: Sender<u8>,
    rx: Receiver<u8>,
}

impl InputQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// Try-only enqueue for interrupt context. Returns `false` when the byte was dropped.
    pub fn isr_enqueue(&self, byte: u8) -> bool {
        self.tx.try_send(byte).is_ok()
    }

    /// Enqueue, waiting at most `timeout` for room. Returns `false` when the byte was dropped.
    pub fn enqueue_timeout(&self, byte: u8, timeout: Duration) -> bool {
        self.tx.send_timeout(byte, timeout).is_ok()
    }

    pub fn dequeue(&self) -> Option<u8> {
        self.rx.try_recv().ok()
    }

    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<u8> {
        match self.rx.recv_timeout(timeout) {
            Ok(byte) => Some(byte),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }

    /// Drop everything queued. Returns how many bytes were discarded.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }
}
