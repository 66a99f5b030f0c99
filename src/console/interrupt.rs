use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU64, Ordering};

const DISABLED: i16 = -1;

/// The reserved interrupt byte and the interpreter's pending-interrupt flag.
pub struct InterruptSignal {
    byte: AtomicI16,
    pending: AtomicBool,
    raised: AtomicU64,
}

impl InterruptSignal {
    pub fn new(byte: Option<u8>) -> Self {
        Self {
            byte: AtomicI16::new(byte.map_or(DISABLED, i16::from)),
            pending: AtomicBool::new(false),
            raised: AtomicU64::new(0),
        }
    }

    pub fn set_char(&self, byte: Option<u8>) {
        self.byte
            .store(byte.map_or(DISABLED, i16::from), Ordering::Release);
    }

    pub fn char(&self) -> Option<u8> {
        u8::try_from(self.byte.load(Ordering::Acquire)).ok()
    }

    pub fn is_interrupt(&self, byte: u8) -> bool {
        self.char() == Some(byte)
    }

    /// Ask the interpreter to raise its keyboard interrupt at the next check.
    /// Safe from interrupt context: a single atomic store.
    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
        self.raised.fetch_add(1, Ordering::Relaxed);
    }

    /// Consume a pending interrupt.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn raised_count(&self) -> u64 {
        self.raised.load(Ordering::Relaxed)
    }
}
