use parking_lot::RwLock;
use std::sync::Arc;

/// The Output Interceptor: called with exactly the bytes just written to the local terminal.
pub type Forwarder = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// The single interceptor slot of a console.
#[derive(Default)]
pub(super) struct ForwarderSlot {
    hook: RwLock<Option<Forwarder>>,
}

impl ForwarderSlot {
    pub(super) fn set(&self, forwarder: Option<Forwarder>) {
        *self.hook.write() = forwarder;
    }

    pub(super) fn is_set(&self) -> bool {
        self.hook.read().is_some()
    }

    pub(super) fn call(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        // Clone out so the hook can replace itself (unregister from inside a write).
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook(data);
        }
    }
}

/// Expand `\n` into `\r\n`, emitting the result in chunks of at most `chunk` bytes.
pub(super) fn cook_chunks(data: &[u8], chunk: usize, mut emit: impl FnMut(&[u8])) {
    let chunk = chunk.max(2);
    let mut out = Vec::with_capacity(chunk);
    for &byte in data {
        let needed = if byte == b'\n' { 2 } else { 1 };
        if out.len() + needed > chunk {
            emit(&out);
            out.clear();
        }
        if byte == b'\n' {
            out.push(b'\r');
        }
        out.push(byte);
    }
    if !out.is_empty() {
        emit(&out);
    }
}
