use crate::config::defaults::OUTPUT_BUFFER_CAPACITY;

/// Fixed-capacity staging area batching console output between timer flushes.
pub struct OutputBuffer {
    data: [u8; OUTPUT_BUFFER_CAPACITY],
    len: usize,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBuffer {
    pub const CAPACITY: usize = OUTPUT_BUFFER_CAPACITY;

    pub const fn new() -> Self {
        Self {
            data: [0; OUTPUT_BUFFER_CAPACITY],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn fits(&self, extra: usize) -> bool {
        extra <= Self::CAPACITY - self.len
    }

    /// Append `bytes` if they fit; otherwise leave the buffer untouched and return `false`.
    pub fn append(&mut self, bytes: &[u8]) -> bool {
        if !self.fits(bytes.len()) {
            return false;
        }
        let end = self.len + bytes.len();
        self.data[self.len..end].copy_from_slice(bytes);
        self.len = end;
        true
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_fills_up_to_capacity() {
        let mut buffer = OutputBuffer::new();
        assert!(buffer.append(&[b'a'; 100]));
        assert!(buffer.append(&[b'b'; 28]));
        assert_eq!(buffer.len(), OutputBuffer::CAPACITY);
        assert!(!buffer.append(b"c"));
        assert_eq!(buffer.len(), OutputBuffer::CAPACITY);
    }

    #[test]
    fn rejected_append_leaves_contents_intact() {
        let mut buffer = OutputBuffer::new();
        assert!(buffer.append(&[b'x'; 100]));
        assert!(!buffer.append(&[b'y'; 40]));
        assert_eq!(buffer.as_slice(), &[b'x'; 100][..]);
    }

    #[test]
    fn clear_empties() {
        let mut buffer = OutputBuffer::new();
        buffer.append(b"hello");
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.fits(OutputBuffer::CAPACITY));
    }
}
