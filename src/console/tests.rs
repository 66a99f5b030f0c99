use super::output::cook_chunks;
use super::*;
use std::sync::Mutex as StdMutex;

#[derive(Clone, Default)]
struct Capture(Arc<StdMutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn console_with_capture() -> (Console, Capture) {
    let capture = Capture::default();
    (Console::new(Box::new(capture.clone())), capture)
}

fn recording_forwarder() -> (Forwarder, Arc<StdMutex<Vec<Vec<u8>>>>) {
    let calls = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let forwarder: Forwarder = Arc::new(move |data: &[u8]| {
        sink.lock().unwrap().push(data.to_vec());
    });
    (forwarder, calls)
}

#[test]
fn stdout_write_reaches_local_and_interceptor() {
    let (console, capture) = console_with_capture();
    let (forwarder, calls) = recording_forwarder();
    console.set_stdout_forwarder(Some(forwarder));
    console.stdout_write(b">>> ", true);
    assert_eq!(capture.0.lock().unwrap().as_slice(), b">>> ");
    assert_eq!(calls.lock().unwrap().as_slice(), &[b">>> ".to_vec()]);
}

#[test]
fn unforwarded_write_skips_interceptor() {
    let (console, capture) = console_with_capture();
    let (forwarder, calls) = recording_forwarder();
    console.set_stdout_forwarder(Some(forwarder));
    console.stdout_write(b"local only", false);
    assert_eq!(capture.0.lock().unwrap().as_slice(), b"local only");
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn cleared_interceptor_is_not_called() {
    let (console, _capture) = console_with_capture();
    let (forwarder, calls) = recording_forwarder();
    console.set_stdout_forwarder(Some(forwarder));
    console.set_stdout_forwarder(None);
    assert!(!console.has_stdout_forwarder());
    console.stdout_write(b"x", true);
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn cooked_write_normalizes_line_endings_on_both_sides() {
    let (console, capture) = console_with_capture();
    let (forwarder, calls) = recording_forwarder();
    console.set_stdout_forwarder(Some(forwarder));
    console.stdout_write_cooked(b"a\nb\n", true);
    assert_eq!(capture.0.lock().unwrap().as_slice(), b"a\r\nb\r\n");
    let forwarded: Vec<u8> = calls.lock().unwrap().concat();
    assert_eq!(forwarded, b"a\r\nb\r\n");
}

#[test]
fn cook_chunks_never_splits_crlf_and_respects_chunk_size() {
    let data: Vec<u8> = b"0123456\n".repeat(20);
    let mut chunks = Vec::new();
    cook_chunks(&data, 64, |chunk| chunks.push(chunk.to_vec()));
    assert!(chunks.iter().all(|chunk| chunk.len() <= 64));
    assert!(chunks.iter().all(|chunk| chunk.last() != Some(&b'\r')));
    let joined: Vec<u8> = chunks.concat();
    assert_eq!(joined, b"0123456\r\n".repeat(20));
}

#[test]
fn isr_routes_interrupt_byte_to_signal() {
    let (console, _capture) = console_with_capture();
    console.uart_rx_isr(&[b'a', 0x03, b'b']);
    assert!(console.interrupt().take_pending());
    assert!(!console.interrupt().take_pending());
    assert_eq!(console.input().dequeue(), Some(b'a'));
    assert_eq!(console.input().dequeue(), Some(b'b'));
    assert_eq!(console.input().dequeue(), None);
}

#[test]
fn isr_drops_when_queue_full_without_blocking() {
    let (console, _capture) = console_with_capture();
    let capacity = console.input().capacity();
    let bytes = vec![b'x'; capacity + 5];
    console.uart_rx_isr(&bytes);
    assert_eq!(console.input().len(), capacity);
    assert_eq!(console.isr_dropped(), 5);
}

#[test]
fn disabled_interrupt_char_queues_every_byte() {
    let (console, _capture) = console_with_capture();
    console.interrupt().set_char(None);
    console.uart_rx_isr(&[0x03]);
    assert!(!console.interrupt().take_pending());
    assert_eq!(console.input().dequeue(), Some(0x03));
}

#[test]
fn stdin_rx_chr_times_out_when_empty() {
    let (console, _capture) = console_with_capture();
    assert_eq!(console.stdin_rx_chr(Duration::from_millis(10)), None);
    console.uart_rx_isr(b"z");
    assert_eq!(console.stdin_rx_chr(Duration::from_millis(10)), Some(b'z'));
}
