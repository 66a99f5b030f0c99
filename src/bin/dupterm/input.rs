use dupterm::console::Console;
use dupterm::log_debug;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Read the local terminal and hand every byte to the console's receive path, the
/// way a UART interrupt would. Sets `eof` when stdin closes.
pub(crate) fn spawn_input_thread(
    console: Arc<Console>,
    eof: Arc<AtomicBool>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("dupterm-stdin".to_string())
        .spawn(move || {
            let mut stdin = io::stdin();
            let mut buf = [0u8; 64];
            loop {
                let n = match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        log_debug(&format!("stdin read error: {err}"));
                        break;
                    }
                };
                console.uart_rx_isr(&buf[..n]);
            }
            eof.store(true, Ordering::Release);
        })
}
