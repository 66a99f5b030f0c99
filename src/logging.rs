//! Debug and crash logs. Both live in files: the console is what gets duplicated,
//! so diagnostics must never be written to it.

use crate::config::AppConfig;
use parking_lot::{const_mutex, Mutex};
use std::{
    env, fs,
    io::{self, Write},
    panic,
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{SystemTime, UNIX_EPOCH},
};

const DEBUG_LOG_CAP: u64 = 5 * 1024 * 1024;
const CRASH_LOG_CAP: u64 = 256 * 1024;

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);
static CONTENT_ENABLED: AtomicBool = AtomicBool::new(false);
static DEBUG_LOG: Mutex<Option<CappedLog>> = const_mutex(None);

pub fn log_file_path() -> PathBuf {
    env::temp_dir().join("dupterm.log")
}

/// Crash log: panic location and version, plus the payload only with content logging.
pub fn crash_log_path() -> PathBuf {
    env::temp_dir().join("dupterm_crash.log")
}

/// Append-only file that starts over once the next line would push it past `cap`.
struct CappedLog {
    file: fs::File,
    cap: u64,
    len: u64,
}

impl CappedLog {
    fn open(path: &PathBuf, cap: u64) -> io::Result<Self> {
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let mut log = Self {
            len: file.metadata()?.len(),
            file,
            cap,
        };
        if log.len > cap {
            log.truncate()?;
        }
        Ok(log)
    }

    fn truncate(&mut self) -> io::Result<()> {
        // Append mode keeps later writes at the (new) end.
        self.file.set_len(0)?;
        self.len = 0;
        Ok(())
    }

    fn append(&mut self, line: &str) -> io::Result<()> {
        let next = line.len() as u64;
        if self.len.saturating_add(next) > self.cap {
            self.truncate()?;
        }
        self.file.write_all(line.as_bytes())?;
        self.len = self.len.saturating_add(next);
        Ok(())
    }
}

fn timestamped(msg: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let current = thread::current();
    let thread = current.name().unwrap_or("unnamed");
    format!(
        "[{}.{:03}] [{thread}] {msg}\n",
        now.as_secs(),
        now.subsec_millis()
    )
}

fn configure(enabled: bool, content: bool) {
    DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
    CONTENT_ENABLED.store(enabled && content, Ordering::Relaxed);
    *DEBUG_LOG.lock() = if enabled {
        CappedLog::open(&log_file_path(), DEBUG_LOG_CAP).ok()
    } else {
        None
    };
}

/// Apply the host's logging flags. Logging is off until this runs.
pub fn init_logging(config: &AppConfig) {
    configure(config.logging_enabled(), config.log_content);
}

pub fn log_debug(msg: &str) {
    if !DEBUG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let line = timestamped(msg);
    if let Some(log) = DEBUG_LOG.lock().as_mut() {
        let _ = log.append(&line);
    }
}

/// Log text that may include console content; dropped unless content logging is on.
pub fn log_debug_content(msg: &str) {
    if CONTENT_ENABLED.load(Ordering::Relaxed) {
        log_debug(msg);
    }
}

/// Log raw console bytes, escaped, under `label`. Content logging only.
pub fn log_bytes(label: &str, bytes: &[u8]) {
    if CONTENT_ENABLED.load(Ordering::Relaxed) {
        log_debug(&format_bytes(label, bytes));
    }
}

fn format_bytes(label: &str, bytes: &[u8]) -> String {
    format!("{label} ({} bytes): {}", bytes.len(), bytes.escape_ascii())
}

pub fn log_panic(info: &panic::PanicHookInfo<'_>) {
    if !DEBUG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let payload = if CONTENT_ENABLED.load(Ordering::Relaxed) {
        info.payload()
            .downcast_ref::<&str>()
            .map(|text| (*text).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string())
    } else {
        "payload omitted".to_string()
    };
    let line = timestamped(&format!(
        "panic at {location}: {payload} (v{})",
        env!("CARGO_PKG_VERSION")
    ));
    if let Ok(mut log) = CappedLog::open(&crash_log_path(), CRASH_LOG_CAP) {
        let _ = log.append(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_logging_requires_logging() {
        configure(false, true);
        assert!(!CONTENT_ENABLED.load(Ordering::Relaxed));
        configure(true, true);
        assert!(CONTENT_ENABLED.load(Ordering::Relaxed));
        configure(false, false);
        assert!(DEBUG_LOG.lock().is_none());
    }

    #[test]
    fn capped_log_starts_over_past_cap() {
        let path = env::temp_dir().join(format!("dupterm_cap_{}.log", std::process::id()));
        let _ = fs::remove_file(&path);
        let mut log = CappedLog::open(&path, 16).expect("open log");
        log.append("0123456789\n").unwrap();
        log.append("abcdefghij\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "abcdefghij\n");

        drop(log);
        let reopened = CappedLog::open(&path, 4).expect("reopen log");
        assert_eq!(reopened.len, 0);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn console_bytes_are_escaped() {
        assert_eq!(
            format_bytes("remote input", b"ok\r\n\x03"),
            "remote input (5 bytes): ok\\r\\n\\x03"
        );
    }

    #[test]
    fn lines_carry_thread_name() {
        let line = thread::Builder::new()
            .name("vterm-rx".to_string())
            .spawn(|| timestamped("hello"))
            .unwrap()
            .join()
            .unwrap();
        assert!(line.contains("[vterm-rx] hello"));
        assert!(line.ends_with('\n'));
    }
}
