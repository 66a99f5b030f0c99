//! Mode of the host's own terminal while the REPL runs.
//!
//! Raw mode hands every keystroke to the console receive path, the interrupt byte
//! included, instead of letting the terminal driver act on it. The REPL then has to
//! echo for itself. Raw mode is undone when the guard drops and from the panic hook.

use crate::{log_debug, log_panic};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, IsTerminal};
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static RAW: AtomicBool = AtomicBool::new(false);
static PANIC_HOOK: Once = Once::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalMode {
    /// Keystrokes arrive unprocessed.
    Raw,
    /// The terminal driver edits lines and echoes them.
    Cooked,
    /// Stdin is a pipe or a file.
    Piped,
}

impl TerminalMode {
    /// Whether typed bytes only show up if the REPL echoes them.
    pub fn needs_local_echo(self) -> bool {
        self != TerminalMode::Cooked
    }
}

/// Holds the local terminal in the mode picked at startup.
pub struct LocalTerminal {
    mode: TerminalMode,
}

impl LocalTerminal {
    /// Switch an interactive stdin to raw mode when `want_raw` is set. A terminal
    /// that refuses raw mode stays cooked. Also installs the crash-log panic hook.
    pub fn enter(want_raw: bool) -> Self {
        PANIC_HOOK.call_once(install_panic_hook);
        Self::choose(io::stdin().is_terminal(), want_raw)
    }

    fn choose(interactive: bool, want_raw: bool) -> Self {
        let mode = match (interactive, want_raw) {
            (false, _) => TerminalMode::Piped,
            (true, false) => TerminalMode::Cooked,
            (true, true) => match enter_raw() {
                Ok(()) => TerminalMode::Raw,
                Err(err) => {
                    log_debug(&format!("raw mode unavailable, staying cooked: {err}"));
                    TerminalMode::Cooked
                }
            },
        };
        Self { mode }
    }

    pub fn mode(&self) -> TerminalMode {
        self.mode
    }

    /// Give the terminal back in cooked mode. Dropping the guard does the same.
    pub fn restore(&self) {
        leave_raw();
    }
}

impl Drop for LocalTerminal {
    fn drop(&mut self) {
        leave_raw();
    }
}

fn enter_raw() -> io::Result<()> {
    enable_raw_mode()?;
    RAW.store(true, Ordering::SeqCst);
    Ok(())
}

/// Safe to call any number of times, from any thread.
fn leave_raw() {
    if !RAW.swap(false, Ordering::SeqCst) {
        return;
    }
    if let Err(err) = disable_raw_mode() {
        log_debug(&format!("failed to leave raw mode: {err}"));
    }
}

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        leave_raw();
        log_panic(info);
        previous(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piped_stdin_never_goes_raw() {
        let terminal = LocalTerminal::choose(false, true);
        assert_eq!(terminal.mode(), TerminalMode::Piped);
        assert!(terminal.mode().needs_local_echo());
        assert!(!RAW.load(Ordering::SeqCst));
    }

    #[test]
    fn cooked_terminal_leaves_echo_to_the_driver() {
        let terminal = LocalTerminal::choose(true, false);
        assert_eq!(terminal.mode(), TerminalMode::Cooked);
        assert!(!terminal.mode().needs_local_echo());
        terminal.restore();
        assert!(!RAW.load(Ordering::SeqCst));
    }

    #[test]
    fn raw_mode_echoes_locally() {
        assert!(TerminalMode::Raw.needs_local_echo());
    }
}
