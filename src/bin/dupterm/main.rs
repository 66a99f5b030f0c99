//! dupterm host: a small line REPL whose console is duplicated to one remote peer.
//!
//! # Architecture
//!
//! - Input thread: reads the local terminal and feeds the console's receive path
//! - Accept thread: attaches one TCP peer at a time as the remote console
//! - Main thread: the REPL, the only code that runs while holding the execution token

mod input;
mod listener;
mod repl;

use anyhow::Result;
use dupterm::config::AppConfig;
use dupterm::local_terminal::LocalTerminal;
use dupterm::{init_logging, init_tracing, log_debug, log_file_path, vterm};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_logging(&config);
    log_debug("=== dupterm started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));
    if init_tracing(&config) {
        log_debug("lifecycle events recorded as JSON lines");
    }

    let engine = vterm::init();
    let console = Arc::clone(engine.console());
    console.interrupt().set_char(config.effective_interrupt_char());

    let terminal = LocalTerminal::enter(!config.no_raw);
    log_debug(&format!("local terminal mode: {:?}", terminal.mode()));
    let echo = terminal.mode().needs_local_echo();

    let local_addr = listener::spawn_listener(&config)?;
    log_debug(&format!("remote console listening on {local_addr}"));

    let local_eof = Arc::new(AtomicBool::new(false));
    input::spawn_input_thread(Arc::clone(&console), Arc::clone(&local_eof))?;

    console.stdout_str(&format!(
        "dupterm {} (remote console on {local_addr}, type help)\n",
        env!("CARGO_PKG_VERSION")
    ));
    let result = repl::run(engine, &console, echo, &local_eof);

    vterm::unregister();
    terminal.restore();
    log_debug("=== dupterm exiting ===");
    result
}
