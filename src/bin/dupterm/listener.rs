use anyhow::{Context, Result};
use dupterm::config::AppConfig;
use dupterm::log_debug;
use dupterm::vterm::{self, Backend, DupModes};
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use tracing::{info, warn};

const BUSY_MESSAGE: &[u8] = b"dupterm: another remote console is already attached\r\n";
const WELCOME_MESSAGE: &[u8] = b"dupterm: remote console attached\r\n";

/// Bind the remote console listener and serve it from a background thread.
pub(crate) fn spawn_listener(config: &AppConfig) -> Result<SocketAddr> {
    let listener = TcpListener::bind(config.listen)
        .with_context(|| format!("failed to bind remote console listener on {}", config.listen))?;
    let local_addr = listener.local_addr()?;
    let modes = DupModes::new(config.read_mode, config.write_mode);
    thread::Builder::new()
        .name("dupterm-accept".to_string())
        .spawn(move || accept_loop(listener, modes))
        .context("failed to start the accept thread")?;
    Ok(local_addr)
}

fn accept_loop(listener: TcpListener, modes: DupModes) {
    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => attach(stream, modes),
            Err(err) => log_debug(&format!("accept failed: {err}")),
        }
    }
}

/// One remote console at a time; later peers are told so and dropped.
fn attach(mut stream: TcpStream, modes: DupModes) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    if vterm::is_active() {
        let _ = stream.write_all(BUSY_MESSAGE);
        info!(target: "dupterm", %peer, "rejected concurrent remote console");
        return;
    }
    if let Err(err) = stream.write_all(WELCOME_MESSAGE) {
        log_debug(&format!("remote console {peer} went away before attach: {err}"));
        return;
    }
    let registered = Backend::socket(stream)
        .context("failed to configure remote console socket")
        .and_then(|backend| vterm::register(backend, modes));
    match registered {
        Ok(()) => log_debug(&format!("remote console attached from {peer}")),
        Err(err) => {
            warn!(target: "dupterm", %peer, error = %err, "remote console attach failed");
            log_debug(&format!("remote console attach failed for {peer}: {err:#}"));
        }
    }
}
