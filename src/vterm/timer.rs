use anyhow::{anyhow, Result};
use crossbeam_channel::{select, tick, unbounded, Receiver, Sender};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

enum TimerCommand {
    Start(Duration),
    Stop,
}

/// A reusable periodic timer backed by one long-lived thread.
///
/// The thread is created once and survives any number of start/stop cycles.
/// `start`/`stop` never wait for the callback, so both may be called from inside it.
pub struct PeriodicTimer {
    commands: Sender<TimerCommand>,
    running: Arc<AtomicBool>,
}

impl PeriodicTimer {
    pub fn spawn(name: &str, callback: impl Fn() + Send + 'static) -> io::Result<Self> {
        let (commands, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(false));
        let thread_running = Arc::clone(&running);
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_timer(rx, thread_running, callback))?;
        Ok(Self { commands, running })
    }

    pub fn start(&self, period: Duration) -> Result<()> {
        self.running.store(true, Ordering::Release);
        self.commands
            .send(TimerCommand::Start(period))
            .map_err(|_| {
                self.running.store(false, Ordering::Release);
                anyhow!("timer thread is gone")
            })
    }

    /// Stop ticking. A callback already running finishes; no new one starts.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.commands.send(TimerCommand::Stop);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

fn run_timer(rx: Receiver<TimerCommand>, running: Arc<AtomicBool>, callback: impl Fn()) {
    let mut ticker: Option<Receiver<Instant>> = None;
    loop {
        let command = match &ticker {
            None => rx.recv(),
            Some(ticks) => select! {
                recv(rx) -> command => command,
                recv(ticks) -> _ => {
                    if running.load(Ordering::Acquire) {
                        callback();
                    }
                    continue;
                }
            },
        };
        match command {
            Ok(TimerCommand::Start(period)) => ticker = Some(tick(period)),
            Ok(TimerCommand::Stop) => ticker = None,
            // Owner dropped.
            Err(_) => break,
        }
    }
}
