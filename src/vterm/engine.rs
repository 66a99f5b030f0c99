use super::backend::{write_all, Backend, ReadCall, ReadStatus, WriteSite};
use super::buffer::OutputBuffer;
use super::stats::{Counters, VtermStats};
use super::stdin::insert_stdin;
use super::stream::DuplexStream;
use super::timer::PeriodicTimer;
use super::{DupModes, ReadMode, WriteMode};
use crate::config::defaults::{
    POLL_READ_CHUNK, PUSH_LOCK_TIMEOUT, READER_TASK_CHUNK, READER_TASK_STACK_SIZE,
    STREAM_RETRY_DELAY, TIMER_PERIOD, UNREGISTER_LOCK_TIMEOUT,
};
use crate::console::{Console, Forwarder};
use crate::{lock_bounded, log_bytes, log_debug};
use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;
use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Everything guarded by the engine lock. `generation == 0` means idle.
struct Session {
    backend: Backend,
    modes: DupModes,
    buffer: OutputBuffer,
    generation: u64,
}

impl Session {
    const fn idle() -> Self {
        Self {
            backend: Backend::Null,
            modes: DupModes::IDLE,
            buffer: OutputBuffer::new(),
            generation: 0,
        }
    }

    fn reset(&mut self) {
        *self = Self::idle();
    }
}

/// What the engine published about the registered backend. Lives outside the
/// session lock so the timer can still poll while a writer holds the session.
#[derive(Default)]
struct Installed {
    backend: Backend,
    generation: u64,
    polled: bool,
}

/// How teardown gets at the session.
enum Teardown<'a> {
    /// The caller already holds the engine lock.
    Held(&'a mut Session),
    /// Wait at most this long for the lock, then tear down without it.
    Wait(Duration),
}

struct Shared {
    this: Weak<Shared>,
    session: Mutex<Session>,
    /// The backend whose teardown hook is still owed. Non-null from registration
    /// until teardown has finished, so a new session cannot overlap an old one.
    installed: Mutex<Installed>,
    /// Generation of the active session, 0 when unregistered. Whoever swaps it to 0
    /// owns the teardown.
    active_generation: AtomicU64,
    next_generation: AtomicU64,
    timer: Option<PeriodicTimer>,
    timer_period: Duration,
    console: Arc<Console>,
    counters: Counters,
}

/// The console duplication engine.
///
/// Holds at most one session at a time. The lock and the timer are created with the
/// engine and reused across sessions.
pub struct Vterm {
    shared: Arc<Shared>,
}

impl Vterm {
    pub fn new(console: Arc<Console>) -> Self {
        Self::with_timer_period(console, TIMER_PERIOD)
    }

    pub(crate) fn with_timer_period(console: Arc<Console>, timer_period: Duration) -> Self {
        Self::build(console, timer_period, true)
    }

    /// An engine whose timer thread never came up.
    #[cfg(test)]
    pub(crate) fn without_timer(console: Arc<Console>) -> Self {
        Self::build(console, TIMER_PERIOD, false)
    }

    fn build(console: Arc<Console>, timer_period: Duration, with_timer: bool) -> Self {
        let shared = Arc::new_cyclic(|this: &Weak<Shared>| {
            let timer = if with_timer {
                spawn_timer(this.clone())
            } else {
                None
            };
            Shared {
                this: this.clone(),
                session: Mutex::new(Session::idle()),
                installed: Mutex::new(Installed::default()),
                active_generation: AtomicU64::new(0),
                next_generation: AtomicU64::new(0),
                timer,
                timer_period,
                console,
                counters: Counters::default(),
            }
        });
        Self { shared }
    }

    pub fn console(&self) -> &Arc<Console> {
        &self.shared.console
    }

    /// Start duplicating the console over `backend`.
    ///
    /// Fails without changing any state when a session is already active, the previous
    /// one is still being torn down, or the timer/reader thread cannot be started.
    pub fn register(&self, backend: Backend, modes: DupModes) -> Result<()> {
        self.shared.register(backend, modes)
    }

    pub fn register_socket(&self, stream: TcpStream) -> Result<()> {
        let backend = Backend::socket(stream).context("failed to configure console socket")?;
        self.register(backend, DupModes::SOCKET)
    }

    pub fn register_stream(&self, channel: impl DuplexStream + 'static) -> Result<()> {
        self.register(Backend::stream(channel), DupModes::STREAM)
    }

    /// Stop duplicating. Returns `true` if this call performed the teardown.
    pub fn unregister(&self) -> bool {
        self.shared
            .unregister_inner(None, Teardown::Wait(UNREGISTER_LOCK_TIMEOUT))
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Hand console output to the session. Buffered sessions coalesce it until the
    /// next tick; direct sessions write it out before returning.
    pub fn push(&self, data: &[u8]) {
        self.shared.forward(data);
    }

    /// Write out the coalescing buffer if the lock is free right now.
    pub fn flush(&self) {
        self.shared.flush();
    }

    /// One timer period's worth of work. Runs on the timer thread; exposed so hosts
    /// and tests can drive the engine without waiting for the timer.
    pub fn timer_tick(&self) {
        self.shared.timer_tick();
    }

    pub fn stats(&self) -> VtermStats {
        self.shared.stats()
    }

    #[cfg(test)]
    pub(crate) fn with_lock_held<R>(&self, f: impl FnOnce() -> R) -> R {
        let _session = self.shared.session.lock();
        f()
    }

    #[cfg(test)]
    pub(crate) fn buffered_len(&self) -> usize {
        self.shared.session.lock().buffer.len()
    }
}

impl Drop for Vterm {
    fn drop(&mut self) {
        self.shared.unregister_inner(None, Teardown::Wait(UNREGISTER_LOCK_TIMEOUT));
    }
}

impl Shared {
    fn is_active(&self) -> bool {
        self.active_generation.load(Ordering::Acquire) != 0
    }

    fn register(&self, backend: Backend, modes: DupModes) -> Result<()> {
        if backend.is_null() {
            bail!("cannot duplicate the console over the null backend");
        }
        if self.is_active() {
            bail!("console duplication is already active");
        }
        let timer = if modes.needs_timer() {
            Some(
                self.timer
                    .as_ref()
                    .ok_or_else(|| anyhow!("console duplication timer is unavailable"))?,
            )
        } else {
            None
        };

        let Some(mut session) =
            lock_bounded(&self.session, UNREGISTER_LOCK_TIMEOUT, "vterm register")
        else {
            bail!("console duplication lock is busy");
        };
        if self.is_active() {
            bail!("console duplication is already active");
        }
        if !self.installed.lock().backend.is_null() {
            bail!("previous console duplication session is still shutting down");
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        *session = Session {
            backend: backend.clone(),
            modes,
            buffer: OutputBuffer::new(),
            generation,
        };
        if let Some(timer) = timer {
            if let Err(err) = timer.start(self.timer_period) {
                session.reset();
                return Err(err.context("failed to start the console duplication timer"));
            }
        }
        *self.installed.lock() = Installed {
            backend: backend.clone(),
            generation,
            polled: modes.read == ReadMode::Poll,
        };
        self.console.set_stdout_forwarder(Some(self.forwarder()));
        // Teardown becomes claimable from here on, so this is the last step before
        // anything else may observe the session.
        self.active_generation.store(generation, Ordering::Release);

        if modes.read == ReadMode::Thread {
            if let Err(err) = self.spawn_reader(backend.clone(), generation) {
                self.rollback_locked(&mut session);
                return Err(
                    anyhow::Error::new(err).context("failed to start the console reader thread")
                );
            }
        }
        drop(session);

        Counters::bump(&self.counters.registrations);
        info!(
            target: "vterm",
            backend = backend.kind(),
            read_mode = ?modes.read,
            write_mode = ?modes.write,
            generation,
            "console duplication registered"
        );
        Ok(())
    }

    /// Undo a registration that failed after it was installed. Not a teardown: the
    /// backend is dropped by the caller without running its hook.
    fn rollback_locked(&self, session: &mut Session) {
        self.active_generation.store(0, Ordering::Release);
        if let Some(timer) = &self.timer {
            timer.stop();
        }
        self.console.set_stdout_forwarder(None);
        *self.installed.lock() = Installed::default();
        session.reset();
    }

    fn forwarder(&self) -> Forwarder {
        let weak = self.this.clone();
        Arc::new(move |data: &[u8]| {
            if let Some(shared) = weak.upgrade() {
                shared.forward(data);
            }
        })
    }

    fn spawn_reader(&self, backend: Backend, generation: u64) -> io::Result<()> {
        let weak = self.this.clone();
        thread::Builder::new()
            .name("vterm-rx".to_string())
            .stack_size(READER_TASK_STACK_SIZE)
            .spawn(move || reader_task_loop(weak, backend, generation))
            .map(drop)
    }

    /// Is `session` the active one? A session left behind by a teardown that could
    /// not take the lock is discarded here, by the next lock holder.
    fn current(&self, session: &mut Session) -> bool {
        if session.generation == 0 {
            return false;
        }
        if session.generation == self.active_generation.load(Ordering::Acquire) {
            return true;
        }
        session.reset();
        false
    }

    /// Output interceptor: every byte the console wrote locally lands here.
    fn forward(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let Some(mut session) = lock_bounded(&self.session, PUSH_LOCK_TIMEOUT, "vterm push")
        else {
            Counters::add(&self.counters.push_dropped, data.len());
            return;
        };
        if !self.current(&mut session) {
            return;
        }
        log_bytes("console output", data);
        match session.modes.write {
            WriteMode::Buffered => self.push_locked(&mut session, data),
            WriteMode::Direct => self.write_locked(&mut session, data, WriteSite::Caller),
        }
    }

    fn push_locked(&self, session: &mut Session, data: &[u8]) {
        if session.buffer.append(data) {
            return;
        }
        // Overflow: flush what is buffered, then send the new bytes straight through.
        let result = self
            .drain_locked(session, WriteSite::Caller)
            .and_then(|()| write_all(&session.backend, data, WriteSite::Caller));
        match result {
            Ok(()) => Counters::add(&self.counters.forwarded, data.len()),
            Err(err) => self.abort_locked(session, &err, "push"),
        }
    }

    fn write_locked(&self, session: &mut Session, data: &[u8], site: WriteSite) {
        match write_all(&session.backend, data, site) {
            Ok(()) => Counters::add(&self.counters.forwarded, data.len()),
            Err(err) => self.abort_locked(session, &err, "write"),
        }
    }

    /// Write the whole buffer out and empty it. The buffer is emptied on failure too.
    fn drain_locked(&self, session: &mut Session, site: WriteSite) -> io::Result<()> {
        if session.buffer.is_empty() {
            return Ok(());
        }
        let result = write_all(&session.backend, session.buffer.as_slice(), site);
        if result.is_ok() {
            Counters::add(&self.counters.forwarded, session.buffer.len());
        }
        session.buffer.clear();
        result
    }

    fn flush(&self) {
        let Some(mut session) = self.session.try_lock() else {
            Counters::bump(&self.counters.skipped_flushes);
            return;
        };
        if self.current(&mut session) {
            self.flush_locked(&mut session);
        }
    }

    fn flush_locked(&self, session: &mut Session) {
        if let Err(err) = self.drain_locked(session, WriteSite::Timer) {
            self.abort_locked(session, &err, "flush");
        }
    }

    fn abort_locked(&self, session: &mut Session, err: &io::Error, context: &str) {
        warn!(target: "vterm", error = %err, context, "console backend write failed");
        log_debug(&format!("vterm {context}: backend write failed: {err}"));
        let generation = session.generation;
        self.unregister_inner(Some(generation), Teardown::Held(session));
    }

    fn timer_tick(&self) {
        // Never wait on a lock from the timer. A busy session only costs the flush.
        match self.session.try_lock() {
            Some(mut session) => {
                if self.current(&mut session) && session.modes.write == WriteMode::Buffered {
                    self.flush_locked(&mut session);
                }
            }
            None => Counters::bump(&self.counters.skipped_flushes),
        }
        // A failed flush has already emptied `installed`, which also ends polling.
        if let Some((backend, generation)) = self.poll_target() {
            self.poll_read(&backend, generation);
        }
    }

    fn poll_target(&self) -> Option<(Backend, u64)> {
        let installed = self.installed.try_lock()?;
        let live = installed.polled
            && installed.generation == self.active_generation.load(Ordering::Acquire);
        live.then(|| (installed.backend.clone(), installed.generation))
    }

    fn poll_read(&self, backend: &Backend, generation: u64) {
        let mut buf = [0u8; POLL_READ_CHUNK];
        match backend.read(&mut buf, ReadCall::Poll) {
            Ok(ReadStatus::Data(n)) => self.inject(&buf[..n]),
            Ok(ReadStatus::WouldBlock) => {}
            Ok(ReadStatus::Closed) => {
                self.end_of_input(generation, "peer closed the connection", Duration::ZERO);
            }
            Err(err) => {
                self.end_of_input(generation, &format!("read failed: {err}"), Duration::ZERO);
            }
        }
    }

    fn end_of_input(&self, generation: u64, reason: &str, wait: Duration) {
        if self.unregister_inner(Some(generation), Teardown::Wait(wait)) {
            info!(target: "vterm", generation, reason, "console duplication ended by backend");
        }
    }

    fn inject(&self, data: &[u8]) {
        log_bytes("remote input", data);
        let outcome = insert_stdin(&self.console, data);
        Counters::add(&self.counters.injected, outcome.queued);
        Counters::add(&self.counters.inject_dropped, outcome.dropped);
        Counters::add(&self.counters.interrupts, outcome.interrupts);
    }

    /// Tear the session down once. `expected` restricts the claim to one generation so
    /// late error paths of an older session cannot end a newer one.
    fn unregister_inner(&self, expected: Option<u64>, teardown: Teardown<'_>) -> bool {
        let claimed = match expected {
            Some(generation) => self
                .active_generation
                .compare_exchange(generation, 0, Ordering::AcqRel, Ordering::Acquire)
                .map_err(|_| ()),
            None => match self.active_generation.swap(0, Ordering::AcqRel) {
                0 => Err(()),
                generation => Ok(generation),
            },
        };
        let Ok(generation) = claimed else {
            if let Teardown::Held(session) = teardown {
                self.current(session);
            }
            return false;
        };

        match teardown {
            Teardown::Held(session) => self.teardown_locked(session),
            Teardown::Wait(wait) => match lock_bounded(&self.session, wait, "vterm unregister") {
                Some(mut session) => self.teardown_locked(&mut session),
                None => {
                    warn!(
                        target: "vterm",
                        generation,
                        "engine lock busy; tearing down without it"
                    );
                    self.teardown_detached();
                }
            },
        }

        Counters::bump(&self.counters.teardowns);
        info!(target: "vterm", generation, "console duplication unregistered");
        true
    }

    fn teardown_locked(&self, session: &mut Session) {
        if let Some(timer) = &self.timer {
            timer.stop();
        }
        self.console.set_stdout_forwarder(None);
        let backend = std::mem::take(&mut *self.installed.lock()).backend;
        session.reset();
        // Only after the session is idle, and before the lock is released.
        backend.unregister();
    }

    /// Teardown for when the lock holder is stuck. The session itself is reset by the
    /// next lock holder.
    fn teardown_detached(&self) {
        if let Some(timer) = &self.timer {
            timer.stop();
        }
        self.console.set_stdout_forwarder(None);
        // Emptying `installed` is what allows the next registration, so it goes last.
        let backend = std::mem::take(&mut *self.installed.lock()).backend;
        backend.unregister();
    }

    fn stats(&self) -> VtermStats {
        let generation = self.active_generation.load(Ordering::Acquire);
        let backend = self.installed.lock().backend.kind();
        let snapshot = self
            .session
            .try_lock()
            .filter(|session| generation != 0 && session.generation == generation)
            .map(|session| (session.modes, session.buffer.len()));
        let counters = &self.counters;
        VtermStats {
            active: generation != 0,
            backend,
            generation,
            read_mode: snapshot.map(|(modes, _)| modes.read),
            write_mode: snapshot.map(|(modes, _)| modes.write),
            buffered: snapshot.map(|(_, len)| len),
            forwarded_bytes: Counters::get(&counters.forwarded),
            push_dropped_bytes: Counters::get(&counters.push_dropped),
            injected_bytes: Counters::get(&counters.injected),
            inject_dropped_bytes: Counters::get(&counters.inject_dropped),
            interrupts: Counters::get(&counters.interrupts),
            registrations: Counters::get(&counters.registrations),
            teardowns: Counters::get(&counters.teardowns),
            skipped_flushes: Counters::get(&counters.skipped_flushes),
        }
    }
}

fn spawn_timer(shared: Weak<Shared>) -> Option<PeriodicTimer> {
    let timer = PeriodicTimer::spawn("vterm-timer", move || {
        if let Some(shared) = shared.upgrade() {
            shared.timer_tick();
        }
    });
    match timer {
        Ok(timer) => Some(timer),
        Err(err) => {
            log_debug(&format!("vterm: timer thread unavailable: {err}"));
            None
        }
    }
}

/// Body of the reader thread: block in the backend's read and feed the input queue
/// until the peer goes away or the session ends.
fn reader_task_loop(shared: Weak<Shared>, backend: Backend, generation: u64) {
    let mut buf = [0u8; READER_TASK_CHUNK];
    loop {
        let status = backend.read(&mut buf, ReadCall::Blocking);
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if shared.active_generation.load(Ordering::Acquire) != generation {
            break;
        }
        match status {
            Ok(ReadStatus::Data(n)) => shared.inject(&buf[..n]),
            Ok(ReadStatus::WouldBlock) => thread::sleep(STREAM_RETRY_DELAY),
            Ok(ReadStatus::Closed) => {
                shared.end_of_input(
                    generation,
                    "peer closed the connection",
                    UNREGISTER_LOCK_TIMEOUT,
                );
                break;
            }
            Err(err) => {
                shared.end_of_input(
                    generation,
                    &format!("read failed: {err}"),
                    UNREGISTER_LOCK_TIMEOUT,
                );
                break;
            }
        }
    }
    log_debug(&format!("vterm reader for session {generation} exiting"));
}
