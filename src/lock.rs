use parking_lot::{Mutex, MutexGuard};
use std::time::Duration;

/// Wait at most `timeout` for `lock`; `None` means the caller must carry on without it.
pub(crate) fn lock_bounded<'a, T>(
    lock: &'a Mutex<T>,
    timeout: Duration,
    context: &str,
) -> Option<MutexGuard<'a, T>> {
    let guard = lock.try_lock_for(timeout);
    if guard.is_none() {
        crate::log_debug(&format!(
            "{context}: lock not acquired within {}ms",
            timeout.as_millis()
        ));
    }
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn gives_up_after_timeout() {
        let lock = Mutex::new(0u8);
        let _held = lock.lock();
        thread::scope(|scope| {
            let waited = scope.spawn(|| {
                lock_bounded(&lock, Duration::from_millis(20), "test").is_none()
            });
            assert!(waited.join().unwrap());
        });
    }

    #[test]
    fn returns_guard_when_free() {
        let lock = Mutex::new(7u8);
        let guard = lock_bounded(&lock, Duration::ZERO, "test").expect("free lock");
        assert_eq!(*guard, 7);
    }
}
