//! Shared execution-serialization token.
//!
//! The hosted interpreter executes code only while holding this token,
//! so at most one interpreter thread executes at a time. Any thread that is about
//! to block on I/O while holding it must let it go for the blocking span, which
//! is what [`release_for_blocking`] does.

use parking_lot::{const_mutex, Mutex, MutexGuard};
use std::cell::RefCell;
use std::marker::PhantomData;

static TOKEN: Mutex<()> = const_mutex(());

thread_local! {
    static HELD: RefCell<Option<MutexGuard<'static, ()>>> = const { RefCell::new(None) };
}

/// Proof that the current thread entered the token. Dropping it releases the token.
#[must_use = "the token is released as soon as the guard is dropped"]
pub struct TokenGuard {
    owned: bool,
    _not_send: PhantomData<*const ()>,
}

impl Drop for TokenGuard {
    fn drop(&mut self) {
        if self.owned {
            HELD.with(|held| held.borrow_mut().take());
        }
    }
}

/// Enter the token, blocking until it is free. Re-entering on the same thread is a no-op.
pub fn acquire() -> TokenGuard {
    if is_held() {
        return TokenGuard {
            owned: false,
            _not_send: PhantomData,
        };
    }
    let guard = TOKEN.lock();
    HELD.with(|held| *held.borrow_mut() = Some(guard));
    TokenGuard {
        owned: true,
        _not_send: PhantomData,
    }
}

pub fn is_held() -> bool {
    HELD.with(|held| held.borrow().is_some())
}

/// Scope in which the token is released; it is taken back when the scope ends,
/// including early returns and unwinding.
#[must_use = "the token is reacquired as soon as the span is dropped"]
pub struct BlockingSpan {
    reacquire: bool,
    _not_send: PhantomData<*const ()>,
}

impl Drop for BlockingSpan {
    fn drop(&mut self) {
        if self.reacquire {
            let guard = TOKEN.lock();
            HELD.with(|held| *held.borrow_mut() = Some(guard));
        }
    }
}

/// Release the token (if this thread holds it) until the returned span is dropped.
pub fn release_for_blocking() -> BlockingSpan {
    let released = HELD.with(|held| held.borrow_mut().take()).is_some();
    BlockingSpan {
        reacquire: released,
        _not_send: PhantomData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn blocking_span_lets_other_threads_in() {
        let _guard = acquire();
        assert!(is_held());
        {
            let _span = release_for_blocking();
            assert!(!is_held());
            let (tx, rx) = mpsc::channel();
            let other = thread::spawn(move || {
                let _inner = acquire();
                tx.send(()).unwrap();
            });
            rx.recv_timeout(Duration::from_secs(2))
                .expect("other thread should get the token");
            other.join().unwrap();
        }
        assert!(is_held());
    }

    #[test]
    fn span_without_token_does_not_acquire() {
        assert!(!is_held());
        {
            let _span = release_for_blocking();
        }
        assert!(!is_held());
    }

    #[test]
    fn span_reacquires_on_unwind() {
        let result = std::panic::catch_unwind(|| {
            let guard = acquire();
            let _span = release_for_blocking();
            std::mem::forget(guard);
            panic!("blocking call failed");
        });
        assert!(result.is_err());
        assert!(is_held());
        HELD.with(|held| held.borrow_mut().take());
    }

    #[test]
    fn nested_acquire_keeps_outer_ownership() {
        let outer = acquire();
        {
            let _inner = acquire();
        }
        assert!(is_held());
        drop(outer);
        assert!(!is_held());
    }
}
