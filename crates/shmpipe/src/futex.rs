//! Futex wait/wake.
//!
//! The blocking half of the channel: a side whose condition holds (empty for
//! the consumer, full for the producer) parks on the header's `wake` word
//! instead of spinning. The word's numeric value is meaningless; only its
//! identity as a wait key matters. A return from [`futex_wait`] proves
//! nothing (spurious wakeups and signal interruption are ordinary returns),
//! so callers always re-check their cursor condition afterwards. Correctness
//! never depends on these calls; a failed syscall just degrades to an extra
//! condition check.
//!
//! On targets without a futex, [`futex_wait`] falls back to a bounded
//! exponential-backoff spin with the same re-check discipline.

use std::sync::atomic::{AtomicU32, Ordering};

/// Block until the value at `word` differs from `expected` or a wake
/// arrives. Returns immediately if the value already differs at call time.
#[cfg(target_os = "linux")]
pub fn futex_wait(word: &AtomicU32, expected: u32) {
    // SAFETY: word is a live atomic for the duration of the call; the
    // syscall compares and sleeps without writing through the pointer.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            std::ptr::null::<libc::timespec>(),
        )
    };
    // EAGAIN means the word already changed, EINTR a signal; both are
    // ordinary returns and the caller re-checks its condition either way.
    let _ = rc;
}

/// Wake up to `count` waiters parked on `word`. Returns the number woken;
/// a no-op when nobody is waiting.
#[cfg(target_os = "linux")]
pub fn futex_wake(word: &AtomicU32, count: i32) -> i32 {
    // SAFETY: word is a live atomic; the kernel only reads the address.
    let woken = unsafe { libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAKE, count) };
    if woken < 0 { 0 } else { woken as i32 }
}

/// Fallback wait: bounded exponential-backoff spin on the word. A spurious
/// return is harmless under the caller's re-check discipline.
#[cfg(not(target_os = "linux"))]
pub fn futex_wait(word: &AtomicU32, expected: u32) {
    for shift in 0..=10u32 {
        if word.load(Ordering::Acquire) != expected {
            return;
        }
        for _ in 0..(1u32 << shift) {
            std::hint::spin_loop();
        }
    }
    std::thread::yield_now();
}

/// Fallback wake: waiters are spinning on the word itself, so the increment
/// performed by [`futex_signal`] is already the wake.
#[cfg(not(target_os = "linux"))]
pub fn futex_wake(_word: &AtomicU32, _count: i32) -> i32 {
    0
}

/// Relieve the other side's blocking condition: bump the word so an
/// in-flight wait falls through its value check, then wake one waiter.
pub fn futex_signal(word: &AtomicU32) {
    word.fetch_add(1, Ordering::Release);
    futex_wake(word, 1);
}

/// Like [`futex_signal`] but wakes every waiter. Used at shutdown, when
/// both sides may be parked.
pub fn futex_signal_all(word: &AtomicU32) {
    word.fetch_add(1, Ordering::Release);
    futex_wake(word, i32::MAX);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn wake_with_no_waiter_is_a_noop() {
        let word = AtomicU32::new(0);
        assert_eq!(futex_wake(&word, 1), 0);
        assert_eq!(word.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn wait_returns_immediately_on_stale_expected() {
        let word = AtomicU32::new(5);
        // expected != current value: must not block.
        futex_wait(&word, 4);
    }

    #[test]
    fn signal_bumps_the_word() {
        let word = AtomicU32::new(0);
        futex_signal(&word);
        assert_eq!(word.load(Ordering::Relaxed), 1);
        futex_signal_all(&word);
        assert_eq!(word.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn signal_releases_a_parked_waiter() {
        let word = Arc::new(AtomicU32::new(0));
        let released = Arc::new(AtomicBool::new(false));

        let waiter = {
            let word = word.clone();
            let released = released.clone();
            std::thread::spawn(move || {
                loop {
                    let observed = word.load(Ordering::Acquire);
                    if observed != 0 {
                        break;
                    }
                    futex_wait(&word, observed);
                }
                released.store(true, Ordering::Release);
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        assert!(!released.load(Ordering::Acquire));

        futex_signal(&word);
        waiter.join().unwrap();
        assert!(released.load(Ordering::Acquire));
    }
}
