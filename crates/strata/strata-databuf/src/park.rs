//! Sleeping on a slot state word.
//!
//! On Linux the waiter sleeps in the kernel on the state word itself
//! (`FUTEX_WAIT`), and `set_filled`/`set_free` wake it with `FUTEX_WAKE`.
//! The futex is not process-private, so this also works for file-backed
//! databufs mapped by separate processes. Elsewhere waiters nap briefly
//! and re-check.

use std::io;
use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Sleep while `word == expected`, for at most `timeout`.
///
/// Spurious returns are fine: callers always re-read the word.
#[cfg(target_os = "linux")]
pub fn park(word: &AtomicU32, expected: u32, timeout: Duration) -> io::Result<()> {
    let ts = libc::timespec {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as _,
    };
    // SAFETY: the pointer comes from a live AtomicU32 inside the mapping,
    // and the kernel only reads it.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            &ts as *const libc::timespec,
            std::ptr::null::<u32>(),
            0u32,
        )
    };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        // value already changed, signal, or timeout: let the caller re-check
        Some(libc::EAGAIN) | Some(libc::EINTR) | Some(libc::ETIMEDOUT) => Ok(()),
        _ => Err(err),
    }
}

/// Wake every thread parked on `word`.
#[cfg(target_os = "linux")]
pub fn wake_all(word: &AtomicU32) {
    // SAFETY: same pointer contract as `park`.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAKE,
            i32::MAX,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

#[cfg(not(target_os = "linux"))]
const NAP: Duration = Duration::from_micros(100);

#[cfg(not(target_os = "linux"))]
pub fn park(word: &AtomicU32, expected: u32, timeout: Duration) -> io::Result<()> {
    use std::sync::atomic::Ordering;
    if word.load(Ordering::Acquire) == expected {
        std::thread::sleep(timeout.min(NAP));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn wake_all(_word: &AtomicU32) {}
