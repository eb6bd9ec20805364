//! Running a solve under a deadline.
//!
//! The task runs on the calling thread, next to the Z3 context it uses. A
//! scoped watchdog thread waits on a one-slot channel for the task to finish;
//! if the deadline passes first it fires the interrupt (for Z3,
//! [`ContextHandle::interrupt`][z3::ContextHandle::interrupt]) and the caller
//! still waits for the task to wind down before returning [`Error::Timeout`].
//! The watchdog is always joined, so once [`run_with_deadline`] returns
//! nothing else touches the engine.

use std::panic;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};

/// Runs `task`, calling `interrupt` from a watchdog thread once `timeout`
/// elapses. Whatever the task returns after an interrupt is discarded.
///
/// A panic inside `task` is resumed on the calling thread.
pub fn run_with_deadline<T, I, F>(interrupt: I, timeout: Duration, task: F) -> Result<T>
where
    I: FnOnce() + Send,
    F: FnOnce() -> Result<T>,
{
    thread::scope(|scope| {
        let (done, finished) = mpsc::sync_channel::<()>(1);
        let watchdog = scope.spawn(move || match finished.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
            Err(RecvTimeoutError::Timeout) => {
                debug!("deadline of {:?} expired, interrupting solver", timeout);
                interrupt();
                true
            }
        });

        // If `task` panics, `done` is dropped while unwinding and the
        // watchdog sees `Disconnected`.
        let result = task();
        // The watchdog owns the receiver until it returns, so this cannot fail.
        let _ = done.send(());

        match watchdog.join() {
            Ok(false) => result,
            Ok(true) => {
                debug!("solver task drained (finished: {})", result.is_ok());
                Err(Error::Timeout(timeout))
            }
            Err(payload) => panic::resume_unwind(payload),
        }
    })
}
