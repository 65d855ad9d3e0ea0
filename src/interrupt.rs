//! Cooperative I/O timeout.
//!
//! FFmpeg polls an interrupt callback while it blocks in network or file
//! I/O. [`InterruptState`] is armed with a deadline before a blocking call;
//! once the deadline passes the callback asks FFmpeg to abort, and the state
//! remembers that the abort came from the timeout.

use std::{
    cell::Cell,
    os::raw::{c_int, c_void},
    time::{Duration, Instant},
};

/// Timer state shared with FFmpeg through the interrupt callback's opaque
/// pointer. Must stay at a stable address while a demux context refers to it.
#[derive(Debug, Default)]
pub(crate) struct InterruptState {
    started: Cell<Option<Instant>>,
    timeout: Cell<Duration>,
    timed_out: Cell<bool>,
}

impl InterruptState {
    /// Start a new deadline. [`Duration::ZERO`] disables the check.
    pub fn arm(&self, timeout: Duration) {
        self.started.set(Some(Instant::now()));
        self.timeout.set(timeout);
        self.timed_out.set(false);
    }

    pub fn disarm(&self) {
        self.started.set(None);
    }

    /// Whether the armed deadline expired.
    pub fn timed_out(&self) -> bool {
        self.timed_out.get()
    }

    fn expired_at(&self, now: Instant) -> bool {
        let timeout = self.timeout.get();
        match self.started.get() {
            Some(started) if !timeout.is_zero() => now.saturating_duration_since(started) > timeout,
            _ => false,
        }
    }

    /// Evaluate the deadline, latching the timed-out flag.
    pub fn poll(&self) -> bool {
        if self.expired_at(Instant::now()) {
            self.timed_out.set(true);
        }
        self.timed_out.get()
    }

    pub fn as_opaque(&self) -> *mut c_void {
        self as *const Self as *mut c_void
    }
}

/// FFmpeg interrupt callback. Returns non-zero to abort the blocking call.
pub(crate) unsafe extern "C" fn interrupt_callback(opaque: *mut c_void) -> c_int {
    if opaque.is_null() {
        return 0;
    }
    let state = unsafe { &*(opaque as *const InterruptState) };
    c_int::from(state.poll())
}
