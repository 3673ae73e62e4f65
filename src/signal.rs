//! This modules defines a basic signal that can be used to notify a waiting
//! thread about the completion of a task. Signals transport the outcome of a
//! task from the worker that ran it to the thread holding its handle.
//!
//! The implementation here is loosely adapted from the oneshot crate,
//! modified to use a futex instead of a CAS loop.

use core::cell::UnsafeCell;

use crate::platform::*;

// -----------------------------------------------------------------------------
// States

/// The default state of a signal, with no waiting recever and no sent value.
pub const IDLE: u32 = 0b00;

/// A bit set by the recever when it is waiting, and needs the sender to wake it up.
pub const WAIT: u32 = 0b01;

/// A bit set by the sender when data has been transmitted to the recever.
pub const SENT: u32 = 0b10;

// -----------------------------------------------------------------------------
// Signal

/// A signal transmits a single value across threads, exactly once.
///
/// Unlike a channel, a signal has no notion of a disconnected peer: both sides
/// share ownership of it (through an `Arc`), and the sending side is
/// responsible for always sending something before it goes away.
pub struct Signal<T> {
    /// The state of the signal, used for synchronization and sleeping.
    state: AtomicU32,
    /// The value transmitted by the signal.
    value: UnsafeCell<Option<T>>,
}

impl<T: Send> Signal<T> {
    /// Creates a new signal.
    pub fn new() -> Self {
        Self {
            state: AtomicU32::new(IDLE),
            value: UnsafeCell::new(None),
        }
    }

    /// Creates a signal which has already been sent a value.
    #[cfg(test)]
    pub fn ready(value: T) -> Self {
        Self {
            state: AtomicU32::new(SENT),
            value: UnsafeCell::new(Some(value)),
        }
    }

    /// Returns true if a value has been sent over the signal.
    #[inline]
    pub fn is_sent(&self) -> bool {
        self.state.load(Ordering::Acquire) & SENT != 0
    }

    /// Receives the signal if it has been sent, without blocking.
    ///
    /// # Panics
    ///
    /// This panics if called on a signal on which data has already been
    /// received.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `recv` and `try_recv` are only called
    /// from a single thread.
    pub unsafe fn try_recv(&self) -> Option<T> {
        if self.is_sent() {
            // SAFETY: The sending thread only ever accesses this memory
            // location once, before entering the SENT state. Because we are
            // now in the SENT state, and there can be no other calls to
            // `recv` or `try_recv` happening on other threads, we have
            // exclusive access to this memory location.
            let value = unsafe { (*self.value.get()).take() };
            Some(value.expect("signal value was already received"))
        } else {
            None
        }
    }

    /// Receives the signal, or waits for it to be sent.
    ///
    /// # Panics
    ///
    /// This panics if called on a signal on which data has already been
    /// received.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `recv` and `try_receive` are only called
    /// from a single thread.
    #[cold]
    pub unsafe fn recv(&self) -> T {
        // Loop to mitigate spurious wake-ups.
        loop {
            // Set the WAIT bit and load the current state.
            let state = self.state.fetch_or(WAIT, Ordering::Acquire);

            if state & SENT != 0 {
                // SAFETY: See `try_recv`. The SENT bit has been observed with
                // acquire ordering, so the value write is visible to us.
                let value = unsafe { (*self.value.get()).take() };
                return value.expect("signal value was already received");
            }

            // If a value has not been sent, wait until it is.
            self.sleep(state | WAIT);
        }
    }

    /// Sends the signal to the receiving thread.
    ///
    /// # Panics
    ///
    /// This panics if called more than once on the same signal.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `send` is only ever called from one
    /// thread, at most once.
    #[inline(always)]
    pub unsafe fn send(&self, value: T) {
        // Panic if the signal has already been sent.
        if self.state.load(Ordering::Relaxed) & SENT != 0 {
            panic!("attempted to send value over signal, but signal has already been sent");
        }

        // SAFETY: The receiving thread only ever accesses this memory location
        // when the signal is in the SENT state. Because we are responsible for
        // setting that state, and the check above ensures that we are not
        // already in that state, we have unique access to the memory location.
        unsafe { *self.value.get() = Some(value) };

        let state = self.state.fetch_or(SENT, Ordering::Release);
        if state & WAIT != 0 {
            // The receiving thread is asleep, or about to sleep, so we must
            // wake it.
            self.wake();
        }
    }

    #[cfg(not(feature = "shuttle"))]
    #[inline(always)]
    fn sleep(&self, expected: u32) {
        atomic_wait::wait(&self.state, expected);
    }

    #[cfg(not(feature = "shuttle"))]
    #[inline(always)]
    fn wake(&self) {
        atomic_wait::wake_one(&self.state);
    }

    // Shuttle can't see futex waits, so the receiver yields to the scheduler
    // and polls instead.
    #[cfg(feature = "shuttle")]
    fn sleep(&self, _expected: u32) {
        shuttle::thread::yield_now();
    }

    #[cfg(feature = "shuttle")]
    fn wake(&self) {}
}

impl<T: Send> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: References to signals have to be sent between threads for them to
// work, so they must be `Sync`. And signals themselves transmit values between
// threads, so the type `T` must be `Send`.
unsafe impl<T: Send> Sync for Signal<T> {}
