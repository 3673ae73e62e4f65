//! Unwinding recovery utilities, in the style of rayon.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::string::ToString;
use core::any::Any;
use core::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::thread::Result;

/// Executes `f` and captures any panic, translating that panic into a
/// `Err` result. Tasks are treated as exception safe: their only output is
/// the value they return, which is discarded if they panic.
#[inline(always)]
pub fn halt_unwinding<F, R>(func: F) -> Result<R>
where
    F: FnOnce() -> R,
{
    catch_unwind(AssertUnwindSafe(func))
}

/// Extracts a human readable message from a panic payload.
#[cold]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}

/// Convenience wrapper around [`panic_message`] for an owned payload.
pub fn payload_message(payload: Box<dyn Any + Send>) -> String {
    panic_message(&*payload)
}
