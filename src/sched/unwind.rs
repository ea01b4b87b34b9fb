use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::thread;

/// Executes `f` and captures any panic, translating that panic into a `Err` result, so a faulty
/// job can not take a worker thread or an execution queue down with it.
pub fn halt_unwinding<F, R>(func: F) -> thread::Result<R>
where
    F: FnOnce() -> R,
{
    panic::catch_unwind(AssertUnwindSafe(func))
}

/// Best-effort description of a panic payload.
pub fn describe(payload: &(dyn Any + Send)) -> &str {
    if let Some(v) = payload.downcast_ref::<&'static str>() {
        v
    } else if let Some(v) = payload.downcast_ref::<String>() {
        v.as_str()
    } else {
        "<unknown>"
    }
}

pub struct AbortIfPanic;

impl Drop for AbortIfPanic {
    fn drop(&mut self) {
        eprintln!("detected unexpected panic; aborting");
        process::abort();
    }
}
