use crate::event::InputEvent;
use parking_lot::Mutex;
use std::io::Error;

/// Anything events can be written to, one at a time.
pub trait EventSink: Send {
    fn write_event(&mut self, event: &InputEvent) -> Result<(), Error>;
}

/// Serialized write path shared by every producer of a single sink.
///
/// Each write takes the lock for exactly one event, so producers interleave at event
/// granularity. Sync reports are not added here; callers pair their own value changes with
/// `SYN_REPORT`.
pub struct EventChannel<S> {
    sink: Mutex<S>,
}

impl<S: EventSink> EventChannel<S> {
    pub fn new(sink: S) -> Self {
        EventChannel {
            sink: Mutex::new(sink),
        }
    }

    /// Writes a freshly stamped event.
    pub fn emit(&self, type_: u16, code: u16, value: i32) -> Result<(), Error> {
        self.forward(&InputEvent::now(type_, code, value))
    }

    /// Writes `event` as is, timestamp included. Failures are logged and handed back; nothing
    /// is retried.
    pub fn forward(&self, event: &InputEvent) -> Result<(), Error> {
        let result = self.sink.lock().write_event(event);
        if let Err(ref err) = result {
            log::warn!(
                "Failed to emit event (type {:#x}, code {:#x}, value {}): {}",
                event.type_,
                event.code,
                event.value,
                err
            );
        }

        result
    }

    pub fn into_inner(self) -> S {
        self.sink.into_inner()
    }
}
