use input::{EventChannel, EventSink, InputEvent, RAW_EVENT_SIZE};
use std::io::{Error, ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Cooperative stop request for the relay.
#[derive(Clone, Debug, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("incomplete read from source device ({read} of {expected} bytes)")]
    ShortRead { read: usize, expected: usize },
    #[error("failed to read from source device: {0}")]
    Read(#[source] Error),
}

/// Forwards every event read from `source` to `channel`, untouched and in order, until
/// `shutdown` is triggered. Returns how many events were relayed.
///
/// Interrupted reads are retried and `WouldBlock` (a poll timeout) just re-checks `shutdown`.
/// A short read ends the relay, the stream can't be trusted after one.
pub fn run<R, S>(source: &mut R, channel: &EventChannel<S>, shutdown: &Shutdown) -> Result<u64, RelayError>
where
    R: Read + ?Sized,
    S: EventSink,
{
    let mut buffer = [0; RAW_EVENT_SIZE];
    let mut relayed = 0;

    while !shutdown.is_triggered() {
        let read = match source.read(&mut buffer) {
            Ok(read) => read,
            Err(ref err) if err.kind() == ErrorKind::Interrupted || err.kind() == ErrorKind::WouldBlock => {
                continue
            }
            Err(err) => return Err(RelayError::Read(err)),
        };

        let event = InputEvent::from_bytes(&buffer[..read]).ok_or(RelayError::ShortRead {
            read,
            expected: RAW_EVENT_SIZE,
        })?;
        log::trace!("{:?}", event);

        // Already logged by the channel; a dropped event must not end the relay.
        let _ = channel.forward(&event);
        relayed += 1;
    }

    Ok(relayed)
}
