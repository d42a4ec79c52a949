mod capability;
mod channel;
mod event;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::{CreateError, CreateStep, SourceDevice, VirtualDevice, RAW_EVENT_SIZE, UINPUT_PATH};

pub use capability::{
    max_code, mirror, AbsInfo, Bitmap, CapabilityQueryError, CapabilitySet, CapabilitySource,
    Declaration, MIRRORED_TYPES,
};
pub use channel::{EventChannel, EventSink};
pub use event::*;
