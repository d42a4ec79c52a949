mod event;
mod event_reader;
mod event_writer;
mod glue;

pub use event::RAW_EVENT_SIZE;
pub use event_reader::SourceDevice;
pub use event_writer::{CreateError, CreateStep, VirtualDevice, UINPUT_PATH};
