use crate::capability::AbsInfo;
use crate::event::{InputEvent, Timestamp};
use crate::linux::glue;
use std::mem;
use std::ptr;

/// Size of one `struct input_event` as read from and written to device nodes.
pub const RAW_EVENT_SIZE: usize = mem::size_of::<glue::input_event>();

impl InputEvent {
    pub(crate) fn to_raw(&self) -> glue::input_event {
        glue::input_event {
            time: libc::timeval {
                tv_sec: self.time.sec as _,
                tv_usec: self.time.usec as _,
            },
            type_: self.type_,
            code: self.code,
            value: self.value,
        }
    }

    pub(crate) fn from_raw(raw: glue::input_event) -> Self {
        InputEvent {
            time: Timestamp {
                sec: raw.time.tv_sec as _,
                usec: raw.time.tv_usec as _,
            },
            type_: raw.type_,
            code: raw.code,
            value: raw.value,
        }
    }

    /// Decodes one event in the kernel layout. `None` unless `bytes` is exactly one event long.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != RAW_EVENT_SIZE {
            return None;
        }

        let raw = unsafe { ptr::read_unaligned(bytes.as_ptr() as *const glue::input_event) };
        Some(Self::from_raw(raw))
    }

    pub fn to_bytes(&self) -> [u8; RAW_EVENT_SIZE] {
        let raw = self.to_raw();
        let mut bytes = [0; RAW_EVENT_SIZE];
        unsafe {
            ptr::copy_nonoverlapping(
                &raw as *const glue::input_event as *const u8,
                bytes.as_mut_ptr(),
                RAW_EVENT_SIZE,
            );
        }

        bytes
    }
}

impl From<glue::input_absinfo> for AbsInfo {
    fn from(raw: glue::input_absinfo) -> Self {
        AbsInfo {
            value: raw.value,
            minimum: raw.minimum,
            maximum: raw.maximum,
            fuzz: raw.fuzz,
            flat: raw.flat,
            resolution: raw.resolution,
        }
    }
}

impl From<AbsInfo> for glue::input_absinfo {
    fn from(info: AbsInfo) -> Self {
        glue::input_absinfo {
            value: info.value,
            minimum: info.minimum,
            maximum: info.maximum,
            fuzz: info.fuzz,
            flat: info.flat,
            resolution: info.resolution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{BTN_LEFT, EV_KEY};

    #[test]
    fn kernel_layout() {
        let event = InputEvent {
            time: Timestamp {
                sec: 1_700_000_000,
                usec: 250_000,
            },
            type_: EV_KEY,
            code: BTN_LEFT,
            value: 1,
        };

        let bytes = event.to_bytes();
        assert_eq!(InputEvent::from_bytes(&bytes), Some(event));

        let tail = mem::size_of::<libc::timeval>();
        assert_eq!(&bytes[tail..tail + 2], &EV_KEY.to_ne_bytes());
        assert_eq!(&bytes[tail + 2..tail + 4], &BTN_LEFT.to_ne_bytes());
        assert_eq!(&bytes[tail + 4..], &1i32.to_ne_bytes());
    }

    #[test]
    fn rejects_partial_events() {
        let bytes = InputEvent::now(EV_KEY, BTN_LEFT, 0).to_bytes();
        assert_eq!(InputEvent::from_bytes(&bytes[..RAW_EVENT_SIZE - 1]), None);
        assert_eq!(InputEvent::from_bytes(&[]), None);
    }
}
