use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;
pub const EV_MSC: u16 = 0x04;
pub const EV_SW: u16 = 0x05;
pub const EV_MAX: u16 = 0x1f;

pub const KEY_MAX: u16 = 0x2ff;
pub const REL_MAX: u16 = 0x0f;
pub const ABS_MAX: u16 = 0x3f;
pub const MSC_MAX: u16 = 0x07;

pub const SYN_REPORT: u16 = 0x00;
pub const BTN_LEFT: u16 = 0x110;

pub const BUS_USB: u16 = 0x03;
pub const BUS_VIRTUAL: u16 = 0x06;

pub const VENDOR: u16 = 0x1111;
pub const PRODUCT: u16 = 0x3333;
pub const VERSION: u16 = 0x0001;
pub const NAME: &str = "Virtual Mouse";

/// Wall clock time of an event, as carried by the kernel's `struct timeval`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: i64,
    pub usec: i64,
}

impl Timestamp {
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        Timestamp {
            sec: elapsed.as_secs() as i64,
            usec: elapsed.subsec_micros() as i64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    pub time: Timestamp,
    pub type_: u16,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    /// An event stamped with the current time.
    pub fn now(type_: u16, code: u16, value: i32) -> Self {
        InputEvent {
            time: Timestamp::now(),
            type_,
            code,
            value,
        }
    }

    pub fn is_syn_report(&self) -> bool {
        self.type_ == EV_SYN && self.code == SYN_REPORT
    }
}

/// Identity a virtual device presents to the rest of the system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DeviceIdentity {
    pub name: String,
    pub bustype: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        DeviceIdentity {
            name: NAME.to_owned(),
            bustype: BUS_USB,
            vendor: VENDOR,
            product: PRODUCT,
            version: VERSION,
        }
    }
}
