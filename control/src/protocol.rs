use serde::{Deserialize, Serialize};

pub const INVALID_REQUEST: &str = "Invalid request";

/// Something that can be switched on and off from the control socket.
pub trait StatusControl: Send + Sync + 'static {
    fn status(&self) -> bool;

    /// Returns once the switch has fully reached the requested state. May block.
    fn set_status(&self, enabled: bool);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    On,
    Off,
}

impl Status {
    pub fn is_on(self) -> bool {
        self == Status::On
    }
}

impl From<bool> for Status {
    fn from(enabled: bool) -> Self {
        if enabled {
            Status::On
        } else {
            Status::Off
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Status { status: Status },
    Error { error: String },
}

impl Reply {
    pub fn error(message: &str) -> Self {
        Reply::Error {
            error: message.to_owned(),
        }
    }

    pub fn to_json(&self) -> String {
        // Nothing in a reply can fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl From<Status> for Reply {
    fn from(status: Status) -> Self {
        Reply::Status { status }
    }
}

#[derive(Deserialize)]
struct SetStatus {
    status: Status,
}

pub fn get_status<C: StatusControl + ?Sized>(control: &C) -> Reply {
    Status::from(control.status()).into()
}

/// Applies a `{"status": "on"|"off"}` body and answers with the status `control` ended up in.
/// Anything else is rejected without touching `control`.
pub fn set_status<C: StatusControl + ?Sized>(control: &C, body: &[u8]) -> Reply {
    match serde_json::from_slice::<SetStatus>(body) {
        Ok(SetStatus { status }) => {
            control.set_status(status.is_on());
            get_status(control)
        }
        Err(err) => {
            log::debug!("Rejecting status request: {}", err);
            Reply::error(INVALID_REQUEST)
        }
    }
}
