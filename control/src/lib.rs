mod protocol;
mod server;
mod session;

pub use protocol::{get_status, set_status, Reply, Status, StatusControl, INVALID_REQUEST};
pub use server::{respond, ControlServer, DEFAULT_SOCKET_PATH};
pub use session::{Request, Response, Session, SessionError, MAX_REQUEST_SIZE};
