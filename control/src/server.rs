use crate::protocol::{self, Reply, StatusControl};
use crate::session::{Request, Response, Session};
use std::convert::Infallible;
use std::fs;
use std::io::{Error, ErrorKind};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

pub const DEFAULT_SOCKET_PATH: &str = "/var/run/click-socket";

const READ_BUFFER_SIZE: usize = 1024;

/// The control socket. The socket file is removed again when the server is dropped.
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// Binds `path`, replacing a stale socket left behind by an earlier run. The socket is made
    /// world writable, it is only reachable from this machine anyway.
    pub fn bind(path: &Path) -> Result<Self, Error> {
        match fs::remove_file(path) {
            Ok(()) => log::debug!("Removed stale socket {}", path.display()),
            Err(ref err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }

        let listener = UnixListener::bind(path)?;
        let server = Self {
            listener,
            path: path.to_owned(),
        };
        fs::set_permissions(path, fs::Permissions::from_mode(0o666))?;

        Ok(server)
    }

    /// Accepts connections until accepting fails, one task per connection.
    pub async fn serve<C: StatusControl>(self, control: Arc<C>) -> Result<Infallible, Error> {
        log::info!("Listening on {}", self.path.display());

        loop {
            let (stream, _) = self.listener.accept().await?;
            let control = control.clone();

            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, control).await {
                    log::debug!("Control connection failed: {}", err);
                }
            });
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            log::debug!("Failed to remove {}: {}", self.path.display(), err);
        }
    }
}

async fn handle_connection<C: StatusControl>(
    mut stream: UnixStream,
    control: Arc<C>,
) -> Result<(), Error> {
    let mut session = Session::new();
    let mut buffer = [0; READ_BUFFER_SIZE];

    let request = loop {
        let read = stream.read(&mut buffer).await?;
        if read == 0 {
            // Gone before a full request arrived, nobody to answer.
            return session
                .finish()
                .map_err(|err| Error::new(ErrorKind::UnexpectedEof, err));
        }

        match session.push(&buffer[..read]) {
            Ok(Some(request)) => break Ok(request),
            Ok(None) => continue,
            Err(err) => break Err(err),
        }
    };

    let response = match request {
        Ok(request) => respond(request, control).await,
        Err(err) => {
            log::debug!("Bad control request: {}", err);
            Response::json(400, Reply::error("Bad request").to_json())
        }
    };

    stream.write_all(&response.to_bytes()).await?;
    stream.shutdown().await
}

/// Answers one request. Status changes may block on the injector, so they run on the blocking
/// pool.
pub async fn respond<C: StatusControl>(request: Request, control: Arc<C>) -> Response {
    log::debug!("{} {}", request.method, request.path);

    let reply = match request.method.as_str() {
        "GET" => protocol::get_status(&*control),
        "POST" => {
            let body = request.body;
            match tokio::task::spawn_blocking(move || protocol::set_status(&*control, &body)).await {
                Ok(reply) => reply,
                Err(err) => {
                    log::error!("Status change failed: {}", err);
                    return Response::json(500, Reply::error("Internal error").to_json());
                }
            }
        }
        _ => return Response::json(405, Reply::error("Method not allowed").to_json()),
    };

    log::debug!("Replying {}", reply.to_json());
    Response::json(200, reply.to_json())
}
