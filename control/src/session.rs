use thiserror::Error;

/// Largest request (head and body together) a session will buffer.
pub const MAX_REQUEST_SIZE: usize = 16 * 1024;

const HEAD_END: &[u8] = b"\r\n\r\n";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("request exceeds {} bytes", MAX_REQUEST_SIZE)]
    TooLarge,
    #[error("malformed request line")]
    RequestLine,
    #[error("malformed header line")]
    Header,
    #[error("invalid Content-Length")]
    ContentLength,
    #[error("chunked request bodies are not supported")]
    Chunked,
    #[error("connection closed mid-request")]
    Incomplete,
}

#[derive(Debug)]
struct Head {
    method: String,
    path: String,
    body_start: usize,
    content_length: usize,
}

/// Bytes of one request as they arrive on a connection. Parsed once the head and the whole
/// body are in, then handed out as a `Request`.
#[derive(Debug, Default)]
pub struct Session {
    buffer: Vec<u8>,
    head: Option<Head>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `data`. Returns the request once it is complete.
    pub fn push(&mut self, data: &[u8]) -> Result<Option<Request>, SessionError> {
        if self.buffer.len() + data.len() > MAX_REQUEST_SIZE {
            return Err(SessionError::TooLarge);
        }
        self.buffer.extend_from_slice(data);

        if self.head.is_none() {
            let end = match find(&self.buffer, HEAD_END) {
                Some(end) => end,
                None => return Ok(None),
            };

            self.head = Some(parse_head(&self.buffer[..end], end + HEAD_END.len())?);
        }

        let complete = match self.head {
            Some(ref head) => self.buffer.len() >= head.body_start + head.content_length,
            None => false,
        };
        if !complete {
            return Ok(None);
        }

        match self.head.take() {
            Some(head) => {
                let body = self.buffer[head.body_start..head.body_start + head.content_length].to_vec();
                self.buffer.clear();
                Ok(Some(Request {
                    method: head.method,
                    path: head.path,
                    body,
                }))
            }
            None => Ok(None),
        }
    }

    /// Called when the peer stops sending. A connection that never sent anything is not an
    /// error.
    pub fn finish(self) -> Result<(), SessionError> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(SessionError::Incomplete)
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_head(head: &[u8], body_start: usize) -> Result<Head, SessionError> {
    let head = std::str::from_utf8(head).map_err(|_| SessionError::RequestLine)?;
    let mut lines = head.split("\r\n");

    let mut request_line = lines.next().unwrap_or("").split(' ');
    let (method, path, version) = match (
        request_line.next(),
        request_line.next(),
        request_line.next(),
        request_line.next(),
    ) {
        (Some(method), Some(path), Some(version), None) if !method.is_empty() => {
            (method, path, version)
        }
        _ => return Err(SessionError::RequestLine),
    };
    if !version.starts_with("HTTP/1.") {
        return Err(SessionError::RequestLine);
    }

    let mut content_length = 0;
    for line in lines {
        let (name, value) = line.split_once(':').ok_or(SessionError::Header)?;
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().map_err(|_| SessionError::ContentLength)?;
        } else if name.eq_ignore_ascii_case("transfer-encoding") && !value.eq_ignore_ascii_case("identity") {
            return Err(SessionError::Chunked);
        }
    }

    match body_start.checked_add(content_length) {
        Some(end) if end <= MAX_REQUEST_SIZE => {}
        _ => return Err(SessionError::TooLarge),
    }

    Ok(Head {
        method: method.to_owned(),
        path: path.to_owned(),
        body_start,
        content_length,
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub body: String,
}

impl Response {
    pub fn json(code: u16, body: String) -> Self {
        Response { code, body }
    }

    fn reason(&self) -> &'static str {
        match self.code {
            200 => "OK",
            400 => "Bad Request",
            405 => "Method Not Allowed",
            500 => "Internal Server Error",
            _ => "Unknown",
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.code,
            self.reason(),
            self.body.len(),
            self.body
        )
        .into_bytes()
    }
}
