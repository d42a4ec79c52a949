//! Drives the control server over a real Unix socket.

use control::{ControlServer, Reply, Status, StatusControl};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

#[derive(Default)]
struct Switch {
    enabled: AtomicBool,
    transitions: AtomicUsize,
}

impl StatusControl for Switch {
    fn status(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_status(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::SeqCst) != enabled {
            self.transitions.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn socket_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("clickmate-{}-{}.sock", name, std::process::id()))
}

async fn start(name: &str) -> (PathBuf, Arc<Switch>) {
    let path = socket_path(name);
    let server = ControlServer::bind(&path).unwrap();
    let switch = Arc::new(Switch::default());
    tokio::spawn(server.serve(switch.clone()));
    (path, switch)
}

async fn exchange(path: &PathBuf, chunks: &[&[u8]]) -> (u16, String) {
    let mut stream = UnixStream::connect(path).await.unwrap();
    for chunk in chunks {
        stream.write_all(chunk).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    let code = response[9..12].parse().unwrap();
    let body = response.split("\r\n\r\n").nth(1).unwrap().to_owned();
    (code, body)
}

async fn send(path: &PathBuf, request: &[u8]) -> (u16, String) {
    exchange(path, &[request]).await
}

fn get() -> Vec<u8> {
    b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n".to_vec()
}

fn post(body: &str) -> Vec<u8> {
    format!(
        "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
    .into_bytes()
}

fn reply(body: &str) -> Reply {
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn status_starts_off() {
    let (path, _) = start("starts-off").await;

    let (code, body) = send(&path, &get()).await;
    assert_eq!(code, 200);
    assert_eq!(reply(&body), Reply::from(Status::Off));
}

#[tokio::test]
async fn turning_on_twice_is_one_transition() {
    let (path, switch) = start("on-twice").await;

    for _ in 0..2 {
        let (code, body) = send(&path, &post(r#"{"status":"on"}"#)).await;
        assert_eq!(code, 200);
        assert_eq!(body, r#"{"status":"on"}"#);
    }
    assert_eq!(switch.transitions.load(Ordering::SeqCst), 1);

    let (_, body) = send(&path, &get()).await;
    assert_eq!(reply(&body), Reply::from(Status::On));

    let (_, body) = send(&path, &post(r#"{"status":"off"}"#)).await;
    assert_eq!(body, r#"{"status":"off"}"#);
    assert!(!switch.status());
}

#[tokio::test]
async fn invalid_bodies_change_nothing() {
    let (path, switch) = start("invalid").await;

    for body in [r#"{"foo":"bar"}"#, "not json", r#"{"status":"sideways"}"#] {
        let (code, reply_body) = send(&path, &post(body)).await;
        assert_eq!(code, 200);
        assert_eq!(reply_body, r#"{"error":"Invalid request"}"#);
    }

    assert_eq!(switch.transitions.load(Ordering::SeqCst), 0);

    // Still serving afterwards.
    let (_, body) = send(&path, &get()).await;
    assert_eq!(reply(&body), Reply::from(Status::Off));
}

#[tokio::test]
async fn other_methods_are_not_allowed() {
    let (path, _) = start("methods").await;

    let (code, body) = send(&path, b"DELETE / HTTP/1.1\r\n\r\n").await;
    assert_eq!(code, 405);
    assert_eq!(body, r#"{"error":"Method not allowed"}"#);
}

#[tokio::test]
async fn requests_may_arrive_in_pieces() {
    let (path, switch) = start("pieces").await;

    let request = post(r#"{"status":"on"}"#);
    let (head, body) = request.split_at(request.len() - 6);
    let (code, reply_body) = exchange(&path, &[&head[..12], &head[12..], body]).await;

    assert_eq!(code, 200);
    assert_eq!(reply_body, r#"{"status":"on"}"#);
    assert!(switch.status());
}

#[tokio::test]
async fn garbage_gets_bad_request() {
    let (path, _) = start("garbage").await;

    let (code, body) = send(&path, b"hello\r\n\r\n").await;
    assert_eq!(code, 400);
    assert_eq!(body, r#"{"error":"Bad request"}"#);
}

#[tokio::test]
async fn absurd_content_length_gets_bad_request() {
    let (path, switch) = start("content-length").await;

    let request = format!(
        "POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n{{\"status\":\"on\"}}",
        usize::MAX
    );
    let (code, body) = send(&path, request.as_bytes()).await;
    assert_eq!(code, 400);
    assert_eq!(body, r#"{"error":"Bad request"}"#);
    assert!(!switch.status());

    // The server survived.
    let (code, _) = send(&path, &get()).await;
    assert_eq!(code, 200);
}

#[tokio::test]
async fn socket_is_world_writable_and_replaces_stale_files() {
    let path = socket_path("permissions");
    std::fs::write(&path, b"stale").unwrap();

    let server = ControlServer::bind(&path).unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o666);

    drop(server);
    assert!(!path.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_settle() {
    let (path, switch) = start("concurrent").await;

    let requests: Vec<_> = (0..16)
        .map(|i| {
            let path = path.clone();
            let body = if i % 2 == 0 { r#"{"status":"on"}"# } else { r#"{"status":"off"}"# };
            tokio::spawn(async move { send(&path, &post(body)).await })
        })
        .collect();

    for request in requests {
        let (code, _) = request.await.unwrap();
        assert_eq!(code, 200);
    }

    let (_, body) = send(&path, &get()).await;
    assert_eq!(reply(&body), Reply::from(Status::from(switch.status())));
}
