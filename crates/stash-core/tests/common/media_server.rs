//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves a single static body with a fixed Content-Type. GET with
//! `Range: bytes=N-` gets 206 Partial Content unless ranges are disabled.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Copy)]
pub struct MediaServerOptions {
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    pub content_type: &'static str,
}

impl Default for MediaServerOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            content_type: "application/octet-stream",
        }
    }
}

pub struct MediaServer {
    /// Base URL, e.g. "http://127.0.0.1:12345/".
    pub url: String,
    requests: Arc<AtomicUsize>,
}

impl MediaServer {
    /// Number of requests served so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread serving `body`. The server runs
/// until the process exits.
pub fn start(body: Vec<u8>, opts: MediaServerOptions) -> MediaServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            counter.fetch_add(1, Ordering::SeqCst);
            thread::spawn(move || handle(stream, &body, opts));
        }
    });
    MediaServer {
        url: format!("http://127.0.0.1:{}/", port),
        requests,
    }
}

fn handle(mut stream: std::net::TcpStream, body: &[u8], opts: MediaServerOptions) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (method, range_start) = parse_request(request);
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    let total = body.len();
    let (status, extra, slice) = match range_start {
        Some(start) if opts.support_ranges && start < total => (
            "206 Partial Content",
            format!("Content-Range: bytes {}-{}/{}\r\n", start, total - 1, total),
            &body[start..],
        ),
        Some(_) if opts.support_ranges => (
            "416 Range Not Satisfiable",
            format!("Content-Range: bytes */{}\r\n", total),
            &body[0..0],
        ),
        _ => ("200 OK", String::new(), body),
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
        status,
        opts.content_type,
        slice.len(),
        extra
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(slice);
}

/// Returns (method, optional start offset for `Range: bytes=N-`).
fn parse_request(request: &str) -> (&str, Option<usize>) {
    let mut method = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim().to_ascii_lowercase();
                if let Some(spec) = value.strip_prefix("bytes=") {
                    if let Some((start, _)) = spec.split_once('-') {
                        range = start.trim().parse::<usize>().ok();
                    }
                }
            }
        }
    }
    (method, range)
}
