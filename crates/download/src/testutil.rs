//! Loopback HTTP server for engine tests.
//!
//! Speaks just enough HTTP/1.1 for reqwest: one request per connection,
//! `Connection: close`, HEAD and GET, and `Range: bytes=N-`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub(crate) const LAST_MODIFIED_VALUE: &str = "Wed, 21 Oct 2015 07:28:00 GMT";

/// Size reported by placeholder pages (below the plausibility threshold).
pub(crate) const PLACEHOLDER_SIZE: usize = 512;

#[derive(Clone)]
pub(crate) enum Route {
    /// A real artifact.
    File {
        body: Arc<Vec<u8>>,
        honor_range: bool,
    },
    /// HEAD answers with a small page; GET redirects when a target is set.
    Placeholder { location: Option<String> },
    /// Any request answers with this status.
    Status(u16),
    /// Sends the headers and `prefix`, then never finishes the body.
    Stall { prefix: Vec<u8>, total: u64 },
    /// No `Content-Length`: the body ends when the connection closes.
    Unsized(Vec<u8>),
}

impl Route {
    pub(crate) fn file(body: Vec<u8>) -> Self {
        Route::File {
            body: Arc::new(body),
            honor_range: true,
        }
    }

    pub(crate) fn file_ignoring_range(body: Vec<u8>) -> Self {
        Route::File {
            body: Arc::new(body),
            honor_range: false,
        }
    }

    pub(crate) fn placeholder(location: Option<&str>) -> Self {
        Route::Placeholder {
            location: location.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: String,
    pub path: String,
    pub range: Option<String>,
}

pub(crate) struct MockServer {
    base: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub(crate) async fn start(routes: Vec<(&str, Route)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let routes: Arc<HashMap<String, Route>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, route)| (path.to_string(), route))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = Arc::clone(&routes);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let _ = handle_conn(stream, routes, recorded).await;
                });
            }
        });

        Self {
            base: format!("http://127.0.0.1:{port}"),
            requests,
            handle,
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub(crate) fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A URL on a port nobody listens on.
pub(crate) async fn refused_url(path: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}{path}")
}

async fn handle_conn(
    mut stream: TcpStream,
    routes: Arc<HashMap<String, Route>>,
    recorded: Arc<Mutex<Vec<Recorded>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(1024);
    let mut tmp = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut tmp).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&tmp[..n]);
    }

    let head = String::from_utf8_lossy(&buf).to_string();
    let mut lines = head.lines();
    let mut parts = lines.next().unwrap_or_default().split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();
    let range = lines.find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.eq_ignore_ascii_case("range")
            .then(|| value.trim().to_string())
    });

    recorded.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: path.clone(),
        range: range.clone(),
    });

    let is_head = method == "HEAD";
    match routes.get(&path).cloned() {
        None => write_response(&mut stream, 404, "Not Found", &[], b"", is_head).await,
        Some(Route::Status(code)) => {
            write_response(&mut stream, code, "Error", &[], b"error", is_head).await
        }
        Some(Route::Placeholder { location }) => {
            let page = vec![b'x'; PLACEHOLDER_SIZE];
            match (is_head, location) {
                (false, Some(location)) => {
                    let headers = [("Location".to_string(), location)];
                    write_response(&mut stream, 302, "Found", &headers, b"", false).await
                }
                _ => write_response(&mut stream, 200, "OK", &[], &page, is_head).await,
            }
        }
        Some(Route::File { body, honor_range }) => {
            let modified = [("Last-Modified".to_string(), LAST_MODIFIED_VALUE.to_string())];
            let start = range
                .as_deref()
                .filter(|_| honor_range && !is_head)
                .and_then(|r| r.strip_prefix("bytes="))
                .and_then(|r| r.trim_end_matches('-').parse::<usize>().ok());
            match start {
                Some(start) if start >= body.len() => {
                    write_response(&mut stream, 416, "Range Not Satisfiable", &[], b"", false)
                        .await
                }
                Some(start) => {
                    let headers = [
                        modified[0].clone(),
                        (
                            "Content-Range".to_string(),
                            format!("bytes {start}-{}/{}", body.len() - 1, body.len()),
                        ),
                    ];
                    write_response(&mut stream, 206, "Partial Content", &headers, &body[start..], false)
                        .await
                }
                None => write_response(&mut stream, 200, "OK", &modified, &body, is_head).await,
            }
        }
        Some(Route::Unsized(body)) => {
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n")
                .await?;
            if !is_head {
                stream.write_all(&body).await?;
            }
            stream.shutdown().await
        }
        Some(Route::Stall { prefix, total }) => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {total}\r\nLast-Modified: {LAST_MODIFIED_VALUE}\r\nConnection: close\r\n\r\n"
            );
            stream.write_all(head.as_bytes()).await?;
            if is_head {
                return stream.shutdown().await;
            }
            stream.write_all(&prefix).await?;
            stream.flush().await?;
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }
}

async fn write_response(
    stream: &mut TcpStream,
    code: u16,
    reason: &str,
    headers: &[(String, String)],
    body: &[u8],
    head_only: bool,
) -> std::io::Result<()> {
    let mut resp = format!("HTTP/1.1 {code} {reason}\r\nContent-Length: {}\r\n", body.len());
    for (name, value) in headers {
        resp.push_str(&format!("{name}: {value}\r\n"));
    }
    resp.push_str("Connection: close\r\n\r\n");

    stream.write_all(resp.as_bytes()).await?;
    if !head_only {
        stream.write_all(body).await?;
    }
    stream.shutdown().await
}
