//! Loopback HTTP server for exercising the network paths in tests.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Clone, Debug)]
pub enum Route {
    File { body: Vec<u8>, ranges: bool },
    /// Range-capable file whose connection drops after `cut_at` bytes.
    Truncated { body: Vec<u8>, cut_at: usize },
    /// Advertises byte ranges on HEAD but always answers GET with a full 200.
    IgnoresRange(Vec<u8>),
    Json(String),
    Status(u16),
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub range: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Clone)]
pub struct TestServer {
    addr: SocketAddr,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let server = Self {
            addr,
            routes: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let state = server.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let state = state.clone();
                thread::spawn(move || {
                    let _ = state.handle(stream);
                });
            }
        });
        server
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    pub fn route(&self, path: &str, route: Route) {
        self.routes
            .lock()
            .expect("routes lock")
            .insert(path.to_string(), route);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|req| req.method == method && req.path == path)
            .count()
    }

    fn handle(&self, mut stream: TcpStream) -> std::io::Result<()> {
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        let mut reader = BufReader::new(stream.try_clone()?);

        let mut request_line = String::new();
        if reader.read_line(&mut request_line)? == 0 {
            return Ok(());
        }
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or("").to_string();
        let raw_path = parts.next().unwrap_or("/");
        let (path, query) = match raw_path.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (raw_path.to_string(), None),
        };

        let mut range = None;
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 || line == "\r\n" || line == "\n" {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                let value = value.trim().to_string();
                if name.eq_ignore_ascii_case("range") {
                    range = Some(value);
                } else if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.parse().unwrap_or(0);
                }
            }
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body)?;

        self.requests
            .lock()
            .expect("requests lock")
            .push(RecordedRequest {
                method: method.clone(),
                path: path.clone(),
                query,
                range: range.clone(),
                body,
            });

        let route = self.routes.lock().expect("routes lock").get(&path).cloned();
        let head_only = method == "HEAD";
        match route {
            None => write_response(&mut stream, 404, "Not Found", &[], b"not found", head_only),
            Some(Route::Status(code)) => {
                write_response(&mut stream, code, "Test Status", &[], b"status", head_only)
            }
            Some(Route::Json(json)) => write_response(
                &mut stream,
                200,
                "OK",
                &[("Content-Type", "application/json".to_string())],
                json.as_bytes(),
                head_only,
            ),
            Some(Route::File { body, ranges }) => serve_file(
                &mut stream,
                &body,
                FileBehaviour {
                    advertise_ranges: ranges,
                    honour_ranges: ranges,
                    cut_at: None,
                },
                range.as_deref(),
                head_only,
            ),
            Some(Route::Truncated { body, cut_at }) => serve_file(
                &mut stream,
                &body,
                FileBehaviour {
                    advertise_ranges: true,
                    honour_ranges: true,
                    cut_at: Some(cut_at),
                },
                range.as_deref(),
                head_only,
            ),
            Some(Route::IgnoresRange(body)) => serve_file(
                &mut stream,
                &body,
                FileBehaviour {
                    advertise_ranges: true,
                    honour_ranges: false,
                    cut_at: None,
                },
                range.as_deref(),
                head_only,
            ),
        }
    }
}

struct FileBehaviour {
    advertise_ranges: bool,
    honour_ranges: bool,
    /// Absolute offset after which the connection is dropped, while the
    /// declared Content-Length still covers the whole requested span.
    cut_at: Option<usize>,
}

fn serve_file(
    stream: &mut TcpStream,
    body: &[u8],
    behaviour: FileBehaviour,
    range: Option<&str>,
    head_only: bool,
) -> std::io::Result<()> {
    let accept = if behaviour.advertise_ranges { "bytes" } else { "none" };
    let start = range
        .filter(|_| behaviour.honour_ranges && !head_only)
        .and_then(|value| value.strip_prefix("bytes="))
        .and_then(|value| value.trim_end_matches('-').parse::<usize>().ok());
    let end = behaviour.cut_at.unwrap_or(body.len()).min(body.len());
    match start {
        Some(start) if start >= body.len() => write_response(
            stream,
            416,
            "Range Not Satisfiable",
            &[],
            b"",
            head_only,
        ),
        Some(start) => write_partial_response(
            stream,
            206,
            "Partial Content",
            &[
                ("Accept-Ranges", accept.to_string()),
                (
                    "Content-Range",
                    format!("bytes {}-{}/{}", start, body.len() - 1, body.len()),
                ),
            ],
            body.len() - start,
            &body[start..end.max(start)],
            head_only,
        ),
        None => write_partial_response(
            stream,
            200,
            "OK",
            &[("Accept-Ranges", accept.to_string())],
            body.len(),
            &body[..end],
            head_only,
        ),
    }
}

fn write_response(
    stream: &mut TcpStream,
    code: u16,
    status: &str,
    headers: &[(&str, String)],
    body: &[u8],
    head_only: bool,
) -> std::io::Result<()> {
    write_partial_response(stream, code, status, headers, body.len(), body, head_only)
}

/// Declares `declared` bytes but only sends `body`.
fn write_partial_response(
    stream: &mut TcpStream,
    code: u16,
    status: &str,
    headers: &[(&str, String)],
    declared: usize,
    body: &[u8],
    head_only: bool,
) -> std::io::Result<()> {
    let mut response = format!(
        "HTTP/1.1 {code} {status}\r\nContent-Length: {declared}\r\nConnection: close\r\n"
    );
    for (name, value) in headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("\r\n");
    stream.write_all(response.as_bytes())?;
    if !head_only {
        stream.write_all(body)?;
    }
    stream.flush()
}

pub fn temp_root(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("launcher-{tag}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp root");
    dir
}

/// Builds an in-memory zip from `(name, contents, unix mode)` entries.
/// Names ending in `/` become directories.
pub fn zip_bytes(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    use zip::write::FileOptions;

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, contents, mode) in entries {
        let options = FileOptions::default().unix_permissions(*mode);
        if name.ends_with('/') {
            writer.add_directory(*name, options).expect("add dir");
        } else {
            writer.start_file(*name, options).expect("start file");
            writer.write_all(contents).expect("write entry");
        }
    }
    writer.finish().expect("finish zip").into_inner()
}
