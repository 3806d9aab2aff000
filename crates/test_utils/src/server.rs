//! A minimal canned-response http server for collaborator tests.
//!
//! Accepts one connection per canned response, records what was
//! requested, answers with the canned body, and closes the connection
//! so pooled clients reconnect for the next request.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};

/// A response the test server should hand out.
#[derive(Debug, Clone)]
pub struct CannedResponse {
    /// Http status code.
    pub status: u16,

    /// Response body, sent as `application/json`.
    pub body: String,

    /// Extra response headers.
    pub extra_headers: Vec<(String, String)>,
}

impl CannedResponse {
    /// An http 200 response with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            extra_headers: Vec::new(),
        }
    }

    /// Add an extra response header.
    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }
}

/// A request the test server received.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    /// Request method.
    pub method: String,

    /// Request path including any query string.
    pub path: String,

    /// Request body.
    pub body: Vec<u8>,
}

/// A tiny http server answering a fixed sequence of canned responses.
pub struct TestHttpServer {
    addr: std::net::SocketAddr,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl TestHttpServer {
    /// Bind a local listener and serve the given responses in order,
    /// one connection each. The serving thread exits once all responses
    /// have been handed out.
    pub fn start(responses: Vec<CannedResponse>) -> std::io::Result<Self> {
        let listener =
            TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));

        let thread_received = received.clone();
        std::thread::spawn(move || {
            for response in responses {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                if let Err(err) =
                    handle_connection(stream, &response, &thread_received)
                {
                    tracing::warn!(?err, "test http server io error");
                }
            }
        });

        Ok(Self { addr, received })
    }

    /// The base url clients should hit, e.g. `http://127.0.0.1:41234`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// All requests received so far.
    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().unwrap().clone()
    }
}

fn handle_connection(
    mut stream: TcpStream,
    response: &CannedResponse,
    received: &Arc<Mutex<Vec<ReceivedRequest>>>,
) -> std::io::Result<()> {
    let (head, mut body) = read_head(&mut stream)?;

    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let content_length = lines
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .next()
        .unwrap_or(0);

    while body.len() < content_length {
        let mut buf = [0u8; 4096];
        let read = stream.read(&mut buf)?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&buf[..read]);
    }

    received.lock().unwrap().push(ReceivedRequest {
        method,
        path,
        body,
    });

    let mut out = format!(
        "HTTP/1.1 {} TEST\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        response.body.len(),
    );
    for (name, value) in &response.extra_headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    out.push_str(&response.body);
    stream.write_all(out.as_bytes())?;
    stream.flush()
}

/// Read up to the header/body separator, returning the header text and
/// any body bytes already pulled off the socket.
fn read_head(stream: &mut TcpStream) -> std::io::Result<(String, Vec<u8>)> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        if let Some(pos) =
            data.windows(4).position(|window| window == b"\r\n\r\n")
        {
            let head =
                String::from_utf8_lossy(&data[..pos]).to_string();
            let body = data[pos + 4..].to_vec();
            return Ok((head, body));
        }
        let read = stream.read(&mut buf)?;
        if read == 0 {
            return Ok((String::from_utf8_lossy(&data).to_string(), Vec::new()));
        }
        data.extend_from_slice(&buf[..read]);
    }
}
