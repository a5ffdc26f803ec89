#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;

/// A request as the fake tracker saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub target: String,
    pub headers: FxHashMap<String, String>,
}

#[derive(Clone)]
struct Response {
    status: u16,
    body: String,
    delay: Duration,
}

#[derive(Default)]
struct Routes {
    responses: FxHashMap<String, Response>,
    requests: Vec<Recorded>,
}

/// Minimal HTTP/1.1 server answering GETs with canned JSON.
#[derive(Clone)]
pub struct FakeTracker {
    base: String,
    routes: Arc<Mutex<Routes>>,
}

impl FakeTracker {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(Mutex::new(Routes::default()));

        let shared = Arc::clone(&routes);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&shared)));
            }
        });

        Self {
            base: format!("http://{addr}/"),
            routes,
        }
    }

    /// Base URL with a trailing slash.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, target: &str) -> String {
        format!("{}{}", self.base, target.trim_start_matches('/'))
    }

    /// Answer GETs of `target` (path and query) with `status` and `body`.
    pub fn route(&self, target: &str, status: u16, body: serde_json::Value) {
        self.route_after(target, Duration::ZERO, status, body);
    }

    /// Like [`FakeTracker::route`], holding the answer back for `delay`.
    pub fn route_after(&self, target: &str, delay: Duration, status: u16, body: serde_json::Value) {
        let response = Response {
            status,
            body: body.to_string(),
            delay,
        };
        self.routes
            .lock()
            .unwrap()
            .responses
            .insert(target.to_string(), response);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.routes.lock().unwrap().requests.clone()
    }
}

async fn serve(mut stream: TcpStream, routes: Arc<Mutex<Routes>>) {
    let mut raw = Vec::new();
    let mut buffer = [0u8; 4096];
    while !raw.windows(4).any(|window| window == b"\r\n\r\n") {
        match stream.read(&mut buffer).await {
            Ok(0) | Err(_) => return,
            Ok(read) => raw.extend_from_slice(&buffer[..read]),
        }
    }

    let head = String::from_utf8_lossy(&raw).to_string();
    let mut lines = head.split("\r\n");
    let target = lines
        .next()
        .and_then(|line| line.split(' ').nth(1))
        .unwrap_or("/")
        .to_string();
    let headers = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    let Response {
        status,
        body,
        delay,
    } = {
        let mut routes = routes.lock().unwrap();
        routes.requests.push(Recorded {
            target: target.clone(),
            headers,
        });
        routes.responses.get(&target).cloned().unwrap_or(Response {
            status: 404,
            body: "{}".to_string(),
            delay: Duration::ZERO,
        })
    };
    tokio::time::sleep(delay).await;

    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// HTTP client for talking to a [`FakeTracker`], bypassing any proxy.
pub fn http() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(ojd_remote::USER_AGENT)
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll `condition` until it holds, failing the test after a few seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
