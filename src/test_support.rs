//! In-process HTTP stub servers for tests.
//!
//! Each stub binds `127.0.0.1:0`, answers configured `(method, path)` routes
//! and 404s everything else, and records every request it receives so tests
//! can assert exact attempt counts and ordering.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::Value;
use tokio::task::JoinHandle;

/// One recorded request.
#[derive(Debug, Clone)]
pub struct Hit {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
struct StubRoute {
    status: u16,
    body: String,
    content_type: &'static str,
    delay: Duration,
}

struct StubState {
    routes: HashMap<(String, String), StubRoute>,
    hits: Mutex<Vec<Hit>>,
}

/// Builder for a stub server.
#[derive(Default)]
pub struct StubServer {
    routes: HashMap<(String, String), StubRoute>,
}

impl StubServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method path` with a JSON body.
    pub fn json(self, method: &str, path: &str, status: u16, body: Value) -> Self {
        self.insert(method, path, status, body.to_string(), "application/json", Duration::ZERO)
    }

    /// Answer `method path` with a plain-text body.
    pub fn text(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.insert(method, path, status, body.to_string(), "text/plain", Duration::ZERO)
    }

    /// Answer `method path` with a JSON body after sleeping `delay`.
    pub fn slow(self, method: &str, path: &str, delay: Duration, body: Value) -> Self {
        self.insert(method, path, 200, body.to_string(), "application/json", delay)
    }

    fn insert(
        mut self,
        method: &str,
        path: &str,
        status: u16,
        body: String,
        content_type: &'static str,
        delay: Duration,
    ) -> Self {
        self.routes.insert(
            (method.to_ascii_uppercase(), path.to_string()),
            StubRoute {
                status,
                body,
                content_type,
                delay,
            },
        );
        self
    }

    pub async fn spawn(self) -> RunningStub {
        let state = Arc::new(StubState {
            routes: self.routes,
            hits: Mutex::new(Vec::new()),
        });
        let app = Router::new().fallback(answer).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("stub local addr");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        RunningStub {
            base_url: format!("http://{addr}"),
            port: addr.port(),
            state,
            handle,
        }
    }
}

async fn answer(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    state.hits.lock().expect("hits lock").push(Hit {
        method: method.to_string(),
        path: path.clone(),
        query: uri.query().map(str::to_string),
        body: serde_json::from_slice(&body).ok(),
    });

    let route = state.routes.get(&(method.to_string(), path)).cloned();
    match route {
        Some(route) => {
            if !route.delay.is_zero() {
                tokio::time::sleep(route.delay).await;
            }
            let status = StatusCode::from_u16(route.status).unwrap_or(StatusCode::OK);
            (status, [(header::CONTENT_TYPE, route.content_type)], route.body).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// A running stub; aborted on drop.
pub struct RunningStub {
    pub base_url: String,
    pub port: u16,
    state: Arc<StubState>,
    handle: JoinHandle<()>,
}

impl RunningStub {
    pub fn hits(&self) -> Vec<Hit> {
        self.state.hits.lock().expect("hits lock").clone()
    }

    /// Recorded requests as `"METHOD /path"` strings, in arrival order.
    pub fn hit_lines(&self) -> Vec<String> {
        self.hits()
            .into_iter()
            .map(|h| format!("{} {}", h.method, h.path))
            .collect()
    }

    pub fn hit_count(&self) -> usize {
        self.state.hits.lock().expect("hits lock").len()
    }
}

impl Drop for RunningStub {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A base URL on which nothing is listening.
pub async fn dead_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}
