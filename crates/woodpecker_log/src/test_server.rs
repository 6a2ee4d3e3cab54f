//! In-process log server for HTTP tests.
//!
//! Serves the static-ct-api routes at the root and again under `/mon`. A request
//! for a path with a published file gets that file; anything else gets the next
//! queued [`Reply`]. Every request is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub(crate) struct Reply {
    status: u16,
    body: Vec<u8>,
}

impl Reply {
    pub(crate) fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::status(200, body)
    }

    pub(crate) fn status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub(crate) fn not_found() -> Self {
        Self::status(404, "not found")
    }
}

/// A request as the server saw it
#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) body: Vec<u8>,
}

impl Recorded {
    /// `METHOD /path`
    pub(crate) fn line(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    pub(crate) fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Default)]
struct Exchange {
    files: HashMap<String, Vec<u8>>,
    replies: VecDeque<Reply>,
    requests: Vec<Recorded>,
}

type Shared = Arc<Mutex<Exchange>>;

pub(crate) struct TestLog {
    base: String,
    exchange: Shared,
    server: JoinHandle<()>,
}

impl TestLog {
    /// Bind an ephemeral port and answer requests with `replies` in order
    pub(crate) async fn start(replies: Vec<Reply>) -> Self {
        let exchange: Shared = Arc::new(Mutex::new(Exchange {
            replies: replies.into(),
            ..Exchange::default()
        }));
        let app = Router::new()
            .merge(routes())
            .nest("/mon", routes())
            .fallback(respond)
            .with_state(exchange.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base,
            exchange,
            server,
        }
    }

    /// Serve `body` for every GET of `path`
    pub(crate) fn publish(&self, path: &str, body: Vec<u8>) {
        self.exchange
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), body);
    }

    pub(crate) fn base(&self) -> &str {
        &self.base
    }

    pub(crate) fn requests(&self) -> Vec<Recorded> {
        self.exchange.lock().unwrap().requests.clone()
    }
}

impl Drop for TestLog {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn routes() -> Router<Shared> {
    Router::new()
        .route("/ct/v1/add-chain", post(respond))
        .route("/ct/v1/add-pre-chain", post(respond))
        .route("/checkpoint", get(respond))
        .route("/tile/{*path}", get(respond))
}

async fn respond(
    State(exchange): State<Shared>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> (StatusCode, Vec<u8>) {
    let mut exchange = exchange.lock().unwrap();
    let path = uri.path().to_string();
    let published = (method == Method::GET)
        .then(|| exchange.files.get(&path).cloned())
        .flatten();
    exchange.requests.push(Recorded {
        method,
        path,
        body: body.to_vec(),
    });
    if let Some(file) = published {
        return (StatusCode::OK, file);
    }
    match exchange.replies.pop_front() {
        Some(reply) => (
            StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            reply.body,
        ),
        None => (StatusCode::NOT_FOUND, b"no reply queued".to_vec()),
    }
}
