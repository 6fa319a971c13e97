//! Mock document service
//!
//! Serves the listing and PDF endpoints from in-memory state so tests can
//! script corrupt bodies and upstream errors per document.

use super::constants::*;
use super::fixtures::valid_pdf;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use expense_pdf_sync::document_api::DocumentRef;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Scripted answer to one fetch.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Body(Vec<u8>),
    Status(u16),
}

#[derive(Default)]
struct MockState {
    documents: Mutex<Vec<DocumentRef>>,
    /// Per source id; the last response repeats once the queue is drained.
    responses: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    fetch_counts: Mutex<HashMap<String, usize>>,
    fetch_queries: Mutex<Vec<HashMap<String, String>>>,
    list_status: Mutex<Option<u16>>,
}

/// Mock service listening on a random local port.
///
/// When dropped, the server shuts down.
pub struct MockDocumentServer {
    pub base_url: String,
    state: Arc<MockState>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockDocumentServer {
    /// Spawn a server listing `documents` as `(source_id, correlation_id)`.
    /// Unscripted documents are served as valid PDFs.
    pub async fn spawn(documents: Vec<(&str, &str)>) -> Self {
        let state = Arc::new(MockState::default());
        *state.documents.lock().unwrap() = documents
            .into_iter()
            .map(|(source_id, correlation_id)| DocumentRef::new(source_id, correlation_id))
            .collect();

        let app = Router::new()
            .route("/documents", get(list_documents))
            .route("/documents/{source_id}/pdf", get(fetch_document))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            state,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Script the responses for `source_id`, served in order.
    pub fn script(&self, source_id: &str, responses: Vec<MockResponse>) {
        self.state
            .responses
            .lock()
            .unwrap()
            .insert(source_id.to_string(), responses.into());
    }

    /// Make the listing endpoint answer with `status`.
    pub fn fail_listing(&self, status: u16) {
        *self.state.list_status.lock().unwrap() = Some(status);
    }

    pub fn fetch_count(&self, source_id: &str) -> usize {
        self.state
            .fetch_counts
            .lock()
            .unwrap()
            .get(source_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.state.fetch_counts.lock().unwrap().values().sum()
    }

    /// Query strings of every fetch, in arrival order.
    pub fn fetch_queries(&self) -> Vec<HashMap<String, String>> {
        self.state.fetch_queries.lock().unwrap().clone()
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    header("X-Api-Key") == Some(TEST_API_KEY)
        && header("X-Chain-Id") == Some(TEST_CHAIN_ID)
        && header("X-Customer-Code") == Some(TEST_CUSTOMER_CODE)
}

async fn list_documents(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if let Some(status) = *state.list_status.lock().unwrap() {
        return StatusCode::from_u16(status).unwrap().into_response();
    }
    if !query.contains_key("startDate") || !query.contains_key("endDate") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let documents = state.documents.lock().unwrap().clone();
    Json(documents).into_response()
}

async fn fetch_document(
    State(state): State<Arc<MockState>>,
    Path(source_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    *state
        .fetch_counts
        .lock()
        .unwrap()
        .entry(source_id.clone())
        .or_insert(0) += 1;
    state.fetch_queries.lock().unwrap().push(query);

    let response = {
        let mut responses = state.responses.lock().unwrap();
        match responses.get_mut(&source_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
    };

    match response.unwrap_or_else(|| MockResponse::Body(valid_pdf(&source_id))) {
        MockResponse::Body(bytes) => (StatusCode::OK, bytes).into_response(),
        MockResponse::Status(status) => StatusCode::from_u16(status).unwrap().into_response(),
    }
}
