//! HTTP surface of the ping collector

use crate::experiments::{ExperimentRegistry, ExperimentUrlRequest};
use crate::store::PingStore;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use klaatu_common::{Ping, PingServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Shared handler state
#[derive(Clone, Default)]
pub struct AppState {
    pub pings: Arc<PingStore>,
    pub experiments: Arc<ExperimentRegistry>,
}

/// The ping collector service
pub struct PingServer {
    state: AppState,
    config: PingServerConfig,
}

impl PingServer {
    /// Create a server with an empty store
    pub fn new(config: PingServerConfig) -> Self {
        Self {
            state: AppState::default(),
            config,
        }
    }

    /// The store backing this server
    pub fn store(&self) -> Arc<PingStore> {
        self.state.pings.clone()
    }

    pub fn config(&self) -> &PingServerConfig {
        &self.config
    }

    /// Create router
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/", get(health_handler))
            // Telemetry clients append their own document path after /submit/
            .route("/submit", post(submit_handler))
            .route("/submit/*suffix", post(submit_handler))
            .route(
                "/pings",
                get(list_pings_handler)
                    .post(submit_handler)
                    .delete(clear_pings_handler),
            )
            .route(
                "/experiment",
                get(list_experiments_handler)
                    .post(register_experiment_handler)
                    .delete(clear_experiments_handler),
            )
            .fallback(not_found_handler)
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .with_state(self.state.clone());

        if self.config.accept_gzip {
            router = router.layer(RequestDecompressionLayer::new());
        }
        if self.config.cors {
            router = router.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any));
        }

        router.layer(TraceLayer::new_for_http())
    }

    /// Serve on the configured address until ctrl-c
    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr()?;
        let listener = TcpListener::bind(addr).await?;
        info!("Ping server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to install ctrl-c handler: {}", e);
                    std::future::pending::<()>().await;
                }
                info!("Shutdown signal received");
            })
            .await?;

        Ok(())
    }

    /// Bind the configured address and serve from a background task.
    ///
    /// A listen port of `0` picks a free port; read it back from the handle.
    pub async fn spawn(self) -> anyhow::Result<PingServerHandle> {
        let addr = self.config.listen_addr()?;
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!("Ping server spawned on http://{}", local_addr);

        Ok(PingServerHandle {
            local_addr,
            store: self.state.pings.clone(),
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

impl Default for PingServer {
    fn default() -> Self {
        Self::new(PingServerConfig::default())
    }
}

/// Handle to a ping server running in a background task.
///
/// Dropping the handle stops the server; [`PingServerHandle::shutdown`] also
/// waits for in-flight requests to finish.
pub struct PingServerHandle {
    local_addr: SocketAddr,
    store: Arc<PingStore>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl PingServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL for clients, e.g. `http://127.0.0.1:5000`
    pub fn base_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    pub fn store(&self) -> Arc<PingStore> {
        self.store.clone()
    }

    /// Stop accepting connections and wait for the server task to exit
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        (&mut self.task).await??;
        info!("Ping server on {} stopped", self.local_addr);
        Ok(())
    }
}

impl Drop for PingServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "klaatu-ping-server",
        "pings": state.pings.len(),
    }))
}

/// Store the body as one ping, whatever its shape.
async fn submit_handler(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(value) => {
            state.pings.submit(Ping::new(value));
            StatusCode::OK.into_response()
        }
        Err(e) => {
            debug!("Rejected ping body ({} bytes): {}", body.len(), e);
            (StatusCode::BAD_REQUEST, format!("invalid JSON body: {}", e)).into_response()
        }
    }
}

async fn list_pings_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pings.list())
}

async fn clear_pings_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.pings.clear();
    StatusCode::OK
}

async fn register_experiment_handler(
    State(state): State<AppState>,
    Json(req): Json<ExperimentUrlRequest>,
) -> impl IntoResponse {
    state.experiments.register(req.experiment_url);
    (StatusCode::CREATED, Json(""))
}

async fn list_experiments_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.experiments.list())
}

async fn clear_experiments_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.experiments.clear();
    (StatusCode::OK, Json("URLs cleared"))
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not found" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::{json, Value};
    use std::io::Write;
    use tower::ServiceExt;

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_submit_with_suffix_then_list() {
        let server = PingServer::default();
        let doc = json!({"type": "main", "payload": {"info": {"subsessionLength": 3, "sessionLength": 9}}});

        let (status, body) = send(
            server.router(),
            post("/submit/telemetry/abc-123/main/Firefox/120.0", doc.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());

        let (status, body) = send(server.router(), get("/pings")).await;
        assert_eq!(status, StatusCode::OK);
        let listed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(listed, json!([doc]));
    }

    #[tokio::test]
    async fn test_post_pings_appends() {
        let server = PingServer::default();

        send(server.router(), post("/pings", r#"{"a":1}"#)).await;
        send(server.router(), post("/pings", r#"{"a":1}"#)).await;

        assert_eq!(server.store().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected_without_side_effects() {
        let server = PingServer::default();
        server.store().submit(Ping::new(json!({"kept": true})));

        let (status, _) = send(server.router(), post("/submit/x", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let pings = server.store().list();
        assert_eq!(pings.len(), 1);
        assert_eq!(pings[0].as_value(), &json!({"kept": true}));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let server = PingServer::new(PingServerConfig {
            max_body_bytes: 64,
            ..Default::default()
        });
        let big = json!({"padding": "x".repeat(256)}).to_string();

        let (status, _) = send(server.router(), post("/submit/big", big)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(server.store().is_empty());
    }

    #[tokio::test]
    async fn test_gzip_submission_is_decompressed() {
        let server = PingServer::default();
        let doc = json!({"events": [{"category": "nimbus_events", "name": "enrollment"}]});

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(doc.to_string().as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/submit/telemetry/x")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_ENCODING, "gzip")
            .body(Body::from(compressed))
            .unwrap();

        let (status, _) = send(server.router(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(server.store().list()[0].as_value(), &doc);
    }

    #[tokio::test]
    async fn test_delete_clears() {
        let server = PingServer::default();
        server.store().submit(Ping::new(json!(1)));

        let request = Request::builder()
            .method("DELETE")
            .uri("/pings")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(server.router(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());

        let (_, body) = send(server.router(), get("/pings")).await;
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!([]));
    }

    #[tokio::test]
    async fn test_health_reports_count() {
        let server = PingServer::default();
        server.store().submit(Ping::new(json!({})));

        let (status, body) = send(server.router(), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        let health: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["pings"], 1);
    }

    #[tokio::test]
    async fn test_experiment_registry_routes() {
        let server = PingServer::default();

        let (status, _) = send(
            server.router(),
            post("/experiment", r#"{"experiment_url": "https://example.test/r"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, body) = send(server.router(), get("/experiment")).await;
        assert_eq!(
            serde_json::from_slice::<Value>(&body).unwrap(),
            json!(["https://example.test/r"])
        );
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let server = PingServer::default();
        let (status, _) = send(server.router(), get("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
