//! Shared attestation cache service.
//!
//! Many crawler processes point their `RemoteCache` at one instance of this
//! service so each domain is fetched once per fleet, not once per process.
//! Storage is a [`SqliteCache`]; the first write for a domain wins.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use topics_attest::cache::remote::CachePutRequest;
use topics_attest::cache::CachedAttestation;
use topics_attest::SqliteCache;

pub struct CacheService {
    store: Arc<SqliteCache>,
}

impl CacheService {
    pub fn new(store: SqliteCache) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(handle_get).post(handle_put))
            .route("/health", get(handle_health))
            .layer(TraceLayer::new_for_http())
            .with_state(self.store.clone())
    }

    /// Bind `addr` and serve until Ctrl-C.
    pub async fn run(&self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("cache service listening on {addr}");
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutting down cache service"),
        Err(e) => {
            tracing::warn!("no Ctrl-C handler, serving until killed: {e}");
            std::future::pending::<()>().await;
        }
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn handle_get(
    State(store): State<Arc<SqliteCache>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(domain) = params.get("domain").filter(|d| !d.is_empty()) else {
        return error(StatusCode::BAD_REQUEST, "missing domain");
    };

    match store.get_raw(domain) {
        Ok(Some(stored)) => (StatusCode::OK, Json(stored)).into_response(),
        Ok(None) => error(StatusCode::NOT_FOUND, "not cached"),
        Err(e) => {
            tracing::error!("cache lookup for {domain} failed: {e}");
            error(StatusCode::INTERNAL_SERVER_ERROR, "storage error")
        }
    }
}

async fn handle_put(
    State(store): State<Arc<SqliteCache>>,
    body: Result<Json<CachePutRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = body else {
        return error(StatusCode::BAD_REQUEST, "body must be a JSON object");
    };
    let (Some(domain), Some(attested)) = (request.domain, request.attested) else {
        return error(StatusCode::BAD_REQUEST, "domain and attested are required");
    };
    let attestation_result = request.attestation_result.filter(|v| !v.is_null());
    if attested && attestation_result.is_none() {
        return error(
            StatusCode::BAD_REQUEST,
            "attestation_result is required when attested is true",
        );
    }

    let stored = CachedAttestation {
        attested,
        attestation_result,
    };
    match store.insert_raw(&domain, &stored) {
        Ok(inserted) => {
            tracing::debug!("stored {domain} (attested={attested}, new={inserted})");
            (StatusCode::CREATED, Json(json!({ "domain": domain }))).into_response()
        }
        Err(e) => {
            tracing::error!("cache write for {domain} failed: {e}");
            error(StatusCode::INTERNAL_SERVER_ERROR, "storage error")
        }
    }
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
