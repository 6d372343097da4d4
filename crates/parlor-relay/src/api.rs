//! HTTP surface: the WebSocket endpoint plus a couple of read-only routes.
//!
//! Endpoints:
//! - GET /ws          — WebSocket upgrade for chat clients
//! - GET /health      — liveness and basic counters
//! - GET /api/roster  — display names of joined participants

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{ConnectInfo, State, ws::WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::relay;
use crate::router::RelayState;

/// Response for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Unix time in milliseconds.
    pub time: u64,
    pub uptime_secs: u64,
    pub participants: usize,
}

pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/roster", get(roster))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the relay on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: Arc<RelayState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<RelayState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let origin = origin_address(peer, &headers, state.options.trust_forwarded_for);
    ws.max_message_size(state.options.max_frame_bytes)
        .on_upgrade(move |socket| relay::handle_connection(socket, state, origin))
}

/// The address a connection is banned by.
///
/// Peer IP with IPv4-mapped IPv6 folded to IPv4, or the first
/// `X-Forwarded-For` hop when running behind a trusted proxy.
pub fn origin_address(peer: SocketAddr, headers: &HeaderMap, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded {
            return addr.to_string();
        }
    }
    peer.ip().to_canonical().to_string()
}

async fn health(State(state): State<Arc<RelayState>>) -> Json<HealthResponse> {
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    Json(HealthResponse {
        status: "ok",
        time,
        uptime_secs: state.start_time.elapsed().as_secs(),
        participants: state.registry.read().await.len(),
    })
}

async fn roster(State(state): State<Arc<RelayState>>) -> Json<Vec<String>> {
    Json(state.registry.read().await.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn origin_is_peer_ip_without_port() {
        let headers = HeaderMap::new();
        assert_eq!(origin_address(peer("10.0.0.5:51234"), &headers, false), "10.0.0.5");
    }

    #[test]
    fn mapped_ipv6_is_folded_to_ipv4() {
        let headers = HeaderMap::new();
        assert_eq!(origin_address(peer("[::ffff:10.0.0.5]:80"), &headers, false), "10.0.0.5");
        assert_eq!(origin_address(peer("[::1]:80"), &headers, false), "::1");
    }

    #[test]
    fn forwarded_for_only_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(origin_address(peer("10.0.0.1:80"), &headers, false), "10.0.0.1");
        assert_eq!(origin_address(peer("10.0.0.1:80"), &headers, true), "203.0.113.7");
    }

    #[test]
    fn empty_forwarded_for_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" "));
        assert_eq!(origin_address(peer("10.0.0.1:80"), &headers, true), "10.0.0.1");
    }
}
