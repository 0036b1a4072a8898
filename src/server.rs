//! HTTP surface of the gateway, mounted under `/api/mcp`.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

use crate::discovery::types::parse_flag;
use crate::discovery::{DiscoverRequest, ServiceFilter};
use crate::gateway::{
    Gateway, GatewayError, InvokeRequest, RegisterServerRequest, ServerSelection,
};

pub const API_PREFIX: &str = "/api/mcp";

type SharedGateway = Arc<Gateway>;

#[derive(Debug, Default, Deserialize)]
struct ServersQuery {
    #[serde(default)]
    source: ServerSelection,
}

#[derive(Debug, Default, Deserialize)]
struct RefreshQuery {
    #[serde(default, deserialize_with = "flag_or_false")]
    refresh: bool,
}

fn flag_or_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    parse_flag(deserializer, false)
}

/// The full router, with every route nested under [`API_PREFIX`].
pub fn router(gateway: SharedGateway) -> Router {
    let api = Router::new()
        .route("/servers", get(list_servers))
        .route("/servers/register", post(register_server))
        .route("/servers/:name", delete(unregister_server))
        .route("/services", get(list_services))
        .route("/discover", post(discover))
        .route("/tools", get(list_all_tools))
        .route("/tools/:server_name", get(list_server_tools))
        .route("/invoke", post(invoke_tool))
        .route("/health", get(health))
        .route("/context", get(prompt_context))
        .route("/openai-tools", get(openai_tools))
        .with_state(gateway);

    Router::new().nest(API_PREFIX, api)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, gateway: SharedGateway, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(shutdown)
        .await
}

// ─── Handlers ────────────────────────────────────────────────────────────────

async fn list_servers(
    State(gw): State<SharedGateway>,
    Query(q): Query<ServersQuery>,
) -> impl IntoResponse {
    Json(gw.list_servers(q.source).await)
}

async fn list_services(
    State(gw): State<SharedGateway>,
    Query(filter): Query<ServiceFilter>,
) -> impl IntoResponse {
    Json(gw.list_services(&filter).await)
}

async fn register_server(
    State(gw): State<SharedGateway>,
    Json(request): Json<RegisterServerRequest>,
) -> impl IntoResponse {
    Json(gw.register_server(request).await)
}

async fn unregister_server(
    State(gw): State<SharedGateway>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    Json(gw.unregister_server(&name).await)
}

async fn discover(
    State(gw): State<SharedGateway>,
    body: Option<Json<DiscoverRequest>>,
) -> impl IntoResponse {
    let request = match body {
        Some(Json(request)) => request,
        None => gw.default_discover_request().clone(),
    };
    Json(gw.discover(&request).await)
}

async fn list_all_tools(
    State(gw): State<SharedGateway>,
    Query(q): Query<RefreshQuery>,
) -> impl IntoResponse {
    Json(gw.list_all_tools(q.refresh).await)
}

async fn list_server_tools(
    State(gw): State<SharedGateway>,
    Path(server_name): Path<String>,
    Query(q): Query<RefreshQuery>,
) -> Response {
    match gw.list_server_tools(&server_name, q.refresh).await {
        Ok(tools) => Json(tools).into_response(),
        Err(e @ GatewayError::ServerNotFound { .. }) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": e.to_string() })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": e.to_string() })),
        )
            .into_response(),
    }
}

async fn invoke_tool(
    State(gw): State<SharedGateway>,
    Json(request): Json<InvokeRequest>,
) -> impl IntoResponse {
    Json(gw.invoke_tool(&request).await)
}

async fn health(State(gw): State<SharedGateway>) -> impl IntoResponse {
    Json(gw.health().await)
}

async fn prompt_context(State(gw): State<SharedGateway>) -> impl IntoResponse {
    Json(json!({ "context": gw.build_prompt_context().await }))
}

async fn openai_tools(State(gw): State<SharedGateway>) -> impl IntoResponse {
    let tools = gw.openai_tools().await;
    Json(json!({ "count": tools.len(), "tools": tools }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{DiscoveryClient, LocalScanner};
    use crate::probe::{ProbeEngine, ProbeTimeouts};
    use crate::registry::RegistryStore;
    use crate::test_support::{dead_base_url, StubServer};
    use serde_json::Value;
    use std::time::Duration;

    async fn spawn_api() -> (String, Arc<Gateway>) {
        let probe = ProbeEngine::new().unwrap();
        let timeouts = ProbeTimeouts {
            liveness: Duration::from_secs(1),
            port_scan: Duration::from_secs(1),
            health: Duration::from_secs(1),
            catalog: Duration::from_secs(1),
            invocation: Duration::from_secs(2),
        };
        let discovery = DiscoveryClient::new(dead_base_url().await, Duration::from_secs(1)).unwrap();
        let scanner = LocalScanner::new(probe.clone(), timeouts, "127.0.0.1");
        let gateway = Arc::new(Gateway::new(
            Arc::new(RegistryStore::in_memory()),
            discovery,
            scanner,
            probe,
            timeouts,
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let gw = gateway.clone();
        tokio::spawn(async move {
            let _ = serve(listener, gw, std::future::pending()).await;
        });
        (format!("http://{addr}{API_PREFIX}"), gateway)
    }

    #[tokio::test]
    async fn test_register_list_unregister_over_http() {
        let svc = StubServer::new()
            .json("GET", "/health", 200, json!({"status": "ok"}))
            .spawn()
            .await;
        let (api, _gw) = spawn_api().await;
        let http = reqwest::Client::new();

        let registered: Value = http
            .post(format!("{api}/servers/register"))
            .json(&json!({"name": "svc-a", "url": svc.base_url}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(registered["success"], true);
        assert_eq!(registered["server"]["status"], "healthy");

        let listing: Value = http
            .get(format!("{api}/servers?source=local"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listing["count"], 1);
        assert_eq!(listing["servers"][0]["name"], "svc-a");
        assert_eq!(listing["servers"][0]["source"], "local-registry");
        assert_eq!(listing["discoveryServiceAvailable"], false);

        let removed: Value = http
            .delete(format!("{api}/servers/svc-a"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(removed["success"], true);

        let listing: Value = http
            .get(format!("{api}/servers?source=local"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listing["count"], 0);
    }

    #[tokio::test]
    async fn test_unknown_server_tools_is_404() {
        let (api, _gw) = spawn_api().await;
        let resp = reqwest::get(format!("{api}/tools/nope")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 404);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["detail"], "Server nope not found");
    }

    #[tokio::test]
    async fn test_invoke_unknown_server_is_200_failure() {
        let (api, _gw) = spawn_api().await;
        let resp = reqwest::Client::new()
            .post(format!("{api}/invoke"))
            .json(&json!({"server": "nope", "tool": "echo"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["server"], "nope");
        assert_eq!(body["tool"], "echo");
    }

    #[tokio::test]
    async fn test_discover_over_http() {
        let (api, _gw) = spawn_api().await;
        let svc = StubServer::new()
            .json("GET", "/health", 200, json!({}))
            .spawn()
            .await;
        let body: Value = reqwest::Client::new()
            .post(format!("{api}/discover"))
            .json(&json!({"scanDocker": false, "scanPorts": [svc.port]}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["source"], "local");
        assert_eq!(body["count"], 1);
        assert_eq!(body["registeredTotal"], 1);
    }

    #[tokio::test]
    async fn test_health_and_services_fallback() {
        let (api, _gw) = spawn_api().await;

        let health: Value = reqwest::get(format!("{api}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["healthy"], false);
        assert_eq!(health["discoveryService"]["available"], false);
        assert_eq!(health["localRegistry"]["totalCount"], 0);

        let services: Value = reqwest::get(format!("{api}/services?serviceType=filesystem"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(services["source"], "local-fallback");
        assert_eq!(services["fromDiscoveryService"], false);
    }

    #[tokio::test]
    async fn test_empty_flag_values_use_defaults() {
        let (api, _gw) = spawn_api().await;

        let services =
            reqwest::get(format!("{api}/services?serviceType=&status=&useCache=")).await.unwrap();
        assert_eq!(services.status().as_u16(), 200);

        let tools = reqwest::get(format!("{api}/tools?refresh=")).await.unwrap();
        assert_eq!(tools.status().as_u16(), 200);

        let bad = reqwest::get(format!("{api}/tools?refresh=maybe")).await.unwrap();
        assert_eq!(bad.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_context_empty_when_no_tools() {
        let (api, _gw) = spawn_api().await;
        let body: Value = reqwest::get(format!("{api}/context"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["context"], "");
    }
}
