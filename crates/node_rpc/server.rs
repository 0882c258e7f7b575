use std::net::SocketAddr;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::context::RpcApiContext;
use crate::error::RpcErrorMetadata;
use crate::router::dispatch;
use crate::types::{RpcErrorResponse, RpcRequest, RpcRequestId, RpcSuccessResponse};

pub async fn start_api(listen_addr: SocketAddr, context: RpcApiContext) -> std::io::Result<()> {
    let router = Router::new()
        .route("/", post(handle_request))
        .layer(CorsLayer::permissive())
        .with_state(context);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(%listen_addr, "node outbox rpc listening");
    axum::serve(listener, router).await
}

async fn handle_request(State(context): State<RpcApiContext>, Json(req): Json<RpcRequest>) -> Json<Value> {
    let id = match &req.id {
        RpcRequestId::Number(n) => RpcRequestId::Number(*n),
        RpcRequestId::String(s) => RpcRequestId::String(s.clone()),
    };
    match dispatch(&req, context) {
        Ok(result) => Json(json!(RpcSuccessResponse {
            id,
            jsonrpc: "2.0".to_string(),
            result,
        })),
        Err(e) => {
            tracing::warn!(method = %req.method, error = %e, "node rpc request failed");
            Json(json!(RpcErrorResponse {
                id,
                jsonrpc: "2.0".to_string(),
                error: RpcErrorMetadata::from(e),
            }))
        }
    }
}
