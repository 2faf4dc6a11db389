use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{ConnectInfo, Query, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::debug;

use localshare_net::{Handshaker, Messenger, TransferEngine};
use localshare_shared::constants::{ROUTE_DOWNLOAD, ROUTE_DOWNLOAD_INFO, ROUTE_EXCHANGE, ROUTE_MESSAGE};
use localshare_shared::hash::hash_file_async;
use localshare_shared::types::{DeviceDescriptor, DownloadInfo, MessageKind, MessageParams};
use localshare_store::Store;

use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub handshaker: Handshaker,
    pub messenger: Messenger,
    pub transfers: TransferEngine,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(ROUTE_EXCHANGE, post(exchange))
        .route(ROUTE_MESSAGE, post(message))
        .route(ROUTE_DOWNLOAD, get(download))
        .route(ROUTE_DOWNLOAD_INFO, get(download_info))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageIdQuery {
    message_id: i64,
}

async fn exchange(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(remote): Json<DeviceDescriptor>,
) -> Result<Json<DeviceDescriptor>, ServerError> {
    let source = connect_info.map(|ConnectInfo(addr)| addr);
    let local = state.handshaker.accept(remote, source).await?;
    Ok(Json(local))
}

async fn message(
    State(state): State<AppState>,
    Json(params): Json<MessageParams>,
) -> Result<StatusCode, ServerError> {
    let message = state.messenger.receive(params).await?;
    if let Some(id) = message.id.filter(|_| message.has_file()) {
        state.transfers.spawn_download(id);
    }
    Ok(StatusCode::OK)
}

/// Serve the file of a message we sent, honouring `Range`.
async fn download(
    State(state): State<AppState>,
    Query(query): Query<MessageIdQuery>,
    request: Request,
) -> Result<Response, ServerError> {
    let (path, filename) = shared_file(&state.store, query.message_id).await?;
    debug!(message_id = query.message_id, path = %path.display(), "Serving file");

    let response = ServeFile::new(&path)
        .oneshot(request)
        .await
        .map_err(|e| -> ServerError { match e {} })?;
    let mut response = response.map(Body::new);

    if response.status() == StatusCode::NOT_FOUND {
        return Err(ServerError::NotFound(format!("file of message {}", query.message_id)));
    }

    let disposition = format!("attachment; filename={}", urlencoding::encode(&filename));
    let value = HeaderValue::from_str(&disposition)
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    response
        .headers_mut()
        .insert(header::CONTENT_DISPOSITION, value);
    Ok(response)
}

async fn download_info(
    State(state): State<AppState>,
    Query(query): Query<MessageIdQuery>,
) -> Result<Json<DownloadInfo>, ServerError> {
    let (path, _) = shared_file(&state.store, query.message_id).await?;
    let size = tokio::fs::metadata(&path).await?.len();
    let hash = hash_file_async(&path).await?;
    Ok(Json(DownloadInfo { size, hash }))
}

/// Local path and display name of the file attached to sent message `id`.
async fn shared_file(store: &Store, id: i64) -> Result<(PathBuf, String), ServerError> {
    let message = store.message(id).await?;
    if message.kind != MessageKind::Send {
        return Err(ServerError::NotFound(format!("sent message {id}")));
    }
    let path = message
        .filepath
        .map(PathBuf::from)
        .filter(|p| p.is_file())
        .ok_or_else(|| ServerError::NotFound(format!("file of message {id}")))?;
    let filename = message.filename.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    Ok((path, filename))
}
