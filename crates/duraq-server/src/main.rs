//! Duraq Server - Local Durable Queue HTTP Server
//!
//! This is the main entry point for the duraq queue service.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use duraq_core::LocalQueue;
use duraq_storage::NdjsonStore;
use duraq_types::{
    Error, QueueAttributes, QueueConfig, ReceiptHandle, ReceiveOptions, ReceivedMessage,
    SendOptions,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

// ==================== App State ====================

/// Shared application state
#[derive(Clone)]
struct AppState {
    queue: Arc<LocalQueue>,
}

// ==================== Request/Response Types ====================

/// Send message request
#[derive(Debug, Deserialize, ToSchema)]
struct SendRequest {
    /// Message body, already serialized by the producer
    body: String,
    /// Seconds before the message becomes deliverable
    #[serde(default)]
    delay_seconds: Option<u64>,
    /// Custom message attributes
    #[serde(default)]
    attributes: Option<std::collections::HashMap<String, String>>,
}

/// Send response
#[derive(Debug, Serialize, ToSchema)]
struct SendResponse {
    /// ID of the enqueued message
    message_id: String,
}

/// Receive query parameters
#[derive(Debug, Deserialize, ToSchema)]
struct ReceiveQuery {
    /// Maximum number of messages to lease (default: 1)
    #[serde(default = "default_max_messages")]
    max: usize,
    /// Visibility timeout override in milliseconds
    #[serde(default)]
    visibility_timeout_ms: Option<u64>,
}

fn default_max_messages() -> usize {
    1
}

/// Message response (for API)
#[derive(Debug, Serialize, ToSchema)]
struct MessageResponse {
    /// Unique message ID
    id: String,
    /// Message body
    body: String,
    /// Producer-set attributes
    attributes: std::collections::HashMap<String, String>,
    /// Handle required to ack or nack this delivery
    receipt_handle: String,
    /// Number of lease grants including this one
    receive_count: u32,
}

impl From<ReceivedMessage> for MessageResponse {
    fn from(msg: ReceivedMessage) -> Self {
        Self {
            id: msg.id.to_string(),
            body: msg.body,
            attributes: msg.attributes,
            receipt_handle: msg.receipt_handle.0,
            receive_count: msg.receive_count,
        }
    }
}

/// Ack request
#[derive(Debug, Deserialize, ToSchema)]
struct AckRequest {
    /// Receipt handle of the delivery to acknowledge
    receipt_handle: String,
}

/// Nack request
#[derive(Debug, Deserialize, ToSchema)]
struct NackRequest {
    /// Receipt handle of the delivery to give up
    receipt_handle: String,
    /// Redeliver immediately instead of after a backoff delay
    #[serde(default)]
    retry: bool,
}

/// API Error response
#[derive(Debug, Serialize, ToSchema)]
struct ApiErrorBody {
    /// Error message
    error: String,
    /// Error code
    code: String,
}

/// Purge response
#[derive(Debug, Serialize, ToSchema)]
struct PurgeResponse {
    /// Number of messages purged
    purged: u64,
}

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    /// Health status
    status: String,
    /// Server version
    version: String,
}

// ==================== Error Handling ====================

/// Wrapper for duraq errors to implement IntoResponse
struct AppError(Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self.0 {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            Error::UnknownHandle(_) => (StatusCode::NOT_FOUND, "UNKNOWN_HANDLE"),
            Error::ExpiredHandle(_) => (StatusCode::GONE, "EXPIRED_HANDLE"),
            Error::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR"),
        };

        let body = Json(ApiErrorBody {
            error: self.0.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

// ==================== OpenAPI Documentation ====================

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Duraq API",
        version = "0.1.0",
        description = "Duraq - Local Durable Queue API",
        license(name = "MIT OR Apache-2.0"),
        contact(name = "Duraq Team", url = "https://github.com/duraq/duraq")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    paths(
        health,
        list_queues,
        get_queue_attributes,
        purge_queue,
        send_message,
        receive_messages,
        ack_message,
        nack_message,
    ),
    components(
        schemas(
            HealthResponse,
            QueueAttributes,
            SendRequest,
            SendResponse,
            MessageResponse,
            ReceiveQuery,
            AckRequest,
            NackRequest,
            ApiErrorBody,
            PurgeResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "queues", description = "Queue inspection and maintenance endpoints"),
        (name = "messages", description = "Message operations endpoints")
    )
)]
struct ApiDoc;

// ==================== Handlers ====================

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse)
    )
)]
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List all queues
#[utoipa::path(
    get,
    path = "/api/v1/queues",
    tag = "queues",
    responses(
        (status = 200, description = "Names of all queues", body = Vec<String>)
    )
)]
async fn list_queues(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    let queues = state.queue.list_queues().await?;
    Ok(Json(queues))
}

/// Get approximate queue attributes
#[utoipa::path(
    get,
    path = "/api/v1/queues/{name}/attributes",
    tag = "queues",
    params(
        ("name" = String, Path, description = "Queue name")
    ),
    responses(
        (status = 200, description = "Queue attributes", body = QueueAttributes),
        (status = 400, description = "Invalid queue name", body = ApiErrorBody)
    )
)]
async fn get_queue_attributes(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<QueueAttributes>, AppError> {
    let attributes = state.queue.get_attributes(&name).await?;
    Ok(Json(attributes))
}

/// Purge all messages from a queue
#[utoipa::path(
    post,
    path = "/api/v1/queues/{name}/purge",
    tag = "queues",
    params(
        ("name" = String, Path, description = "Queue name")
    ),
    responses(
        (status = 200, description = "Queue purged", body = PurgeResponse),
        (status = 400, description = "Invalid queue name", body = ApiErrorBody)
    )
)]
async fn purge_queue(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<PurgeResponse>, AppError> {
    let count = state.queue.purge(&name).await?;
    Ok(Json(PurgeResponse { purged: count }))
}

/// Send a message to a queue
#[utoipa::path(
    post,
    path = "/api/v1/queues/{name}/messages",
    tag = "messages",
    params(
        ("name" = String, Path, description = "Queue name")
    ),
    request_body = SendRequest,
    responses(
        (status = 201, description = "Message enqueued", body = SendResponse),
        (status = 400, description = "Invalid message", body = ApiErrorBody)
    )
)]
async fn send_message(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    Json(req): Json<SendRequest>,
) -> Result<(StatusCode, Json<SendResponse>), AppError> {
    let options = SendOptions {
        delay_seconds: req.delay_seconds,
        attributes: req.attributes.unwrap_or_default(),
    };

    let message_id = state.queue.send(&queue_name, req.body, options).await?;

    Ok((
        StatusCode::CREATED,
        Json(SendResponse {
            message_id: message_id.to_string(),
        }),
    ))
}

/// Receive (lease) messages from a queue
#[utoipa::path(
    get,
    path = "/api/v1/queues/{name}/messages",
    tag = "messages",
    params(
        ("name" = String, Path, description = "Queue name"),
        ("max" = Option<usize>, Query, description = "Maximum messages to lease"),
        ("visibility_timeout_ms" = Option<u64>, Query, description = "Visibility timeout override")
    ),
    responses(
        (status = 200, description = "Messages leased (possibly none)", body = Vec<MessageResponse>),
        (status = 400, description = "Invalid queue name", body = ApiErrorBody)
    )
)]
async fn receive_messages(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    Query(query): Query<ReceiveQuery>,
) -> Result<Json<Vec<MessageResponse>>, AppError> {
    let options = ReceiveOptions {
        visibility_timeout_ms: query.visibility_timeout_ms,
    };
    let messages = state.queue.receive(&queue_name, query.max, options).await?;
    let responses: Vec<MessageResponse> = messages.into_iter().map(Into::into).collect();
    Ok(Json(responses))
}

/// Acknowledge a delivery (removes the message)
#[utoipa::path(
    post,
    path = "/api/v1/queues/{name}/messages/ack",
    tag = "messages",
    params(
        ("name" = String, Path, description = "Queue name")
    ),
    request_body = AckRequest,
    responses(
        (status = 204, description = "Message acknowledged"),
        (status = 404, description = "Unknown receipt handle", body = ApiErrorBody),
        (status = 410, description = "Expired receipt handle", body = ApiErrorBody)
    )
)]
async fn ack_message(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    Json(req): Json<AckRequest>,
) -> Result<StatusCode, AppError> {
    let handle = ReceiptHandle(req.receipt_handle);
    state.queue.ack(&queue_name, &handle).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Give up a delivery (returns the message to the queue)
#[utoipa::path(
    post,
    path = "/api/v1/queues/{name}/messages/nack",
    tag = "messages",
    params(
        ("name" = String, Path, description = "Queue name")
    ),
    request_body = NackRequest,
    responses(
        (status = 204, description = "Message released back to the queue"),
        (status = 404, description = "Unknown receipt handle", body = ApiErrorBody),
        (status = 410, description = "Expired receipt handle", body = ApiErrorBody)
    )
)]
async fn nack_message(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    Json(req): Json<NackRequest>,
) -> Result<StatusCode, AppError> {
    let handle = ReceiptHandle(req.receipt_handle);
    state.queue.nack(&queue_name, &handle, req.retry).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Router ====================

fn create_router(state: AppState) -> Router {
    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Health
        .route("/health", get(health))
        // Queues
        .route("/api/v1/queues", get(list_queues))
        .route(
            "/api/v1/queues/:name/attributes",
            get(get_queue_attributes),
        )
        .route("/api/v1/queues/:name/purge", post(purge_queue))
        // Messages
        .route(
            "/api/v1/queues/:name/messages",
            post(send_message).get(receive_messages),
        )
        .route("/api/v1/queues/:name/messages/ack", post(ack_message))
        .route("/api/v1/queues/:name/messages/nack", post(nack_message))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ==================== Configuration ====================

fn config_from_env() -> anyhow::Result<QueueConfig> {
    let base_dir =
        std::env::var("DURAQ_BASE_DIR").unwrap_or_else(|_| "./duraq-data".to_string());
    let mut config = QueueConfig::new(base_dir);

    if let Ok(dlq) = std::env::var("DURAQ_DEAD_LETTER_QUEUE") {
        config = config.with_dead_letter_queue(dlq);
    }
    if let Ok(max) = std::env::var("DURAQ_MAX_RECEIVE_COUNT") {
        config = config.with_max_receive_count(max.parse()?);
    }
    if let Ok(timeout) = std::env::var("DURAQ_DEFAULT_VISIBILITY_TIMEOUT_MS") {
        config = config.with_default_visibility_timeout_ms(timeout.parse()?);
    }

    Ok(config)
}

// ==================== Main ====================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duraq=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Create the queue service over NDJSON files in the base directory
    let config = config_from_env()?;
    let store = Arc::new(NdjsonStore::new(&config.base_dir));
    let queue = Arc::new(LocalQueue::with_store(store, config));

    // Start background compaction
    queue
        .start_maintenance(std::time::Duration::from_secs(60))
        .await;

    // Create app state
    let state = AppState { queue };

    // Create router
    let app = create_router(state);

    // Start server
    let addr =
        std::env::var("DURAQ_LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Duraq server listening on {}", addr);
    info!("Swagger UI: http://{}/swagger-ui/", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
