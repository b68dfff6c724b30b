use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, OnceLock};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chain_tools::catalog::tool_catalog;
use chain_tools::{Executor, SimulatedChain};
use conversation::{
    Conversation, ConversationHandle, Dependencies, EngineError, SessionContext,
    SessionSnapshot, Topic, TransactionLedger, TransactionRecord,
};
use llm_gateway::{build_model, ChatModel};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};
use tutor_core::config::CONFIG;
use tutor_core::{CallId, FunctionCall, RegistryError};

mod config;
use config::load_server_settings;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Wallet used by the simulated chain when none is configured.
const DEMO_WALLET: &str = "0x000000000000000000000000000000000000dEaD";

#[derive(Clone)]
struct AppState {
    model: Arc<dyn ChatModel>,
    executor: Executor,
    ledger: Arc<TransactionLedger>,
    context: SessionContext,
    conversations: Arc<RwLock<HashMap<String, ConversationHandle>>>,
}

impl AppState {
    fn dependencies(&self) -> Dependencies {
        Dependencies {
            model: self.model.clone(),
            executor: self.executor.clone(),
            recorder: self.ledger.clone(),
            context: self.context.clone(),
        }
    }

    async fn conversation(&self, id: &str) -> Result<ConversationHandle, ApiError> {
        self.conversations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("unknown conversation {id}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        let status = match &error {
            EngineError::Closed => StatusCode::GONE,
            EngineError::Registry(RegistryError::UnknownCall(_)) => StatusCode::NOT_FOUND,
            EngineError::Registry(_) | EngineError::InFlight(_) => StatusCode::CONFLICT,
        };
        Self::new(status, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        debug!(status = %self.status, message = %self.message, "request refused");
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

fn find_topic(id: &str) -> Result<Topic, ApiError> {
    Topic::find(id).ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, format!("unknown topic {id:?}")))
}

#[derive(Debug, Default, Deserialize)]
struct CreateConversationRequest {
    #[serde(default)]
    topic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessageRequest {
    content: String,
}

#[derive(Debug, Deserialize)]
struct SelectTopicRequest {
    topic: String,
}

#[derive(Debug, Default, Deserialize)]
struct WaitQuery {
    /// Respond after pending model and capability work has been applied.
    #[serde(default)]
    wait: bool,
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/topics", get(list_topics))
        .route("/capabilities", get(get_capabilities))
        .route("/transactions", get(list_transactions))
        .route("/conversations", post(create_conversation))
        .route(
            "/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/conversations/:id/messages", post(post_message))
        .route("/conversations/:id/calls/:call_id/approve", post(approve_call))
        .route("/conversations/:id/calls/:call_id/reject", post(reject_call))
        .route("/conversations/:id/reset", post(reset_conversation))
        .route("/conversations/:id/topic", post(select_topic))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = load_server_settings().unwrap_or_else(|err| {
        warn!("failed to load config: {err:?}, using defaults");
        Default::default()
    });
    settings.apply_runtime_env();

    let wallet = CONFIG
        .wallet_address
        .clone()
        .unwrap_or_else(|| DEMO_WALLET.to_string());
    let model = build_model(&CONFIG);
    info!(model = model.label(), %wallet, chain_id = CONFIG.chain_id, "tutor backend ready");

    let app_state = AppState {
        model,
        executor: Executor::new(Arc::new(SimulatedChain::new(&wallet))),
        ledger: Arc::new(TransactionLedger::new()),
        context: SessionContext {
            wallet_address: Some(wallet),
            chain_id: CONFIG.chain_id,
        },
        conversations: Arc::new(RwLock::new(HashMap::new())),
    };
    let bind_addr = settings.bind_addr()?;

    let router = Router::new()
        .merge(api_routes())
        .nest("/api", api_routes())
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_methods(Any).allow_origin(Any).allow_headers(Any));

    info!("Starting API server on {bind_addr}");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    let log_dir = std::path::Path::new("logs");
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("failed to create log directory {log_dir:?}: {err}");
    }

    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(log_dir, "api-server.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let env_filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());

    let fmt_stdout = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);
    let fmt_file = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    let subscriber = Registry::default()
        .with(env_filter)
        .with(fmt_stdout)
        .with(fmt_file);

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("tracing already initialised");
    }
}

async fn list_topics() -> Json<ApiResponse<Vec<Topic>>> {
    Json(ApiResponse::ok(Topic::builtin()))
}

async fn get_capabilities() -> Json<ApiResponse<Value>> {
    Json(ApiResponse::ok(tool_catalog()))
}

async fn list_transactions(State(state): State<AppState>) -> Json<ApiResponse<Vec<TransactionRecord>>> {
    Json(ApiResponse::ok(state.ledger.records()))
}

async fn create_conversation(
    State(state): State<AppState>,
    body: Option<Json<CreateConversationRequest>>,
) -> ApiResult<SessionSnapshot> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let topic = match request.topic.as_deref() {
        Some(id) => find_topic(id)?,
        None => Topic::general(),
    };

    let handle = Conversation::spawn(state.dependencies(), topic);
    let snapshot = handle.snapshot().await?;
    info!(conversation = %handle.id(), topic = %snapshot.topic.id, "conversation created");
    state
        .conversations
        .write()
        .await
        .insert(handle.id().to_string(), handle);
    ok(snapshot)
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WaitQuery>,
) -> ApiResult<SessionSnapshot> {
    let handle = state.conversation(&id).await?;
    ok(snapshot(&handle, query.wait).await?)
}

/// Forgets the conversation and stops its actor.
async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<String> {
    let handle = state
        .conversations
        .write()
        .await
        .remove(&id)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("unknown conversation {id}")))?;

    match handle.close().await {
        Ok(()) | Err(EngineError::Closed) => {}
        Err(error) => return Err(error.into()),
    }
    info!(conversation = %id, "conversation deleted");
    ok(id)
}

async fn snapshot(handle: &ConversationHandle, wait: bool) -> Result<SessionSnapshot, EngineError> {
    if wait {
        handle.when_idle().await
    } else {
        handle.snapshot().await
    }
}

async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WaitQuery>,
    Json(request): Json<PostMessageRequest>,
) -> ApiResult<SessionSnapshot> {
    if request.content.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "message content is empty"));
    }
    let handle = state.conversation(&id).await?;
    handle.send_user_message(request.content).await?;
    ok(snapshot(&handle, query.wait).await?)
}

async fn approve_call(
    State(state): State<AppState>,
    Path((id, call_id)): Path<(String, String)>,
) -> ApiResult<FunctionCall> {
    let handle = state.conversation(&id).await?;
    ok(handle.approve(&CallId::from(call_id)).await?)
}

async fn reject_call(
    State(state): State<AppState>,
    Path((id, call_id)): Path<(String, String)>,
) -> ApiResult<FunctionCall> {
    let handle = state.conversation(&id).await?;
    ok(handle.reject(&CallId::from(call_id)).await?)
}

async fn reset_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionSnapshot> {
    let handle = state.conversation(&id).await?;
    handle.reset().await?;
    ok(handle.snapshot().await?)
}

async fn select_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SelectTopicRequest>,
) -> ApiResult<SessionSnapshot> {
    let topic = find_topic(&request.topic)?;
    let handle = state.conversation(&id).await?;
    handle.select_topic(topic).await?;
    ok(handle.snapshot().await?)
}
