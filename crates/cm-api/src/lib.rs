use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    http::Method,
    http::Request,
    middleware,
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use clap::Parser;
use dotenvy::dotenv;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use cm_common::db::{create_pool_from_url, run_migrations, PgPool, PgStore};
use cm_common::llm::{LlmClient, LlmConfig, OpenAiClient};
use cm_common::logging::{init_tracing_subscriber, install_tracing_panic_hook};
use cm_common::workflow::{MemoryStore, WorkflowStore};

pub mod error;
pub mod handlers;

use error::ApiError;
use handlers::{feedback, generate, health, workflows};

const SHUTDOWN_DRAIN_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Parser)]
#[command(name = "cm-api", about = "HTTP API for iterative candidate matching")]
struct Cli {
    /// PostgreSQL connection string; omit to run on the in-memory store
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Server port
    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// API key for the chat-completions endpoint
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: String,

    /// Chat model used for generation, analysis and refinement
    #[arg(long, env = "LLM_MODEL", default_value = "gpt-4o-mini")]
    llm_model: String,

    /// Base url of the OpenAI-compatible endpoint
    #[arg(long, env = "LLM_ENDPOINT", default_value = "https://api.openai.com/v1")]
    llm_endpoint: String,

    /// Per-call timeout in seconds
    #[arg(long, env = "LLM_TIMEOUT_SECONDS", default_value_t = 30)]
    llm_timeout_seconds: u64,

    /// Bounded retries on transient model failures
    #[arg(long, env = "LLM_MAX_RETRIES", default_value_t = 3)]
    llm_max_retries: u32,

    /// Comma separated list of allowed CORS origins
    #[arg(long, env = "CM_CORS_ORIGINS", default_value = "http://localhost:3000")]
    cors_origins: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    fn from_cli(cli: &Cli) -> Result<Self, ApiError> {
        let cors_origins = cli
            .cors_origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect::<Vec<_>>();

        if cors_origins.iter().any(|origin| origin == "*") {
            return Err(ApiError::BadRequest(
                "CM_CORS_ORIGINS must list explicit origins".into(),
            ));
        }

        Ok(Self {
            database_url: cli.database_url.clone(),
            port: cli.port,
            cors_origins,
        })
    }

    pub fn for_tests() -> Self {
        Self {
            database_url: None,
            port: 3001,
            cors_origins: vec!["http://localhost:3000".into()],
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn WorkflowStore>,
    pub llm: Arc<dyn LlmClient>,
    pub config: AppConfig,
    /// Present only when backed by Postgres; used by the readiness probe.
    pub pool: Option<PgPool>,
    pub readiness: Arc<AtomicBool>,
}

pub type SharedState = Arc<AppState>;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}

async fn attach_request_id_context(req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    Ok(error::with_request_id(request_id, next.run(req)).await)
}

pub fn create_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let request_id_header = HeaderName::from_static("x-request-id");
    let trace_header = request_id_header.clone();

    let trace = TraceLayer::new_for_http().make_span_with(move |request: &Request<Body>| {
        let request_id = request
            .headers()
            .get(&trace_header)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
            status = tracing::field::Empty,
        )
    });

    let api_routes = Router::new()
        .route("/candidates/generate", post(generate::generate))
        .route("/candidates/feedback", post(feedback::submit_feedback))
        .route("/workflows/:job_id", get(workflows::get_workflow_state))
        .route(
            "/workflows/:job_id/complete",
            post(workflows::complete_workflow),
        );

    Router::new()
        .route("/health", get(health::readyz))
        .route("/livez", get(health::livez))
        .route("/readyz", get(health::readyz))
        .nest("/api", api_routes)
        .layer(middleware::from_fn(attach_request_id_context))
        .layer(DefaultBodyLimit::max(256 * 1024))
        .layer(trace)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(
            request_id_header,
            MakeRequestUuid::default(),
        ))
        .layer(cors)
        .with_state(state)
}

pub async fn run() -> Result<(), ApiError> {
    dotenv().ok();
    init_tracing_subscriber(env!("CARGO_PKG_NAME"));
    install_tracing_panic_hook(env!("CARGO_PKG_NAME"));

    let cli = Cli::parse();
    let config = AppConfig::from_cli(&cli)?;

    let llm_config = LlmConfig {
        api_key: cli.openai_api_key.clone(),
        model: cli.llm_model.clone(),
        endpoint: cli.llm_endpoint.trim_end_matches('/').to_string(),
        timeout: Duration::from_secs(cli.llm_timeout_seconds),
        max_retries: cli.llm_max_retries,
        ..LlmConfig::default()
    };
    let llm: Arc<dyn LlmClient> = Arc::new(
        OpenAiClient::new(llm_config).map_err(|err| ApiError::BadRequest(err.to_string()))?,
    );

    let (store, pool): (Arc<dyn WorkflowStore>, Option<PgPool>) = match &config.database_url {
        Some(url) => {
            let pool = create_pool_from_url(url)
                .map_err(|err| ApiError::Database(format!("failed to create pool: {err}")))?;
            run_migrations(&pool)
                .await
                .map_err(|err| ApiError::Database(format!("failed to run migrations: {err}")))?;
            (Arc::new(PgStore::new(pool.clone())), Some(pool))
        }
        None => {
            warn!("DATABASE_URL not set; workflow state will not survive restarts");
            (Arc::new(MemoryStore::new()), None)
        }
    };

    let state = Arc::new(AppState {
        store,
        llm,
        config: config.clone(),
        pool,
        readiness: Arc::new(AtomicBool::new(true)),
    });

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let app = create_router(state.clone());

    info!(%addr, model = %cli.llm_model, "cm-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    Ok(())
}

async fn shutdown_signal(state: SharedState) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    state
        .readiness
        .store(false, std::sync::atomic::Ordering::SeqCst);

    // Give load balancers a brief window to observe /readyz as not ready
    // before axum stops accepting new connections.
    tokio::time::sleep(SHUTDOWN_DRAIN_GRACE).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn sets_request_id_when_missing() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(SetRequestIdLayer::new(
                HeaderName::from_static("x-request-id"),
                MakeRequestUuid::default(),
            ));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[test]
    fn wildcard_cors_origin_is_rejected() {
        let cli = Cli {
            database_url: None,
            port: 3001,
            openai_api_key: "key".into(),
            llm_model: "gpt-4o-mini".into(),
            llm_endpoint: "https://api.openai.com/v1".into(),
            llm_timeout_seconds: 30,
            llm_max_retries: 3,
            cors_origins: "*".into(),
        };

        assert!(matches!(
            AppConfig::from_cli(&cli),
            Err(ApiError::BadRequest(_))
        ));
    }
}
