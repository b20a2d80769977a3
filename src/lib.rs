use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod posts;
pub mod routes;
pub mod session;
pub mod users;

use auth::AuthRule;

// --- Public Re-exports ---

// Makes core state types easily accessible to the application entry point
// and the integration tests.
pub use config::AppConfig;
pub use error::Error;
pub use posts::{ContentState, MemoryContentStore, PostgresContentStore};
pub use session::{MemorySessionStore, PostgresSessionStore, SessionState};
pub use users::{CredentialState, MemoryCredentialStore, PostgresCredentialStore};

/// ApiDoc
///
/// Auto-generates the OpenAPI documentation (Swagger JSON) for the
/// application from the `#[utoipa::path]` and `#[derive(utoipa::ToSchema)]`
/// annotations. The resulting JSON is served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register, handlers::login, handlers::list_posts,
        handlers::posts_by_category, handlers::get_post, handlers::add_post,
        handlers::user_posts, handlers::delete_post, handlers::add_comment,
        handlers::delete_comment, handlers::vote_post
    ),
    components(
        schemas(
            models::Post, models::Comment, models::Vote, models::Author,
            models::Credentials, models::CreatePostRequest,
            models::CreateCommentRequest, models::Token,
        )
    ),
    tags(
        (name = "fractus", description = "Content-sharing service API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, thread-safe container holding all application services and
/// configuration, shared across all incoming requests. The protected-rule
/// table for the authorization gate is built here at construction time.
#[derive(Clone)]
pub struct AppState {
    /// Content Store: posts with their embedded comments and votes.
    pub content: ContentState,
    /// Credential Store: user records and the password contract.
    pub users: CredentialState,
    /// Session Store: opaque tokens bound to user ids.
    pub sessions: SessionState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
    /// The closed table of (method, route template) pairs requiring a
    /// session, consulted by the authorization gate.
    pub rules: Arc<Vec<AuthRule>>,
}

impl AppState {
    pub fn new(
        content: ContentState,
        users: CredentialState,
        sessions: SessionState,
        config: AppConfig,
    ) -> Self {
        Self {
            content,
            users,
            sessions,
            config,
            rules: Arc::new(routes::protected()),
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

// Allow handlers and middleware to selectively pull components from the
// shared AppState.

impl FromRef<AppState> for ContentState {
    fn from_ref(app_state: &AppState) -> ContentState {
        app_state.content.clone()
    }
}

impl FromRef<AppState> for CredentialState {
    fn from_ref(app_state: &AppState) -> CredentialState {
        app_state.users.clone()
    }
}

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the application's routing structure, layers the authorization
/// gate over it, applies the observability stack and registers the
/// application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    // The authorization gate wraps every route; it consults the rule table
    // in the state and forwards anything unmatched untouched, so public
    // routes pay only the template lookup.
    let base_router = Router::new()
        // Documentation: serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(routes::api())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_gate,
        ))
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID generation: a unique UUID per incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request tracing: wraps the request/response lifecycle in
                // a span correlated by the request id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id))
                // 3d. Panic recovery: a panicking handler becomes a 500
                // instead of a dropped connection.
                .layer(CatchPanicLayer::new()),
        )
        // 4. CORS layer, outermost.
        .layer(cors)
}

/// trace_span_logger
///
/// Customizes the `TraceLayer` span: includes the `x-request-id` header (if
/// present) alongside the HTTP method and URI, so every log line of one
/// request shares a correlation id.
fn trace_span_logger(request: &Request) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
