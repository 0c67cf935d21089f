use axum::{
    Router,
    body::Body,
    extract::FromRef,
    http::{HeaderName, Request},
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod policy;
pub mod repository;

pub mod routes;
use routes::{customers, public};

// --- Public Re-exports ---

pub use auth::{Principal, TokenVerifier};
pub use config::AppConfig;
pub use error::ApiError;
pub use policy::{PolicyError, PolicyTable};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// Name of the security scheme referenced by the protected operations.
pub const BEARER_SCHEME: &str = "Bearer";

/// Declares the JWT bearer scheme the protected operations refer to.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            BEARER_SCHEME,
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some(
                        "JWT Authorization header using the Bearer scheme. \
                         Send `Authorization: Bearer <token>`.",
                    ))
                    .build(),
            ),
        );
    }
}

/// ApiDoc
///
/// OpenAPI document for every route, served at `/api-docs/openapi.json` and
/// browsable through Swagger UI at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_customers, handlers::get_customer, handlers::create_customer,
        handlers::update_customer, handlers::delete_customer, handlers::health,
    ),
    components(schemas(models::Customer)),
    modifiers(&SecurityAddon),
    tags(
        (name = "customers", description = "Customer records"),
        (name = "ops", description = "Operational endpoints")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Everything a request may need, shared read-only across all requests.
/// Handlers pull the pieces they use through `FromRef`.
#[derive(Clone)]
pub struct AppState {
    /// Customer store.
    pub repo: RepositoryState,
    /// Bearer token validation, built from `config.jwt`.
    pub verifier: TokenVerifier,
    /// Named policies the route guards are built from.
    pub policies: PolicyTable,
    pub config: AppConfig,
}

impl AppState {
    /// State with the standard policy table and a verifier for `config.jwt`.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        Self {
            repo,
            verifier: TokenVerifier::new(&config.jwt),
            policies: PolicyTable::standard(),
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for TokenVerifier {
    fn from_ref(app_state: &AppState) -> TokenVerifier {
        app_state.verifier.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles all routes, the API documentation, and the observability
/// layers. Fails only if a route refers to a policy missing from
/// `state.policies`.
pub fn create_router(state: AppState) -> Result<Router, PolicyError> {
    // 1. CORS Configuration
    // Permissive: the API is consumed by browser tools such as Swagger UI.
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name used for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Swagger UI plus the raw OpenAPI JSON. Always open.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: no guard.
        .merge(public::public_routes())
        // Customer Routes: each method carries the guard for its named policy.
        // An unknown policy name aborts router construction here, not at request time.
        .merge(customers::customer_routes(&state)?)
        .with_state(state);

    // 3. Observability and Correlation Layers (applied outermost)
    Ok(base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing: one span per request, tagged with the id from 3a.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer (last, so preflight answers carry the headers too)
        .layer(cors))
}

/// Span for one request, tagged with the `x-request-id` set above so every
/// log line of the request can be correlated.
fn trace_span_logger(request: &Request<Body>) -> Span {
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
