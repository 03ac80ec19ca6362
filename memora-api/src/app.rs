/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use memora_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::with_database(pool, config);
/// let app = memora_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use chrono::Duration;
use memora_shared::auth::permissions::CapabilityMap;
use memora_shared::auth::session::{SessionConfig, SessionManager};
use memora_shared::auth::two_factor::TwoFactorService;
use memora_shared::store::Stores;
use sqlx::PgPool;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::Config;
use crate::middleware::{security::SecurityHeadersLayer, session_gate::session_gate};

/// Shared application state
///
/// Cloned into every handler; all fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// Pool for health checks; `None` when running on the in-memory store
    pub db: Option<PgPool>,

    pub stores: Stores,

    pub sessions: SessionManager,

    pub two_factor: TwoFactorService,

    /// Role to capability table consulted by the guards
    pub capabilities: Arc<CapabilityMap>,

    pub config: Arc<Config>,
}

impl AppState {
    /// State over arbitrary stores, with the standard capability table
    pub fn new(stores: Stores, config: Config) -> Self {
        let session_config = SessionConfig::new(config.jwt.secret.clone())
            .with_ttl(Duration::days(config.session.ttl_days))
            .with_secure(config.api.production);

        Self {
            db: None,
            sessions: SessionManager::new(stores.sessions.clone(), session_config),
            two_factor: TwoFactorService::new(stores.users.clone(), config.a2f.issuer.clone()),
            stores,
            capabilities: Arc::new(CapabilityMap::standard()),
            config: Arc::new(config),
        }
    }

    /// State backed by PostgreSQL
    pub fn with_database(pool: PgPool, config: Config) -> Self {
        let mut state = Self::new(Stores::postgres(pool.clone()), config);
        state.db = Some(pool);
        state
    }

    /// Replaces the capability table
    pub fn with_capabilities(mut self, capabilities: CapabilityMap) -> Self {
        self.capabilities = Arc::new(capabilities);
        self
    }
}

/// Builds the router with all routes and middleware
///
/// ```text
/// /health                                   public
/// /v1/auth/register, /login, /a2f/verify    public
/// /v1/auth/logout, /me, /a2f/{setup,enable,disable}
/// /v1/groups[/:group_id[/members[/:user_id]]]
/// /v1/groups/:group_id/projects
/// /v1/projects/:project_id[/tasks]
/// /v1/tasks/:task_id
/// ```
///
/// Layers, outermost first: security headers, CORS, tracing, session gate.
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/logout", post(routes::auth::logout))
        .route("/me", get(routes::auth::me))
        .route("/a2f/verify", post(routes::auth::verify_a2f))
        .route("/a2f/setup", post(routes::two_factor::setup))
        .route("/a2f/enable", post(routes::two_factor::enable))
        .route("/a2f/disable", post(routes::two_factor::disable));

    let group_routes = Router::new()
        .route(
            "/",
            get(routes::groups::list_groups).post(routes::groups::create_group),
        )
        .route(
            "/:group_id",
            get(routes::groups::get_group)
                .patch(routes::groups::update_group)
                .delete(routes::groups::delete_group),
        )
        .route(
            "/:group_id/members",
            get(routes::groups::list_members).post(routes::groups::add_member),
        )
        .route(
            "/:group_id/members/:user_id",
            axum::routing::patch(routes::groups::change_member_role)
                .delete(routes::groups::remove_member),
        )
        .route(
            "/:group_id/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        );

    let project_routes = Router::new()
        .route(
            "/:project_id",
            axum::routing::patch(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        .route(
            "/:project_id/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        );

    let task_routes = Router::new().route(
        "/:task_id",
        axum::routing::patch(routes::tasks::update_task).delete(routes::tasks::delete_task),
    );

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/groups", group_routes)
        .nest("/projects", project_routes)
        .nest("/tasks", task_routes);

    let cors = cors_layer(&state.config);
    let hsts = state.config.api.production;

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/v1", v1_routes)
        .layer(axum::middleware::from_fn_with_state(state.clone(), session_gate))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(hsts))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.allows_any_origin() {
        // cookies are not sent cross-origin under a wildcard
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
