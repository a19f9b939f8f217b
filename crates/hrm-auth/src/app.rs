use std::time::Duration;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::auth::sweeper::SessionSweeper;
use crate::config::Config;
use crate::controllers::{self, AppState};
use crate::migrations::Migrator;
use crate::openapi::ApiDoc;

/// The auth server: database, shared state and the router built on them.
pub struct App {
    pub config: Config,
    pub db: DatabaseConnection,
    state: AppState,
    custom_openapi: Option<utoipa::openapi::OpenApi>,
    api_docs_path: String,
    custom_routes: Vec<Router<AppState>>,
}

impl App {
    /// Create the application from environment configuration.
    pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::from_env()?;
        Self::with_config(config).await
    }

    /// Create the application with a given config. Pending migrations are applied.
    pub async fn with_config(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let db = crate::db::connect(&config).await?;

        tracing::info!("Running pending database migrations...");
        Migrator::up(&db, None).await?;
        tracing::info!("Migrations complete.");

        let state = AppState::new(db.clone(), config.clone());

        Ok(App {
            config,
            db,
            state,
            custom_openapi: None,
            api_docs_path: "/api-docs".to_string(),
            custom_routes: Vec::new(),
        })
    }

    /// Handle `--migrate` and `--rollback [N]` command-line flags.
    ///
    /// Returns `true` when a database command ran and the process should exit.
    pub async fn run_db_command(
        db: &DatabaseConnection,
        args: &[String],
    ) -> Result<bool, Box<dyn std::error::Error>> {
        if args.iter().any(|a| a == "--migrate") {
            tracing::info!("Running pending database migrations...");
            Migrator::up(db, None).await?;
            tracing::info!("Migrations complete.");
            return Ok(true);
        }

        if let Some(pos) = args.iter().position(|arg| arg == "--rollback") {
            let steps = args
                .get(pos + 1)
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(1);
            tracing::info!("Rolling back {} migration(s)...", steps);
            Migrator::down(db, Some(steps)).await?;
            tracing::info!("Rollback complete.");
            return Ok(true);
        }

        Ok(false)
    }

    /// Shared state for routers mounted with [`routes`](Self::routes).
    ///
    /// Protected business routers need it for `from_fn_with_state(state, authenticate)`.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Merge a router into the application, e.g. HR resource routes
    /// guarded by `authenticate` and `require_permission`.
    ///
    /// ```rust,ignore
    /// let app = App::new().await?;
    /// let employees = Router::new()
    ///     .route("/api/employees/{id}", put(update_employee))
    ///     .route_layer(from_fn(require_permission("EMPLOYEE_MANAGEMENT", Action::Update)))
    ///     .route_layer(from_fn_with_state(app.state(), authenticate));
    /// app.routes(employees).run().await?;
    /// ```
    pub fn routes(mut self, router: Router<AppState>) -> Self {
        self.custom_routes.push(router);
        self
    }

    /// Merge another OpenAPI document into the one served at the docs path.
    pub fn api_docs(mut self, openapi: utoipa::openapi::OpenApi) -> Self {
        self.custom_openapi = Some(openapi);
        self
    }

    /// Customize where the docs are served. Default: `/api-docs`.
    pub fn api_docs_url(mut self, path: &str) -> Self {
        self.api_docs_path = path.to_string();
        self
    }

    /// Build the Axum router.
    pub fn router(&self) -> Router {
        let state = self.state.clone();

        let mut openapi_spec = ApiDoc::openapi();
        if let Some(extra) = &self.custom_openapi {
            openapi_spec.merge(extra.clone());
        }
        let openapi_json = openapi_spec.clone();
        let json_path = format!("{}/openapi.json", self.api_docs_path);

        let mut app_routes: Router<AppState> = Router::new()
            .route("/", get(welcome))
            .nest("/api/auth", controllers::auth::routes(state.clone()));
        for custom in &self.custom_routes {
            app_routes = app_routes.merge(custom.clone());
        }

        let mut router = app_routes
            .with_state(state)
            .merge(Scalar::with_url(self.api_docs_path.clone(), openapi_spec))
            .route(
                &json_path,
                get(move || {
                    let spec = openapi_json.clone();
                    async move { axum::Json(spec) }
                }),
            )
            .layer(CorsLayer::permissive());

        if self.config.is_dev() {
            use tower_http::trace::DefaultMakeSpan;
            use tower_http::trace::DefaultOnRequest;
            use tower_http::trace::DefaultOnResponse;
            use tower_http::LatencyUnit;

            let x_request_id = axum::http::HeaderName::from_static("x-request-id");
            router = router
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(PropagateRequestIdLayer::new(x_request_id))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                        .on_request(DefaultOnRequest::new().level(tracing::Level::INFO))
                        .on_response(
                            DefaultOnResponse::new()
                                .level(tracing::Level::INFO)
                                .latency_unit(LatencyUnit::Millis),
                        ),
                );
        }

        router
    }

    /// Start the session sweeper for this app's database.
    pub fn spawn_sweeper(&self) -> SessionSweeper {
        let interval = Duration::from_secs(self.config.security.session_sweep_interval_secs.max(1));
        SessionSweeper::spawn(self.db.clone(), interval)
    }

    /// Serve until Ctrl+C, then stop the sweeper.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = self.config.server_addr();
        let router = self.router();
        let sweeper = self.spawn_sweeper();

        tracing::info!(
            "hrm-auth running on http://{} (docs at {})",
            addr,
            self.api_docs_path
        );

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        sweeper.stop().await;
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down hrm-auth...");
}

#[derive(Serialize)]
struct WelcomeMessage {
    service: &'static str,
    docs: &'static str,
    status: &'static str,
}

/// Service banner at `/`.
async fn welcome() -> impl IntoResponse {
    axum::Json(WelcomeMessage {
        service: "hrm-auth",
        docs: "/api-docs",
        status: "running",
    })
}
