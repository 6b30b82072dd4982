//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        db::DbAdapter, email::HttpEmailAdapter, generator_llm::OpenAiGeneratorAdapter,
        whatsapp::GraphApiWhatsAppAdapter,
    },
    config::Config,
    error::ApiError,
    tasks::{dispatch_loop, scheduler_loop},
    web::{
        delivery_status_webhook_handler, health_handler, repair_handler, rest::ApiDoc,
        run_dispatcher_handler, run_scheduler_handler, state::AppState,
    },
};
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    // Without an API key the generator errors per call and selection falls
    // back to the static word pool.
    if config.openai_api_key.is_none() {
        info!("OPENAI_API_KEY not set; word generation disabled, using fallback pool");
    }
    let generator = Arc::new(OpenAiGeneratorAdapter::new(
        config.openai_api_key.as_deref(),
        config.generation_model.clone(),
    ));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.provider_timeout_secs))
        .build()
        .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {e}")))?;

    let whatsapp = Arc::new(GraphApiWhatsAppAdapter::new(
        http.clone(),
        config.whatsapp_api_base.clone(),
        config.whatsapp_access_token.clone(),
        config.whatsapp_phone_number_id.clone(),
    ));
    let email = Arc::new(HttpEmailAdapter::new(
        http,
        config.email_api_base.clone(),
        config.email_api_key.clone(),
        config.email_sender.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        store: db_adapter,
        config: config.clone(),
        generator,
        whatsapp,
        email,
    });

    // --- 5. Spawn the Background Loops ---
    tokio::spawn(dispatch_loop(app_state.clone()));
    tokio::spawn(scheduler_loop(app_state.clone()));

    // --- 6. Create the Web Router ---
    let api_router = Router::new()
        .route("/scheduler/run", post(run_scheduler_handler))
        .route("/dispatcher/run", post(run_dispatcher_handler))
        .route("/health", get(health_handler))
        .route("/repairs/{action}", post(repair_handler))
        .route(
            "/webhooks/delivery-status",
            post(delivery_status_webhook_handler),
        )
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
