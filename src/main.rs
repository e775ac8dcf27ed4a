use anyhow::Context;
use livedesk::bootstrap;
use livedesk::config::Config;
use livedesk::infrastructure::http::router::build_router;
use livedesk::infrastructure::observability;
use livedesk::infrastructure::persistence::Database;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Tracing, optional OTLP export and the Prometheus endpoint
    let _observability = observability::init(&config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize observability: {}", e))?;
    tracing::info!("Configuration loaded");

    // Initialize database connection
    let db = Database::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection established");

    // Run migrations
    db.run_migrations()
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    let app = bootstrap::build_app(db.clone(), &config)
        .map_err(|e| anyhow::anyhow!("Failed to build application: {}", e))?;

    // Nobody is connected yet, so nobody is online
    app.state
        .presence_service
        .reset_all()
        .await
        .context("Failed to reset agent presence")?;

    // Start the escalation sweep
    let shutdown = CancellationToken::new();
    let sweeper = app.escalation_worker.start(shutdown.clone());

    let hub = app.state.connection_hub.clone();
    let router = build_router(app.state);

    // Start server
    let addr = config.server_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("listening on {}", addr);

    let signal = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
            signal.cancel();
            hub.close_all().await;
        })
        .await?;

    // Let an in-flight sweep finish
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::error!("Escalation worker ended abnormally: {}", e);
    }

    db.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
