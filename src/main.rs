use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::{Any, CorsLayer};

use onboard_flow::config::OnboardConfig;
use onboard_flow::onboarding::{
    OnboardingManager, OnboardingRouteState, RoleClassifier, onboarding_routes,
    spawn_abandonment_task,
};
use onboard_flow::store::{Database, LibSqlBackend, RoleDirectory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = OnboardConfig::from_env().context("Invalid configuration")?;

    eprintln!("Onboard Flow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/onboarding/{{user_id}}", config.http_port);

    // ── Database ─────────────────────────────────────────────────────────
    let backend = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    let db: Arc<dyn Database> = backend.clone();
    let roles: Arc<dyn RoleDirectory> = backend;
    eprintln!("   Database: {}", config.db_path.display());

    // ── Classification rules ────────────────────────────────────────────
    let classifier = match &config.classifier_rules {
        Some(path) => {
            eprintln!("   Classifier rules: {}", path.display());
            RoleClassifier::from_json_file(path)
                .with_context(|| format!("Failed to load classifier rules from {}", path.display()))?
        }
        None => {
            eprintln!("   Classifier rules: built-in");
            RoleClassifier::with_defaults()
        }
    };

    let manager = Arc::new(OnboardingManager::new(
        db,
        roles,
        classifier,
        config.retry_policy(),
    ));

    // ── Abandonment sweep ───────────────────────────────────────────────
    let _sweep_handle = match config.abandon_after {
        Some(idle) => {
            let idle = chrono::Duration::from_std(idle).context("Abandonment threshold out of range")?;
            eprintln!(
                "   Abandonment: after {}h idle, checked every {}s",
                idle.num_hours(),
                config.sweep_interval.as_secs()
            );
            Some(spawn_abandonment_task(
                Arc::clone(&manager),
                config.sweep_interval,
                idle,
            ))
        }
        None => {
            eprintln!("   Abandonment: disabled");
            None
        }
    };

    // ── HTTP ────────────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = onboarding_routes(OnboardingRouteState { manager }).layer(cors);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.http_port))?;
    tracing::info!(port = config.http_port, "Onboarding server started");
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
