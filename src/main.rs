use actix_web::{middleware::Compress, web, App, HttpServer};
use actix_cors::Cors;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;

use fraudwatch::auth::{AuthProvider, HttpAuthProvider};
use fraudwatch::openapi::ApiDoc;
use fraudwatch::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use fraudwatch::routes::{config, AppState};
use fraudwatch::scorer::{HttpScorer, Scorer};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment comes from the deployment (shell, systemd, Docker, ...).
    // Load .env automatically only in debug builds to reduce local setup.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping fraudwatch server");

    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        warn!("metrics exporter not started: {e}");
    }

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = {
        info!("Using in-memory repository backend");
        fraudwatch::repo::inmem::InMemRepo::new()
    };

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&db_url)
            .expect("Failed to create Pg pool");
        info!("Using Postgres repository backend");
        fraudwatch::repo::pg::PgRepo::new(pool)
    };

    let scorer: Arc<dyn Scorer> =
        Arc::new(HttpScorer::from_env().expect("scorer configuration"));

    let auth: Option<Arc<dyn AuthProvider>> = match HttpAuthProvider::from_env() {
        Ok(p) => Some(Arc::new(p)),
        Err(e) => {
            warn!("auth provider not configured ({e}); auth endpoints will answer 503");
            None
        }
    };

    let rl_enabled = std::env::var("RL_ENABLED")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(true);
    let rate_limiter = Some(RateLimiterFacade::new(
        InMemoryRateLimiter::new(rl_enabled),
        RateLimitConfig::from_env(),
    ));

    let state = AppState { repo: Arc::new(repo), scorer, auth, rate_limiter };
    let openapi = ApiDoc::openapi();

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // local dev frontend ports (Vite dev server / containerized nginx)
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(("0.0.0.0", 8080))?;

    info!("Listening on http://0.0.0.0:8080");

    server.run().await
}

/// Validate that required environment variables are set
fn validate_env_vars() {
    use std::env;

    let mut missing = Vec::new();
    for var in ["JWT_SECRET", "SCORER_BASE_URL"] {
        if env::var(var).is_err() {
            missing.push(var);
        }
    }

    if !missing.is_empty() {
        eprintln!("Missing required environment variables: {missing:?}");
        eprintln!("Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }

    if let Ok(secret) = env::var("JWT_SECRET") {
        if secret.len() < 32 {
            eprintln!("JWT_SECRET must be at least 32 characters long for security");
            std::process::exit(1);
        }
    }

    if env::var("AUTH_BASE_URL").is_err() {
        eprintln!("Warning: AUTH_BASE_URL not set; signup/login/logout will be unavailable");
    }
}
