use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use blogicum::openapi::ApiDoc;
use blogicum::rate_limit::RateLimiterFacade;
use blogicum::repo::Repo;
use blogicum::storage::FsImageStore;
use blogicum::{config, AppConfig, AppState, SecurityHeaders};

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use blogicum::repo::inmem::InMemRepo;
    let repo = match &cfg.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            info!("Using in-memory repository backend with snapshot in {}", dir.display());
            InMemRepo::with_snapshot(dir.join("blog.json"))
        }
        None => {
            info!("Using in-memory repository backend");
            InMemRepo::new()
        }
    };
    Ok(Arc::new(repo))
}

#[cfg(feature = "postgres-store")]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use blogicum::repo::pg::PgRepo;
    use sqlx::postgres::PgPoolOptions;
    let db_url = cfg.database_url.as_deref().context("DATABASE_URL must be set for postgres-store")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connecting to Postgres")?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.map_err(|e| anyhow::anyhow!("migrations failed: {e}"))?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = AppConfig::from_env()?;
    info!("Bootstrapping blogicum");
    info!("Frontend URL: {}", cfg.frontend_url.as_deref().unwrap_or("(none)"));

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = build_repo(&cfg)?;
    #[cfg(feature = "postgres-store")]
    let repo = build_repo(&cfg).await?;

    let image_store = Arc::new(FsImageStore::new(cfg.media_dir.clone()));
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("installing Prometheus recorder")?;

    let state = AppState::new(repo, image_store)
        .with_rate_limiter(RateLimiterFacade::from_config(cfg.rate_limit.clone()))
        .with_metrics(metrics)
        .with_bootstrap_admins(cfg.bootstrap_admins.clone());

    let openapi = ApiDoc::openapi();
    info!("OpenAPI document generated");

    let frontend_url = cfg.frontend_url.clone();
    let enable_hsts = cfg.enable_hsts;
    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // during local dev allow Vite default port
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
                .max_age(3600);
            if let Some(front) = &frontend_url {
                c = c.allowed_origin(front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::new(enable_hsts))
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
            .configure(config)
    })
    .bind(&cfg.bind_addr)
    .with_context(|| format!("binding {}", cfg.bind_addr))?;

    info!("Listening on http://{}", cfg.bind_addr);

    server.run().await?;
    Ok(())
}
