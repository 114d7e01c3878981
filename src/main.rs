use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use traffic_predictor::{
    app::{self, AppState},
    config::Config,
    model::Models,
    predictor::Predictor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "traffic_predictor=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env()?;

    tokio::fs::create_dir_all(&cfg.output_dir)
        .await
        .with_context(|| format!("failed to create output dir {}", cfg.output_dir.display()))?;
    tracing::info!("writing results to {}", cfg.output_dir.display());

    let models = Models::load(&cfg);
    tracing::info!(
        "traffic jam model: {}, day type model: {}",
        models.traffic.status(),
        models.day_type.status()
    );

    let state = AppState::new(
        Predictor::new(models, cfg.derive_vc_ratio),
        cfg.fields.clone(),
        cfg.output_dir.clone(),
    );
    let app = app::create_router(state);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
