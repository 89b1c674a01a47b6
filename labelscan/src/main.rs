use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use labelscan::api::{create_router, AppState};
use labelscan::config::Config;

#[derive(Parser)]
#[command(name = "labelscan")]
#[command(about = "Reads photographed labels with local OCR or a remote vision model")]
struct Args {
    /// Refuse to start when the vision model has no usable credential
    #[arg(long)]
    require_vision: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "labelscan=info,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config = Config::from_env();

    tokio::fs::create_dir_all(&config.uploads.dir).await?;
    tracing::info!("Upload directory: {}", config.uploads.dir.display());

    tracing::info!(
        "Initializing OCR: languages={}, max dimension={}",
        config.ocr.languages,
        config.ocr.max_image_dimension
    );

    let state = AppState::new(config.clone());

    if let Some(reason) = state.pipeline.vision().unavailable_reason() {
        tracing::error!("{} - /image/analyze-openai will fail until OPENAI_API_KEY is set", reason);
        if args.require_vision {
            return Err(anyhow::anyhow!(
                "Vision model unavailable and --require-vision was given: {reason}"
            ));
        }
    }

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Labelscan starting on http://{}", addr);
    tracing::info!("  Health check: http://{}/health", addr);
    tracing::info!("  Local OCR:    POST http://{}/image/analyze", addr);
    tracing::info!("  Vision model: POST http://{}/image/analyze-openai", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining in-flight requests...");
}
