use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rtsp_fanout::api::{self, AppState};
use rtsp_fanout::{FfmpegTranscoder, ServerConfig, StreamRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtsp_fanout=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ServerConfig::default();
    if let Ok(addr) = std::env::var("RTSP_FANOUT_ADDR") {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid RTSP_FANOUT_ADDR: {addr}"))?;
        config = config.bind(addr);
    }

    let ffmpeg = std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".into());
    let transcoder = Arc::new(FfmpegTranscoder::new(&ffmpeg));

    // A missing transcoder binary is fatal; nothing can be ingested
    transcoder
        .probe()
        .await
        .context("ffmpeg is not installed or not on PATH")?;

    let registry = Arc::new(StreamRegistry::new(transcoder));
    let state = AppState::new(Arc::clone(&registry), config.clone());

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "rtsp fan-out server listening");

    api::serve_with_shutdown(state, listener, shutdown_signal()).await?;

    tracing::info!("shutting down, stopping all streams");
    registry.stop_all().await;
    tracing::info!("server exited");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
