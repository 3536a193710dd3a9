use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use taskhive_backend_lib::{config::Settings, routes, AppState};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// TaskHive realtime backend
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the config file
    #[arg(long, default_value = "config/default.toml")]
    config: String,

    /// Override the bind address from the config
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load_from(&args.config)?;
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    let (state, _store) = AppState::in_memory(settings.clone());
    let app = routes::create_app(Arc::new(state));

    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!("listening on {}", settings.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
