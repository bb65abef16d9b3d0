use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use yt_comment_replier::config::Config;
use yt_comment_replier::gateway::OAuthGateway;
use yt_comment_replier::server::{self, AppState};
use yt_comment_replier::store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
use yt_data_client::YouTubeClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = Config::parse();

    info!("Starting yt-comment-replier v{}", env!("CARGO_PKG_VERSION"));

    let oauth = config
        .oauth_config()
        .context("Failed to load OAuth client credentials")?;
    info!("OAuth redirect URI: {}", oauth.redirect_uri);

    let store: Arc<dyn CredentialStore> = match &config.session_dir {
        Some(dir) => {
            info!("Storing user tokens in: {}", dir.display());
            Arc::new(FileCredentialStore::open(dir).context("Failed to open session directory")?)
        }
        None => {
            info!("Storing user tokens in memory");
            Arc::new(MemoryCredentialStore::default())
        }
    };

    let mut rng = config.rng();
    if config.rng_seed.is_some() {
        info!("Using seeded random source");
    }

    let http = reqwest::Client::new();
    let api = YouTubeClient::from_env(http.clone());
    info!("YouTube Data API at: {}", api.base_url());

    let gateway = OAuthGateway::new(oauth, http, store, StdRng::from_seed(rng.r#gen()));
    let state = Arc::new(AppState::new(
        Arc::new(api),
        gateway,
        config.frontend_url.clone(),
        rng,
    ));

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address()))?;
    info!("Listening on http://{}", listener.local_addr()?);

    server::serve(listener, state).await?;

    info!("Shutdown complete");
    Ok(())
}
