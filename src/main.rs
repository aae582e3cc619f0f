use anyhow::Result;
use photobind::config::Config;
use photobind::gateway::{self, BotContext};
use photobind::pdf::PdfRenderer;
use photobind::session::SessionStore;
use photobind::storage::StagingArea;
use photobind::telegram::{TelegramApi, Transport};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;

    let api = TelegramApi::new(config.bot_token.clone())?;
    api.check_token().await?;
    let transport: Arc<dyn Transport> = Arc::new(api);

    let ctx = Arc::new(BotContext {
        transport,
        renderer: Arc::new(PdfRenderer),
        sessions: Arc::new(SessionStore::new()),
        staging: Arc::new(StagingArea::new(config.staging_dir.clone())),
        operator_id: config.operator_id,
    });

    println!("🤖 photobind is polling for updates...");
    gateway::run(ctx).await;
    Ok(())
}
