//! pagebinder service entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use pagebinder::channels::{Channel, Dispatcher, TelegramChannel};
use pagebinder::config::Config;
use pagebinder::directory::AdminDirectory;
use pagebinder::logging::init_logging;
use pagebinder::pipeline::{ChromiumRenderer, DocumentPipeline};
use pagebinder::server;
use pagebinder::session::Conversations;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load(None)?;
    init_logging(&config.observability.log_level);

    tracing::info!("pagebinder v{}", env!("CARGO_PKG_VERSION"));

    anyhow::ensure!(
        !config.bot.token.is_empty(),
        "bot token is not configured (set BOT_TOKEN or [bot] token)"
    );
    anyhow::ensure!(
        !config.bot.original_admin_id.is_empty(),
        "original admin id is not configured (set ORIGINAL_ADMIN_ID or [bot] original_admin_id)"
    );

    let directory = Arc::new(AdminDirectory::open(&config.db_path())?);
    directory
        .bootstrap_original(&config.bot.original_admin_id)
        .await?;

    let work_dir = config.work_dir();
    tokio::fs::create_dir_all(&work_dir)
        .await
        .with_context(|| format!("failed to create work dir {}", work_dir.display()))?;

    let channel: Arc<dyn Channel> = Arc::new(TelegramChannel::new(config.bot.token.clone()));

    let pipeline = Arc::new(DocumentPipeline::new(
        Arc::new(ChromiumRenderer),
        Arc::clone(&channel),
        reqwest::Client::new(),
        config.pipeline.user_agent.clone(),
        Duration::from_secs(config.pipeline.navigation_timeout_secs),
        work_dir,
    ));

    let conversations = Arc::new(Conversations::new(
        Arc::clone(&channel),
        pipeline,
        Duration::from_secs(config.bot.dialog_timeout_secs),
        config.pipeline.default_output_name.clone(),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&channel),
        directory,
        conversations,
    ));

    // Health endpoint for the hosting platform
    let host = config.server.host.clone();
    let port = config.server.port;
    tokio::spawn(async move {
        if let Err(error) = server::serve(&host, port).await {
            tracing::error!(%error, "health server exited");
        }
    });

    let (tx, rx) = mpsc::channel(64);
    let listener = Arc::clone(&channel);
    tokio::spawn(async move {
        if let Err(error) = listener.listen(tx).await {
            tracing::error!(%error, "channel listener exited");
        }
    });

    tokio::select! {
        _ = dispatcher.run(rx) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
