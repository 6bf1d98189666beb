use std::io;
use std::path::Path;

use anyhow::Context;
use beddy_logging::BeddySubscriberBuilder;
use beddy_monitor::{Cli, EventService, MonitorConfig, pump};
use clap::Parser;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = MonitorConfig::resolve(&cli)?;

    let _log_guard = BeddySubscriberBuilder::new()
        .with_config(config.log.clone())
        .init()
        .context("Failed to initialize logging")?;

    let service = EventService::open(&config).context("Failed to open event store")?;
    let resume_cursor = service.resume_cursor().await?;
    info!(
        backend = ?config.store.backend,
        resume_cursor,
        "Event service ready"
    );

    let input = open_input(cli.input.as_deref()).await?;
    let mut stdout = io::stdout().lock();
    let result = pump(&service, input, &mut stdout).await;

    service.stop().await?;
    let stats = result?;
    info!(
        events_put = stats.events_put,
        lines_skipped = stats.lines_skipped,
        changes_reported = stats.changes_reported,
        "Monitor finished"
    );
    Ok(())
}

async fn open_input(path: Option<&Path>) -> anyhow::Result<Box<dyn AsyncBufRead + Unpin>> {
    let input: Box<dyn AsyncBufRead + Unpin> = match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    Ok(input)
}
