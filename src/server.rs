use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use hookbox::bus::ImageEvent;
use hookbox::config::Config;
use hookbox::pipeline::Pipeline;

use crate::cli::PushArgs;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn serve(address: Option<SocketAddr>) -> Result<(), AnyError> {
    info!("Loading configuration");
    let config = Config::load()?;
    let address = address.unwrap_or(config.server.bind_addr);

    let pipeline = Pipeline::assemble(config)?;
    hookbox::api::run(pipeline.app_state(), address).await?;

    pipeline.store.persist()?;
    info!("Ledger flushed, exiting");
    Ok(())
}

pub async fn prune() -> Result<(), AnyError> {
    let config = Config::load()?;
    let ttl = chrono::Duration::from_std(config.retention.record_ttl.as_duration())?;

    let store = hookbox::ledger::LedgerStore::open(&config.server.ledger_path)?;
    let stats = store.prune_terminal_records(ttl)?;
    info!(?stats, ttl = %config.retention.record_ttl, "Prune finished");
    Ok(())
}

pub async fn push(args: PushArgs) -> Result<(), AnyError> {
    let (repository, tag) = args
        .image
        .rsplit_once(':')
        .filter(|(repo, tag)| !repo.is_empty() && !tag.is_empty() && !tag.contains('/'))
        .ok_or_else(|| format!("image '{}' must be repository:tag", args.image))?;

    let config = Config::load()?;
    let pipeline = Pipeline::assemble(config)?;

    let event = ImageEvent::new(args.project_id, repository, tag).with_labels(args.labels);
    let report = pipeline.publish_push(event).await?;
    info!(handled = report.handled, failed = report.failed, "Push event published");

    if pipeline.local_runner.is_some() {
        let wait: Duration = args.wait.into();
        info!(?wait, "Waiting for in-process deliveries");
        tokio::time::sleep(wait).await;
    }
    pipeline.store.persist()?;
    Ok(())
}

pub fn print_config() -> Result<(), AnyError> {
    let config = Config::load()?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
