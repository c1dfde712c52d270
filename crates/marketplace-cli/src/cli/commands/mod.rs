use std::path::PathBuf;

use anyhow::Context;
use marketplace_registry::{IntegrationStore, MarketplaceConfig};
use serde_json::Value;

use super::args::{Cli, Command};
use crate::exit_codes::SUCCESS;

pub mod catalog;
pub mod publish;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = load_config(cli.database);

    match cli.cmd {
        Command::InitDb => init_db(&config),
        Command::Publish(args) => publish::run(args, &config).await,
        Command::List(args) => catalog::list(args, &config),
        Command::Get(args) => catalog::get(args, &config),
        Command::Versions(args) => catalog::versions(args, &config),
        Command::RecordDownload(args) => catalog::record_download(args, &config),
        Command::Feature(args) => catalog::feature(args, &config),
    }
}

fn load_config(database: Option<PathBuf>) -> MarketplaceConfig {
    let config = MarketplaceConfig::from_env();
    match database {
        Some(path) => config.with_database_path(path),
        None => config,
    }
}

pub(crate) fn open_store(config: &MarketplaceConfig) -> anyhow::Result<IntegrationStore> {
    Ok(IntegrationStore::open(&config.database_path)?)
}

pub(crate) fn print_json(value: &Value) -> anyhow::Result<i32> {
    let out = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{out}");
    Ok(SUCCESS)
}

fn init_db(config: &MarketplaceConfig) -> anyhow::Result<i32> {
    open_store(config)?;
    tracing::info!(
        event = "schema_ready",
        database = %config.database_path.display()
    );
    print_json(&serde_json::json!({
        "database": config.database_path.display().to_string(),
        "status": "ready"
    }))
}
