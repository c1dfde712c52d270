use std::io::Read;

use anyhow::Context;
use marketplace_registry::{MarketplaceConfig, PublishPipeline, PublishRequest, RegistryError};

use super::super::args::PublishArgs;
use super::{open_store, print_json};

pub async fn run(args: PublishArgs, config: &MarketplaceConfig) -> anyhow::Result<i32> {
    let body = if args.request.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read publish request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(&args.request)
            .with_context(|| format!("failed to read {}", args.request.display()))?
    };

    let request: PublishRequest = serde_json::from_str(&body).map_err(|e| {
        RegistryError::Validation {
            message: format!("invalid json: {e}"),
        }
    })?;

    let authorization = args
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| format!("Bearer {t}"));

    let pipeline = PublishPipeline::from_config(config, open_store(config)?)?;
    let record = pipeline.publish(authorization.as_deref(), request).await?;

    print_json(&serde_json::to_value(record)?)
}
