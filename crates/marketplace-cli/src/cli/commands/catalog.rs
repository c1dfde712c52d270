//! Catalog reads and engagement updates.

use marketplace_registry::{ListQuery, MarketplaceConfig, SortKey};
use serde_json::json;

use super::super::args::{FeatureArgs, GetArgs, IdArgs, ListArgs};
use super::{open_store, print_json};

pub fn list(args: ListArgs, config: &MarketplaceConfig) -> anyhow::Result<i32> {
    let store = open_store(config)?;
    let items = store.list(ListQuery {
        latest_only: !args.all,
        featured_only: args.featured,
        sort: SortKey::parse(&args.sort),
    })?;
    print_json(&json!({ "integrations": items }))
}

pub fn get(args: GetArgs, config: &MarketplaceConfig) -> anyhow::Result<i32> {
    let store = open_store(config)?;
    let item = store.get(&args.id, args.version.as_deref())?;
    print_json(&serde_json::to_value(item)?)
}

pub fn versions(args: IdArgs, config: &MarketplaceConfig) -> anyhow::Result<i32> {
    let store = open_store(config)?;
    let items = store.list_versions(&args.id)?;
    print_json(&json!({ "versions": items }))
}

pub fn record_download(args: IdArgs, config: &MarketplaceConfig) -> anyhow::Result<i32> {
    let store = open_store(config)?;
    let item = store.record_download(&args.id)?;
    print_json(&serde_json::to_value(item)?)
}

pub fn feature(args: FeatureArgs, config: &MarketplaceConfig) -> anyhow::Result<i32> {
    let store = open_store(config)?;
    let item = store.set_featured(&args.id, !args.off)?;
    print_json(&serde_json::to_value(item)?)
}
