//! Integration registry core for the marketplace.
//!
//! This crate implements the trusted publish path of the integration
//! registry, providing:
//!
//! - CI identity token verification against a cached provider key set
//! - Live attestation that the claimed commit passed the verify workflow
//! - Binding of request provenance (version, tag, repo, manifest) to the token
//! - Transactional publishing with latest-pointer and uniqueness invariants
//! - Read paths and download tracking
//!
//! # Quick Start
//!
//! ```no_run
//! use marketplace_registry::{IntegrationStore, MarketplaceConfig, PublishPipeline};
//!
//! # async fn example(header: &str, body: &str) -> anyhow::Result<()> {
//! let config = MarketplaceConfig::from_env();
//! let store = IntegrationStore::open(&config.database_path)?;
//! let pipeline = PublishPipeline::from_config(&config, store)?;
//!
//! let request = serde_json::from_str(body)?;
//! let record = pipeline.publish(Some(header), request).await?;
//! println!("published {}@{}", record.id, record.version);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! See [`config`] for the environment variables.

pub mod bind;
pub mod config;
pub mod error;
pub mod oidc;
pub mod pipeline;
pub mod store;
pub mod types;
pub mod validate;

// Re-export main types
pub use bind::{normalize_repo_url, ClaimBinder};
pub use config::{ComposePolicy, GitHubConfig, MarketplaceConfig, OidcConfig};
pub use error::{ClaimField, RegistryError, RegistryResult};
pub use oidc::{
    IdentityClaims, KeyLookupError, KeySetCache, RunAttestor, SigningKey, TokenVerifier,
};
pub use pipeline::PublishPipeline;
pub use store::{IntegrationStore, TRENDING_WINDOW_DAYS};
pub use types::{
    EngagementStats, IntegrationRecord, ListQuery, PublishRequest, SortKey, MAX_IMAGES,
};
pub use validate::{
    bearer_token, check_compose_content, validate_publish_request, ComposeChecker,
};
