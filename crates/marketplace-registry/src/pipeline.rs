//! Privileged publish: identity → attestation → binding → storage.

use tracing::{info, warn};

use crate::bind::ClaimBinder;
use crate::config::MarketplaceConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::oidc::{IdentityClaims, RunAttestor, TokenVerifier};
use crate::store::IntegrationStore;
use crate::types::{IntegrationRecord, PublishRequest};
use crate::validate::{bearer_token, validate_publish_request, ComposeChecker};

/// Publishes integrations on behalf of verified CI runs.
#[derive(Debug, Clone)]
pub struct PublishPipeline {
    verifier: TokenVerifier,
    attestor: RunAttestor,
    binder: ClaimBinder,
    compose: ComposeChecker,
    store: IntegrationStore,
}

impl PublishPipeline {
    pub fn new(
        verifier: TokenVerifier,
        attestor: RunAttestor,
        binder: ClaimBinder,
        compose: ComposeChecker,
        store: IntegrationStore,
    ) -> Self {
        Self {
            verifier,
            attestor,
            binder,
            compose,
            store,
        }
    }

    pub fn from_config(config: &MarketplaceConfig, store: IntegrationStore) -> RegistryResult<Self> {
        Ok(Self::new(
            TokenVerifier::from_config(&config.oidc)?,
            RunAttestor::from_config(&config.oidc, &config.github)?,
            ClaimBinder::from_config(&config.oidc, &config.github),
            ComposeChecker::new(config.compose.clone())?,
            store,
        ))
    }

    pub fn store(&self) -> &IntegrationStore {
        &self.store
    }

    /// Publish `request` authorized by the `Authorization` header value.
    ///
    /// Stages run in order and the first failure is returned unchanged.
    /// No outbound compose fetch happens before the request is bound to
    /// the verified identity.
    pub async fn publish(
        &self,
        authorization: Option<&str>,
        request: PublishRequest,
    ) -> RegistryResult<IntegrationRecord> {
        let token = bearer_token(authorization)?;

        let claims = self.verifier.verify(token).await.inspect_err(|e| {
            warn!(event = "publish_rejected", stage = "verify", error = %e);
        })?;

        self.attestor
            .confirm(&claims)
            .await
            .inspect_err(|e| log_rejection("attest", &claims, e))?;

        // A non-tag identity is refused before the body is looked at.
        self.binder
            .tag_from_claims(&claims)
            .inspect_err(|e| log_rejection("tag", &claims, e))?;

        let request = validate_publish_request(&request, self.compose.policy())
            .inspect_err(|e| log_rejection("validate", &claims, e))?;

        let tag = self
            .binder
            .bind(&request, &claims)
            .inspect_err(|e| log_rejection("bind", &claims, e))?;

        self.compose
            .check(&request.compose_file)
            .await
            .inspect_err(|e| log_rejection("compose", &claims, e))?;

        let store = self.store.clone();
        let record = tokio::task::spawn_blocking(move || store.publish(&request, true))
            .await
            .map_err(|e| RegistryError::Storage {
                message: format!("publish task failed: {e}"),
            })??;

        info!(
            event = "publish_oidc_accepted",
            package_id = %record.id,
            version = %record.version,
            tag = %tag,
            repository = %claims.repository,
            commit = %claims.commit_sha,
            run_id = %claims.run_id
        );
        Ok(record)
    }
}

fn log_rejection(stage: &'static str, claims: &IdentityClaims, err: &RegistryError) {
    warn!(
        event = "publish_rejected",
        stage,
        repository = %claims.repository,
        git_ref = %claims.git_ref,
        ref_type = %claims.ref_kind,
        commit = %claims.commit_sha,
        workflow = %claims.workflow_name,
        actor = %claims.actor,
        run_id = %claims.run_id,
        error = %err
    );
}
