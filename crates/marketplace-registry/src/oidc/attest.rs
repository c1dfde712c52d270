//! Out-of-band confirmation that the claimed commit passed CI.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::claims::IdentityClaims;
use crate::config::{GitHubConfig, OidcConfig};
use crate::error::{RegistryError, RegistryResult};

#[derive(Debug, Deserialize)]
struct WorkflowRunsResponse {
    #[serde(default)]
    total_count: u64,
}

/// Queries the CI provider's run history for a successful workflow run.
#[derive(Debug, Clone)]
pub struct RunAttestor {
    client: Client,
    api_url: String,
    workflow: Option<String>,
    api_token: Option<String>,
}

impl RunAttestor {
    pub fn new(
        api_url: impl Into<String>,
        workflow: Option<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> RegistryResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("marketplace-registry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::AttestationUnavailable {
                message: format!("failed to build http client: {e}"),
            })?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            workflow: workflow
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty()),
            api_token: api_token
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        })
    }

    pub fn from_config(oidc: &OidcConfig, github: &GitHubConfig) -> RegistryResult<Self> {
        Self::new(
            &github.api_url,
            oidc.verify_workflow.clone(),
            github.api_token.clone(),
            oidc.http_timeout,
        )
    }

    /// Confirm that the configured workflow succeeded at the claimed commit.
    ///
    /// Fails closed when no workflow is configured.
    pub async fn confirm(&self, claims: &IdentityClaims) -> RegistryResult<()> {
        let Some(workflow) = self.workflow.as_deref() else {
            return Err(RegistryError::NotConfigured {
                message: "verify workflow not configured".to_string(),
            });
        };

        if !is_repository_slug(&claims.repository) {
            return Err(RegistryError::invalid_token(format!(
                "malformed repository claim: {}",
                claims.repository
            )));
        }

        let url = format!(
            "{}/repos/{}/actions/workflows/{}/runs",
            self.api_url, claims.repository, workflow
        );

        let mut request = self
            .client
            .get(&url)
            .query(&[
                ("per_page", "1"),
                ("status", "success"),
                ("head_sha", claims.commit_sha.as_str()),
            ])
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.api_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::AttestationUnavailable {
                message: format!("run history request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                event = "attestation_http_error",
                status = status.as_u16(),
                repository = %claims.repository,
                "run history query rejected"
            );
            return Err(RegistryError::AttestationUnavailable {
                message: format!("github api error: HTTP {}", status.as_u16()),
            });
        }

        let payload: WorkflowRunsResponse =
            response
                .json()
                .await
                .map_err(|e| RegistryError::AttestationUnavailable {
                    message: format!("invalid run history response: {e}"),
                })?;

        if payload.total_count < 1 {
            return Err(RegistryError::WorkflowNotVerified {
                repository: claims.repository.clone(),
                commit_sha: claims.commit_sha.clone(),
                workflow: workflow.to_string(),
            });
        }

        debug!(
            event = "attestation_confirmed",
            repository = %claims.repository,
            commit = %claims.commit_sha,
            workflow = %workflow
        );
        Ok(())
    }
}

/// `owner/name` with characters a repository slug can contain.
fn is_repository_slug(value: &str) -> bool {
    let mut parts = value.split('/');
    let (Some(owner), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let valid = |s: &str| {
        !s.is_empty()
            && s != "."
            && s != ".."
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    valid(owner) && valid(name)
}
